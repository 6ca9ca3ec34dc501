mod acl;
mod hmac;
mod jwt;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService};
pub use jwt::{JwtMiddlewareFactory, JwtMiddlewareService};
