mod helpers;
mod paise;

pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use paise::{Paise, PaiseConversionError, CURRENCY_CODE, PAISE_PER_RUPEE};
pub use secret::Secret;
