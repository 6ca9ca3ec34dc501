use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OrderId, Paise, Payment, PaymentStatus, Registration, Sport, TeamInfo, TeamMember},
    traits::RegistrationError,
};

pub const MAX_TEAM_NAME_LENGTH: usize = 100;
pub const MIN_MEMBER_NAME_LENGTH: usize = 2;
pub const MAX_MEMBER_NAME_LENGTH: usize = 50;
pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_PHONE_DIGITS: usize = 15;

/// A registration together with its payment row, if one has been recorded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDetail {
    pub registration: Registration,
    pub payment: Option<Payment>,
}

/// Everything needed to open (or re-open) a gateway order for a PENDING registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentQuote {
    pub registration: Registration,
    pub sport: Sport,
    pub payment: Option<Payment>,
}

impl PaymentQuote {
    pub fn amount(&self) -> Paise {
        self.sport.fee
    }

    /// The existing gateway order, if it can still be paid. Placeholder orders never qualify.
    pub fn open_gateway_order(&self) -> Option<&Payment> {
        self.payment
            .as_ref()
            .filter(|p| p.status == PaymentStatus::Pending && !p.order_id.is_placeholder())
    }

    pub fn placeholder_order_id(&self) -> OrderId {
        OrderId::placeholder(self.registration.id)
    }
}

/// Checks the team metadata of a registration request against the sport's team rules.
///
/// Individual sports must not carry team metadata. Team sports require a team name and a member list whose length
/// is within the sport's `[min_team_size, max_team_size]` range.
pub fn validate_team(sport: &Sport, team: Option<&TeamInfo>) -> Result<(), RegistrationError> {
    let team = match (sport.is_team_sport(), team) {
        (false, None) => return Ok(()),
        (false, Some(_)) => {
            return Err(RegistrationError::ValidationError(format!("{} is not a team sport", sport.name)));
        },
        (true, None) => {
            return Err(RegistrationError::ValidationError(format!("{} requires team details", sport.name)));
        },
        (true, Some(team)) => team,
    };
    let name_len = team.team_name.trim().chars().count();
    if name_len == 0 || name_len > MAX_TEAM_NAME_LENGTH {
        return Err(RegistrationError::ValidationError(format!(
            "Team name must be between 1 and {MAX_TEAM_NAME_LENGTH} characters"
        )));
    }
    let count = team.members.len() as i64;
    if count < sport.min_team_size || count > sport.max_team_size {
        return Err(RegistrationError::ValidationError(format!(
            "{} teams must have between {} and {} members, but {count} were given",
            sport.name, sport.min_team_size, sport.max_team_size
        )));
    }
    for (i, member) in team.members.iter().enumerate() {
        validate_member(member).map_err(|e| RegistrationError::ValidationError(format!("Team member {}: {e}", i + 1)))?;
    }
    Ok(())
}

fn validate_member(member: &TeamMember) -> Result<(), String> {
    let name_len = member.name.trim().chars().count();
    if !(MIN_MEMBER_NAME_LENGTH..=MAX_MEMBER_NAME_LENGTH).contains(&name_len) {
        return Err(format!(
            "name must be between {MIN_MEMBER_NAME_LENGTH} and {MAX_MEMBER_NAME_LENGTH} characters"
        ));
    }
    if !is_valid_email(member.email.trim()) {
        return Err(format!("'{}' is not a valid email address", member.email));
    }
    if !is_valid_phone(member.phone.trim()) {
        return Err(format!("phone number must have {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits"));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain.split('.').count() > 1
        && domain.split('.').all(|part| !part.is_empty())
}

fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    digits.chars().all(|c| c.is_ascii_digit()) && (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len())
}
