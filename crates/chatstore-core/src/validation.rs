//! Field rules for usernames and contact numbers.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

lazy_static! {
    static ref USERNAME: Regex = Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").unwrap();
    static ref CONTACT_NUMBER: Regex = Regex::new(r"^C-[0-9]{6}$").unwrap();
}

/// Username format check (`^[A-Za-z0-9_.-]{1,64}$`)
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername(username.to_string()))
    }
}

/// Contact number format check (`C-` followed by six ASCII digits)
pub fn validate_contact_number(contact: &str) -> Result<(), ValidationError> {
    if CONTACT_NUMBER.is_match(contact) {
        Ok(())
    } else {
        Err(ValidationError::InvalidContactNumber(contact.to_string()))
    }
}
