//! Grammar checks for the names that appear in message headers.

use crate::dbus::{MAX_NAME_LEN, ValidationError};


fn is_element_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Checks `.`-separated elements. At least two elements, none empty.
fn dotted(s: &str, extra: &[u8], digit_start: bool) -> bool {
    if s.is_empty() || s.len() > MAX_NAME_LEN {
        return false;
    }
    let mut elements = 0;
    for element in s.split('.') {
        let Some(&first) = element.as_bytes().first() else {
            return false;
        };
        if !digit_start && first.is_ascii_digit() {
            return false;
        }
        let valid = element
            .bytes()
            .all(|c| is_element_char(c) || extra.contains(&c));
        if !valid {
            return false;
        }
        elements += 1;
    }
    elements >= 2
}

pub fn validate_object_path(s: &str) -> Result<(), ValidationError> {
    let err = || ValidationError::ObjectPath(s.to_owned());
    let Some(rest) = s.strip_prefix('/') else {
        return Err(err());
    };
    if rest.is_empty() {
        return Ok(());
    }
    for element in rest.split('/') {
        if element.is_empty() || !element.bytes().all(is_element_char) {
            return Err(err());
        }
    }
    Ok(())
}

pub fn validate_interface(s: &str) -> Result<(), ValidationError> {
    match dotted(s, &[], false) {
        true => Ok(()),
        false => Err(ValidationError::Interface(s.to_owned())),
    }
}

pub fn validate_error_name(s: &str) -> Result<(), ValidationError> {
    match dotted(s, &[], false) {
        true => Ok(()),
        false => Err(ValidationError::ErrorName(s.to_owned())),
    }
}

pub fn validate_member(s: &str) -> Result<(), ValidationError> {
    let valid = match s.as_bytes().first() {
        Some(c) if !c.is_ascii_digit() => {
            s.len() <= MAX_NAME_LEN && s.bytes().all(is_element_char)
        }
        _ => false,
    };
    match valid {
        true => Ok(()),
        false => Err(ValidationError::Member(s.to_owned())),
    }
}

/// Accepts unique names (`:1.42`) and well-known names (`org.example.Foo`).
pub fn validate_bus_name(s: &str) -> Result<(), ValidationError> {
    let valid = match s.strip_prefix(':') {
        Some(rest) => s.len() <= MAX_NAME_LEN && dotted(rest, b"-", true),
        None => dotted(s, b"-", false),
    };
    match valid {
        true => Ok(()),
        false => Err(ValidationError::BusName(s.to_owned())),
    }
}

pub fn is_unique_name(s: &str) -> bool {
    s.starts_with(':')
}
