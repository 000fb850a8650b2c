use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;
use validator::ValidationError;

/// Usernames and group names: non-empty, printable, no leading/trailing whitespace.
pub static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S(.*\S)?$").unwrap());

pub fn validate_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || !NAME_REGEX.is_match(value) {
        let mut err = ValidationError::new("invalid_name");
        err.message = Some(Cow::Borrowed(
            "must be non-empty and not start or end with whitespace",
        ));
        return Err(err);
    }
    Ok(())
}
