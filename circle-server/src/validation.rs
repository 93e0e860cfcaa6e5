//! Input validation shared by the handlers.

use circle_types::Visibility;
use thiserror::Error;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const POST_MAX_LEN: usize = 2_000;
pub const COMMENT_MAX_LEN: usize = 500;
pub const MESSAGE_MAX_LEN: usize = 2_000;
pub const BIO_MAX_LEN: usize = 300;
pub const GROUP_NAME_MAX_LEN: usize = 80;
pub const SUBJECT_MAX_LEN: usize = 150;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username must be {}-{} characters", USERNAME_MIN_LEN, USERNAME_MAX_LEN)]
    UsernameLength,
    #[error("Username may only contain letters, digits, '_' and '.'")]
    UsernameCharacters,
    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("Password must be at most {} characters", PASSWORD_MAX_LEN)]
    PasswordTooLong,
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("{field} exceeds {max} character limit (current: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
    #[error("Invalid visibility '{0}'. Use 'public' or 'friends'")]
    Visibility(String),
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::UsernameLength);
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(ValidationError::UsernameCharacters);
    }
    Ok(())
}

pub fn validate_password(password: &str, min_len: usize) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < min_len {
        return Err(ValidationError::PasswordTooShort(min_len));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(ValidationError::PasswordTooLong);
    }
    Ok(())
}

/// Trim `text` and check it is non-empty and within `max` characters.
pub fn validate_text<'a>(
    field: &'static str,
    text: &'a str,
    max: usize,
) -> Result<&'a str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    let actual = trimmed.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(trimmed)
}

/// Like [`validate_text`] but an empty value is allowed and becomes `None`.
pub fn validate_optional_text(
    field: &'static str,
    text: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => validate_text(field, value, max).map(|v| Some(v.to_string())),
    }
}

/// Missing visibility defaults to public.
pub fn parse_visibility(raw: Option<&str>) -> Result<Visibility, ValidationError> {
    match raw {
        None => Ok(Visibility::default()),
        Some(value) => {
            Visibility::parse(value).ok_or_else(|| ValidationError::Visibility(value.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("a.b").is_ok());
        assert_eq!(validate_username("ab"), Err(ValidationError::UsernameLength));
        assert_eq!(
            validate_username("has space"),
            Err(ValidationError::UsernameCharacters)
        );
        assert_eq!(
            validate_username("émile"),
            Err(ValidationError::UsernameCharacters)
        );
    }

    #[test]
    fn test_password_rules() {
        assert_eq!(
            validate_password("short", 8),
            Err(ValidationError::PasswordTooShort(8))
        );
        assert!(validate_password("long enough", 8).is_ok());
        assert_eq!(
            validate_password(&"x".repeat(PASSWORD_MAX_LEN + 1), 8),
            Err(ValidationError::PasswordTooLong)
        );
    }

    #[test]
    fn test_validate_text_trims_and_limits() {
        assert_eq!(validate_text("Post", "  hi  ", 10), Ok("hi"));
        assert_eq!(validate_text("Post", "   ", 10), Err(ValidationError::Empty("Post")));
        let err = validate_text("Comment", "abcdef", 5).unwrap_err();
        assert_eq!(err.to_string(), "Comment exceeds 5 character limit (current: 6)");
    }

    #[test]
    fn test_optional_text_blank_is_none() {
        assert_eq!(validate_optional_text("Bio", Some("  "), 10), Ok(None));
        assert_eq!(validate_optional_text("Bio", None, 10), Ok(None));
        assert_eq!(
            validate_optional_text("Bio", Some(" hey "), 10),
            Ok(Some("hey".to_string()))
        );
    }

    #[test]
    fn test_parse_visibility() {
        assert_eq!(parse_visibility(None), Ok(Visibility::Public));
        assert_eq!(parse_visibility(Some("friends")), Ok(Visibility::Friends));
        assert!(parse_visibility(Some("secret")).is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_usernames_accepted(name in "[A-Za-z0-9_.]{3,30}") {
            prop_assert!(validate_username(&name).is_ok());
        }

        #[test]
        fn prop_usernames_with_other_chars_rejected(
            prefix in "[a-z]{2,10}",
            bad in "[ !@#$%^&*()+=/-]",
            suffix in "[a-z]{1,10}",
        ) {
            let name = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(validate_username(&name).is_err());
        }

        #[test]
        fn prop_validated_text_never_exceeds_limit(text in ".{0,80}", max in 1usize..60) {
            if let Ok(value) = validate_text("Field", &text, max) {
                prop_assert!(value.chars().count() <= max);
                prop_assert!(!value.is_empty());
            }
        }
    }
}
