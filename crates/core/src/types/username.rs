//! Login username type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    #[error("username cannot be empty")]
    Empty,
    #[error("username must be at most {max} characters")]
    TooLong { max: usize },
    #[error("username may only contain letters, digits and @/./+/-/_ (found {0:?})")]
    InvalidCharacter(char),
}

/// A login username shared by learners and admins.
///
/// 1-150 characters drawn from letters, digits and `@ . + - _`. Usernames
/// are case-sensitive and are never trimmed, so the value checked against
/// a confirmation prompt is exactly the stored one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub const MAX_LENGTH: usize = 150;

    /// Parse a `Username`.
    ///
    /// # Errors
    ///
    /// Returns [`UsernameError`] if the input is empty, too long or contains
    /// a character outside the allowed set.
    pub fn parse(s: &str) -> Result<Self, UsernameError> {
        if s.is_empty() {
            return Err(UsernameError::Empty);
        }
        if s.chars().count() > Self::MAX_LENGTH {
            return Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')))
        {
            return Err(UsernameError::InvalidCharacter(bad));
        }
        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(Username::parse("alice").unwrap().as_str(), "alice");
        assert!(Username::parse("bob.smith+1@home").is_ok());
        assert!(Username::parse("root_admin-2").is_ok());
    }

    #[test]
    fn test_parse_rejects_empty_and_long() {
        assert_eq!(Username::parse(""), Err(UsernameError::Empty));
        assert!(matches!(
            Username::parse(&"x".repeat(151)),
            Err(UsernameError::TooLong { max: 150 })
        ));
        assert!(Username::parse(&"x".repeat(150)).is_ok());
    }

    #[test]
    fn test_parse_rejects_spaces_and_symbols() {
        assert_eq!(
            Username::parse("alice smith"),
            Err(UsernameError::InvalidCharacter(' '))
        );
        assert_eq!(
            Username::parse("bob!"),
            Err(UsernameError::InvalidCharacter('!'))
        );
    }

    #[test]
    fn test_case_is_preserved() {
        let a = Username::parse("Bob").unwrap();
        let b = Username::parse("bob").unwrap();
        assert_ne!(a, b);
    }
}
