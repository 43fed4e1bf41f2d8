//! Login/registration form input.
//!
//! Empty fields are rejected here, before anything reaches the store.
//! Anything else, whitespace included, is passed on exactly as typed.

use std::fmt;

use thiserror::Error;

/// Why a form was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,
    #[error("secret must not be empty")]
    EmptySecret,
}

/// An identifier/secret pair that passed form validation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identifier: String,
    secret: String,
}

impl Credentials {
    /// Validate raw form input.
    ///
    /// Only empty values are rejected. Whitespace counts as input and is
    /// kept untrimmed.
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Result<Self, FormError> {
        let identifier = identifier.into();
        let secret = secret.into();

        if identifier.is_empty() {
            return Err(FormError::EmptyIdentifier);
        }
        if secret.is_empty() {
            return Err(FormError::EmptySecret);
        }

        Ok(Self { identifier, secret })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_values_verbatim() {
        let creds = Credentials::new(" A@x.com", "p ").unwrap();
        assert_eq!(creds.identifier(), " A@x.com");
        assert_eq!(creds.secret(), "p ");
    }

    #[test]
    fn whitespace_only_values_are_input() {
        let creds = Credentials::new("a@x.com", "   ").unwrap();
        assert_eq!(creds.secret(), "   ");

        let creds = Credentials::new(" ", "p").unwrap();
        assert_eq!(creds.identifier(), " ");
    }

    #[test]
    fn rejects_empty_identifier_first() {
        assert_eq!(Credentials::new("", ""), Err(FormError::EmptyIdentifier));
        assert_eq!(Credentials::new("", "p"), Err(FormError::EmptyIdentifier));
    }

    #[test]
    fn rejects_empty_secret() {
        assert_eq!(Credentials::new("a@x.com", ""), Err(FormError::EmptySecret));
    }

    #[test]
    fn debug_output_hides_secret() {
        let creds = Credentials::new("a@x.com", "hunter2").unwrap();
        let printed = format!("{creds:?}");
        assert!(printed.contains("a@x.com"));
        assert!(!printed.contains("hunter2"));
    }
}
