//! User-facing status lines.
//!
//! Login failures never say whether the identifier exists.

use crate::form::FormError;
use crate::gateway::AuthOutcome;

pub const REGISTERED: &str = "Registration complete.";
pub const IDENTIFIER_TAKEN: &str = "That email address is already in use.";
pub const AUTHENTICATED: &str = "Welcome back.";
pub const INVALID_CREDENTIALS: &str = "Invalid email address or password.";
pub const STORAGE_UNAVAILABLE: &str = "Account storage is unavailable, please try again later.";

/// Short status line for a finished request.
pub fn outcome_message(outcome: &AuthOutcome) -> &'static str {
    match outcome {
        AuthOutcome::Registered => REGISTERED,
        AuthOutcome::IdentifierTaken => IDENTIFIER_TAKEN,
        AuthOutcome::Authenticated => AUTHENTICATED,
        AuthOutcome::InvalidCredentials => INVALID_CREDENTIALS,
        AuthOutcome::StorageFailed(_) => STORAGE_UNAVAILABLE,
    }
}

/// Short status line for rejected form input.
pub fn form_message(err: FormError) -> &'static str {
    match err {
        FormError::EmptyIdentifier => "Please enter your email address.",
        FormError::EmptySecret => "Please enter your password.",
    }
}
