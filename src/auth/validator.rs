//! Authentication validator
//!
//! Username and password checks against the injected credential store.

use super::credentials::CredentialStore;
use super::permissions::Permissions;
use crate::error::AuthError;

/// Longest accepted username or password
pub const MAX_CREDENTIAL_LENGTH: usize = 128;

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str) -> bool {
    !input.trim().is_empty()
        && input.len() <= MAX_CREDENTIAL_LENGTH
        && !input.contains(['\r', '\n', '\0'])
}

/// Checks the shape of a username. Existence is only checked at PASS time,
/// so USER never reveals which accounts exist.
pub fn validate_user(username: &str) -> Result<(), AuthError> {
    if !is_valid_input(username) {
        return Err(AuthError::MalformedInput("Invalid username format".into()));
    }
    Ok(())
}

/// Validates the password for `username`, returning the granted permissions.
pub fn validate_password(
    username: &str,
    password: &str,
    store: &CredentialStore,
) -> Result<Permissions, AuthError> {
    if !is_valid_input(password) {
        return Err(AuthError::AuthenticationFailed(username.to_string()));
    }

    store
        .verify(username, password)
        .ok_or_else(|| AuthError::AuthenticationFailed(username.to_string()))
}
