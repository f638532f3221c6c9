//! Authentication system
//!
//! Handles the static credential set, credential validation and per-user permissions.

pub mod credentials;
pub mod permissions;
pub mod validator;

pub use credentials::CredentialStore;
pub use permissions::{Access, Permissions};
pub use validator::{validate_password, validate_user};
