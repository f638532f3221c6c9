//! Credential storage
//!
//! The static credential set is built once from configuration and shared
//! read-only by every session.

use std::collections::HashMap;
use std::sync::Arc;

use super::permissions::Permissions;
use crate::config::UserConfig;

#[derive(Debug, Clone)]
struct Account {
    password: String,
    permissions: Permissions,
}

/// Username to account map. Names are stored and looked up lower-cased.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    accounts: Arc<HashMap<String, Account>>,
}

impl CredentialStore {
    pub fn from_config(users: &HashMap<String, UserConfig>) -> Self {
        let accounts = users
            .iter()
            .map(|(name, user)| {
                (
                    name.to_lowercase(),
                    Account {
                        password: user.password.clone(),
                        permissions: Permissions::parse(&user.perms),
                    },
                )
            })
            .collect();

        Self {
            accounts: Arc::new(accounts),
        }
    }

    /// Permissions of `username` if `password` matches
    pub fn verify(&self, username: &str, password: &str) -> Option<Permissions> {
        self.accounts
            .get(&username.to_lowercase())
            .filter(|account| account.password == password)
            .map(|account| account.permissions)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        let mut users = HashMap::new();
        users.insert(
            "Alice".to_string(),
            UserConfig {
                password: "alice123".into(),
                perms: "elr".into(),
            },
        );
        CredentialStore::from_config(&users)
    }

    #[test]
    fn test_verify() {
        let store = store();
        assert!(store.verify("alice", "alice123").is_some());
        assert!(store.verify("ALICE", "alice123").is_some());
        assert!(store.verify("alice", "ALICE123").is_none());
        assert!(store.verify("bob", "alice123").is_none());
        assert_eq!(store.len(), 1);
    }
}
