//! Requester identity lookup.

use async_trait::async_trait;
use thiserror::Error;

/// A user as seen by the license core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl User {
    /// Full name when known, otherwise the username.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Failure modes of a directory lookup.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user '{0}' not found")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// User directory consulted for trial requests and seat counts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<User, DirectoryError>;

    /// Number of active users on this server.
    async fn active_user_count(&self) -> Result<i64, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_full_name() {
        let user = User {
            username: "ada".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let user = User {
            username: "grace".to_string(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "grace");

        let first_only = User {
            username: "g".to_string(),
            first_name: "Grace".to_string(),
            ..Default::default()
        };
        assert_eq!(first_only.display_name(), "Grace");
    }
}
