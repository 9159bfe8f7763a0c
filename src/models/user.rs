use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An end user. `id` is the internal join key; `public_id` is the opaque
/// 14-character identifier exposed on the wire and used as the JWT subject.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub public_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Display name assembled from the profile fields.
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> User {
        User {
            id: 1,
            public_id: "usr00000000001".to_string(),
            email: "ada@example.com".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            avatar_url: None,
            is_active: true,
            email_verified: false,
            activated_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn full_name_falls_back_to_email() {
        assert_eq!(user("Ada", "Lovelace").full_name(), "Ada Lovelace");
        assert_eq!(user("Ada", "").full_name(), "Ada");
        assert_eq!(user("", "Lovelace").full_name(), "Lovelace");
        assert_eq!(user("", "").full_name(), "ada@example.com");
    }
}
