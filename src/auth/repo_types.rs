use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account roles. Closed set, also enforced by a CHECK constraint on the
/// users table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    /// Membership test against a route's fixed allow-list.
    pub fn allowed_in(self, allowed: &[Role]) -> bool {
        allowed.contains(&self)
    }
}

/// User record as read by default. Credential material is never selected
/// onto this type; see [`CredentialUser`] for the explicit hash-bearing read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// True when the password was changed after the given token issue time.
    /// A token issued before the change is no longer trustworthy.
    pub fn changed_password_after(&self, token_issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => changed_at.unix_timestamp() > token_issued_at,
            None => false,
        }
    }
}

/// Hash-bearing read, requested explicitly by credential checks only.
/// The hash is skipped on serialization so it cannot leak through a response.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CredentialUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn make_user(password_changed_at: Option<OffsetDateTime>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            role: Role::User,
            password_changed_at,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn never_changed_password_is_never_stale() {
        let user = make_user(None);
        assert!(!user.changed_password_after(0));
    }

    #[test]
    fn token_issued_after_change_stays_valid() {
        let changed = OffsetDateTime::now_utc() - Duration::hours(1);
        let user = make_user(Some(changed));
        let issued_later = changed.unix_timestamp() + 60;
        assert!(!user.changed_password_after(issued_later));
    }

    #[test]
    fn token_issued_before_change_is_stale() {
        let changed = OffsetDateTime::now_utc();
        let user = make_user(Some(changed));
        let issued_earlier = changed.unix_timestamp() - 60;
        assert!(user.changed_password_after(issued_earlier));
    }

    #[test]
    fn role_allow_list_membership() {
        let staff = [Role::Guide, Role::LeadGuide, Role::Admin];
        assert!(Role::Admin.allowed_in(&staff));
        assert!(Role::Guide.allowed_in(&staff));
        assert!(!Role::User.allowed_in(&staff));
        assert!(!Role::User.allowed_in(&[Role::Admin]));
    }

    #[test]
    fn role_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&Role::LeadGuide).unwrap(), "\"lead-guide\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }

    #[test]
    fn credential_user_never_serializes_the_hash() {
        let cred = CredentialUser {
            user: make_user(None),
            password_hash: "$argon2id$v=19$secret".into(),
        };
        let json = serde_json::to_string(&cred).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
        assert!(json.contains("a@x.com"));
    }
}
