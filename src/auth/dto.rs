use serde::{Deserialize, Serialize};

use crate::auth::repo_types::User;

/// Signup body. Deliberately an allow-list: a client-supplied role or
/// password-changed timestamp has nowhere to land.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Login body. Fields are optional so a missing one is reported as a 400
/// instead of a body-decode rejection.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub password_current: String,
    pub password: String,
    pub password_confirm: String,
}

/// Returned by every flow that issues a session token.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn signup_ignores_fields_outside_the_allow_list() {
        let payload: SignupRequest = serde_json::from_str(
            r#"{
                "name": "A",
                "email": "a@x.com",
                "password": "longpw1",
                "passwordConfirm": "longpw1",
                "role": "admin",
                "passwordChangedAt": "2020-01-01T00:00:00Z"
            }"#,
        )
        .expect("unknown fields are dropped, not stored");
        assert_eq!(payload.name, "A");
        assert_eq!(payload.password_confirm, "longpw1");
    }

    #[test]
    fn auth_response_carries_no_password_material() {
        let response = AuthResponse {
            token: "tok".into(),
            user: User {
                id: Uuid::new_v4(),
                name: "A".into(),
                email: "a@x.com".into(),
                role: Role::User,
                password_changed_at: None,
                created_at: OffsetDateTime::now_utc(),
            },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"token\""));
        assert!(json.contains("a@x.com"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn login_fields_may_be_absent() {
        let payload: LoginRequest = serde_json::from_str(r#"{"email": "a@x.com"}"#).unwrap();
        assert!(payload.password.is_none());
    }
}
