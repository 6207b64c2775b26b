use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::marker::PhantomData;
use tracing::warn;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo_types::{Role, User},
    },
    error::ApiError,
    state::AppState,
};

/// Pulls the bearer credential off a request. The Authorization header is
/// the primary carrier; the `jwt` cookie is the fallback, and the header
/// wins when both are present.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
        {
            if !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
    }
    cookie_token(headers)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "jwt" && !value.is_empty()).then(|| value.to_string())
    })
}

/// Authenticated identity. Verifies the session token, loads the account it
/// belongs to and rejects tokens issued before the last password change.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            ApiError::Authentication(
                "You are not logged in! Please log in to get access.".into(),
            )
        })?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|err| {
            // one rejection for malformed, bad-signature and expired alike
            warn!(error = %err, "session token rejected");
            ApiError::Authentication("Invalid token. Please log in again!".into())
        })?;

        let user = User::find_by_id(&state.db, claims.sub).await?.ok_or_else(|| {
            ApiError::Authentication(
                "The user belonging to this token does no longer exist.".into(),
            )
        })?;

        if user.changed_password_after(claims.iat as i64) {
            return Err(ApiError::Authentication(
                "User recently changed password! Please log in again".into(),
            ));
        }

        Ok(CurrentUser(user))
    }
}

/// A fixed set of roles a route admits.
pub trait RolePolicy: Send {
    const ALLOWED: &'static [Role];
}

/// Guides and above.
pub struct Staff;
impl RolePolicy for Staff {
    const ALLOWED: &'static [Role] = &[Role::Guide, Role::LeadGuide, Role::Admin];
}

/// Administrators only.
pub struct AdminOnly;
impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Authorization gate. Runs the full authentication extraction first, so a
/// request can only ever hold a `RoleGuard` once `CurrentUser` succeeded;
/// ordering is enforced by construction rather than by route wiring.
pub struct RoleGuard<P: RolePolicy>(pub User, PhantomData<P>);

impl<P: RolePolicy> RoleGuard<P> {
    pub fn into_user(self) -> User {
        self.0
    }
}

#[async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for RoleGuard<P> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.allowed_in(P::ALLOWED) {
            return Err(ApiError::Forbidden(
                "You do not have permission to perform this action".into(),
            ));
        }
        Ok(RoleGuard(user, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn token_comes_from_the_authorization_header() {
        let headers = headers_with(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn cookie_is_the_fallback_carrier() {
        let headers = headers_with(&[(header::COOKIE, "theme=dark; jwt=tok123; lang=en")]);
        assert_eq!(bearer_token(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn header_wins_over_cookie() {
        let headers = headers_with(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "jwt=from-cookie"),
        ]);
        assert_eq!(bearer_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn missing_or_malformed_credentials_yield_nothing() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let headers = headers_with(&[(header::AUTHORIZATION, "Basic dXNlcjpwdw==")]);
        assert_eq!(bearer_token(&headers), None);

        let headers = headers_with(&[(header::AUTHORIZATION, "Bearer ")]);
        assert_eq!(bearer_token(&headers), None);

        let headers = headers_with(&[(header::COOKIE, "jwt=")]);
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn role_policies_cover_the_expected_sets() {
        assert!(Role::Admin.allowed_in(AdminOnly::ALLOWED));
        assert!(!Role::LeadGuide.allowed_in(AdminOnly::ALLOWED));
        assert!(Role::Guide.allowed_in(Staff::ALLOWED));
        assert!(!Role::User.allowed_in(Staff::ALLOWED));
    }
}
