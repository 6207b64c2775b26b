use axum::{
    extract::{FromRef, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest,
            SignupRequest, StatusResponse, UpdatePasswordRequest,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        password::{hash_password_off_thread, verify_password_off_thread},
        repo_types::{CredentialUser, User},
        reset::{self, ResetToken},
    },
    config::Environment,
    error::ApiError,
    mailer::password_reset_email,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updateMyPassword", patch(update_password))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation("Password too short".into()));
    }
    if password != confirm {
        return Err(ApiError::Validation("Passwords are not the same!".into()));
    }
    Ok(())
}

/// Unknown email and wrong password read identically to the client.
fn incorrect_credentials() -> ApiError {
    ApiError::Authentication("Incorrect email or password".into())
}

fn session_cookie(token: &str, keys: &JwtKeys, env: Environment) -> String {
    let max_age = keys.cookie_ttl_days * 24 * 60 * 60;
    let mut cookie = format!("jwt={token}; Path=/; Max-Age={max_age}; HttpOnly");
    if env.is_production() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Sign a fresh session token for the user and send it back in both the body
/// and the `jwt` cookie.
fn send_token(
    user: User,
    status: StatusCode,
    keys: &JwtKeys,
    env: Environment,
) -> Result<Response, ApiError> {
    let token = keys.sign(user.id)?;
    let cookie = session_cookie(&token, keys, env);
    let body = Json(AuthResponse { token, user });
    Ok((status, [(header::SET_COOKIE, cookie)], body).into_response())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Please tell us your name!".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Please provide a valid email".into()));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Validation("Email already registered".into()));
    }

    let hash = hash_password_off_thread(payload.password).await?;
    let user = User::create(&state.db, payload.name.trim(), &payload.email, &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    send_token(
        user,
        StatusCode::CREATED,
        &JwtKeys::from_ref(&state),
        state.config.environment,
    )
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(ApiError::Validation(
            "Please provide email and password!".into(),
        ));
    };
    let email = email.trim().to_lowercase();

    // hash-bearing read, requested explicitly for this check only
    let Some(found) = CredentialUser::find_by_email(&state.db, &email).await? else {
        warn!(email = %email, "login with unknown email");
        return Err(incorrect_credentials());
    };

    if !verify_password_off_thread(password, found.password_hash).await? {
        warn!(user_id = %found.user.id, "login with wrong password");
        return Err(incorrect_credentials());
    }

    info!(user_id = %found.user.id, "user logged in");
    send_token(
        found.user,
        StatusCode::OK,
        &JwtKeys::from_ref(&state),
        state.config.environment,
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("There is no user with email address.".into()))?;

    let token = ResetToken::generate();
    User::set_password_reset(&state.db, user.id, &token.hash, token.expires_at).await?;

    let reset_url = format!(
        "{}/api/v1/users/resetPassword/{}",
        state.config.public_base_url, token.plaintext
    );

    if let Err(err) = state
        .mailer
        .send(
            &user.email,
            "Your password reset token (valid for 10 min)",
            &password_reset_email(&reset_url),
        )
        .await
    {
        // fail closed: no pending token may outlive a notification that
        // never reached the user
        error!(error = %err, user_id = %user.id, "reset email failed, clearing pending token");
        User::clear_password_reset(&state.db, user.id).await?;
        return Err(ApiError::EmailDelivery(
            "There was an error sending the email. Try again later!".into(),
        ));
    }

    info!(user_id = %user.id, "password reset token issued");
    Ok(Json(StatusResponse {
        status: "success",
        message: "Token sent to email!",
    }))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    // the lookup keys on the digest and filters expired rows in the store;
    // a wrong token and a stale one are indistinguishable to the client
    let hashed = reset::digest(&token);
    let user = User::find_by_reset_token(&state.db, &hashed)
        .await?
        .ok_or_else(|| ApiError::Validation("Token is invalid or has expired".into()))?;

    validate_new_password(&payload.password, &payload.password_confirm)?;

    let hash = hash_password_off_thread(payload.password).await?;
    let user = User::update_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password reset");
    send_token(
        user,
        StatusCode::OK,
        &JwtKeys::from_ref(&state),
        state.config.environment,
    )
}

#[instrument(skip(state, user, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Response, ApiError> {
    let found = CredentialUser::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| {
            ApiError::Authentication("The user belonging to this token does no longer exist.".into())
        })?;

    if !verify_password_off_thread(payload.password_current, found.password_hash).await? {
        return Err(ApiError::Authentication(
            "Your current password is wrong.".into(),
        ));
    }

    validate_new_password(&payload.password, &payload.password_confirm)?;

    let hash = hash_password_off_thread(payload.password).await?;
    let user = User::update_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password updated");
    send_token(
        user,
        StatusCode::OK,
        &JwtKeys::from_ref(&state),
        state.config.environment,
    )
}
