use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::{
        sea_orm_active_enums::UserRole,
        users::{self, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::{
        auth::{AuthUser, decode_token},
        session::CartOwner,
    },
    models::User,
    response::{ApiResponse, Meta},
    services::cart_service,
    state::AppState,
};

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Signed bearer token and its lifetime in seconds.
pub fn issue_token(config: &AppConfig, user_id: Uuid, role: UserRole) -> AppResult<(String, i64)> {
    let lifetime = Duration::minutes(config.jwt_expires_minutes);
    let expiration = Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok((token, lifetime.num_seconds()))
}

/// Unknown email and wrong password fail the same way.
pub async fn verify_credentials<C: ConnectionTrait>(
    conn: &C,
    email: &str,
    password: &str,
) -> AppResult<users::Model> {
    let user = Users::find()
        .filter(UserCol::Email.eq(normalize_email(email)))
        .one(conn)
        .await?
        .ok_or(AppError::AuthFailed)?;

    if !verify_password(password, &user.password_hash)? {
        return Err(AppError::AuthFailed);
    }
    Ok(user)
}

/// Resolves a bearer token to a user that still exists.
pub async fn current_user(state: &AppState, token: &str) -> AppResult<users::Model> {
    let auth = decode_token(&state.config.jwt_secret, token)?;
    Users::find_by_id(auth.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("User no longer exists".into()))
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    let exists = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::Conflict("Email is already taken".into()));
    }

    let now = Utc::now();
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        first_name: Set(payload.first_name),
        last_name: Set(payload.last_name),
        phone: Set(payload.phone),
        role: Set(UserRole::Customer),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(user_id = %user.id, "user registered");
    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("User created", user.into(), None))
}

/// Logs in and, when the caller carried an anonymous cart, folds it into the user's cart.
pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
    session_id: Option<String>,
) -> AppResult<ApiResponse<LoginResponse>> {
    payload.validate()?;
    let user = verify_credentials(&state.orm, &payload.email, &payload.password).await?;
    let (token, expires_in) = issue_token(&state.config, user.id, user.role)?;

    if let Some(session_id) = session_id {
        let session = CartOwner::Session(session_id);
        let auth = AuthUser {
            user_id: user.id,
            role: user.role,
        };
        cart_service::merge_carts(state, &session, &auth).await?;
    }

    audit::record(
        &state.orm,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let resp = LoginResponse {
        token,
        token_type: "Bearer".into(),
        expires_in,
        user: user.into(),
    };
    Ok(ApiResponse::success("Logged in", resp, Some(Meta::empty())))
}
