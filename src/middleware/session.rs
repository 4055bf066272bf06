use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::MaybeAuthUser, state::AppState};

pub const SESSION_HEADER: &str = "x-session-id";

/// Who a cart belongs to: a signed-in user or an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Session(_) => None,
        }
    }
}

/// Anonymous session id taken from the `x-session-id` header.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

fn session_from_parts(parts: &Parts) -> Result<Option<SessionId>, AppError> {
    let Some(value) = parts.headers.get(SESSION_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest("Invalid x-session-id header".into()))?
        .trim();
    if value.is_empty() || value.len() > 128 {
        return Err(AppError::BadRequest("Invalid x-session-id header".into()));
    }
    Ok(Some(SessionId(value.to_string())))
}

impl<S> OptionalFromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        session_from_parts(parts)
    }
}

impl FromRequestParts<AppState> for CartOwner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeAuthUser(user) = MaybeAuthUser::from_request_parts(parts, state).await?;
        if let Some(user) = user {
            return Ok(CartOwner::User(user.user_id));
        }
        match session_from_parts(parts)? {
            Some(SessionId(session)) => Ok(CartOwner::Session(session)),
            None => Err(AppError::Unauthenticated(
                "Bearer token or x-session-id header required".into(),
            )),
        }
    }
}
