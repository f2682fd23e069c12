//! Request extractors shared by the API handlers.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json, RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::de::DeserializeOwned;
use shared::Validate;

use crate::{error::AppError, state::AppState};

/// Identity of the caller, taken from a verified bearer token.
///
/// A missing or non-bearer `Authorization` header is rejected with 401; a token
/// that fails verification is rejected with 403.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthenticated)?;

        let claims = state.tokens.verify(bearer.token()).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AppError::Forbidden
        })?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}

/// JSON body that has been parsed and passed `Validate`.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(ApiJson(value))
    }
}
