use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::{self, AuthResult};
use crate::error::ApiError;
use crate::state::AppState;

/// Extractor that validates the `Authorization: Bearer` header.
pub struct Authenticated(pub AuthResult);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));

        let result = auth::validate_auth(&state.config, bearer);

        async move {
            match result {
                Some(auth) => Ok(Authenticated(auth)),
                None => Err(ApiError::unauthorized()),
            }
        }
    }
}
