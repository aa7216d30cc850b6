//! Authentication middleware

use crate::api::handlers::AppState;
use crate::auth::authenticator;
use crate::auth::models::Principal;
use crate::core::error::{AppError, AuthFailure};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Authenticate requests that carry a credential
///
/// Requests without one pass through untouched; handlers that need a caller
/// extract [`Principal`], which rejects with `401` when none was attached.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if !authenticator::supports(request.headers()) {
        return next.run(request).await;
    }

    match state.authenticator.authenticate(request.headers()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AppError::Authentication(AuthFailure::MissingCredential))
    }
}
