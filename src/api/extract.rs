//! Request extractors that reject with the JSON error body
//!
//! Drop-in replacements for `axum::Json`, `axum::extract::Query` and
//! `axum::extract::Path`: input that cannot be read becomes
//! [`AppError::InvalidRequest`] instead of axum's plain-text rejection.

use crate::core::error::AppError;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Request,
    },
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};

/// JSON body extractor and response
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(AppError::InvalidRequest(json_rejection_message(&rejection))),
        }
    }
}

impl<T> IntoResponse for Json<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

fn json_rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err.body_text()),
        JsonRejection::JsonSyntaxError(err) => format!("Invalid JSON syntax: {}", err.body_text()),
        JsonRejection::MissingJsonContentType(_) => {
            "Missing Content-Type header. Expected 'application/json'.".to_string()
        }
        JsonRejection::BytesRejection(err) => {
            format!("Failed to read request body: {}", err.body_text())
        }
        other => other.body_text(),
    }
}

/// Query string extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Query(value)) => Ok(Query(value)),
            Err(rejection) => Err(AppError::InvalidRequest(query_rejection_message(&rejection))),
        }
    }
}

fn query_rejection_message(rejection: &QueryRejection) -> String {
    format!("Invalid query string: {}", rejection.body_text())
}

/// Path parameter extractor
#[derive(Debug, Clone, Copy)]
pub struct Path<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Path::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Path(value)| Path(value))
            .map_err(|rejection: PathRejection| {
                AppError::InvalidRequest(format!("Invalid path parameter: {}", rejection.body_text()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request as HttpRequest, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde::Deserialize;
    use tower::util::ServiceExt;

    #[derive(Debug, Deserialize, Serialize)]
    struct Payload {
        email: String,
    }

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: Option<i64>,
    }

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                post(|Json(payload): Json<Payload>| async move { Json(payload) }),
            )
            .route(
                "/items/:id",
                get(|Path(id): Path<i64>| async move { id.to_string() }),
            )
            .route(
                "/paged",
                get(|Query(paging): Query<Paging>| async move {
                    paging.page.unwrap_or(1).to_string()
                }),
            )
    }

    async fn error_body(response: Response) -> serde_json::Value {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "InvalidRequest");
        assert_eq!(body["code"], 400);
        body
    }

    #[tokio::test]
    async fn test_missing_body_is_json_error() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::empty())
            .unwrap();
        let body = error_body(app().oneshot(request).await.unwrap()).await;
        assert!(body["message"].as_str().unwrap().contains("Content-Type"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_json_error() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{email:"))
            .unwrap();
        let body = error_body(app().oneshot(request).await.unwrap()).await;
        assert!(body["message"].as_str().unwrap().contains("Invalid JSON syntax"));
    }

    #[tokio::test]
    async fn test_wrong_field_type_is_json_error() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email": 42}"#))
            .unwrap();
        let body = error_body(app().oneshot(request).await.unwrap()).await;
        assert!(body["message"].as_str().unwrap().contains("Invalid JSON data"));
    }

    #[tokio::test]
    async fn test_bad_query_is_json_error() {
        let request = HttpRequest::builder()
            .uri("/paged?page=abc")
            .body(Body::empty())
            .unwrap();
        let body = error_body(app().oneshot(request).await.unwrap()).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid query string"));

        let request = HttpRequest::builder()
            .uri("/paged?page=3")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bad_path_parameter_is_json_error() {
        let request = HttpRequest::builder()
            .uri("/items/abc")
            .body(Body::empty())
            .unwrap();
        let body = error_body(app().oneshot(request).await.unwrap()).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid path parameter"));
    }
}
