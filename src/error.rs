use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("bad request")] BadRequest,
    #[error("validation failed")] Validation(Vec<FieldError>),
    /// Subcategory gate: authentication required; `next` preserves the
    /// original path as the login return target.
    #[error("authentication required")] Unauthorized { next: Option<String> },
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn validation(errors: Vec<(String, String)>) -> Self {
        ApiError::Validation(
            errors
                .into_iter()
                .map(|(field, message)| FieldError { field, message })
                .collect(),
        )
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::InvalidLink => ApiError::validation(vec![(
                "reply_to".into(),
                "root pointer must reference a top-level thread".into(),
            )]),
            RepoError::Internal(msg) => {
                log::error!("repo error: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = ApiErrorBody {
            error: self.to_string(),
            fields: None,
            login: None,
            next: None,
        };
        match self {
            ApiError::Validation(fields) => body.fields = Some(fields.clone()),
            ApiError::Unauthorized { next } => {
                body.login = Some("/api/v1/auth/login".into());
                body.next = next.clone();
            }
            _ => {}
        }
        HttpResponse::build(status).json(body)
    }
}
