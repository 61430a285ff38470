use actix_identity::error::{GetIdentityError, LoginError};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::env::VarError;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("Identity error: {0}")]
    IdentityError(#[from] GetIdentityError),

    #[error("Login error: {0}")]
    LoginError(#[from] LoginError),

    #[error("Password error: {0}")]
    PasswordError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] VarError),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Message safe to show to a visitor. Internal failures never leak details.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound => "Страница не найдена".to_owned(),
            AppError::Unauthorized => "Требуется вход в систему".to_owned(),
            AppError::Forbidden => "Доступ запрещён".to_owned(),
            AppError::Validation(msg) => msg.clone(),
            AppError::DatabaseError(_) => {
                "Не удалось сохранить данные, попробуйте ещё раз".to_owned()
            }
            _ => "Внутренняя ошибка сервера".to_owned(),
        }
    }

    /// Alert for a form that should be shown again instead of failing the
    /// request. `None` means the error is not the submitter's to retry.
    pub fn form_alert(&self) -> Option<String> {
        match self {
            AppError::Validation(msg) => Some(msg.clone()),
            AppError::DatabaseError(e) => {
                log::error!("Form submission hit a database error: {}", e);
                Some(self.public_message())
            }
            _ => None,
        }
    }
}

/// Collapses every failed rule into one alert line. Field order is not
/// stable in `ValidationErrors`, so messages are sorted.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_values()
            .flatten()
            .map(|e| match &e.message {
                Some(msg) => msg.to_string(),
                None => e.code.to_string(),
            })
            .collect();
        messages.sort();
        messages.dedup();
        AppError::Validation(messages.join("; "))
    }
}

/// Body of every failed JSON response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::SEE_OTHER,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(_)
            | AppError::TemplateError(_)
            | AppError::IdentityError(_)
            | AppError::LoginError(_)
            | AppError::PasswordError(_)
            | AppError::ConfigError(_)
            | AppError::InternalServerError(_)
            | AppError::IoError(_)
            | AppError::EnvVarError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Unauthorized => HttpResponse::SeeOther()
                .append_header(("Location", "/login"))
                .finish(),
            _ => {
                if self.status_code().is_server_error() {
                    log::error!("Request failed: {}", self);
                }
                HttpResponse::build(self.status_code())
                    .content_type("text/plain; charset=utf-8")
                    .body(self.public_message())
            }
        }
    }
}

impl From<AppError> for std::io::Error {
    fn from(err: AppError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}
