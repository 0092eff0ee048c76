// src/error.rs
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: u16,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to get analysis from AI: {0}")]
    Model(String),

    #[error("Screen capture unavailable: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn storage(err: anyhow::Error) -> Self {
        AppError::Storage(format!("{:#}", err))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Storage(_) => 500,
            AppError::Model(_) => 502,
            AppError::Capture(_) => 409,
            AppError::Config(_) => 500,
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_response = ApiErrorResponse {
            success: false,
            error: self.to_string(),
            code: status_code,
        };

        HttpResponse::build(
            actix_web::http::StatusCode::from_u16(status_code)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
        )
        .json(error_response)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Model("request timed out".into())
        } else {
            AppError::Model(err.to_string())
        }
    }
}

// Convenience type alias for Result
pub type Result<T> = std::result::Result<T, AppError>;
