// src/models/mod.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::Display;
use log::error;
use serde_json::json;

pub mod change_record;
pub use change_record::*;

// Errors surfaced by the change tracker
#[derive(Debug, Display, Clone, PartialEq)]
pub enum TrackerError {
    #[display(fmt = "Not Found: {}", _0)]
    NotFound(String),
    #[display(fmt = "Invalid Argument: {}", _0)]
    InvalidArgument(String),
    #[display(fmt = "Unsupported: {}", _0)]
    Unsupported(String),
    #[display(fmt = "IO Failure: {}", _0)]
    Io(String),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    // Short machine-readable name used in the failure envelope
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::NotFound(_) => "not_found",
            TrackerError::InvalidArgument(_) => "invalid_argument",
            TrackerError::Unsupported(_) => "unsupported",
            TrackerError::Io(_) => "io_failure",
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        TrackerError::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        TrackerError::InvalidArgument(msg.into())
    }
}

impl std::error::Error for TrackerError {}

impl From<std::io::Error> for TrackerError {
    fn from(e: std::io::Error) -> Self {
        error!("I/O failure: {:?}", e);
        TrackerError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        error!("Failed to (de)serialize change log: {:?}", e);
        TrackerError::Io(e.to_string())
    }
}

// Errors become a structured failure response rather than a transport error
impl ResponseError for TrackerError {
    fn status_code(&self) -> StatusCode {
        match self {
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::InvalidArgument(_) | TrackerError::Unsupported(_) => StatusCode::BAD_REQUEST,
            TrackerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}
