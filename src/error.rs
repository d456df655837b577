use std::fmt::{Display, Formatter};

use worker::{Response, Result};

use crate::export::ExportError;
use crate::extraction::ExtractionError;
use crate::models::ErrorResponse;
use crate::notify::Notice;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Upstream(String),
    NoData(String),
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Upstream(_) => "upstream_error",
            Self::NoData(_) => "no_data",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(message)
            | Self::Upstream(message)
            | Self::NoData(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Upstream(_) => 502,
            Self::NoData(_) => 422,
            Self::Internal(_) => 500,
        }
    }

    pub fn to_error_response(&self, notices: Vec<Notice>) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.message().to_string(),
            notices,
        }
    }

    pub fn into_response_with_notices(self, notices: Vec<Notice>) -> Result<Response> {
        let mut response = Response::from_json(&self.to_error_response(notices))?;
        response.headers_mut().set("Cache-Control", "no-store")?;
        Ok(response.with_status(self.status_code()))
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<worker::Error> for ApiError {
    fn from(error: worker::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::BadRequest(format!("invalid request body: {error}"))
    }
}

impl From<ExtractionError> for ApiError {
    fn from(error: ExtractionError) -> Self {
        if error.is_input_error() {
            Self::BadRequest(error.to_string())
        } else {
            Self::Upstream(error.to_string())
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(error: ExportError) -> Self {
        match error {
            ExportError::NothingExtracted => Self::BadRequest(error.to_string()),
            ExportError::NoData => Self::NoData(error.to_string()),
            ExportError::Csv(_) | ExportError::Io(_) | ExportError::Encoding(_) => {
                Self::Internal(error.to_string())
            }
        }
    }
}
