use serde::{Deserialize, Serialize};

use crate::extraction::ExtractionResult;
use crate::notify::Notice;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub const TABLE_CSV_FILENAME: &str = "extracted_data.csv";
pub const TEXT_CSV_FILENAME: &str = "extracted_text.csv";
pub const TEXT_COLUMN: &str = "text";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractRequestBody {
    #[serde(alias = "photoUrl", alias = "imageReference")]
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportRequestBody {
    #[serde(alias = "extractedData", alias = "extractedText")]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractResponse {
    pub result: ExtractionResult,
    pub raw: String,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<Notice>,
}
