use std::fmt::{Display, Formatter};
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use regex::Regex;
use url::Url;

use crate::extraction::ExtractionError;

/// An image handed to the model, either inline or by location.
///
/// Payloads are never decoded or size-checked here; a corrupt or oversized
/// image is only rejected by the model itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    Inline { mime_type: String, data: String },
    Remote(Url),
}

impl ImageReference {
    pub fn parse(input: &str) -> Result<Self, ExtractionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ExtractionError::MissingImage);
        }

        if trimmed
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
        {
            return parse_data_uri(trimmed);
        }

        let url = Url::parse(trimmed)
            .map_err(|error| ExtractionError::InvalidReference(error.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(Self::Remote(url)),
            other => Err(ExtractionError::InvalidReference(format!(
                "unsupported image URL scheme: {other}"
            ))),
        }
    }

    /// Encodes uploaded bytes the way a browser `FileReader` produces a data URL.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self::Inline {
            mime_type: mime_type.trim().to_ascii_lowercase(),
            data: STANDARD.encode(bytes),
        }
    }
}

impl FromStr for ImageReference {
    type Err = ExtractionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl Display for ImageReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline { mime_type, data } => write!(f, "data:{mime_type};base64,{data}"),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

fn parse_data_uri(input: &str) -> Result<ImageReference, ExtractionError> {
    let data_uri_re = Regex::new(r"(?is)^data:(?P<mime>[^;,]*)(?P<params>(?:;[^;,]*)*),(?P<data>.*)$")
        .expect("hardcoded data URI regex is valid");

    let Some(capture) = data_uri_re.captures(input) else {
        return Err(ExtractionError::InvalidReference(
            "data URI is missing its ',' separator".to_string(),
        ));
    };

    let mime_type = capture
        .name("mime")
        .map(|value| value.as_str().trim().to_ascii_lowercase())
        .unwrap_or_default();
    if mime_type.is_empty() {
        return Err(ExtractionError::InvalidReference(
            "data URI has no media type".to_string(),
        ));
    }

    let is_base64 = capture
        .name("params")
        .map(|value| value.as_str())
        .unwrap_or_default()
        .split(';')
        .any(|param| param.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return Err(ExtractionError::InvalidReference(
            "data URI must be base64-encoded".to_string(),
        ));
    }

    let data = capture
        .name("data")
        .map(|value| value.as_str().trim().to_string())
        .unwrap_or_default();
    if data.is_empty() {
        return Err(ExtractionError::MissingImage);
    }

    Ok(ImageReference::Inline { mime_type, data })
}

/// One extraction call: built per user action, dropped after the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub image: ImageReference,
}

impl ExtractionRequest {
    #[must_use]
    pub fn new(image: ImageReference) -> Self {
        Self { image }
    }
}
