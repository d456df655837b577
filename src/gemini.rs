use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;
use worker::wasm_bindgen::JsValue;
use worker::{Fetch, Headers, Method, Request, RequestInit};

use crate::extraction::{ExtractionError, Extractor, strip_code_fence};
use crate::image::{ExtractionRequest, ImageReference};
use crate::prompt::PromptTemplate;

/// Envelope field the model is asked to put its output in.
pub const ENVELOPE_FIELD: &str = "extractedData";
const LEGACY_ENVELOPE_FIELD: &str = "extractedText";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(Blob),
    FileData(FileData),
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn image(image: &ImageReference) -> Self {
        match image {
            ImageReference::Inline { mime_type, data } => Self::InlineData(Blob {
                mime_type: mime_type.clone(),
                data: data.clone(),
            }),
            ImageReference::Remote(url) => Self::FileData(FileData {
                mime_type: mime_type_for_path(url.path()).map(str::to_string),
                file_uri: url.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub file_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[must_use]
pub fn build_request(
    template: &PromptTemplate,
    image: &ImageReference,
    temperature: Option<f32>,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts: template.render(image),
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: envelope_schema(),
            temperature,
        },
    }
}

fn envelope_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "extractedData": {
                "type": "STRING",
                "description": "The extracted data from the image, formatted as a JSON string."
            }
        },
        "required": ["extractedData"]
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, with thought parts left out.
    pub fn into_text(self) -> Result<String, ExtractionError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(self
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .map_or(ExtractionError::EmptyResponse, ExtractionError::Rejected));
        };

        let text = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text)
            .collect::<String>();

        if text.trim().is_empty() {
            return Err(match candidate.finish_reason {
                Some(reason) if reason != "STOP" => ExtractionError::Rejected(reason),
                _ => ExtractionError::EmptyResponse,
            });
        }

        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Maps a failed `generateContent` call to an error that carries Google's message.
#[must_use]
pub fn upstream_error(status: u16, body: &str) -> ExtractionError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.trim().is_empty() => {
            ExtractionError::Remote(parsed.error.message)
        }
        _ => ExtractionError::Remote(format!("model request failed: status {status}")),
    }
}

/// Pulls the payload out of `{"extractedData": ...}`.
///
/// Output that is not an envelope is returned as-is (trimmed); a non-string
/// payload is re-serialized as compact JSON.
#[must_use]
pub fn unwrap_envelope(output: &str) -> String {
    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(strip_code_fence(output))
    else {
        return output.trim().to_string();
    };

    let payload = object
        .remove(ENVELOPE_FIELD)
        .or_else(|| object.remove(LEGACY_ENVELOPE_FIELD));

    match payload {
        Some(Value::String(data)) => data,
        Some(other) => other.to_string(),
        None => output.trim().to_string(),
    }
}

pub fn endpoint(api_base: &str, model: &str) -> Result<Url, url::ParseError> {
    let model = model.trim().trim_start_matches("models/");
    Url::parse(&format!(
        "{}/v1beta/models/{model}:generateContent",
        api_base.trim().trim_end_matches('/')
    ))
}

#[must_use]
pub fn mime_type_for_path(path: &str) -> Option<&'static str> {
    let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: Option<f32>,
}

/// Live extractor backed by the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    endpoint: Url,
    temperature: Option<f32>,
    template: PromptTemplate,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            endpoint: endpoint(&config.api_base, &config.model)?,
            api_key: config.api_key,
            temperature: config.temperature,
            template: PromptTemplate::ocr(),
        })
    }

    async fn generate(&self, image: &ImageReference) -> Result<String, ExtractionError> {
        let payload = serde_json::to_string(&build_request(&self.template, image, self.temperature))
            .map_err(|error| ExtractionError::Network(format!("failed to encode request: {error}")))?;

        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json").map_err(network)?;
        headers.set("x-goog-api-key", &self.api_key).map_err(network)?;

        let mut init = RequestInit::new();
        init.with_method(Method::Post)
            .with_headers(headers)
            .with_body(Some(JsValue::from_str(&payload)));

        let request = Request::new_with_init(self.endpoint.as_str(), &init).map_err(network)?;
        let mut response = Fetch::Request(request).send().await.map_err(network)?;
        let status = response.status_code();
        let body = response.text().await.map_err(network)?;
        if status >= 400 {
            return Err(upstream_error(status, &body));
        }

        let parsed = serde_json::from_str::<GenerateContentResponse>(&body).map_err(|error| {
            ExtractionError::Remote(format!("unreadable model response: {error}"))
        })?;
        let text = parsed.into_text()?;
        Ok(unwrap_envelope(&text))
    }
}

impl Extractor for GeminiClient {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        match &request.image {
            ImageReference::Remote(url) => {
                let inlined = fetch_remote_image(url).await?;
                self.generate(&inlined).await
            }
            ImageReference::Inline { .. } => self.generate(&request.image).await,
        }
    }
}

async fn fetch_remote_image(url: &Url) -> Result<ImageReference, ExtractionError> {
    let mut response = Fetch::Url(url.clone()).send().await.map_err(network)?;
    let status = response.status_code();
    if status >= 400 {
        return Err(ExtractionError::Remote(format!(
            "failed to fetch image: status {status}"
        )));
    }

    let content_type = response
        .headers()
        .get("Content-Type")
        .map_err(network)?
        .map(|value| media_type(&value).to_ascii_lowercase())
        .filter(|value| value.starts_with("image/"));
    let mime_type = content_type
        .or_else(|| mime_type_for_path(url.path()).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let bytes = response.bytes().await.map_err(network)?;
    if bytes.is_empty() {
        return Err(ExtractionError::Remote("fetched image is empty".to_string()));
    }

    Ok(ImageReference::from_bytes(&bytes, &mime_type))
}

/// `image/png; charset=...` -> `image/png`
#[must_use]
pub fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

fn network(error: worker::Error) -> ExtractionError {
    ExtractionError::Network(error.to_string())
}
