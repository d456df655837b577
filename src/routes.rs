use serde::Serialize;
use worker::{Context, Env, Request, Response, Result, RouteContext, Router};

use crate::error::ApiError;
use crate::export::CsvExport;
use crate::extraction::{ExtractionError, ExtractionResult};
use crate::gemini::{GeminiClient, GeminiConfig, media_type};
use crate::image::ImageReference;
use crate::models::{
    CSV_CONTENT_TYPE, DEFAULT_API_BASE, DEFAULT_MODEL, ExportRequestBody, ExtractRequestBody,
    ExtractResponse,
};
use crate::notify::{CollectingNotifier, Notifier};
use crate::session::ExtractionSession;

#[derive(Debug, Clone)]
pub struct AppState {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: Option<f32>,
}

impl AppState {
    pub fn from_env(env: &Env) -> Self {
        let api_key = env
            .secret("GEMINI_API_KEY")
            .map(|value| value.to_string())
            .or_else(|_| env.var("GEMINI_API_KEY").map(|value| value.to_string()))
            .ok()
            .filter(|value| !value.trim().is_empty());
        let model = env
            .var("GEMINI_MODEL")
            .map(|value| value.to_string())
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_base = env
            .var("GEMINI_API_BASE")
            .map(|value| value.to_string())
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let temperature = env
            .var("GEMINI_TEMPERATURE")
            .ok()
            .and_then(|value| parse_temperature(&value.to_string()));

        Self {
            api_key,
            model,
            api_base,
            temperature,
        }
    }

    pub fn gemini_config(&self) -> Result<GeminiConfig, ApiError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ApiError::Internal("GEMINI_API_KEY is not configured".to_string()))?;

        Ok(GeminiConfig {
            api_key,
            model: self.model.clone(),
            api_base: self.api_base.clone(),
            temperature: self.temperature,
        })
    }
}

pub async fn handle(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    let state = AppState::from_env(&env);

    Router::with_data(state)
        .post_async("/api/v1/extract", extract_route)
        .post_async("/api/v1/csv", csv_route)
        .post_async("/api/v1/copy", copy_route)
        .run(req, env)
        .await
}

async fn extract_route(mut req: Request, ctx: RouteContext<AppState>) -> Result<Response> {
    let mut notifier = CollectingNotifier::new();
    let outcome = extract_response(&mut req, &ctx.data, &mut notifier).await;
    match outcome {
        Ok((result, raw)) => {
            log_extraction(&result);
            json_response(&ExtractResponse {
                result,
                raw,
                notices: notifier.into_notices(),
            })
        }
        Err(error) => {
            worker::console_error!("extraction failed: {error}");
            error.into_response_with_notices(notifier.into_notices())
        }
    }
}

async fn csv_route(mut req: Request, _ctx: RouteContext<AppState>) -> Result<Response> {
    let mut notifier = CollectingNotifier::new();
    let outcome = csv_response(&mut req, &mut notifier).await;
    match outcome {
        Ok(response) => Ok(response),
        Err(error) => {
            worker::console_error!("csv export failed: {error}");
            error.into_response_with_notices(notifier.into_notices())
        }
    }
}

async fn copy_route(mut req: Request, _ctx: RouteContext<AppState>) -> Result<Response> {
    let mut notifier = CollectingNotifier::new();
    let outcome = copy_response(&mut req, &mut notifier).await;
    match outcome {
        Ok(response) => Ok(response),
        Err(error) => error.into_response_with_notices(notifier.into_notices()),
    }
}

async fn extract_response(
    req: &mut Request,
    state: &AppState,
    notifier: &mut CollectingNotifier,
) -> Result<(ExtractionResult, String), ApiError> {
    let image = read_image(req).await?;
    let client = GeminiClient::new(state.gemini_config()?)
        .map_err(|error| ApiError::Internal(format!("invalid Gemini endpoint: {error}")))?;

    let mut session = ExtractionSession::new(notifier);
    if let Some(image) = image {
        session.select_image(image);
    }

    let result = session.extract(&client).await?.clone();
    let raw = session.raw().unwrap_or_default().to_string();
    Ok((result, raw))
}

async fn csv_response(
    req: &mut Request,
    notifier: &mut CollectingNotifier,
) -> Result<Response, ApiError> {
    let body = req.text().await?;
    let export = export_from_body(&body, notifier)?;

    let mut response = Response::ok(export.content)?;
    response
        .headers_mut()
        .set("Content-Type", CSV_CONTENT_TYPE)?;
    response.headers_mut().set(
        "Content-Disposition",
        &format!("attachment; filename=\"{}\"", export.filename),
    )?;
    response.headers_mut().set("Cache-Control", "no-store")?;
    Ok(response)
}

async fn copy_response(
    req: &mut Request,
    notifier: &mut CollectingNotifier,
) -> Result<Response, ApiError> {
    let body = req.text().await?;
    let text = copy_from_body(&body, notifier)?;

    let mut response = Response::ok(text)?;
    response
        .headers_mut()
        .set("Content-Type", "text/plain; charset=utf-8")?;
    response.headers_mut().set("Cache-Control", "no-store")?;
    Ok(response)
}

async fn read_image(req: &mut Request) -> Result<Option<ImageReference>, ApiError> {
    let content_type = req
        .headers()
        .get("Content-Type")?
        .map(|value| media_type(&value).to_ascii_lowercase())
        .unwrap_or_default();

    if content_type.starts_with("image/") {
        let bytes = req.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(ImageReference::from_bytes(&bytes, &content_type)));
    }

    let body = req.text().await?;
    image_from_body(&body)
}

/// Reads `{"image": ...}`. A missing or blank image is `None` so the session
/// reports it the same way a screen with no upload does.
pub fn image_from_body(body: &str) -> Result<Option<ImageReference>, ApiError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let parsed = serde_json::from_str::<ExtractRequestBody>(body)?;
    match ImageReference::parse(&parsed.image) {
        Ok(image) => Ok(Some(image)),
        Err(ExtractionError::MissingImage) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

pub fn export_from_body<N>(body: &str, notifier: N) -> Result<CsvExport, ApiError>
where
    N: Notifier,
{
    let mut session = ExtractionSession::new(notifier);
    session.restore(parse_export_body(body)?.data);
    Ok(session.export_csv()?)
}

pub fn copy_from_body<N>(body: &str, notifier: N) -> Result<String, ApiError>
where
    N: Notifier,
{
    let mut session = ExtractionSession::new(notifier);
    session.restore(parse_export_body(body)?.data);
    session
        .copy_text()
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("nothing has been extracted yet".to_string()))
}

fn parse_export_body(body: &str) -> Result<ExportRequestBody, ApiError> {
    if body.trim().is_empty() {
        return Ok(ExportRequestBody {
            data: String::new(),
        });
    }

    Ok(serde_json::from_str::<ExportRequestBody>(body)?)
}

pub fn parse_temperature(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| (0.0..=2.0).contains(value))
}

fn log_extraction(result: &ExtractionResult) {
    match result {
        ExtractionResult::Table(table) => worker::console_log!(
            "extraction completed: kind=table, rows={}, columns={}",
            table.len(),
            table.headers.len()
        ),
        ExtractionResult::Text { value } => worker::console_log!(
            "extraction completed: kind=text, chars={}",
            value.chars().count()
        ),
    }
}

fn json_response<T>(payload: &T) -> Result<Response>
where
    T: Serialize,
{
    let mut response = Response::from_json(payload)?;
    response.headers_mut().set("Cache-Control", "no-store")?;
    Ok(response)
}
