use std::collections::HashSet;
use std::future::Future;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::image::ExtractionRequest;

/// Column name to cell value, in the order the model emitted the keys.
pub type TableRow = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no image selected")]
    MissingImage,

    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("{0}")]
    Remote(String),

    #[error("request blocked by the model: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("the model returned no text")]
    EmptyResponse,
}

impl ExtractionError {
    /// Input errors are the caller's to fix; everything else came back from upstream.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::MissingImage | Self::InvalidReference(_))
    }
}

/// Anything that turns an image into the model's raw output string.
///
/// Futures are not required to be `Send`: Worker handlers run on a single
/// thread and `worker::Fetch` is not `Send`.
pub trait Extractor {
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl Future<Output = Result<String, ExtractionError>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    #[must_use]
    pub fn from_rows(rows: Vec<TableRow>) -> Self {
        Self {
            headers: column_headers(&rows),
            rows,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExtractionResult {
    Table(Table),
    Text { value: String },
}

impl ExtractionResult {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Text { .. } => "text",
        }
    }

    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            Self::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A bare JSON array of row objects.
    Table,
    /// A single-key object holding the row array, as JSON-mode models often emit.
    WrappedTable,
    /// `{"text": "..."}`.
    TextObject,
    /// Not JSON, or JSON in a shape nobody asked for.
    Unexpected,
}

impl ResponseShape {
    #[must_use]
    pub fn is_expected(self) -> bool {
        !matches!(self, Self::Unexpected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub result: ExtractionResult,
    pub shape: ResponseShape,
}

impl Interpretation {
    fn table(rows: Vec<TableRow>, shape: ResponseShape) -> Self {
        Self {
            result: ExtractionResult::Table(Table::from_rows(rows)),
            shape,
        }
    }

    fn unexpected(raw: &str) -> Self {
        Self {
            result: ExtractionResult::Text {
                value: raw.to_string(),
            },
            shape: ResponseShape::Unexpected,
        }
    }
}

/// Decides once whether the model output is a table or free text.
///
/// Never fails: anything that is not one of the requested shapes is kept
/// verbatim as text and flagged as [`ResponseShape::Unexpected`].
#[must_use]
pub fn interpret(raw: &str) -> Interpretation {
    let body = strip_code_fence(raw);
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return Interpretation::unexpected(raw);
    };

    match parsed {
        Value::Array(items) => match rows_from_items(items) {
            Some(rows) => Interpretation::table(rows, ResponseShape::Table),
            None => Interpretation::unexpected(raw),
        },
        Value::Object(object) => {
            if let Some(Value::String(text)) = object.get("text") {
                return Interpretation {
                    result: ExtractionResult::Text {
                        value: text.clone(),
                    },
                    shape: ResponseShape::TextObject,
                };
            }

            if object.len() != 1 {
                return Interpretation::unexpected(raw);
            }

            let wrapped = object.into_iter().next().map(|(_, value)| value);
            match wrapped {
                Some(Value::Array(items)) if !items.is_empty() => match rows_from_items(items) {
                    Some(rows) => Interpretation::table(rows, ResponseShape::WrappedTable),
                    None => Interpretation::unexpected(raw),
                },
                _ => Interpretation::unexpected(raw),
            }
        }
        _ => Interpretation::unexpected(raw),
    }
}

fn rows_from_items(items: Vec<Value>) -> Option<Vec<TableRow>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

/// Union of keys across all rows, in first-seen order.
#[must_use]
pub fn column_headers(rows: &[TableRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();

    for row in rows {
        for key in row.keys() {
            if seen.insert(key.as_str()) {
                headers.push(key.clone());
            }
        }
    }

    headers
}

/// Removes a surrounding markdown code fence (```` ```json ... ``` ````), if any.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let fence_re = Regex::new(r"(?s)^\s*```[\w-]*[ \t]*\r?\n(?P<body>.*?)\r?\n?[ \t]*```\s*$")
        .expect("hardcoded code fence regex is valid");

    fence_re
        .captures(raw)
        .and_then(|capture| capture.name("body"))
        .map_or_else(|| raw.trim(), |body| body.as_str().trim())
}
