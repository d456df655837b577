use crate::export::{self, CsvExport, ExportError};
use crate::extraction::{ExtractionError, ExtractionResult, Extractor, interpret};
use crate::image::{ExtractionRequest, ImageReference};
use crate::notify::{Notice, Notifier};

pub const NO_IMAGE_TITLE: &str = "Please upload an image first.";
pub const EXTRACTED_TITLE: &str = "Text extracted successfully!";
pub const EXTRACT_FAILED_TITLE: &str = "Error extracting text.";
pub const FORMAT_ERROR_TITLE: &str = "Error parsing extracted text.";
pub const FORMAT_ERROR_DESCRIPTION: &str = "The extracted text is not in the expected JSON format.";
pub const NOTHING_TO_COPY_TITLE: &str = "No text to copy.";
pub const COPIED_TITLE: &str = "Text copied to clipboard!";
pub const NOTHING_TO_DOWNLOAD_TITLE: &str = "No text to download.";
pub const NO_DATA_TITLE: &str = "No data to download.";
pub const CSV_FAILED_TITLE: &str = "Error converting data to CSV.";
pub const DOWNLOADED_TITLE: &str = "Data downloaded as CSV!";

/// State behind one extraction screen: the selected image, the last result,
/// and the actions a user can take on them.
///
/// `extract` borrows the session mutably for the whole round trip, so a
/// session never has two extractions in flight.
#[derive(Debug)]
pub struct ExtractionSession<N> {
    notifier: N,
    image: Option<ImageReference>,
    raw: Option<String>,
    result: Option<ExtractionResult>,
}

impl<N> ExtractionSession<N>
where
    N: Notifier,
{
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            image: None,
            raw: None,
            result: None,
        }
    }

    pub fn select_image(&mut self, image: ImageReference) {
        self.image = Some(image);
    }

    pub fn image(&self) -> Option<&ImageReference> {
        self.image.as_ref()
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        self.result.as_ref()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Runs one extraction for the selected image.
    ///
    /// On failure the previous result is left untouched.
    pub async fn extract<E>(&mut self, extractor: &E) -> Result<&ExtractionResult, ExtractionError>
    where
        E: Extractor,
    {
        let Some(image) = self.image.clone() else {
            self.notifier.notify(Notice::info(NO_IMAGE_TITLE));
            return Err(ExtractionError::MissingImage);
        };

        let request = ExtractionRequest::new(image);
        match extractor.extract(&request).await {
            Ok(raw) => {
                self.notifier.notify(Notice::info(EXTRACTED_TITLE));
                Ok(self.store(raw))
            }
            Err(error) => {
                self.notifier
                    .notify(Notice::destructive(EXTRACT_FAILED_TITLE, error.to_string()));
                Err(error)
            }
        }
    }

    /// Reinstates output from an earlier extraction. Blank input clears the session.
    pub fn restore(&mut self, raw: impl Into<String>) -> Option<&ExtractionResult> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            self.raw = None;
            self.result = None;
            return None;
        }

        Some(self.store(raw))
    }

    pub fn copy_text(&mut self) -> Option<&str> {
        let Some(text) = self.raw.as_deref().and_then(export::clipboard_text) else {
            self.notifier.notify(Notice::info(NOTHING_TO_COPY_TITLE));
            return None;
        };

        self.notifier.notify(Notice::info(COPIED_TITLE));
        Some(text)
    }

    pub fn export_csv(&mut self) -> Result<CsvExport, ExportError> {
        let Some(result) = self.result.as_ref() else {
            self.notifier.notify(Notice::info(NOTHING_TO_DOWNLOAD_TITLE));
            return Err(ExportError::NothingExtracted);
        };

        match export::export_csv(result) {
            Ok(csv) => {
                self.notifier.notify(Notice::info(DOWNLOADED_TITLE));
                Ok(csv)
            }
            Err(ExportError::NoData) => {
                let description = match result {
                    ExtractionResult::Table(_) => "The extracted JSON array is empty.",
                    ExtractionResult::Text { .. } => "The extracted text is empty.",
                };
                self.notifier
                    .notify(Notice::destructive(NO_DATA_TITLE, description));
                Err(ExportError::NoData)
            }
            Err(error) => {
                self.notifier
                    .notify(Notice::destructive(CSV_FAILED_TITLE, error.to_string()));
                Err(error)
            }
        }
    }

    fn store(&mut self, raw: String) -> &ExtractionResult {
        let interpretation = interpret(&raw);
        if !interpretation.shape.is_expected() {
            self.notifier.notify(Notice::destructive(
                FORMAT_ERROR_TITLE,
                FORMAT_ERROR_DESCRIPTION,
            ));
        }

        self.raw = Some(raw);
        self.result.insert(interpretation.result)
    }
}
