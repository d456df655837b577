use crate::gemini::Part;
use crate::image::ImageReference;

/// Marker in a template where the image part is placed.
pub const MEDIA_MARKER: &str = "{{media}}";

pub const OCR_PROMPT: &str = "You are an expert OCR and data structuring specialist. \
Analyze the following image:\n\n{{media}}\n\n\
Identify if there is a table in the image. If a table is present, extract the data and \
structure it into a JSON array of objects. Each object should represent a row in the table, \
with keys corresponding to the column headers. Ensure the JSON is valid and parsable.\n\n\
If no table is present, extract the relevant text from the image and return it as a JSON \
object with a single key \"text\".\n\n\
Return the result as a string in the \"extractedData\" field.\n\n\
Output (JSON format):";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    template: &'static str,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::ocr()
    }
}

impl PromptTemplate {
    #[must_use]
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    #[must_use]
    pub const fn ocr() -> Self {
        Self::new(OCR_PROMPT)
    }

    /// Splits the template around each media marker and puts the image there.
    ///
    /// A template without a marker gets the image appended after its text.
    /// Blank text segments are dropped.
    #[must_use]
    pub fn render(&self, image: &ImageReference) -> Vec<Part> {
        let mut parts = Vec::new();
        let mut segments = self.template.split(MEDIA_MARKER).peekable();
        let mut placed_image = false;

        while let Some(segment) = segments.next() {
            if !segment.trim().is_empty() {
                parts.push(Part::text(segment.trim()));
            }
            if segments.peek().is_some() {
                parts.push(Part::image(image));
                placed_image = true;
            }
        }

        if !placed_image {
            parts.push(Part::image(image));
        }

        parts
    }
}
