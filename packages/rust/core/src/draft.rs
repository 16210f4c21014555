//! The accumulating record of one course-creation attempt.

use adapt_shared::{
    AdaptError, DraftId, DraftUploadedFile, ExtractedStats, ManifestFile, ParseResponse, Result,
};

/// Draft state for one attempt.
///
/// Created empty on submit, filled by the upload and parse steps, then read
/// by generate and finalize. A failed attempt throws it away.
#[derive(Debug, Clone)]
pub struct DraftPayload {
    pub draft_course_id: DraftId,
    /// Successful uploads only, in selection order.
    pub uploaded_files: Vec<DraftUploadedFile>,
    /// Empty until parsing completes.
    pub extracted_text: String,
    pub extracted_stats: ExtractedStats,
    /// Per-file parse outcome.
    pub parsed_files: Vec<ManifestFile>,
}

impl DraftPayload {
    pub fn new(draft_course_id: DraftId) -> Self {
        Self {
            draft_course_id,
            uploaded_files: Vec::new(),
            extracted_text: String::new(),
            extracted_stats: ExtractedStats::default(),
            parsed_files: Vec::new(),
        }
    }

    /// Store the parse result.
    pub fn record_parse(&mut self, response: ParseResponse) {
        self.extracted_text = response.extracted_text;
        self.extracted_stats = response.extracted_stats;
        self.parsed_files = response.manifest;
    }

    /// Characters of extracted text, ignoring surrounding whitespace.
    pub fn text_chars(&self) -> usize {
        self.extracted_text.trim().chars().count()
    }

    /// Guard run before question generation.
    pub fn ensure_enough_text(&self, min_chars: usize) -> Result<()> {
        let chars = self.text_chars();
        if chars == 0 || chars < min_chars {
            return Err(AdaptError::InsufficientText {
                chars,
                min: min_chars,
            });
        }
        Ok(())
    }
}
