//! Collaborator contracts the course pipeline talks to.
//!
//! The pipeline treats object storage and the course API as black boxes.
//! These traits are the seams: `adapt-client` provides the HTTP
//! implementations, tests provide in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::types::{
    CourseManifest, CourseSize, DraftId, DraftUploadedFile, ExtractedStats, ManifestFile,
    Question,
};

/// Object storage for raw course documents.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket name, used in human-readable permission errors.
    fn bucket(&self) -> &str;

    /// Store `body` at `path` (relative to the bucket), overwriting.
    async fn put(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> std::result::Result<(), StorageError>;
}

/// Server-side course operations: parse, generate, finalize, fetch.
#[async_trait]
pub trait CourseBackend: Send + Sync {
    /// Extract text from the uploaded files of a draft.
    async fn parse(&self, request: &ParseRequest) -> Result<ParseResponse>;

    /// Generate questions from extracted text.
    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<Question>>;

    /// Persist the course.
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeResponse>;

    /// Load the canonical manifest of a persisted course.
    async fn fetch_course(&self, course_id: &str) -> Result<CourseManifest>;
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of the parse call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub draft_course_id: DraftId,
    pub owner_id: String,
    pub title: String,
    pub size: CourseSize,
    pub files: Vec<DraftUploadedFile>,
}

/// Result of the parse call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    /// Per-file parse outcome.
    #[serde(default)]
    pub manifest: Vec<ManifestFile>,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub extracted_stats: ExtractedStats,
}

/// Body of the generate call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub draft_course_id: DraftId,
    pub title: String,
    pub size: CourseSize,
    pub extracted_text: String,
}

/// Body of the finalize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub draft_course_id: DraftId,
    pub title: String,
    pub size: CourseSize,
    pub uploaded_files: Vec<DraftUploadedFile>,
    pub questions: Vec<Question>,
}

/// Identity of a persisted course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub course_id: String,
    /// Invite code employees use to join.
    pub course_code: String,
}
