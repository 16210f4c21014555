//! Core domain types for Adapt courses and their drafts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AdaptError;

// ---------------------------------------------------------------------------
// DraftId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one course-creation attempt.
///
/// Minted before any network call so every collaborator sees the same
/// logical course for the whole attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub Uuid);

impl DraftId {
    /// Generate a new time-sortable draft identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DraftId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CourseSize
// ---------------------------------------------------------------------------

/// Requested course length; drives how many questions are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl CourseSize {
    /// Wire/config spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// Short description of the expected question count.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Small => "8-12 questions",
            Self::Medium => "12-18 questions",
            Self::Large => "18-30 questions",
        }
    }
}

impl fmt::Display for CourseSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseSize {
    type Err = AdaptError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(AdaptError::validation(format!(
                "unknown course size \"{other}\" (expected small, medium or large)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// Number of answer options every quiz question carries.
pub const QUIZ_OPTION_COUNT: usize = 4;

/// Index of the correct quiz option, always in `0..4`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CorrectIndex(u8);

impl CorrectIndex {
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for CorrectIndex {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        if (value as usize) < QUIZ_OPTION_COUNT {
            Ok(Self(value))
        } else {
            Err(format!(
                "correctIndex {value} out of range 0..{}",
                QUIZ_OPTION_COUNT - 1
            ))
        }
    }
}

impl TryFrom<usize> for CorrectIndex {
    type Error = String;

    fn try_from(value: usize) -> std::result::Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| format!("correctIndex {value} out of range"))
            .and_then(Self::try_from)
    }
}

impl From<CorrectIndex> for u8 {
    fn from(value: CorrectIndex) -> Self {
        value.0
    }
}

/// Which variant a question is, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Quiz,
    Open,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiz => write!(f, "quiz"),
            Self::Open => write!(f, "open"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = AdaptError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiz" => Ok(Self::Quiz),
            "open" => Ok(Self::Open),
            other => Err(AdaptError::validation(format!(
                "unknown question type \"{other}\" (expected quiz or open)"
            ))),
        }
    }
}

/// Variant payload of a [`Question`].
///
/// Serialized inline with a `type` tag, so a quiz never carries
/// `expectedAnswer` and an open question never carries options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuestionKind {
    #[serde(rename_all = "camelCase")]
    Quiz {
        quiz_options: [String; QUIZ_OPTION_COUNT],
        correct_index: CorrectIndex,
    },
    #[serde(rename_all = "camelCase")]
    Open { expected_answer: String },
}

/// One assessment item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable identity used while reordering.
    pub id: String,
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    /// A blank question of the given type with a fresh id.
    pub fn blank(question_type: QuestionType) -> Self {
        let kind = match question_type {
            QuestionType::Quiz => QuestionKind::Quiz {
                quiz_options: Default::default(),
                correct_index: CorrectIndex::default(),
            },
            QuestionType::Open => QuestionKind::Open {
                expected_answer: String::new(),
            },
        };
        Self {
            id: Uuid::now_v7().to_string(),
            prompt: String::new(),
            kind,
        }
    }

    pub fn question_type(&self) -> QuestionType {
        match self.kind {
            QuestionKind::Quiz { .. } => QuestionType::Quiz,
            QuestionKind::Open { .. } => QuestionType::Open,
        }
    }

    pub fn is_quiz(&self) -> bool {
        self.question_type() == QuestionType::Quiz
    }
}

// ---------------------------------------------------------------------------
// Draft and manifest files
// ---------------------------------------------------------------------------

/// A file that reached object storage during the current attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUploadedFile {
    /// Collision-free key, e.g. `0190…c3.pdf`.
    pub remote_key: String,
    /// Full bucket path: `{ownerId}/{draftCourseId}/files/{remoteKey}`.
    pub storage_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Summary of the text the parse step extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedStats {
    pub chars: usize,
    pub files_count: usize,
    pub truncated: bool,
}

/// Per-file outcome of server-side parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileParseStatus {
    Parsed,
    Skipped,
    Error,
}

/// One file entry of a course manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub file_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub storage_path: String,
    pub parse_status: FileParseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

// ---------------------------------------------------------------------------
// CourseManifest
// ---------------------------------------------------------------------------

/// Aggregate processing state of a persisted course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Processing,
    Ready,
    Partial,
    Error,
}

/// The canonical persisted course, as returned by fetch-by-id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseManifest {
    pub course_id: String,
    pub title: String,
    pub size: CourseSize,
    pub created_at: DateTime<Utc>,
    pub overall_status: OverallStatus,
    pub text_bytes: u64,
    /// Short code employees use to join the course.
    pub invite_code: String,
    #[serde(default)]
    pub employees_count: u64,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<Question>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_count: Option<usize>,
}
