//! Course-creation pipeline and domain logic for Adapt.
//!
//! This crate turns a title and a handful of documents into an editable
//! question set and a saved course: file validation, the upload
//! orchestrator, the draft and question models, and the wizard controller
//! that sequences them (see [`CoursePipeline`]).

pub mod draft;
pub mod phase;
pub mod pipeline;
pub mod questions;
pub mod upload;
pub mod validator;

#[cfg(test)]
mod testing;

pub use draft::DraftPayload;
pub use phase::{LoadingStep, Phase, PhaseEvent};
pub use pipeline::{
    AttemptOutcome, CoursePipeline, FinalizedCourse, ProgressReporter, SelectedFile,
    SilentProgress,
};
pub use questions::QuestionEditor;
pub use upload::{FileEntry, FileStatus, UploadNamespace, UploadOrchestrator, remote_key_for};
pub use validator::{
    ALLOWED_EXTENSIONS, FileRejection, file_extension, format_file_size, resolve_mime_type,
    validate_file,
};
