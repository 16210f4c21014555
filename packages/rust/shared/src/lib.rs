//! Shared types, error model, collaborator contracts, and configuration for Adapt.
//!
//! This crate is the foundation depended on by all other Adapt crates.
//! It provides:
//! - [`AdaptError`] and [`StorageError`], the unified error types
//! - Domain types ([`Question`], [`DraftUploadedFile`], [`CourseManifest`], [`DraftId`])
//! - Collaborator traits ([`ObjectStorage`], [`CourseBackend`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod services;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, DefaultsConfig, LimitsConfig, MAX_UPLOAD_CONCURRENCY, PipelineConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    read_secret, render_config, resolve_owner_id,
};
pub use error::{AdaptError, Result, Stage, StorageError};
pub use services::{
    CourseBackend, FinalizeRequest, FinalizeResponse, GenerateRequest, ObjectStorage,
    ParseRequest, ParseResponse,
};
pub use types::{
    CorrectIndex, CourseManifest, CourseSize, DraftId, DraftUploadedFile, ExtractedStats,
    FileParseStatus, ManifestFile, OverallStatus, QUIZ_OPTION_COUNT, Question, QuestionKind,
    QuestionType,
};
