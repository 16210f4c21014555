//! Course-creation wizard: form → upload → parse → generate → edit → save.
//!
//! [`CoursePipeline`] owns the phase machine and sequences the collaborator
//! calls. Hosts drive it with one `&mut` call at a time and observe state
//! through its accessors and a [`ProgressReporter`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use adapt_shared::{
    AdaptError, CourseBackend, CourseManifest, CourseSize, DraftId, FinalizeRequest,
    GenerateRequest, ObjectStorage, ParseRequest, PipelineConfig, Question, Result, Stage,
};

use crate::draft::DraftPayload;
use crate::phase::{Phase, PhaseEvent};
use crate::questions::QuestionEditor;
use crate::upload::{FileEntry, UploadNamespace, UploadOrchestrator};
use crate::validator::{FileRejection, format_file_size, resolve_mime_type, validate_file};

/// Progress callback for reporting wizard status.
pub trait ProgressReporter: Send + Sync {
    /// Called whenever the phase (or loading step) changes.
    fn phase(&self, phase: &Phase);
    /// Called when a file upload starts (`current` is 1-based).
    fn file_started(&self, name: &str, current: usize, total: usize);
    /// Called when a file upload reaches `done` or `error`.
    fn file_finished(&self, entry: &FileEntry);
    /// Called when the course is saved.
    fn done(&self, course: &FinalizedCourse);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: &Phase) {}
    fn file_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn file_finished(&self, _entry: &FileEntry) {}
    fn done(&self, _course: &FinalizedCourse) {}
}

/// A file picked by the user, before validation.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    /// Content type reported by the source, if any.
    pub declared_type: Option<String>,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            bytes: bytes.into(),
        }
    }
}

/// How a submit or regenerate ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Questions are ready for editing.
    Ready,
    /// The user cancelled; the wizard is back on the form.
    Cancelled,
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct FinalizedCourse {
    pub course_id: String,
    /// Invite code employees join with.
    pub course_code: String,
    /// Canonical manifest; `None` until it has been fetched.
    pub manifest: Option<CourseManifest>,
}

/// The course-creation wizard controller.
pub struct CoursePipeline {
    storage: Arc<dyn ObjectStorage>,
    backend: Arc<dyn CourseBackend>,
    config: PipelineConfig,
    owner_id: String,

    title: String,
    size: CourseSize,
    files: Vec<FileEntry>,
    validation_errors: BTreeMap<String, FileRejection>,

    phase: Phase,
    draft: Option<DraftPayload>,
    editor: Option<QuestionEditor>,
    last_error: Option<String>,
    finalized: Option<FinalizedCourse>,
    cancel: CancellationToken,
}

impl CoursePipeline {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        backend: Arc<dyn CourseBackend>,
        config: PipelineConfig,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            backend,
            config,
            owner_id: owner_id.into(),
            title: String::new(),
            size: CourseSize::default(),
            files: Vec::new(),
            validation_errors: BTreeMap::new(),
            phase: Phase::Form,
            draft: None,
            editor: None,
            last_error: None,
            finalized: None,
            cancel: CancellationToken::new(),
        }
    }

    // -- observers ----------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn size(&self) -> CourseSize {
        self.size
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Rejected files by name, accumulated across `add_files` calls.
    pub fn validation_errors(&self) -> &BTreeMap<String, FileRejection> {
        &self.validation_errors
    }

    pub fn draft(&self) -> Option<&DraftPayload> {
        self.draft.as_ref()
    }

    pub fn editor(&self) -> Option<&QuestionEditor> {
        self.editor.as_ref()
    }

    /// The error surfaced by the last failed operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn finalized(&self) -> Option<&FinalizedCourse> {
        self.finalized.as_ref()
    }

    /// Token the current or next attempt observes. Cancel it to abort.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // -- form ---------------------------------------------------------------

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<()> {
        self.ensure_form("edit the title")?;
        self.title = title.into();
        Ok(())
    }

    pub fn set_size(&mut self, size: CourseSize) -> Result<()> {
        self.ensure_form("change the size")?;
        self.size = size;
        Ok(())
    }

    /// Validate and append files. Returns the rejections from this call.
    ///
    /// A file with the same name and size as an existing entry is skipped.
    pub fn add_files(
        &mut self,
        files: impl IntoIterator<Item = SelectedFile>,
    ) -> Result<Vec<(String, FileRejection)>> {
        self.ensure_form("add files")?;

        let mut rejected = Vec::new();
        for file in files {
            let size = file.bytes.len() as u64;
            if let Err(rejection) = validate_file(&file.name, size, self.config.max_file_bytes) {
                debug!(file = %file.name, %rejection, "file rejected");
                rejected.push((file.name, rejection));
                continue;
            }
            if self
                .files
                .iter()
                .any(|f| f.name() == file.name && f.size() == size)
            {
                debug!(file = %file.name, "duplicate file skipped");
                continue;
            }
            let mime_type = resolve_mime_type(&file.name, file.declared_type.as_deref());
            self.files
                .push(FileEntry::new(file.name, mime_type, file.bytes));
        }

        self.validation_errors.extend(rejected.iter().cloned());
        Ok(rejected)
    }

    /// Drop a file entry. Returns whether it existed.
    pub fn remove_file(&mut self, id: Uuid) -> Result<bool> {
        self.ensure_form("remove files")?;
        let before = self.files.len();
        self.files.retain(|f| f.id() != id);
        Ok(self.files.len() != before)
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Reset to an empty form. Not allowed while loading or saving.
    pub fn close(&mut self) -> Result<()> {
        let next = self.phase.transition(PhaseEvent::Close)?;
        self.title.clear();
        self.size = CourseSize::default();
        self.files.clear();
        self.validation_errors.clear();
        self.draft = None;
        self.editor = None;
        self.last_error = None;
        self.finalized = None;
        self.phase = next;
        Ok(())
    }

    // -- attempt ------------------------------------------------------------

    /// Run a full attempt: upload, parse, check text, generate.
    ///
    /// On success the wizard is in `Editing`. Form validation failures
    /// leave it in `Form` without any network call; later failures return
    /// it to `Form` with the draft discarded.
    #[instrument(skip_all, fields(title = %self.title.trim(), files = self.files.len()))]
    pub async fn submit(&mut self, progress: &dyn ProgressReporter) -> Result<AttemptOutcome> {
        let next = self.phase.transition(PhaseEvent::Submit)?;
        if let Err(e) = self.validate_form() {
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        let token = self.fresh_token();
        for entry in &mut self.files {
            entry.reset();
        }
        let draft_id = DraftId::new();
        info!(%draft_id, "starting attempt");

        self.draft = Some(DraftPayload::new(draft_id));
        self.editor = None;
        self.finalized = None;
        self.last_error = None;
        self.set_phase(next, progress);

        match self.run_attempt(&token, progress).await {
            Ok(AttemptOutcome::Cancelled) => {
                self.abort_to_form(progress);
                Ok(AttemptOutcome::Cancelled)
            }
            Ok(AttemptOutcome::Ready) => Ok(AttemptOutcome::Ready),
            Err(e) => {
                warn!(error = %e, "attempt failed");
                self.fail(&e, progress);
                self.draft = None;
                Err(e)
            }
        }
    }

    /// Generate again from the same extracted text, replacing all questions.
    ///
    /// Manual edits are discarded on success. On failure the previous list
    /// stays and the wizard returns to `Editing`.
    #[instrument(skip_all)]
    pub async fn regenerate(&mut self, progress: &dyn ProgressReporter) -> Result<AttemptOutcome> {
        let next = self.phase.transition(PhaseEvent::Regenerate)?;
        let request = self.generate_request()?;

        let token = self.fresh_token();
        self.last_error = None;
        self.set_phase(next, progress);

        let result = match until_cancelled(&token, self.generate(&request)).await {
            None => {
                self.abort_to_form(progress);
                return Ok(AttemptOutcome::Cancelled);
            }
            Some(result) => result,
        };

        match result {
            Ok(questions) => {
                info!(questions = questions.len(), "questions regenerated");
                self.enter_editing(questions, progress)?;
                Ok(AttemptOutcome::Ready)
            }
            Err(e) => {
                warn!(error = %e, "regenerate failed");
                self.fail(&e, progress);
                Err(e)
            }
        }
    }

    /// Mutable access to the question list. Only while `Editing`.
    pub fn editor_mut(&mut self) -> Result<&mut QuestionEditor> {
        if self.phase != Phase::Editing {
            return Err(AdaptError::InvalidTransition {
                phase: self.phase.to_string(),
                event: "edit questions".into(),
            });
        }
        self.editor
            .as_mut()
            .ok_or_else(|| AdaptError::validation("no questions loaded"))
    }

    /// Persist the course, then load its canonical manifest.
    ///
    /// A failed finalize returns to `Editing`; retrying re-sends the same
    /// draft id. Once finalize succeeds the course exists: the draft is
    /// dropped and the wizard is `Done` even if the manifest fetch fails.
    /// That failure is surfaced through [`last_error`](Self::last_error)
    /// and the manifest is left `None` for [`reload_course`](Self::reload_course).
    #[instrument(skip_all)]
    pub async fn save(&mut self, progress: &dyn ProgressReporter) -> Result<FinalizedCourse> {
        let next = self.phase.transition(PhaseEvent::Save)?;

        let questions = self
            .editor
            .as_ref()
            .map(|e| e.questions().to_vec())
            .unwrap_or_default();
        if questions.is_empty() {
            let e = AdaptError::EmptyQuestionSet;
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        let Some(draft) = &self.draft else {
            return Err(AdaptError::validation("no draft to save"));
        };

        let request = FinalizeRequest {
            draft_course_id: draft.draft_course_id.clone(),
            title: self.title.trim().to_string(),
            size: self.size,
            uploaded_files: draft.uploaded_files.clone(),
            questions,
        };
        info!(
            draft_id = %request.draft_course_id,
            questions = request.questions.len(),
            "saving course"
        );

        self.last_error = None;
        self.set_phase(next, progress);

        let response = match self.backend.finalize(&request).await {
            Ok(response) => response,
            Err(e) => {
                let e = e.at_stage(Stage::Finalize);
                warn!(error = %e, "save failed");
                self.fail(&e, progress);
                return Err(e);
            }
        };
        info!(course_id = %response.course_id, code = %response.course_code, "course saved");

        let next = self.phase.transition(PhaseEvent::Saved)?;
        self.draft = None;
        self.editor = None;
        self.set_phase(next, progress);

        let mut course = FinalizedCourse {
            course_id: response.course_id,
            course_code: response.course_code,
            manifest: None,
        };
        match self.fetch_manifest(&course.course_id).await {
            Ok(manifest) => course.manifest = Some(manifest),
            Err(e) => {
                warn!(error = %e, "saved course could not be loaded");
                self.last_error = Some(e.to_string());
            }
        }
        self.finalized = Some(course.clone());
        progress.done(&course);
        Ok(course)
    }

    /// Fetch the saved course's manifest again. Only in `Done`; never
    /// persists anything.
    #[instrument(skip_all)]
    pub async fn reload_course(&mut self) -> Result<()> {
        let course_id = match (&self.phase, &self.finalized) {
            (Phase::Done, Some(course)) => course.course_id.clone(),
            _ => {
                return Err(AdaptError::InvalidTransition {
                    phase: self.phase.to_string(),
                    event: "reload the saved course".into(),
                });
            }
        };

        let manifest = match self.fetch_manifest(&course_id).await {
            Ok(manifest) => manifest,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.last_error = None;
        if let Some(course) = self.finalized.as_mut() {
            course.manifest = Some(manifest);
        }
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    async fn run_attempt(
        &mut self,
        token: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<AttemptOutcome> {
        let draft_id = self.draft_id()?;

        // Upload
        let namespace = UploadNamespace::new(self.owner_id.clone(), draft_id.clone());
        let orchestrator =
            UploadOrchestrator::new(Arc::clone(&self.storage), self.config.upload_concurrency);
        let uploaded = orchestrator
            .upload_all(&mut self.files, &namespace, token, progress)
            .await;
        if token.is_cancelled() {
            return Ok(AttemptOutcome::Cancelled);
        }
        if uploaded.is_empty() {
            return Err(AdaptError::NoFilesUploaded {
                first_error: self
                    .files
                    .iter()
                    .find_map(|f| f.error().map(String::from)),
            });
        }
        self.advance(progress)?;

        // Parse
        let request = ParseRequest {
            draft_course_id: draft_id.clone(),
            owner_id: self.owner_id.clone(),
            title: self.title.trim().to_string(),
            size: self.size,
            files: uploaded.clone(),
        };
        let parse = self.backend.parse(&request);
        let Some(parsed) = until_cancelled(token, parse).await else {
            return Ok(AttemptOutcome::Cancelled);
        };
        let parsed = parsed.map_err(|e| e.at_stage(Stage::Parse))?;
        info!(
            chars = parsed.extracted_stats.chars,
            files = parsed.extracted_stats.files_count,
            truncated = parsed.extracted_stats.truncated,
            "text extracted"
        );

        let min_chars = self.config.min_extracted_chars;
        let draft = self.draft_mut()?;
        draft.uploaded_files = uploaded;
        draft.record_parse(parsed);
        draft.ensure_enough_text(min_chars)?;
        let request = self.generate_request()?;
        self.advance(progress)?;

        // Generate
        let Some(questions) = until_cancelled(token, self.generate(&request)).await else {
            return Ok(AttemptOutcome::Cancelled);
        };
        let questions = questions?;
        info!(questions = questions.len(), "questions generated");

        self.enter_editing(questions, progress)?;
        Ok(AttemptOutcome::Ready)
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<Question>> {
        self.backend
            .generate(request)
            .await
            .map_err(|e| e.at_stage(Stage::Generate))
    }

    async fn fetch_manifest(&self, course_id: &str) -> Result<CourseManifest> {
        self.backend
            .fetch_course(course_id)
            .await
            .map_err(|e| e.at_stage(Stage::Fetch))
    }

    fn generate_request(&self) -> Result<GenerateRequest> {
        let draft = self
            .draft
            .as_ref()
            .ok_or_else(|| AdaptError::validation("no active draft"))?;
        Ok(GenerateRequest {
            draft_course_id: draft.draft_course_id.clone(),
            title: self.title.trim().to_string(),
            size: self.size,
            extracted_text: draft.extracted_text.clone(),
        })
    }

    /// Loading `Generating` → `Ready` → `Editing` with a new question list.
    fn enter_editing(
        &mut self,
        questions: Vec<Question>,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        self.advance(progress)?;
        let next = self.phase.transition(PhaseEvent::EnterEditing)?;
        self.editor = Some(QuestionEditor::new(questions));
        self.set_phase(next, progress);
        Ok(())
    }

    fn validate_form(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AdaptError::validation("enter a course title"));
        }
        if self.files.is_empty() {
            return Err(AdaptError::validation("add at least one file"));
        }
        let total: u64 = self.files.iter().map(FileEntry::size).sum();
        if total > self.config.max_batch_bytes {
            return Err(AdaptError::validation(format!(
                "files total {}, more than the {} limit",
                format_file_size(total),
                format_file_size(self.config.max_batch_bytes)
            )));
        }
        Ok(())
    }

    fn ensure_form(&self, action: &str) -> Result<()> {
        if self.phase == Phase::Form {
            Ok(())
        } else {
            Err(AdaptError::InvalidTransition {
                phase: self.phase.to_string(),
                event: action.into(),
            })
        }
    }

    /// The attempt token, replaced first if a previous cancel already fired.
    fn fresh_token(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.cancel.clone()
    }

    fn advance(&mut self, progress: &dyn ProgressReporter) -> Result<()> {
        let next = self.phase.transition(PhaseEvent::StepComplete)?;
        self.set_phase(next, progress);
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase, progress: &dyn ProgressReporter) {
        debug!(from = %self.phase, to = %phase, "phase change");
        self.phase = phase;
        progress.phase(&phase);
    }

    /// Surface `error` and route back to where the failed work began.
    fn fail(&mut self, error: &AdaptError, progress: &dyn ProgressReporter) {
        self.last_error = Some(error.to_string());
        match self.phase.transition(PhaseEvent::Fail) {
            Ok(next) => self.set_phase(next, progress),
            Err(e) => warn!(error = %e, "failure outside an active phase"),
        }
    }

    fn abort_to_form(&mut self, progress: &dyn ProgressReporter) {
        info!("attempt cancelled");
        self.cancel = CancellationToken::new();
        self.draft = None;
        self.editor = None;
        match self.phase.transition(PhaseEvent::Cancel) {
            Ok(next) => self.set_phase(next, progress),
            Err(e) => warn!(error = %e, "cancel outside loading"),
        }
    }

    fn draft_id(&self) -> Result<DraftId> {
        self.draft
            .as_ref()
            .map(|d| d.draft_course_id.clone())
            .ok_or_else(|| AdaptError::validation("no active draft"))
    }

    fn draft_mut(&mut self) -> Result<&mut DraftPayload> {
        self.draft
            .as_mut()
            .ok_or_else(|| AdaptError::validation("no active draft"))
    }
}

/// `None` if `token` fires before `work` resolves; the work is dropped.
async fn until_cancelled<T>(
    token: &CancellationToken,
    work: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = work => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::LoadingStep;
    use crate::testing::{FakeBackend, MemoryStorage, RecordingProgress, sample_questions};
    use crate::upload::FileStatus;
    use adapt_shared::QuestionType;

    fn pdf(name: &str) -> SelectedFile {
        SelectedFile::new(name, name.to_string().into_bytes())
    }

    fn pipeline(storage: Arc<MemoryStorage>, backend: Arc<FakeBackend>) -> CoursePipeline {
        CoursePipeline::new(storage, backend, PipelineConfig::default(), "owner-1")
    }

    fn ready_form(storage: Arc<MemoryStorage>, backend: Arc<FakeBackend>) -> CoursePipeline {
        let mut wizard = pipeline(storage, backend);
        wizard.set_title("Onboarding").unwrap();
        wizard.add_files([pdf("handbook.pdf")]).unwrap();
        wizard
    }

    #[tokio::test]
    async fn onboarding_end_to_end() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(3)));
        let progress = RecordingProgress::default();
        let mut wizard = ready_form(storage.clone(), backend.clone());
        wizard.set_size(CourseSize::Medium).unwrap();

        let outcome = wizard.submit(&progress).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Ready);
        assert_eq!(wizard.phase(), Phase::Editing);
        assert_eq!(progress.files_started(), vec![("handbook.pdf".to_string(), 1, 1)]);
        assert_eq!(storage.successful_puts(), 1);
        let (path, content_type) = &storage.objects()[0];
        assert!(path.starts_with("owner-1/"));
        assert!(path.ends_with(".pdf"));
        assert!(!path.contains("handbook"));
        assert_eq!(content_type, "application/pdf");
        assert_eq!(backend.parse_calls(), 1);
        assert_eq!(backend.generate_calls(), 1);
        assert_eq!(wizard.editor().unwrap().len(), 3);

        let parse = backend.last_parse().unwrap();
        assert_eq!(parse.title, "Onboarding");
        assert_eq!(parse.files.len(), 1);
        assert_eq!(parse.files[0].original_name, "handbook.pdf");

        let original: Vec<String> = wizard.editor().unwrap().iter().map(|q| q.id.clone()).collect();
        wizard.editor_mut().unwrap().remove(1).unwrap();

        let course = wizard.save(&progress).await.unwrap();
        assert_eq!(wizard.phase(), Phase::Done);
        assert_eq!(course.course_code, "JOIN-42");
        assert_eq!(backend.fetch_calls(), 1);
        assert_eq!(course.manifest.as_ref().unwrap().quiz_count, Some(2));

        let finalize = backend.last_finalize().unwrap();
        let saved: Vec<&str> = finalize.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(saved, [original[0].as_str(), original[2].as_str()]);
        assert_eq!(finalize.draft_course_id, parse.draft_course_id);
        assert_eq!(finalize.uploaded_files.len(), 1);

        assert!(progress.phases().contains(&Phase::Loading {
            step: LoadingStep::Generating,
            regenerating: false
        }));
        assert_eq!(progress.completed(), 1);
    }

    #[tokio::test]
    async fn all_uploads_failing_never_parses() {
        let storage = Arc::new(MemoryStorage::new().deny_all());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.add_files([pdf("second.pdf")]).unwrap();

        let err = wizard.submit(&SilentProgress).await.unwrap_err();
        assert!(matches!(err, AdaptError::NoFilesUploaded { .. }));
        assert!(err.to_string().contains("no permission"));
        assert_eq!(backend.parse_calls(), 0);
        assert_eq!(wizard.phase(), Phase::Form);
        assert!(wizard.draft().is_none());
        assert!(wizard.last_error().is_some());
        assert!(wizard.files().iter().all(|f| f.error().is_some()));
    }

    #[tokio::test]
    async fn partial_upload_failure_continues() {
        let storage = Arc::new(MemoryStorage::new().fail_on("bad.pdf"));
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.add_files([pdf("bad.pdf")]).unwrap();

        wizard.submit(&SilentProgress).await.unwrap();
        assert_eq!(backend.last_parse().unwrap().files.len(), 1);
        assert_eq!(wizard.files()[1].error().map(|e| e.starts_with("[500]")), Some(true));
    }

    #[tokio::test]
    async fn insufficient_text_never_generates() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("  short text  ", sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());

        let err = wizard.submit(&SilentProgress).await.unwrap_err();
        assert!(matches!(err, AdaptError::InsufficientText { chars: 10, min: 200 }));
        assert_eq!(backend.generate_calls(), 0);
        assert_eq!(wizard.phase(), Phase::Form);
        assert!(wizard.last_error().unwrap().contains("insufficient text"));
    }

    #[tokio::test]
    async fn cancel_after_two_of_five_uploads() {
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = pipeline(Arc::new(MemoryStorage::new()), backend.clone());
        wizard.set_title("Safety").unwrap();
        wizard
            .add_files((1..=5).map(|i| pdf(&format!("doc{i}.pdf"))))
            .unwrap();
        let storage = Arc::new(MemoryStorage::new().cancel_after(2, wizard.cancel_token()));
        wizard.storage = storage.clone();

        let outcome = wizard.submit(&SilentProgress).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Cancelled);
        assert!(wizard.files().iter().filter(|f| f.is_done()).count() <= 2);
        assert_eq!(storage.put_calls(), 2);
        assert_eq!(backend.parse_calls(), 0);
        assert_eq!(wizard.phase(), Phase::Form);
        assert!(wizard.draft().is_none());
        assert!(wizard.last_error().is_none());
        assert!(!wizard.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn stale_cancelled_token_is_replaced() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend);
        wizard.cancel_token().cancel();

        let outcome = wizard.submit(&SilentProgress).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Ready);
        assert!(!wizard.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn regenerate_reuses_extracted_text() {
        let storage = Arc::new(MemoryStorage::new());
        let text = format!("{} end", "policy ".repeat(60));
        let backend = Arc::new(FakeBackend::new(text.clone(), sample_questions(3)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();
        let first_draft = wizard.draft().unwrap().draft_course_id.clone();

        wizard.editor_mut().unwrap().add(QuestionType::Open);
        assert_eq!(wizard.editor().unwrap().len(), 4);

        backend.set_questions(sample_questions(5));
        let outcome = wizard.regenerate(&SilentProgress).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Ready);
        assert_eq!(backend.parse_calls(), 1);
        assert_eq!(backend.generate_calls(), 2);
        assert_eq!(backend.last_generate().unwrap().extracted_text, text);
        assert_eq!(wizard.editor().unwrap().len(), 5);
        assert_eq!(wizard.draft().unwrap().draft_course_id, first_draft);
        assert_eq!(wizard.phase(), Phase::Editing);
    }

    #[tokio::test]
    async fn failed_regenerate_keeps_previous_questions() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(3)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();

        backend.fail_generate(true);
        let err = wizard.regenerate(&SilentProgress).await.unwrap_err();
        assert!(matches!(
            err,
            AdaptError::Service {
                stage: Stage::Generate,
                ..
            }
        ));
        assert_eq!(wizard.phase(), Phase::Editing);
        assert_eq!(wizard.editor().unwrap().len(), 3);
        assert!(wizard.last_error().unwrap().starts_with("question generation failed"));
    }

    #[tokio::test]
    async fn generate_failure_on_submit_returns_to_form() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(3)));
        backend.fail_generate(true);
        let mut wizard = ready_form(storage, backend);

        assert!(wizard.submit(&SilentProgress).await.is_err());
        assert_eq!(wizard.phase(), Phase::Form);
        assert!(wizard.editor().is_none());
        assert!(wizard.draft().is_none());
    }

    #[tokio::test]
    async fn save_failure_returns_to_editing_and_retries_same_draft() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();

        backend.fail_finalize(true);
        let err = wizard.save(&SilentProgress).await.unwrap_err();
        assert!(err.to_string().starts_with("saving the course failed"));
        assert_eq!(wizard.phase(), Phase::Editing);
        let first = backend.last_finalize().unwrap().draft_course_id;

        backend.fail_finalize(false);
        wizard.save(&SilentProgress).await.unwrap();
        assert_eq!(backend.last_finalize().unwrap().draft_course_id, first);
        assert_eq!(backend.finalize_calls(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_after_finalize_never_finalizes_twice() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();

        backend.fail_fetch(true);
        let course = wizard.save(&SilentProgress).await.unwrap();
        assert_eq!(course.course_code, "JOIN-42");
        assert!(course.manifest.is_none());
        assert_eq!(wizard.phase(), Phase::Done);
        assert!(wizard.draft().is_none());
        assert!(wizard.editor().is_none());
        assert!(wizard.last_error().unwrap().starts_with("loading the saved course failed"));

        assert!(matches!(
            wizard.save(&SilentProgress).await,
            Err(AdaptError::InvalidTransition { .. })
        ));
        assert!(wizard.reload_course().await.is_err());

        backend.fail_fetch(false);
        wizard.reload_course().await.unwrap();
        let saved = wizard.finalized().unwrap();
        assert_eq!(saved.manifest.as_ref().unwrap().course_id, saved.course_id);
        assert!(wizard.last_error().is_none());
        assert_eq!(backend.finalize_calls(), 1);
        assert_eq!(backend.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn reload_course_requires_a_saved_course() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();

        assert!(matches!(
            wizard.reload_course().await,
            Err(AdaptError::InvalidTransition { .. })
        ));
        assert_eq!(backend.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn cancel_during_parse_resets_to_form() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        backend.cancel_on_parse(wizard.cancel_token());

        let outcome = wizard.submit(&SilentProgress).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Cancelled);
        assert_eq!(backend.parse_calls(), 1);
        assert_eq!(backend.generate_calls(), 0);
        assert_eq!(wizard.phase(), Phase::Form);
        assert!(wizard.draft().is_none());
        assert!(wizard.editor().is_none());
        assert!(wizard.last_error().is_none());
        assert!(!wizard.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn save_requires_a_question() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), Vec::new()));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();
        assert!(wizard.editor().unwrap().is_empty());

        let err = wizard.save(&SilentProgress).await.unwrap_err();
        assert!(matches!(err, AdaptError::EmptyQuestionSet));
        assert_eq!(wizard.phase(), Phase::Editing);
        assert_eq!(backend.finalize_calls(), 0);
    }

    #[tokio::test]
    async fn form_validation_happens_before_network() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(1)));
        let mut wizard = pipeline(storage.clone(), backend);
        wizard.add_files([pdf("a.pdf")]).unwrap();

        let err = wizard.submit(&SilentProgress).await.unwrap_err();
        assert!(matches!(err, AdaptError::Validation { .. }));
        assert_eq!(wizard.phase(), Phase::Form);
        assert_eq!(storage.put_calls(), 0);

        wizard.set_title("   ").unwrap();
        assert!(wizard.submit(&SilentProgress).await.is_err());

        let mut empty = pipeline(storage.clone(), Arc::new(FakeBackend::new("", Vec::new())));
        empty.set_title("Title").unwrap();
        assert!(empty.submit(&SilentProgress).await.is_err());
        assert_eq!(storage.put_calls(), 0);
    }

    #[tokio::test]
    async fn batch_cap_is_enforced() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(1)));
        let config = PipelineConfig {
            max_file_bytes: 10,
            max_batch_bytes: 15,
            ..PipelineConfig::default()
        };
        let mut wizard = CoursePipeline::new(storage.clone(), backend, config, "owner-1");
        wizard.set_title("Caps").unwrap();
        wizard
            .add_files([
                SelectedFile::new("a.txt", vec![b'a'; 8]),
                SelectedFile::new("b.txt", vec![b'b'; 8]),
            ])
            .unwrap();

        let err = wizard.submit(&SilentProgress).await.unwrap_err();
        assert!(err.to_string().contains("more than the 15 B limit"));
        assert_eq!(storage.put_calls(), 0);
    }

    #[test]
    fn add_files_records_rejections_and_skips_duplicates() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("", Vec::new()));
        let mut wizard = pipeline(storage, backend);

        let rejected = wizard
            .add_files([
                pdf("a.pdf"),
                pdf("a.pdf"),
                pdf("slides.pptx"),
                SelectedFile::new("empty.txt", Vec::new()),
            ])
            .unwrap();
        assert_eq!(rejected.len(), 2);
        assert_eq!(wizard.files().len(), 1);
        assert_eq!(wizard.files()[0].mime_type(), "application/pdf");
        assert_eq!(wizard.files()[0].status(), &FileStatus::Pending);

        wizard.add_files([pdf("b.docx")]).unwrap();
        assert_eq!(wizard.validation_errors().len(), 2);
        assert!(wizard.validation_errors().contains_key("slides.pptx"));

        let id = wizard.files()[0].id();
        assert!(wizard.remove_file(id).unwrap());
        assert!(!wizard.remove_file(id).unwrap());
        assert_eq!(wizard.files().len(), 1);
    }

    #[tokio::test]
    async fn operations_rejected_in_wrong_phase() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend);

        assert!(matches!(
            wizard.save(&SilentProgress).await,
            Err(AdaptError::InvalidTransition { .. })
        ));
        assert!(wizard.regenerate(&SilentProgress).await.is_err());
        assert!(wizard.editor_mut().is_err());

        wizard.submit(&SilentProgress).await.unwrap();
        assert!(wizard.submit(&SilentProgress).await.is_err());
        assert!(wizard.set_title("Other").is_err());
        assert!(wizard.add_files([pdf("late.pdf")]).is_err());
        assert_eq!(wizard.title(), "Onboarding");
    }

    #[tokio::test]
    async fn new_attempt_resets_files_and_mints_new_draft() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();
        let first = backend.last_parse().unwrap();

        wizard.close().unwrap();
        assert_eq!(wizard.phase(), Phase::Form);
        assert!(wizard.files().is_empty());
        assert!(wizard.title().is_empty());

        wizard.set_title("Again").unwrap();
        wizard.add_files([pdf("handbook.pdf")]).unwrap();
        wizard.submit(&SilentProgress).await.unwrap();
        let second = backend.last_parse().unwrap();
        assert_ne!(first.draft_course_id, second.draft_course_id);
        assert_ne!(first.files[0].remote_key, second.files[0].remote_key);
    }

    #[tokio::test]
    async fn cancel_during_regenerate_resets_to_form() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("x".repeat(500), sample_questions(2)));
        let mut wizard = ready_form(storage, backend.clone());
        wizard.submit(&SilentProgress).await.unwrap();

        backend.cancel_on_generate(wizard.cancel_token());
        let outcome = wizard.regenerate(&SilentProgress).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Cancelled);
        assert_eq!(wizard.phase(), Phase::Form);
        assert!(wizard.draft().is_none());
        assert!(wizard.editor().is_none());
    }

    #[tokio::test]
    async fn dismiss_error_clears_message() {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(FakeBackend::new("tiny", sample_questions(1)));
        let mut wizard = ready_form(storage, backend);
        assert!(wizard.submit(&SilentProgress).await.is_err());
        assert!(wizard.last_error().is_some());
        wizard.dismiss_error();
        assert!(wizard.last_error().is_none());
    }
}
