//! In-memory collaborators for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use adapt_shared::{
    AdaptError, CorrectIndex, CourseBackend, CourseManifest, ExtractedStats, FinalizeRequest,
    FinalizeResponse, GenerateRequest, ObjectStorage, OverallStatus, ParseRequest, ParseResponse,
    Question, QuestionKind, Result, StorageError,
};

use crate::phase::Phase;
use crate::pipeline::{FinalizedCourse, ProgressReporter};
use crate::upload::FileEntry;

/// `n` questions alternating quiz / open.
pub fn sample_questions(n: usize) -> Vec<Question> {
    (0..n)
        .map(|i| {
            let kind = if i % 2 == 0 {
                QuestionKind::Quiz {
                    quiz_options: ["A".into(), "B".into(), "C".into(), "D".into()],
                    correct_index: CorrectIndex::try_from(i % 4).unwrap(),
                }
            } else {
                QuestionKind::Open {
                    expected_answer: format!("answer {i}"),
                }
            };
            Question {
                id: format!("gen-{i}"),
                prompt: format!("Question {i}?"),
                kind,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Object storage that keeps puts in memory.
///
/// Failures are keyed on the body, so tests give each file distinct bytes.
pub struct MemoryStorage {
    fail_bodies: Vec<Bytes>,
    deny_all: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    put_calls: AtomicUsize,
    successes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    objects: Mutex<Vec<(String, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            fail_bodies: Vec::new(),
            deny_all: false,
            cancel_after: None,
            put_calls: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            objects: Mutex::new(Vec::new()),
        }
    }

    /// Reject puts whose body equals `body` with a 500.
    pub fn fail_on(mut self, body: &str) -> Self {
        self.fail_bodies.push(Bytes::copy_from_slice(body.as_bytes()));
        self
    }

    /// Reject every put as a policy violation.
    pub fn deny_all(mut self) -> Self {
        self.deny_all = true;
        self
    }

    /// Cancel `token` once `n` puts have succeeded.
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn successful_puts(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Stored `(path, content_type)` pairs in completion order.
    pub fn objects(&self) -> Vec<(String, String)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket(&self) -> &str {
        "courses"
    }

    async fn put(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> std::result::Result<(), StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.deny_all {
            return Err(StorageError::PolicyDenied {
                message: "new row violates row-level security policy".into(),
            });
        }
        if self.fail_bodies.contains(&body) {
            return Err(StorageError::Rejected {
                status: 500,
                message: "internal error".into(),
            });
        }

        self.objects
            .lock()
            .unwrap()
            .push((path.to_string(), content_type.to_string()));
        let done = self.successes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if done >= *n {
                token.cancel();
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Course backend returning canned text and questions.
pub struct FakeBackend {
    text: String,
    questions: Mutex<Vec<Question>>,
    fail_generate: AtomicBool,
    fail_finalize: AtomicBool,
    fail_fetch: AtomicBool,
    cancel_on_parse: Mutex<Option<CancellationToken>>,
    cancel_on_generate: Mutex<Option<CancellationToken>>,
    parse_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    finalize_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    last_parse: Mutex<Option<ParseRequest>>,
    last_generate: Mutex<Option<GenerateRequest>>,
    last_finalize: Mutex<Option<FinalizeRequest>>,
}

impl FakeBackend {
    pub fn new(text: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            text: text.into(),
            questions: Mutex::new(questions),
            fail_generate: AtomicBool::new(false),
            fail_finalize: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            cancel_on_parse: Mutex::new(None),
            cancel_on_generate: Mutex::new(None),
            parse_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            finalize_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            last_parse: Mutex::new(None),
            last_generate: Mutex::new(None),
            last_finalize: Mutex::new(None),
        }
    }

    pub fn set_questions(&self, questions: Vec<Question>) {
        *self.questions.lock().unwrap() = questions;
    }

    pub fn fail_generate(&self, fail: bool) {
        self.fail_generate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_finalize(&self, fail: bool) {
        self.fail_finalize.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Cancel `token` from inside the next parse call.
    pub fn cancel_on_parse(&self, token: CancellationToken) {
        *self.cancel_on_parse.lock().unwrap() = Some(token);
    }

    /// Cancel `token` from inside the next generate call.
    pub fn cancel_on_generate(&self, token: CancellationToken) {
        *self.cancel_on_generate.lock().unwrap() = Some(token);
    }

    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn last_parse(&self) -> Option<ParseRequest> {
        self.last_parse.lock().unwrap().clone()
    }

    pub fn last_generate(&self) -> Option<GenerateRequest> {
        self.last_generate.lock().unwrap().clone()
    }

    pub fn last_finalize(&self) -> Option<FinalizeRequest> {
        self.last_finalize.lock().unwrap().clone()
    }
}

#[async_trait]
impl CourseBackend for FakeBackend {
    async fn parse(&self, request: &ParseRequest) -> Result<ParseResponse> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_parse.lock().unwrap() = Some(request.clone());

        let token = self.cancel_on_parse.lock().unwrap().take();
        if let Some(token) = token {
            token.cancel();
            tokio::task::yield_now().await;
        }
        Ok(ParseResponse {
            manifest: Vec::new(),
            extracted_text: self.text.clone(),
            extracted_stats: ExtractedStats {
                chars: self.text.chars().count(),
                files_count: request.files.len(),
                truncated: false,
            },
        })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<Question>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_generate.lock().unwrap() = Some(request.clone());

        let token = self.cancel_on_generate.lock().unwrap().take();
        if let Some(token) = token {
            token.cancel();
            tokio::task::yield_now().await;
        }
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(AdaptError::Network("model unavailable".into()));
        }
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeResponse> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_finalize.lock().unwrap() = Some(request.clone());
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(AdaptError::Network("database unavailable".into()));
        }
        Ok(FinalizeResponse {
            course_id: request.draft_course_id.to_string(),
            course_code: "JOIN-42".into(),
        })
    }

    async fn fetch_course(&self, course_id: &str) -> Result<CourseManifest> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(AdaptError::Network("fetch down".into()));
        }
        let saved = self.last_finalize();
        let (title, size, questions) = match saved {
            Some(r) => (r.title, r.size, Some(r.questions)),
            None => (String::new(), Default::default(), None),
        };
        Ok(CourseManifest {
            course_id: course_id.to_string(),
            title,
            size,
            created_at: Utc::now(),
            overall_status: OverallStatus::Ready,
            text_bytes: self.text.len() as u64,
            invite_code: "JOIN-42".into(),
            employees_count: 0,
            files: Vec::new(),
            quiz_count: questions
                .as_ref()
                .map(|q| q.iter().filter(|q| q.is_quiz()).count()),
            open_count: questions
                .as_ref()
                .map(|q| q.iter().filter(|q| !q.is_quiz()).count()),
            questions,
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingProgress
// ---------------------------------------------------------------------------

/// Progress reporter that remembers what it was told.
#[derive(Default)]
pub struct RecordingProgress {
    phases: Mutex<Vec<Phase>>,
    started: Mutex<Vec<(String, usize, usize)>>,
    finished: AtomicUsize,
    completed: AtomicUsize,
}

impl RecordingProgress {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().unwrap().clone()
    }

    pub fn files_started(&self) -> Vec<(String, usize, usize)> {
        self.started.lock().unwrap().clone()
    }

    pub fn files_finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for RecordingProgress {
    fn phase(&self, phase: &Phase) {
        self.phases.lock().unwrap().push(*phase);
    }

    fn file_started(&self, name: &str, current: usize, total: usize) {
        self.started
            .lock()
            .unwrap()
            .push((name.to_string(), current, total));
    }

    fn file_finished(&self, _entry: &FileEntry) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self, _course: &FinalizedCourse) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}
