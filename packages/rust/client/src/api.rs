//! HTTP implementation of [`CourseBackend`] against the course API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use adapt_shared::{
    AdaptError, CourseBackend, CourseManifest, ExtractedStats, FinalizeRequest,
    FinalizeResponse, GenerateRequest, ManifestFile, ParseRequest, ParseResponse, Question,
    Result,
};

use crate::http::{build_client, read_json};

const PROCESS_PATH: &str = "api/courses/process";
const GENERATE_PATH: &str = "api/training/generate";
const FINALIZE_PATH: &str = "api/courses/finalize";
const COURSES_PATH: &str = "api/courses/";

/// Course API client.
#[derive(Debug, Clone)]
pub struct HttpCourseBackend {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpCourseBackend {
    /// `base_url` is the API origin, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str, access_token: Option<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: parse_base_url(base_url)?,
            access_token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AdaptError::config(format!("invalid API path {path}: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self
            .authorize(self.client.post(url.clone()).json(body))
            .send()
            .await
            .map_err(|e| AdaptError::Network(format!("{url}: {e}")))?;
        read_json(response).await
    }
}

/// Parse a base URL so that relative joins append to its path.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| AdaptError::config(format!("invalid base URL \"{raw}\": {e}")))
}

// ---------------------------------------------------------------------------
// Wire responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessResponse {
    #[serde(default)]
    manifest: ProcessManifest,
    #[serde(default)]
    extracted_text: String,
    #[serde(default)]
    extracted_stats: ExtractedStats,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessManifest {
    #[serde(default)]
    files: Vec<ManifestFile>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
struct CourseResponse {
    manifest: CourseManifest,
}

#[async_trait]
impl CourseBackend for HttpCourseBackend {
    #[instrument(skip_all, fields(draft_id = %request.draft_course_id, files = request.files.len()))]
    async fn parse(&self, request: &ParseRequest) -> Result<ParseResponse> {
        let response: ProcessResponse = self.post(PROCESS_PATH, request).await?;
        Ok(ParseResponse {
            manifest: response.manifest.files,
            extracted_text: response.extracted_text,
            extracted_stats: response.extracted_stats,
        })
    }

    #[instrument(skip_all, fields(draft_id = %request.draft_course_id))]
    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<Question>> {
        let response: GenerateResponse = self.post(GENERATE_PATH, request).await?;
        Ok(response.questions)
    }

    #[instrument(skip_all, fields(draft_id = %request.draft_course_id))]
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeResponse> {
        self.post(FINALIZE_PATH, request).await
    }

    #[instrument(skip(self))]
    async fn fetch_course(&self, course_id: &str) -> Result<CourseManifest> {
        let mut url = self.endpoint(COURSES_PATH)?;
        url.path_segments_mut()
            .map_err(|()| AdaptError::config("API base URL cannot carry a path"))?
            .pop_if_empty()
            .push(course_id);

        debug!(%url, "GET");
        let response = self
            .authorize(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| AdaptError::Network(format!("{url}: {e}")))?;
        let body: CourseResponse = read_json(response).await?;
        Ok(body.manifest)
    }
}
