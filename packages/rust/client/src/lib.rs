//! HTTP clients for the collaborators of the Adapt course pipeline.
//!
//! - [`HttpObjectStorage`] uploads course documents to object storage.
//! - [`HttpCourseBackend`] calls the course API to parse, generate,
//!   finalize and fetch courses.
//!
//! Both implement the traits from `adapt-shared`, so the pipeline never
//! sees reqwest directly.

mod api;
mod http;
mod storage;

pub use api::HttpCourseBackend;
pub use storage::HttpObjectStorage;
