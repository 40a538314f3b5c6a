//! Shared wire types and errors for the `frontend` service.

pub mod error;
pub mod protocol;

pub use error::{ProfilerError, TracingError};
