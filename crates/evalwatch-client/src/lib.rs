//! Client layer: HTTP transport to the evaluation service and its store.

pub mod http;

pub use http::{ClientConfig, HttpError, HttpEvaluationService};
