//! Inference gateway boundary.
//!
//! The language/vision model is an external collaborator consumed through
//! a narrow request/response contract; [`gateway`] defines the contract
//! and [`http`] implements it against an Ollama-compatible endpoint.

pub mod gateway;
pub mod http;

pub use gateway::{InferenceGateway, InferenceRequest, InferenceResponse, InferenceStatus, Modality};
pub use http::HttpInferenceGateway;
