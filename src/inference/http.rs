//! HTTP implementation of the inference gateway.
//!
//! Targets an Ollama-compatible `/api/chat` endpoint with structured
//! output: the request carries a JSON schema in the `format` field and
//! temperature 0, and the reply's message content is parsed back into a
//! structured value.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::InferenceConfig;
use crate::inference::gateway::{
    InferenceGateway, InferenceRequest, InferenceResponse, Modality,
};
use crate::{AppError, Result};

/// JSON schema the model is asked to emit for an assessment.
fn assessment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "severity_score": { "type": "integer" },
            "risk_indicators": {
                "type": "array",
                "items": { "type": "string" }
            },
            "narrative": { "type": "string" }
        },
        "required": ["severity_score", "risk_indicators", "narrative"]
    })
}

/// Chat reply shape of the Ollama-compatible endpoint.
#[derive(Debug, Deserialize)]
struct ChatReply {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// Reqwest-backed gateway against a configured model endpoint.
pub struct HttpInferenceGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpInferenceGateway {
    /// Build a gateway from the inference configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
        })
    }

    fn build_body(&self, request: &InferenceRequest) -> Value {
        let user_message = match request.modality {
            Modality::Text => json!({
                "role": "user",
                "content": request.payload,
            }),
            Modality::Image => json!({
                "role": "user",
                "content": "Analyze the attached image in the context of the assessment.",
                "images": [request.payload],
            }),
        };

        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.context },
                user_message,
            ],
            "stream": false,
            "format": assessment_schema(),
            "options": { "temperature": 0 },
        })
    }
}

#[async_trait]
impl InferenceGateway for HttpInferenceGateway {
    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let url = format!("{}/api/chat", self.endpoint);
        let body = self.build_body(request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Inference(format!("engine unreachable: {err}")))?;

        let http_status = response.status();
        if !http_status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            debug!(%http_status, "inference engine returned failure status");
            return Ok(InferenceResponse::error(format!(
                "engine status {http_status}: {detail}"
            )));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|err| AppError::Inference(format!("unreadable engine reply: {err}")))?;

        match serde_json::from_str::<Value>(&reply.message.content) {
            Ok(structured) => Ok(InferenceResponse::ok(structured)),
            Err(err) => Ok(InferenceResponse::malformed(format!(
                "content is not valid JSON: {err}"
            ))),
        }
    }
}
