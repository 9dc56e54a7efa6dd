//! Blocking HTTP client for a remote model server.
//!
//! Endpoints:
//! - `POST {dense_endpoint}/api/embeddings`: `{model, prompt}` → `{embedding: number[]}`
//! - `POST {sparse_endpoint}/api/score`: `{model, text}` → `{logits: number[][], attention_mask: number[]}`
//!
//! The client is `reqwest::blocking`: build, use and drop it on blocking
//! worker threads only.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::ModelHostConfig;
use crate::error_handler::{ModelHostError, Result, make_snippet};
use crate::{MlmScores, ModelHost};

/// Model host backed by an HTTP inference server.
pub struct HttpModelHost {
    client: reqwest::blocking::Client,
    cfg: ModelHostConfig,
    url_embeddings: String,
    url_score: String,
}

impl HttpModelHost {
    /// Creates a new host from the given config.
    ///
    /// # Errors
    /// - [`ModelHostError::Config`] if the config is invalid
    /// - [`ModelHostError::Transport`] if the HTTP client cannot be built
    pub fn new(cfg: ModelHostConfig) -> Result<Self> {
        cfg.validate()?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .brotli(true)
            .build()?;

        let url_embeddings = format!(
            "{}/api/embeddings",
            cfg.dense_endpoint.trim().trim_end_matches('/')
        );
        let url_score = format!(
            "{}/api/score",
            cfg.sparse_endpoint.trim().trim_end_matches('/')
        );

        debug!(
            target: "model_host::http",
            dense = %url_embeddings,
            sparse = %url_score,
            "HttpModelHost initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_embeddings,
            url_score,
        })
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, url: &str, body: &B, shape: &str) -> Result<R> {
        debug!(target: "model_host::http", "POST {url}");
        let resp = self.client.post(url).json(body).send()?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(ModelHostError::HttpStatus {
                status,
                url: url.to_string(),
                snippet: make_snippet(&text),
            });
        }

        resp.json::<R>()
            .map_err(|e| ModelHostError::Decode(format!("serde error: {e}; expected `{shape}`")))
    }
}

impl ModelHost for HttpModelHost {
    fn dense_dim(&self) -> usize {
        self.cfg.dense_dim
    }

    #[instrument(skip_all, fields(model = %self.cfg.dense_model))]
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingsRequest {
            model: &self.cfg.dense_model,
            prompt: text,
        };
        let out: EmbeddingsResponse =
            self.post(&self.url_embeddings, &body, "{ embedding: number[] }")?;
        Ok(out.embedding)
    }

    #[instrument(skip_all, fields(model = %self.cfg.sparse_model))]
    fn score(&self, text: &str) -> Result<MlmScores> {
        let body = ScoreRequest {
            model: &self.cfg.sparse_model,
            text,
        };
        let out: ScoreResponse = self.post(
            &self.url_score,
            &body,
            "{ logits: number[][], attention_mask: number[] }",
        )?;
        MlmScores::from_rows(out.logits, out.attention_mask)
    }
}

/* ==========================
HTTP payloads
========================== */

/// Request body for `/api/embeddings`.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response body for `/api/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// Request body for `/api/score`.
#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    model: &'a str,
    text: &'a str,
}

/// Response body for `/api/score`.
#[derive(Debug, Deserialize)]
struct ScoreResponse {
    logits: Vec<Vec<f32>>,
    attention_mask: Vec<u32>,
}
