//! Model host configuration loaded from environment variables.
//!
//! # Environment variables
//!
//! - `MODEL_HOST_URL`      = dense encoder endpoint (default `http://localhost:11434`)
//! - `SPARSE_HOST_URL`     = masked-LM scorer endpoint (default: `MODEL_HOST_URL`)
//! - `DENSE_MODEL`         = dense model id (default `multilingual-e5-small`)
//! - `SPARSE_MODEL`        = sparse model id (default `splade-cocondenser-ensembledistil`)
//! - `EMBEDDING_DIM`       = expected dense dimension (default 384)
//! - `MODEL_TIMEOUT_SECS`  = per-request timeout (default 30)

use crate::error_handler::{ConfigError, Result, env_opt_u64, env_or, validate_http_endpoint};

/// Default dense dimension of the reference encoder.
pub const DEFAULT_DENSE_DIM: usize = 384;

/// Connection and model settings for [`crate::HttpModelHost`].
#[derive(Debug, Clone)]
pub struct ModelHostConfig {
    /// Base URL serving `POST /api/embeddings`.
    pub dense_endpoint: String,
    /// Base URL serving `POST /api/score`.
    pub sparse_endpoint: String,
    /// Dense (sentence) encoder model name.
    pub dense_model: String,
    /// Masked-LM model name used for sparse scoring.
    pub sparse_model: String,
    /// Expected dense vector length.
    pub dense_dim: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ModelHostConfig {
    /// Builds the config from env with defaults, then validates it.
    ///
    /// # Errors
    /// Returns [`ConfigError`] variants for malformed numbers or URLs.
    pub fn from_env() -> Result<Self> {
        let dense_endpoint = env_or("MODEL_HOST_URL", "http://localhost:11434");
        let sparse_endpoint = env_or("SPARSE_HOST_URL", &dense_endpoint);

        let dense_dim = env_opt_u64("EMBEDDING_DIM")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_DENSE_DIM);

        let cfg = Self {
            dense_endpoint,
            sparse_endpoint,
            dense_model: env_or("DENSE_MODEL", "multilingual-e5-small"),
            sparse_model: env_or("SPARSE_MODEL", "splade-cocondenser-ensembledistil"),
            dense_dim,
            timeout_secs: env_opt_u64("MODEL_TIMEOUT_SECS")?.unwrap_or(30),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates endpoints, model names and numeric bounds.
    pub fn validate(&self) -> Result<()> {
        validate_http_endpoint("MODEL_HOST_URL", &self.dense_endpoint)?;
        validate_http_endpoint("SPARSE_HOST_URL", &self.sparse_endpoint)?;
        if self.dense_model.trim().is_empty() || self.sparse_model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        if self.dense_dim == 0 {
            return Err(ConfigError::OutOfRange {
                field: "EMBEDDING_DIM",
                detail: "must be > 0",
            }
            .into());
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "MODEL_TIMEOUT_SECS",
                detail: "must be > 0",
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handler::ModelHostError;

    fn sample() -> ModelHostConfig {
        ModelHostConfig {
            dense_endpoint: "http://localhost:11434".into(),
            sparse_endpoint: "http://localhost:8089".into(),
            dense_model: "multilingual-e5-small".into(),
            sparse_model: "splade-cocondenser-ensembledistil".into(),
            dense_dim: 384,
            timeout_secs: 30,
        }
    }

    #[test]
    fn sample_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_zero_dim_and_empty_model() {
        let mut cfg = sample();
        cfg.dense_dim = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ModelHostError::Config(ConfigError::OutOfRange {
                field: "EMBEDDING_DIM",
                ..
            }))
        ));

        let mut cfg = sample();
        cfg.sparse_model = "  ".into();
        assert!(matches!(
            cfg.validate(),
            Err(ModelHostError::Config(ConfigError::EmptyModel))
        ));
    }

    #[test]
    fn rejects_schemeless_sparse_endpoint() {
        let mut cfg = sample();
        cfg.sparse_endpoint = "localhost:8089".into();
        assert!(cfg.validate().is_err());
    }
}
