//! Service configuration.
//!
//! All behaviour is controlled through [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`] or loaded from the environment with
//! [`ServiceConfig::from_env`]. A missing API key is deliberately NOT a
//! construction error: the service must start without one so health checks
//! work, and the segmentation client fails fast at first use instead.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Default Gemini model when GEMINI_MODEL is unset.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for the mcq-vision service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Gemini API key. `None` means segmentation calls fail with
    /// [`AnalysisError::ApiKeyMissing`]; everything else still works.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Gemini model identifier. Default: `gemini-2.0-flash`.
    ///
    /// The model is the only configurable part of the upstream call — the
    /// segmentation prompt is fixed per deployment, not per request.
    pub model: String,

    /// Rendering DPI for PDF rasterisation. Range 72–400, default 200.
    ///
    /// 200 keeps question-number digits crisp enough for the model to
    /// anchor bounding boxes on, without producing oversized uploads.
    pub dpi: u32,

    /// Pixels of padding added around each crop rectangle. Default 10.
    ///
    /// Model boxes tend to hug the text tightly; a small margin keeps
    /// descenders and circled answer marks inside the crop.
    pub crop_padding: u32,

    /// Bind host for the HTTP server. Default `0.0.0.0`.
    pub host: String,

    /// Bind port for the HTTP server. Default 8000.
    pub port: u16,

    /// Allowed CORS origins. Default: localhost:3000 and localhost:5173.
    pub cors_origins: Vec<String>,

    /// Per-Gemini-call timeout in seconds. Default 60.
    pub api_timeout_secs: u64,

    /// Retry attempts on a transient Gemini failure. Default 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default 500.
    pub retry_backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            dpi: 200,
            crop_padding: 10,
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            api_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from the environment.
    ///
    /// Recognised variables: `GEMINI_API_KEY`, `GEMINI_MODEL`, `HOST`,
    /// `PORT`, `CORS_ORIGINS` (comma-separated), `RENDER_DPI`,
    /// `CROP_PADDING`. Unset or unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.is_empty() {
                config.model = model;
            }
        }
        if let Ok(host) = std::env::var("HOST") {
            if !host.is_empty() {
                config.host = host;
            }
        }
        if let Some(port) = parse_env("PORT") {
            config.port = port;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.cors_origins = parsed;
            }
        }
        if let Some(dpi) = parse_env("RENDER_DPI") {
            config.dpi = clamp_dpi(dpi);
        }
        if let Some(padding) = parse_env("CROP_PADDING") {
            config.crop_padding = padding;
        }

        config
    }

    /// Whether a Gemini API key is present.
    pub fn gemini_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn clamp_dpi(dpi: u32) -> u32 {
    dpi.clamp(72, 400)
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = clamp_dpi(dpi);
        self
    }

    pub fn crop_padding(mut self, px: u32) -> Self {
        self.config.crop_padding = px;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors_origins = origins;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, AnalysisError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(AnalysisError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.model.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_expectations() {
        let c = ServiceConfig::default();
        assert_eq!(c.model, "gemini-2.0-flash");
        assert_eq!(c.dpi, 200);
        assert_eq!(c.crop_padding, 10);
        assert_eq!(c.port, 8000);
        assert_eq!(c.cors_origins.len(), 2);
        assert!(!c.gemini_configured());
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ServiceConfig::builder().dpi(1000).build().unwrap();
        assert_eq!(c.dpi, 400);
        let c = ServiceConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = ServiceConfig::builder().model("").build().unwrap_err();
        assert!(err.to_string().contains("Model"));
    }

    #[test]
    fn api_key_marks_configured() {
        let c = ServiceConfig::builder().api_key("test-key").build().unwrap();
        assert!(c.gemini_configured());
    }
}
