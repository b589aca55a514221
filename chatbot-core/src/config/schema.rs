//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::stream::FlushPolicy;

/// Root configuration for chatbot
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat service endpoint configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Stream reconciliation settings
    #[serde(default)]
    pub stream: StreamConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Wire mechanism used to read streamed completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Raw chunked response body, one fragment per read
    #[default]
    Chunked,
    /// `text/event-stream` response
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Chunked => write!(f, "chunked"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunked" => Ok(TransportKind::Chunked),
            "sse" => Ok(TransportKind::Sse),
            other => Err(format!("unknown transport: {}", other)),
        }
    }
}

/// External chat service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the chat service (no trailing slash required)
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Transport used for `/chat/stream`
    #[serde(default)]
    pub transport: TransportKind,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            transport: TransportKind::default(),
        }
    }
}

/// Stream reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamConfig {
    /// When buffered fragments are flushed into the transcript
    #[serde(default)]
    pub flush: FlushPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "~/.chatbot/logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
