//! HTTP client for the chat service
//!
//! Request/response endpoints (login, register, health, one-shot chat) live
//! in [`ApiClient`]; streaming completions are opened through the
//! [`ChunkedTransport`] and [`SseTransport`] implementations of
//! `chatbot_core::ChatTransport`.

pub mod api;
pub mod auth;
pub mod decode;
pub mod error;
pub mod transport;

pub use api::{ApiClient, HealthResponse, RegisterResponse, TokenResponse};
pub use auth::{sign_in, sign_out, sign_up};
pub use error::{ClientError, ClientResult};
pub use transport::{build_transport, ChunkedTransport, SseTransport};
