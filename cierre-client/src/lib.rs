//! Cierre HTTP Client
//!
//! A small, type-safe HTTP client for the closing-management REST backend.
//!
//! The client knows the three endpoint shapes the task tracker depends on:
//! starting an operation (or uploading a file), polling a task's status, and
//! fetching the owning entity with its authoritative `estado`.
//!
//! # Example
//!
//! ```no_run
//! use cierre_client::CierreClient;
//! use cierre_core::domain::job::{JobHandle, JobKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CierreClient::new("http://localhost:8000/api");
//!
//!     let handle = JobHandle::new("abc", JobKind::Verification, "cierres", 12);
//!     let snapshot = client.task_status(&handle).await?;
//!
//!     println!("{} is {}", handle, snapshot.status);
//!     Ok(())
//! }
//! ```

mod entities;
pub mod error;
mod tasks;

pub use error::{ClientError, Result};
pub use tasks::ACCEPTED_EXTENSIONS;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// HTTP client for the closing-management backend
#[derive(Debug, Clone)]
pub struct CierreClient {
    /// Base URL of the API (e.g., "http://localhost:8000/api")
    base_url: String,
    /// Bearer token sent with every request, if any
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl CierreClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the API (e.g., "http://localhost:8000/api")
    ///
    /// # Example
    /// ```
    /// use cierre_client::CierreClient;
    ///
    /// let client = CierreClient::new("http://localhost:8000/api");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use cierre_client::CierreClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = CierreClient::with_client("http://localhost:8000/api", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL of a resource path, always with a trailing slash
    fn url(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url, path.trim_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Non-2xx responses become `ClientError::ApiError`, carrying the backend
    /// message when the body has one.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                backend_message(&error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Extract the human message from an error body
///
/// The backend reports errors as `{"error": ...}`, `{"detail": ...}` or
/// `{"mensaje": ...}`; anything else is returned as-is.
fn backend_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail", "mensaje", "message"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    body.trim().to_string()
}
