//! Browser backend capability
//!
//! The engine never talks to a browser directly. Everything it needs is the
//! capability set below:
//! - `navigate` - load a URL
//! - `query_element` - count/lookup matches for one locator strategy
//! - `click` / `fill` / `text` - act on a resolved handle
//! - `probe` - evaluate a wait condition once (polling lives in the engine)
//! - `screenshot` - capture evidence
//!
//! `playwright` provides the production implementation over JSON-RPC.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflow::Strategy;

pub mod playwright;
pub mod rpc;

pub use playwright::PlaywrightBridge;

/// Identifier of a captured evidence artifact (screenshot path, bundle id)
pub type EvidenceHandle = String;

/// Opaque handle to one live element on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of querying the page with a single strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    None,
    One(ElementHandle),
    Many(usize),
}

/// A condition the engine can wait on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    Visible(ElementHandle),
    Hidden(ElementHandle),
    NavigationComplete,
    UrlContains(String),
}

/// Classification of backend failures, used by the retry policy's
/// transient-error table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    Timeout,
    Blocked,
    Stale,
    NotInteractable,
    Navigation,
    Disconnected,
    Protocol,
    Startup,
    Unsupported,
}

/// Errors raised by a browser backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to start backend: {0}")]
    StartupFailed(String),

    #[error("Backend disconnected")]
    Disconnected,

    #[error("Backend operation timed out: {0}")]
    Timeout(String),

    #[error("Action blocked: {0}")]
    Blocked(String),

    #[error("Element handle is stale: {0}")]
    Stale(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Backend error: {0}")]
    ServerError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl BackendError {
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::StartupFailed(_) => BackendErrorKind::Startup,
            BackendError::Disconnected | BackendError::IoError(_) => BackendErrorKind::Disconnected,
            BackendError::Timeout(_) => BackendErrorKind::Timeout,
            BackendError::Blocked(_) => BackendErrorKind::Blocked,
            BackendError::Stale(_) => BackendErrorKind::Stale,
            BackendError::NotInteractable(_) => BackendErrorKind::NotInteractable,
            BackendError::Navigation(_) => BackendErrorKind::Navigation,
            BackendError::ServerError(_) | BackendError::SerializationError(_) => {
                BackendErrorKind::Protocol
            }
            BackendError::Unsupported(_) => BackendErrorKind::Unsupported,
        }
    }
}

/// The capability set the engine consumes from a browser-automation backend.
///
/// One backend instance is owned by exactly one executor for the duration of
/// a run, hence `&mut self` everywhere.
#[async_trait]
pub trait BrowserBackend: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BackendError>;

    async fn query_element(&mut self, strategy: &Strategy) -> Result<QueryOutcome, BackendError>;

    async fn is_interactable(&mut self, handle: &ElementHandle) -> Result<bool, BackendError>;

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), BackendError>;

    async fn fill(&mut self, handle: &ElementHandle, text: &str) -> Result<(), BackendError>;

    async fn text(&mut self, handle: &ElementHandle) -> Result<String, BackendError>;

    async fn current_url(&mut self) -> Result<String, BackendError>;

    /// Evaluate a wait condition exactly once
    async fn probe(&mut self, condition: &WaitCondition) -> Result<bool, BackendError>;

    async fn screenshot(&mut self) -> Result<EvidenceHandle, BackendError>;

    async fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
