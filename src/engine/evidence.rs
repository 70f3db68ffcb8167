//! Failure evidence hook
//!
//! The executor calls the collector once for every failed step. Collector
//! errors are logged by the executor and never affect the run.

use async_trait::async_trait;

use crate::bridge::{BackendError, BrowserBackend, EvidenceHandle};
use crate::workflow::job::SourceRef;

#[async_trait]
pub trait EvidenceCollector: Send {
    async fn collect(
        &mut self,
        backend: &mut dyn BrowserBackend,
        source: &SourceRef,
        label: &str,
    ) -> Result<Vec<EvidenceHandle>, BackendError>;
}

/// Takes one screenshot per failed step
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenshotCollector;

#[async_trait]
impl EvidenceCollector for ScreenshotCollector {
    async fn collect(
        &mut self,
        backend: &mut dyn BrowserBackend,
        _source: &SourceRef,
        _label: &str,
    ) -> Result<Vec<EvidenceHandle>, BackendError> {
        Ok(vec![backend.screenshot().await?])
    }
}
