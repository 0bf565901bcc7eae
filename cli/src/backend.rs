use crate::{
    plan::CompositionPlanDocument,
    render::RenderError,
    types::{AudioResult, PromptRequest, PromptResult, RenderProgress},
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Everything the wizard needs from a composition service.
///
/// Implemented by [`crate::api::Client`] for the real backend and by
/// [`crate::mock::MockBackend`] for offline use.
#[async_trait]
pub trait ComposerBackend: Send + Sync {
    async fn generate_prompt(&self, request: &PromptRequest) -> Result<PromptResult>;

    /// Raw plan in either wire shape.
    async fn generate_plan(&self, prompt: &str) -> Result<Value>;

    async fn render(&self, document: &CompositionPlanDocument) -> Result<AudioResult>;

    /// One streaming render attempt. Progress events are forwarded as they
    /// arrive; there is no retry and no timeout at this layer.
    async fn render_streaming(
        &self,
        document: &CompositionPlanDocument,
        title: Option<String>,
        on_progress: &mut (dyn for<'p> FnMut(&'p RenderProgress) + Send),
    ) -> Result<AudioResult, RenderError>;

    /// Copies the rendered audio into `dir` and returns the local path.
    async fn fetch_audio(&self, audio: &AudioResult, dir: &Path) -> Result<PathBuf>;
}

/// Bounds a streaming render; an expired attempt is dropped, which closes
/// its channel, and reported as failed.
pub async fn render_streaming_with_timeout(
    backend: &dyn ComposerBackend,
    document: &CompositionPlanDocument,
    title: Option<String>,
    timeout: Duration,
    on_progress: &mut (dyn for<'p> FnMut(&'p RenderProgress) + Send),
) -> Result<AudioResult, RenderError> {
    match tokio::time::timeout(timeout, backend.render_streaming(document, title, on_progress))
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(RenderError::TimedOut(timeout)),
    }
}
