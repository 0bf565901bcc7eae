use crate::{
    backend::ComposerBackend,
    plan::CompositionPlanDocument,
    render::{self, RenderError},
    types::{
        AudioResult, PlanRequest, PromptRequest, PromptResponse, PromptResult, RenderProgress,
        RenderResponse, RenderResultData,
    },
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// URL layout of the composition backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let raw = base_url.map(str::trim).filter(|url| !url.is_empty()).unwrap_or(DEFAULT_BASE_URL);
        let mut base = Url::parse(raw).with_context(|| format!("invalid backend base URL {raw}"))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("backend base URL must be http or https, got {}", base.scheme());
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base.join(path).with_context(|| format!("failed to build URL for {path}"))
    }

    pub fn prompt(&self) -> Result<Url> {
        self.join("prompt")
    }

    pub fn plan(&self) -> Result<Url> {
        self.join("plan")
    }

    pub fn render(&self) -> Result<Url> {
        self.join("render")
    }

    /// `ws://` or `wss://` twin of `{base}/render/ws`.
    pub fn render_socket(&self) -> Result<Url> {
        let mut url = self.join("render/ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| anyhow!("cannot derive websocket URL from {url}"))?;
        Ok(url)
    }

    pub fn stream(&self, filename: &str) -> String {
        self.resolve(&format!("/render/stream/{filename}"))
    }

    pub fn download(&self, filename: &str) -> String {
        self.resolve(&format!("/render/download/{filename}"))
    }

    /// Server paths are relative to the base; absolute URLs pass through.
    pub fn resolve(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            return path_or_url.to_string();
        }
        let base = self.base.as_str().trim_end_matches('/');
        let path = path_or_url.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub fn audio_from_result(&self, data: &RenderResultData) -> AudioResult {
        let audio_url = match data.stream_url.as_deref() {
            Some(url) if !url.is_empty() => self.resolve(url),
            _ => self.stream(&data.filename),
        };
        let download_url = match data.download_url.as_deref() {
            Some(url) if !url.is_empty() => self.resolve(url),
            _ => self.download(&data.filename),
        };
        AudioResult {
            audio_url,
            download_url,
            filename: data.filename.clone(),
            mime_type: data.content_type.clone(),
            file_size_bytes: data.file_size_bytes,
        }
    }

    pub fn audio_from_response(&self, response: &RenderResponse) -> AudioResult {
        AudioResult {
            audio_url: self.stream(&response.filename),
            download_url: self.download(&response.filename),
            filename: response.filename.clone(),
            mime_type: response.content_type.clone(),
            file_size_bytes: response.file_size_bytes,
        }
    }
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl Client {
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let endpoints = Endpoints::new(base_url)?;
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn base_url(&self) -> &Url {
        self.endpoints.base()
    }

    pub async fn generate_prompt(&self, request: &PromptRequest) -> Result<PromptResult> {
        let url = self.endpoints.prompt()?;
        debug!("POST {url}");
        let response =
            self.http.post(url).json(request).send().await.context("prompt request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(status_error("generate prompt", status, &body));
        }
        let body: PromptResponse =
            response.json().await.context("failed to decode prompt response")?;
        info!("prompt generated: {}", body.title);
        Ok(body.into())
    }

    /// Returns the raw plan value; callers normalize it.
    pub async fn generate_plan(&self, prompt: &str) -> Result<Value> {
        let url = self.endpoints.plan()?;
        debug!("POST {url}");
        let request = PlanRequest { prompt: prompt.to_string() };
        let response =
            self.http.post(url).json(&request).send().await.context("plan request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(status_error("generate plan", status, &body));
        }
        response.json().await.context("failed to decode plan response")
    }

    pub async fn render(&self, document: &CompositionPlanDocument) -> Result<AudioResult> {
        let url = self.endpoints.render()?;
        debug!("POST {url}");
        let response = self
            .http
            .post(url)
            .json(document.render_core())
            .send()
            .await
            .context("render request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(render_error_message(status, &body));
        }
        let body: RenderResponse =
            response.json().await.context("failed to decode render response")?;
        info!("rendered {} ({} bytes)", body.filename, body.file_size_bytes);
        Ok(self.endpoints.audio_from_response(&body))
    }

    pub async fn download(&self, audio: &AudioResult, dir: &Path) -> Result<PathBuf> {
        let target = dir.join(local_file_name(&audio.filename));
        let response = self
            .http
            .get(&audio.download_url)
            .send()
            .await
            .with_context(|| format!("download of {} failed", audio.filename))?;
        let status = response.status();
        if !status.is_success() {
            bail!("download of {} failed with status {status}", audio.filename);
        }
        let bytes = response.bytes().await.context("failed to read audio body")?;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;
        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        info!("saved {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }
}

#[async_trait]
impl ComposerBackend for Client {
    async fn generate_prompt(&self, request: &PromptRequest) -> Result<PromptResult> {
        Client::generate_prompt(self, request).await
    }

    async fn generate_plan(&self, prompt: &str) -> Result<Value> {
        Client::generate_plan(self, prompt).await
    }

    async fn render(&self, document: &CompositionPlanDocument) -> Result<AudioResult> {
        Client::render(self, document).await
    }

    async fn render_streaming(
        &self,
        document: &CompositionPlanDocument,
        title: Option<String>,
        on_progress: &mut (dyn for<'p> FnMut(&'p RenderProgress) + Send),
    ) -> Result<AudioResult, RenderError> {
        render::render_over_websocket(&self.endpoints, document.clone(), title, on_progress).await
    }

    async fn fetch_audio(&self, audio: &AudioResult, dir: &Path) -> Result<PathBuf> {
        self.download(audio, dir).await
    }
}

fn status_error(action: &str, status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("failed to {action}: {status}")
    } else {
        format!("failed to {action}: {status} - {body}")
    }
}

/// Prefers the backend's `detail` field, then the raw body.
fn render_error_message(status: StatusCode, body: &str) -> String {
    let fallback = format!("failed to create music: {status}");
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => match parsed.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => fallback,
            Some(other) => other.to_string(),
        },
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => fallback,
    }
}

/// Keeps only the final path component of a server-supplied name.
pub fn local_file_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "composition.mp3".to_string())
}
