//! Offline backend: canned prompt text, keyword-built plans and a synthesized
//! placeholder tone instead of a real render.

use crate::{
    api::local_file_name,
    audio::write_placeholder_wav,
    backend::ComposerBackend,
    plan::CompositionPlanDocument,
    planner::{OfflinePlanner, STORY_MARKER},
    render::RenderError,
    selections::SelectionOption,
    types::{AudioResult, PromptRequest, PromptResult, RenderProgress},
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::time::sleep;
use tracing::info;

const FILE_SCHEME: &str = "file://";
const MOCK_TITLE: &str = "Untitled Song";
const MOCK_DESCRIPTION: &str = "A custom music composition";
const PROGRESS_STAGES: &[(&str, f32, &str)] = &[
    ("connected", 0.0, "Connected to mock renderer"),
    ("composing", 25.0, "Arranging sections"),
    ("rendering", 60.0, "Synthesizing placeholder audio"),
    ("finalizing", 90.0, "Writing file"),
];

pub struct MockBackend {
    planner: OfflinePlanner,
    output_dir: PathBuf,
    latency: Duration,
}

impl MockBackend {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { planner: OfflinePlanner::new(), output_dir: output_dir.into(), latency: Duration::ZERO }
    }

    /// Simulated network latency per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn pause(&self, factor: f32) {
        if !self.latency.is_zero() {
            sleep(self.latency.mul_f32(factor)).await;
        }
    }

    fn write_track(&self, document: &CompositionPlanDocument) -> Result<AudioResult> {
        let filename = format!("{}.wav", slug(document.title().unwrap_or("composition")));
        let path = self.output_dir.join(&filename);
        let size = write_placeholder_wav(&path)?;
        info!("mock render wrote {} ({size} bytes)", path.display());
        let url = format!("{FILE_SCHEME}{}", path.display());
        Ok(AudioResult {
            audio_url: url.clone(),
            download_url: url,
            filename,
            mime_type: "audio/wav".to_string(),
            file_size_bytes: size,
        })
    }
}

/// Prompt text assembled from the selection descriptions.
pub fn mock_prompt(request: &PromptRequest) -> String {
    let blueprint =
        request.project_blueprint.map(|option| option.details()).unwrap_or("a custom music piece");
    let profile =
        request.sound_profile.map(|option| option.details()).unwrap_or("a unique sonic palette");
    let delivery =
        request.delivery_and_control.map(|option| option.details()).unwrap_or("a flexible workflow");
    let instrumental = if request.instrumental_only {
        " The track should be purely instrumental with no vocals."
    } else {
        ""
    };
    let mut prompt = format!(
        "Create {blueprint} featuring {profile}. Use {delivery} for the production.{instrumental}\n\n\
         The composition should have clear sections with distinct energy levels, appropriate \
         transitions, and professional production quality. Focus on creating an engaging musical \
         journey that serves the intended purpose."
    );
    let narrative = request.user_narrative.trim();
    if !narrative.is_empty() {
        prompt.push_str(&format!("\n\n{STORY_MARKER} {narrative}"));
    }
    prompt
}

fn slug(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric() || *c == '-').collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "composition".to_string()
    } else {
        slug
    }
}

#[async_trait]
impl ComposerBackend for MockBackend {
    async fn generate_prompt(&self, request: &PromptRequest) -> Result<PromptResult> {
        self.pause(1.0).await;
        Ok(PromptResult {
            prompt: mock_prompt(request),
            title: MOCK_TITLE.to_string(),
            description: MOCK_DESCRIPTION.to_string(),
        })
    }

    async fn generate_plan(&self, prompt: &str) -> Result<Value> {
        self.pause(1.0).await;
        Ok(self.planner.build_plan(prompt))
    }

    async fn render(&self, document: &CompositionPlanDocument) -> Result<AudioResult> {
        self.pause(1.5).await;
        self.write_track(document)
    }

    async fn render_streaming(
        &self,
        document: &CompositionPlanDocument,
        _title: Option<String>,
        on_progress: &mut (dyn for<'p> FnMut(&'p RenderProgress) + Send),
    ) -> Result<AudioResult, RenderError> {
        for (stage, percent, message) in PROGRESS_STAGES {
            self.pause(0.4).await;
            on_progress(&RenderProgress {
                stage: stage.to_string(),
                percent: *percent,
                message: message.to_string(),
            });
        }
        self.write_track(document).map_err(|err| RenderError::Transport(format!("{err:#}")))
    }

    async fn fetch_audio(&self, audio: &AudioResult, dir: &Path) -> Result<PathBuf> {
        let source = audio
            .download_url
            .strip_prefix(FILE_SCHEME)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("mock audio is not a local file: {}", audio.download_url))?;
        let target = dir.join(local_file_name(&audio.filename));
        if source == target {
            return Ok(target);
        }
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;
        tokio::fs::copy(&source, &target)
            .await
            .with_context(|| format!("failed to copy {} to {}", source.display(), target.display()))?;
        Ok(target)
    }
}
