//! Wizard state container.
//!
//! All mutation goes through named operations so that step gating and the
//! plan text/structure sync are enforced in one place.

use crate::{
    plan::{
        normalize, CompositionPlanDocument, PlanEditError, PlanEditor, PlanParseError,
    },
    selections::{
        DeliveryAndControl, ProjectBlueprint, RecommendedCombo, Selections, SoundProfile,
    },
    types::{AudioResult, PromptRequest, PromptResult, RenderProgress},
};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardStep {
    #[default]
    Configure,
    Story,
    Compose,
    Listen,
}

impl WizardStep {
    pub const ALL: [Self; 4] = [Self::Configure, Self::Story, Self::Compose, Self::Listen];

    pub fn index(&self) -> usize {
        match self {
            Self::Configure => 0,
            Self::Story => 1,
            Self::Compose => 2,
            Self::Listen => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Configure => "Configure",
            Self::Story => "Story",
            Self::Compose => "Compose",
            Self::Listen => "Listen",
        }
    }

    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<Self> {
        self.index().checked_sub(1).map(|index| Self::ALL[index])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorMode {
    #[default]
    Visual,
    Json,
}

impl EditorMode {
    pub fn toggled(&self) -> Self {
        match self {
            Self::Visual => Self::Json,
            Self::Json => Self::Visual,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Visual => "Visual",
            Self::Json => "JSON",
        }
    }
}

/// Async operations the wizard can have in flight. At most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Prompt,
    Plan,
    Render,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prompt => "prompt generation",
            Self::Plan => "plan generation",
            Self::Render => "render",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("choose a {} first", .0.join(", "))]
    SelectionsIncomplete(Vec<&'static str>),
    #[error("the composition plan is missing or invalid")]
    PlanInvalid,
    #[error("render the current plan before moving on")]
    AudioMissing,
    #[error("already at the first step")]
    AtStart,
    #[error("already at the last step; reset to start over")]
    AtEnd,
    #[error("{0} is already in progress")]
    Busy(Operation),
    #[error("write or generate a prompt first")]
    EmptyPrompt,
    #[error(transparent)]
    Parse(#[from] PlanParseError),
    #[error(transparent)]
    Edit(#[from] PlanEditError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderedAudio {
    result: AudioResult,
    plan_revision: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Wizard {
    step: WizardStep,
    selections: Selections,
    narrative: String,
    prompt: String,
    prompt_title: Option<String>,
    prompt_description: Option<String>,
    plan: PlanEditor,
    editor_mode: EditorMode,
    audio: Option<RenderedAudio>,
    render_progress: Option<RenderProgress>,
    pending: Option<Operation>,
    render_revision: Option<u64>,
}

impl Wizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn prompt_description(&self) -> Option<&str> {
        self.prompt_description.as_deref()
    }

    pub fn plan(&self) -> &PlanEditor {
        &self.plan
    }

    pub fn document(&self) -> Option<&CompositionPlanDocument> {
        self.plan.document()
    }

    pub fn editor_mode(&self) -> EditorMode {
        self.editor_mode
    }

    pub fn audio(&self) -> Option<&AudioResult> {
        self.audio.as_ref().map(|audio| &audio.result)
    }

    pub fn render_progress(&self) -> Option<&RenderProgress> {
        self.render_progress.as_ref()
    }

    pub fn pending(&self) -> Option<Operation> {
        self.pending
    }

    /// Prompt title first, then whatever the plan carries.
    pub fn title(&self) -> Option<&str> {
        self.prompt_title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .or_else(|| self.plan.document().and_then(CompositionPlanDocument::title))
    }

    /// Audio exists and was rendered from the plan as it is now.
    pub fn has_fresh_audio(&self) -> bool {
        self.audio.as_ref().map(|audio| audio.plan_revision == self.plan.revision()).unwrap_or(false)
    }

    pub fn can_advance(&self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Configure => {
                if self.selections.is_complete() {
                    Ok(())
                } else {
                    Err(WizardError::SelectionsIncomplete(self.selections.missing()))
                }
            }
            WizardStep::Story => Ok(()),
            WizardStep::Compose => {
                if !self.plan.is_valid() {
                    Err(WizardError::PlanInvalid)
                } else if !self.has_fresh_audio() {
                    Err(WizardError::AudioMissing)
                } else {
                    Ok(())
                }
            }
            WizardStep::Listen => Err(WizardError::AtEnd),
        }
    }

    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        self.can_advance()?;
        let next = self.step.next().ok_or(WizardError::AtEnd)?;
        info!("wizard: {} -> {}", self.step.label(), next.label());
        self.step = next;
        Ok(next)
    }

    pub fn retreat(&mut self) -> Result<WizardStep, WizardError> {
        let previous = self.step.previous().ok_or(WizardError::AtStart)?;
        info!("wizard: {} <- {}", previous.label(), self.step.label());
        self.step = previous;
        Ok(previous)
    }

    /// Back to Configure with every field at its initial value.
    pub fn reset(&mut self) {
        info!("wizard reset");
        *self = Self::default();
    }

    pub fn set_blueprint(&mut self, blueprint: Option<ProjectBlueprint>) {
        self.selections.project_blueprint = blueprint;
    }

    pub fn set_sound_profile(&mut self, sound: Option<SoundProfile>) {
        self.selections.sound_profile = sound;
    }

    pub fn set_delivery(&mut self, delivery: Option<DeliveryAndControl>) {
        self.selections.delivery_and_control = delivery;
    }

    pub fn set_instrumental(&mut self, instrumental: bool) {
        self.selections.instrumental_only = instrumental;
    }

    pub fn apply_combo(&mut self, combo: &RecommendedCombo) {
        debug!("applying recommended combination {}", combo.use_case);
        self.selections.project_blueprint = Some(combo.blueprint);
        self.selections.sound_profile = Some(combo.sound);
        self.selections.delivery_and_control = Some(combo.delivery);
    }

    pub fn set_narrative(&mut self, narrative: impl Into<String>) {
        self.narrative = narrative.into();
    }

    pub fn prompt_request(&self) -> PromptRequest {
        PromptRequest::new(&self.selections, &self.narrative)
    }

    /// Hand edit of the prompt text; the generated title is kept.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn accept_prompt(&mut self, result: PromptResult) {
        let blank_to_none = |value: String| (!value.trim().is_empty()).then_some(value);
        self.prompt = result.prompt;
        self.prompt_title = blank_to_none(result.title);
        self.prompt_description = blank_to_none(result.description);
    }

    /// Normalizes a freshly generated plan and loads it into the editor.
    /// The prompt's title wins over the plan's own; its description only
    /// fills a gap.
    pub fn ingest_plan(&mut self, raw: Value) -> Result<(), WizardError> {
        let mut document = normalize(raw)?;
        if let Some(title) = self.prompt_title.as_deref() {
            document = document.with_title(title);
        }
        if document.description().is_none() {
            if let Some(description) = self.prompt_description.as_deref() {
                document = document.with_description(description);
            }
        }
        info!("plan loaded with {} sections", document.sections().len());
        self.plan.load(document)?;
        Ok(())
    }

    pub fn edit_plan_text(&mut self, text: impl Into<String>) -> Result<(), WizardError> {
        self.plan.parse(text)?;
        Ok(())
    }

    pub fn apply_plan<F>(&mut self, mutator: F) -> Result<(), WizardError>
    where
        F: FnOnce(CompositionPlanDocument) -> CompositionPlanDocument,
    {
        self.plan.apply(mutator)?;
        Ok(())
    }

    pub fn try_apply_plan<F>(&mut self, mutator: F) -> Result<(), WizardError>
    where
        F: FnOnce(CompositionPlanDocument) -> Result<CompositionPlanDocument, PlanEditError>,
    {
        self.plan.try_apply(mutator)?;
        Ok(())
    }

    pub fn format_plan(&mut self) -> Result<(), WizardError> {
        self.plan.format()?;
        Ok(())
    }

    pub fn toggle_editor_mode(&mut self) -> EditorMode {
        self.editor_mode = self.editor_mode.toggled();
        self.editor_mode
    }

    /// Claims the single in-flight slot for `operation` after checking its
    /// preconditions.
    pub fn begin(&mut self, operation: Operation) -> Result<(), WizardError> {
        if let Some(current) = self.pending {
            return Err(WizardError::Busy(current));
        }
        match operation {
            Operation::Prompt => {}
            Operation::Plan => {
                if self.prompt.trim().is_empty() {
                    return Err(WizardError::EmptyPrompt);
                }
            }
            Operation::Render => {
                if !self.plan.is_valid() {
                    return Err(WizardError::PlanInvalid);
                }
                self.render_progress = None;
                self.render_revision = Some(self.plan.revision());
            }
        }
        debug!("{operation} started");
        self.pending = Some(operation);
        Ok(())
    }

    /// Releases the in-flight slot. Completions for other operations are ignored.
    pub fn finish(&mut self, operation: Operation) {
        if self.pending == Some(operation) {
            debug!("{operation} finished");
            self.pending = None;
        }
    }

    pub fn record_progress(&mut self, progress: RenderProgress) {
        self.render_progress = Some(progress);
    }

    /// Stores a new render, tied to the plan revision captured when the
    /// render began. Edits made while it ran leave the audio stale.
    pub fn accept_render(&mut self, result: AudioResult) {
        info!("render ready: {}", result.filename);
        let plan_revision = self.render_revision.take().unwrap_or_else(|| self.plan.revision());
        self.audio = Some(RenderedAudio { result, plan_revision });
    }

    /// Title sent with a streaming render request.
    pub fn render_title(&self) -> Option<String> {
        self.title().map(str::to_string)
    }
}
