use crate::{
    plan::{CompositionPlanDocument, TagList},
    selections::{SelectionOption, RECOMMENDED_COMBINATIONS},
    types::{AudioResult, PromptRequest, PromptResult, RenderProgress},
    wizard::{EditorMode, Operation, Wizard, WizardStep},
};
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use serde_json::Value;
use std::{path::PathBuf, time::Duration};

const MAX_ACTIVITY_ENTRIES: usize = 200;
const MAX_STATUS_LINES: usize = 8;
const DURATION_STEP_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureRow {
    Blueprint,
    Sound,
    Delivery,
    Instrumental,
    Recommended,
}

impl ConfigureRow {
    pub const ALL: [Self; 5] =
        [Self::Blueprint, Self::Sound, Self::Delivery, Self::Instrumental, Self::Recommended];

    fn shifted(&self, forward: bool) -> Self {
        let index = Self::ALL.iter().position(|row| row == self).unwrap_or(0);
        let len = Self::ALL.len();
        let next = if forward { (index + 1) % len } else { (index + len - 1) % len };
        Self::ALL[next]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposePane {
    Prompt,
    Plan,
}

/// Field a one-line input box writes into when committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTarget {
    RenameSection(usize),
    SectionDuration(usize),
    AddTag(TagList),
    AddLine(usize),
    Title,
    Description,
}

impl InputTarget {
    pub fn label(&self) -> String {
        match self {
            Self::RenameSection(_) => "Section name".to_string(),
            Self::SectionDuration(_) => "Duration (ms)".to_string(),
            Self::AddTag(list) => format!("Add to {}", list.label().to_lowercase()),
            Self::AddLine(_) => "Lyric line".to_string(),
            Self::Title => "Title".to_string(),
            Self::Description => "Description".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInput {
    pub target: InputTarget,
    pub buffer: String,
}

/// Text the user edits in `$EDITOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Narrative,
    Prompt,
    Plan,
}

impl EditTarget {
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Plan => ".json",
            Self::Narrative | Self::Prompt => ".txt",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Command(AppCommand),
    EditExternally(EditTarget),
    Quit,
}

#[derive(Debug, Clone, Default)]
pub struct Playback {
    pub saved_path: Option<PathBuf>,
    pub playing: bool,
    pub duration: Option<Duration>,
}

#[derive(Debug)]
pub struct AppState {
    pub wizard: Wizard,
    pub streaming: bool,
    pub configure_row: ConfigureRow,
    pub combo_index: usize,
    pub compose_pane: ComposePane,
    pub selected_section: usize,
    pub input: Option<PendingInput>,
    pub status_lines: Vec<String>,
    pub activity: Vec<ActivityEntry>,
    pub playback: Playback,
}

impl AppState {
    pub fn new(streaming: bool) -> Self {
        Self {
            wizard: Wizard::new(),
            streaming,
            configure_row: ConfigureRow::Blueprint,
            combo_index: 0,
            compose_pane: ComposePane::Prompt,
            selected_section: 0,
            input: None,
            status_lines: Vec::new(),
            activity: Vec::new(),
            playback: Playback::default(),
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Info(message) => self.log(LogLevel::Info, message),
            AppEvent::Error(message) => self.log(LogLevel::Error, message),
            AppEvent::PromptReady(result) => {
                self.wizard.finish(Operation::Prompt);
                let title = result.title.clone();
                self.wizard.accept_prompt(result);
                if title.trim().is_empty() {
                    self.log(LogLevel::Info, "Prompt ready".to_string());
                } else {
                    self.log(LogLevel::Info, format!("Prompt ready: {title}"));
                }
            }
            AppEvent::PlanReady(raw) => {
                self.wizard.finish(Operation::Plan);
                match self.wizard.ingest_plan(raw) {
                    Ok(()) => {
                        self.selected_section = 0;
                        self.compose_pane = ComposePane::Plan;
                        let count = self.wizard.document().map(|doc| doc.sections().len());
                        self.log(
                            LogLevel::Info,
                            format!("Plan ready with {} sections", count.unwrap_or(0)),
                        );
                    }
                    Err(err) => self.log(LogLevel::Error, format!("Plan rejected: {err}")),
                }
            }
            AppEvent::RenderProgress(progress) => self.wizard.record_progress(progress),
            AppEvent::RenderCompleted(audio) => {
                self.wizard.finish(Operation::Render);
                self.log(
                    LogLevel::Info,
                    format!("Music created: {} ({})", audio.filename, audio.size_label()),
                );
                self.wizard.accept_render(audio);
                self.playback = Playback::default();
                if self.wizard.step() == WizardStep::Compose {
                    if self.wizard.has_fresh_audio() {
                        self.advance();
                    } else {
                        self.log(
                            LogLevel::Info,
                            "Plan changed while rendering; render again to continue".to_string(),
                        );
                    }
                }
            }
            AppEvent::Failed { operation, message } => {
                self.wizard.finish(operation);
                self.log(LogLevel::Error, format!("{operation} failed: {message}"));
            }
            AppEvent::AudioSaved(path) => {
                self.log(LogLevel::Info, format!("Saved to {}", path.display()));
                self.playback.saved_path = Some(path);
            }
            AppEvent::PlaybackStarted { path, duration } => {
                self.playback.saved_path = Some(path);
                self.playback.playing = true;
                self.playback.duration = duration;
            }
            AppEvent::PlaybackStopped => self.playback.playing = false,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }
        if self.input.is_some() {
            self.handle_input_key(key);
            return None;
        }
        if ctrl {
            match key.code {
                KeyCode::Char('n') => {
                    self.advance();
                    return None;
                }
                KeyCode::Char('p') => {
                    self.retreat();
                    return None;
                }
                _ => {}
            }
        }
        match self.wizard.step() {
            WizardStep::Configure => self.handle_configure_key(key),
            WizardStep::Story => self.handle_story_key(key, ctrl),
            WizardStep::Compose => self.handle_compose_key(key, ctrl),
            WizardStep::Listen => self.handle_listen_key(key),
        }
    }

    pub fn apply_external_edit(&mut self, target: EditTarget, text: String) {
        match target {
            EditTarget::Narrative => self.wizard.set_narrative(text.trim_end()),
            EditTarget::Prompt => self.wizard.set_prompt(text.trim_end()),
            EditTarget::Plan => {
                if let Err(err) = self.wizard.edit_plan_text(text) {
                    self.log(LogLevel::Error, format!("Plan text not applied: {err}"));
                }
            }
        }
    }

    pub fn external_text(&self, target: EditTarget) -> String {
        match target {
            EditTarget::Narrative => self.wizard.narrative().to_string(),
            EditTarget::Prompt => self.wizard.prompt().to_string(),
            EditTarget::Plan => self.wizard.plan().text().to_string(),
        }
    }

    pub fn log(&mut self, level: LogLevel, message: String) {
        let line = match level {
            LogLevel::Info => message.clone(),
            LogLevel::Error => format!("Error: {message}"),
        };
        self.push_status_line(line);
        self.activity.push(ActivityEntry { level, message, timestamp: Utc::now() });
        if self.activity.len() > MAX_ACTIVITY_ENTRIES {
            let overflow = self.activity.len() - MAX_ACTIVITY_ENTRIES;
            self.activity.drain(0..overflow);
        }
    }

    pub fn push_status_line(&mut self, line: String) {
        self.status_lines.push(line);
        if self.status_lines.len() > MAX_STATUS_LINES {
            let overflow = self.status_lines.len() - MAX_STATUS_LINES;
            self.status_lines.drain(0..overflow);
        }
    }

    fn advance(&mut self) {
        match self.wizard.advance() {
            Ok(step) => self.push_status_line(format!("Step {}: {}", step.index() + 1, step.label())),
            Err(err) => self.log(LogLevel::Error, err.to_string()),
        }
    }

    fn retreat(&mut self) {
        match self.wizard.retreat() {
            Ok(step) => self.push_status_line(format!("Step {}: {}", step.index() + 1, step.label())),
            Err(err) => self.log(LogLevel::Error, err.to_string()),
        }
    }

    fn reset(&mut self) -> Option<Action> {
        let was_playing = self.playback.playing;
        self.wizard.reset();
        self.configure_row = ConfigureRow::Blueprint;
        self.compose_pane = ComposePane::Prompt;
        self.selected_section = 0;
        self.playback = Playback::default();
        self.log(LogLevel::Info, "Started over".to_string());
        was_playing.then_some(Action::Command(AppCommand::StopPlayback))
    }

    fn handle_configure_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Some(Action::Quit),
            KeyCode::Up => self.configure_row = self.configure_row.shifted(false),
            KeyCode::Down | KeyCode::Tab => self.configure_row = self.configure_row.shifted(true),
            KeyCode::Left => self.cycle_configure_row(false),
            KeyCode::Right => self.cycle_configure_row(true),
            KeyCode::Char(' ') if self.configure_row == ConfigureRow::Instrumental => {
                let instrumental = !self.wizard.selections().instrumental_only;
                self.wizard.set_instrumental(instrumental);
            }
            KeyCode::Enter if self.configure_row == ConfigureRow::Recommended => {
                if let Some(combo) = RECOMMENDED_COMBINATIONS.get(self.combo_index) {
                    self.wizard.apply_combo(combo);
                    self.log(LogLevel::Info, format!("Applied preset: {}", combo.use_case));
                }
            }
            KeyCode::Enter => self.advance(),
            _ => {}
        }
        None
    }

    fn cycle_configure_row(&mut self, forward: bool) {
        let selections = self.wizard.selections().clone();
        match self.configure_row {
            ConfigureRow::Blueprint => {
                self.wizard.set_blueprint(cycle(selections.project_blueprint, forward))
            }
            ConfigureRow::Sound => self.wizard.set_sound_profile(cycle(selections.sound_profile, forward)),
            ConfigureRow::Delivery => {
                self.wizard.set_delivery(cycle(selections.delivery_and_control, forward))
            }
            ConfigureRow::Instrumental => self.wizard.set_instrumental(!selections.instrumental_only),
            ConfigureRow::Recommended => {
                let len = RECOMMENDED_COMBINATIONS.len();
                self.combo_index =
                    if forward { (self.combo_index + 1) % len } else { (self.combo_index + len - 1) % len };
            }
        }
    }

    fn handle_story_key(&mut self, key: KeyEvent, ctrl: bool) -> Option<Action> {
        if ctrl {
            return match key.code {
                KeyCode::Char('e') => Some(Action::EditExternally(EditTarget::Narrative)),
                _ => None,
            };
        }
        let mut narrative = self.wizard.narrative().to_string();
        match key.code {
            KeyCode::Char(c) => narrative.push(c),
            KeyCode::Enter => narrative.push('\n'),
            KeyCode::Backspace => {
                narrative.pop();
            }
            _ => return None,
        }
        self.wizard.set_narrative(narrative);
        None
    }

    fn handle_compose_key(&mut self, key: KeyEvent, ctrl: bool) -> Option<Action> {
        if ctrl {
            return match key.code {
                KeyCode::Char('g') => self.start_prompt(),
                KeyCode::Char('l') => self.start_plan(),
                KeyCode::Char('r') => self.start_render(),
                KeyCode::Char('e') => Some(Action::EditExternally(match self.compose_pane {
                    ComposePane::Prompt => EditTarget::Prompt,
                    ComposePane::Plan => EditTarget::Plan,
                })),
                KeyCode::Char('f') => {
                    match self.wizard.format_plan() {
                        Ok(()) => self.log(LogLevel::Info, "Plan formatted".to_string()),
                        Err(err) => self.log(LogLevel::Error, format!("Cannot format: {err}")),
                    }
                    None
                }
                KeyCode::Char('t') => {
                    let mode = self.wizard.toggle_editor_mode();
                    self.push_status_line(format!("{} editor", mode.label()));
                    None
                }
                _ => None,
            };
        }
        if key.code == KeyCode::Tab {
            self.compose_pane = match self.compose_pane {
                ComposePane::Prompt => ComposePane::Plan,
                ComposePane::Plan => ComposePane::Prompt,
            };
            return None;
        }
        match self.compose_pane {
            ComposePane::Prompt => {
                let mut prompt = self.wizard.prompt().to_string();
                if edit_text(&mut prompt, key.code) {
                    self.wizard.set_prompt(prompt);
                }
                None
            }
            ComposePane::Plan => match self.wizard.editor_mode() {
                EditorMode::Json => {
                    let mut text = self.wizard.plan().text().to_string();
                    if edit_text(&mut text, key.code) {
                        // Parse errors stay inline with the text.
                        let _ = self.wizard.edit_plan_text(text);
                    }
                    None
                }
                EditorMode::Visual => {
                    self.handle_visual_key(key.code);
                    None
                }
            },
        }
    }

    fn handle_visual_key(&mut self, code: KeyCode) {
        let count = self.wizard.document().map(|doc| doc.sections().len()).unwrap_or(0);
        let index = self.selected_section.min(count.saturating_sub(1));
        let outcome = match code {
            KeyCode::Up => {
                self.selected_section = index.saturating_sub(1);
                Ok(())
            }
            KeyCode::Down => {
                self.selected_section = (index + 1).min(count.saturating_sub(1));
                Ok(())
            }
            KeyCode::Char('a') => {
                let outcome = self.wizard.apply_plan(CompositionPlanDocument::with_section_added);
                if outcome.is_ok() {
                    self.selected_section = count;
                }
                outcome
            }
            KeyCode::Char('d') if count > 0 => {
                let outcome = self.wizard.try_apply_plan(|doc| doc.with_section_removed(index));
                if outcome.is_ok() {
                    self.selected_section = index.min(count.saturating_sub(2));
                }
                outcome
            }
            KeyCode::Char('K') if index > 0 => {
                let outcome = self.wizard.try_apply_plan(|doc| doc.with_section_moved(index, index - 1));
                if outcome.is_ok() {
                    self.selected_section = index - 1;
                }
                outcome
            }
            KeyCode::Char('J') if index + 1 < count => {
                let outcome = self.wizard.try_apply_plan(|doc| doc.with_section_moved(index, index + 1));
                if outcome.is_ok() {
                    self.selected_section = index + 1;
                }
                outcome
            }
            KeyCode::Char('+') if count > 0 => self.nudge_duration(index, true),
            KeyCode::Char('-') if count > 0 => self.nudge_duration(index, false),
            KeyCode::Char('P') if count > 0 => {
                self.wizard.try_apply_plan(|doc| doc.with_last_tag_popped(TagList::PositiveLocal(index)))
            }
            KeyCode::Char('N') if count > 0 => {
                self.wizard.try_apply_plan(|doc| doc.with_last_tag_popped(TagList::NegativeLocal(index)))
            }
            KeyCode::Char('X') if count > 0 => {
                let lines = self.wizard.document().map(|doc| doc.sections()[index].lines.len());
                match lines {
                    Some(len) if len > 0 => {
                        self.wizard.try_apply_plan(|doc| doc.with_line_removed(index, len - 1))
                    }
                    _ => Ok(()),
                }
            }
            other => {
                if let Some(target) = visual_input_target(other, index, count) {
                    self.open_input(target);
                }
                Ok(())
            }
        };
        if let Err(err) = outcome {
            self.log(LogLevel::Error, err.to_string());
        }
    }

    fn nudge_duration(&mut self, index: usize, up: bool) -> Result<(), crate::wizard::WizardError> {
        let current = self
            .wizard
            .document()
            .and_then(|doc| doc.sections().get(index))
            .map(|section| section.duration_ms)
            .unwrap_or(DURATION_STEP_MS);
        let next = if up {
            current.saturating_add(DURATION_STEP_MS)
        } else {
            current.saturating_sub(DURATION_STEP_MS).max(DURATION_STEP_MS)
        };
        self.wizard.try_apply_plan(|doc| doc.with_section_duration(index, next))
    }

    fn open_input(&mut self, target: InputTarget) {
        let document = self.wizard.document();
        let buffer = match target {
            InputTarget::RenameSection(index) => document
                .and_then(|doc| doc.sections().get(index))
                .map(|section| section.section_name.clone()),
            InputTarget::SectionDuration(index) => document
                .and_then(|doc| doc.sections().get(index))
                .map(|section| section.duration_ms.to_string()),
            InputTarget::Title => document.and_then(|doc| doc.title()).map(str::to_string),
            InputTarget::Description => document.and_then(|doc| doc.description()).map(str::to_string),
            InputTarget::AddTag(_) | InputTarget::AddLine(_) => None,
        };
        self.input = Some(PendingInput { target, buffer: buffer.unwrap_or_default() });
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let Some(pending) = self.input.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.input = None,
            KeyCode::Enter => {
                if let Some(pending) = self.input.take() {
                    self.commit_input(pending);
                }
            }
            KeyCode::Backspace => {
                pending.buffer.pop();
            }
            KeyCode::Char(c) => pending.buffer.push(c),
            _ => {}
        }
    }

    fn commit_input(&mut self, pending: PendingInput) {
        let value = pending.buffer;
        let outcome = match pending.target {
            InputTarget::RenameSection(index) => {
                self.wizard.try_apply_plan(|doc| doc.with_section_renamed(index, &value))
            }
            InputTarget::SectionDuration(index) => match value.trim().parse::<u64>() {
                Ok(duration) => self.wizard.try_apply_plan(|doc| doc.with_section_duration(index, duration)),
                Err(_) => {
                    self.log(LogLevel::Error, format!("Not a duration: {value}"));
                    return;
                }
            },
            InputTarget::AddTag(list) => self.wizard.try_apply_plan(|doc| doc.with_tag_added(list, &value)),
            InputTarget::AddLine(index) => {
                self.wizard.try_apply_plan(|doc| doc.with_line_added(index, &value))
            }
            InputTarget::Title => self.wizard.apply_plan(|doc| doc.with_title(&value)),
            InputTarget::Description => self.wizard.apply_plan(|doc| doc.with_description(&value)),
        };
        if let Err(err) = outcome {
            self.log(LogLevel::Error, err.to_string());
        }
    }

    fn handle_listen_key(&mut self, key: KeyEvent) -> Option<Action> {
        let audio = self.wizard.audio().cloned();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Enter | KeyCode::Char('p') => {
                audio.map(|audio| Action::Command(AppCommand::FetchAndPlay(audio)))
            }
            KeyCode::Char('d') => audio.map(|audio| Action::Command(AppCommand::Download(audio))),
            KeyCode::Char('s') => Some(Action::Command(AppCommand::StopPlayback)),
            KeyCode::Char('r') => self.reset(),
            _ => None,
        }
    }

    fn start_prompt(&mut self) -> Option<Action> {
        match self.wizard.begin(Operation::Prompt) {
            Ok(()) => Some(Action::Command(AppCommand::GeneratePrompt(self.wizard.prompt_request()))),
            Err(err) => {
                self.log(LogLevel::Error, err.to_string());
                None
            }
        }
    }

    fn start_plan(&mut self) -> Option<Action> {
        match self.wizard.begin(Operation::Plan) {
            Ok(()) => Some(Action::Command(AppCommand::GeneratePlan {
                prompt: self.wizard.prompt().to_string(),
            })),
            Err(err) => {
                self.log(LogLevel::Error, err.to_string());
                None
            }
        }
    }

    fn start_render(&mut self) -> Option<Action> {
        if let Err(err) = self.wizard.begin(Operation::Render) {
            self.log(LogLevel::Error, err.to_string());
            return None;
        }
        let Some(document) = self.wizard.document().cloned() else {
            self.wizard.finish(Operation::Render);
            return None;
        };
        Some(Action::Command(AppCommand::Render {
            document,
            title: self.wizard.render_title(),
            streaming: self.streaming,
        }))
    }
}

fn cycle<T: SelectionOption + PartialEq>(current: Option<T>, forward: bool) -> Option<T> {
    let all = T::ALL;
    if all.is_empty() {
        return None;
    }
    let next = match current.and_then(|value| all.iter().position(|option| *option == value)) {
        Some(index) if forward => (index + 1) % all.len(),
        Some(index) => (index + all.len() - 1) % all.len(),
        None if forward => 0,
        None => all.len() - 1,
    };
    Some(all[next])
}

/// Applies a typing key to a free-text buffer; false when the key is not text input.
fn edit_text(buffer: &mut String, code: KeyCode) -> bool {
    match code {
        KeyCode::Char(c) => buffer.push(c),
        KeyCode::Enter => buffer.push('\n'),
        KeyCode::Backspace => {
            buffer.pop();
        }
        _ => return false,
    }
    true
}

fn visual_input_target(code: KeyCode, index: usize, count: usize) -> Option<InputTarget> {
    let section = (count > 0).then_some(index);
    match code {
        KeyCode::Char('g') => Some(InputTarget::AddTag(TagList::PositiveGlobal)),
        KeyCode::Char('h') => Some(InputTarget::AddTag(TagList::NegativeGlobal)),
        KeyCode::Char('t') => Some(InputTarget::Title),
        KeyCode::Char('y') => Some(InputTarget::Description),
        KeyCode::Char('G') => Some(InputTarget::AddTag(TagList::Genres)),
        KeyCode::Char('M') => Some(InputTarget::AddTag(TagList::Moods)),
        KeyCode::Char('T') => Some(InputTarget::AddTag(TagList::Tags)),
        KeyCode::Char('r') => section.map(InputTarget::RenameSection),
        KeyCode::Char('m') => section.map(InputTarget::SectionDuration),
        KeyCode::Char('p') => section.map(|index| InputTarget::AddTag(TagList::PositiveLocal(index))),
        KeyCode::Char('n') => section.map(|index| InputTarget::AddTag(TagList::NegativeLocal(index))),
        KeyCode::Char('l') => section.map(InputTarget::AddLine),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    Info(String),
    Error(String),
    PromptReady(PromptResult),
    PlanReady(Value),
    RenderProgress(RenderProgress),
    RenderCompleted(AudioResult),
    Failed { operation: Operation, message: String },
    AudioSaved(PathBuf),
    PlaybackStarted { path: PathBuf, duration: Option<Duration> },
    PlaybackStopped,
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    GeneratePrompt(PromptRequest),
    GeneratePlan { prompt: String },
    Render { document: CompositionPlanDocument, title: Option<String>, streaming: bool },
    FetchAndPlay(AudioResult),
    Download(AudioResult),
    StopPlayback,
}

impl AppCommand {
    /// Wizard operation the command completes, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::GeneratePrompt(_) => Some(Operation::Prompt),
            Self::GeneratePlan { .. } => Some(Operation::Plan),
            Self::Render { .. } => Some(Operation::Render),
            Self::FetchAndPlay(_) | Self::Download(_) | Self::StopPlayback => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(app: &mut AppState, text: &str) {
        for c in text.chars() {
            app.handle_key(press(KeyCode::Char(c)));
        }
    }

    fn audio() -> AudioResult {
        AudioResult {
            audio_url: "http://localhost:8000/render/stream/a.mp3".into(),
            download_url: "http://localhost:8000/render/download/a.mp3".into(),
            filename: "a.mp3".into(),
            mime_type: "audio/mpeg".into(),
            file_size_bytes: 4096,
        }
    }

    fn app_at_compose() -> AppState {
        let mut app = AppState::new(true);
        app.configure_row = ConfigureRow::Recommended;
        app.handle_key(press(KeyCode::Enter));
        app.handle_key(ctrl('n'));
        app.handle_key(ctrl('n'));
        assert_eq!(app.wizard.step(), WizardStep::Compose);
        app
    }

    #[test]
    fn configure_keys_cycle_options_and_gate() {
        let mut app = AppState::new(true);
        app.handle_key(press(KeyCode::Enter));
        assert_eq!(app.wizard.step(), WizardStep::Configure);
        assert!(app.status_lines.last().unwrap().starts_with("Error: choose a"));

        app.handle_key(press(KeyCode::Right));
        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Left));
        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Right));
        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Char(' ')));

        let selections = app.wizard.selections();
        assert_eq!(selections.project_blueprint, Some(crate::selections::ProjectBlueprint::ALL[0]));
        assert_eq!(
            selections.sound_profile,
            crate::selections::SoundProfile::ALL.last().copied()
        );
        assert!(selections.instrumental_only);

        app.handle_key(press(KeyCode::Up));
        app.handle_key(press(KeyCode::Enter));
        assert_eq!(app.wizard.step(), WizardStep::Story);
    }

    #[test]
    fn story_typing_edits_narrative() {
        let mut app = AppState::new(true);
        app.configure_row = ConfigureRow::Recommended;
        app.handle_key(press(KeyCode::Enter));
        app.handle_key(ctrl('n'));
        type_text(&mut app, "Birthday for Samm");
        app.handle_key(press(KeyCode::Backspace));
        assert_eq!(app.wizard.narrative(), "Birthday for Sam");
        assert!(matches!(
            app.handle_key(ctrl('e')),
            Some(Action::EditExternally(EditTarget::Narrative))
        ));
    }

    #[test]
    fn generate_commands_claim_the_operation_slot() {
        let mut app = app_at_compose();
        let Some(Action::Command(AppCommand::GeneratePrompt(request))) = app.handle_key(ctrl('g'))
        else {
            panic!("expected a prompt command");
        };
        assert!(request.project_blueprint.is_some());
        assert!(app.handle_key(ctrl('g')).is_none());
        assert!(app.status_lines.last().unwrap().contains("already in progress"));

        app.handle_event(AppEvent::PromptReady(PromptResult {
            prompt: "upbeat".into(),
            title: "Sam's Day".into(),
            description: String::new(),
        }));
        assert!(app.wizard.pending().is_none());
        assert!(matches!(
            app.handle_key(ctrl('l')),
            Some(Action::Command(AppCommand::GeneratePlan { ref prompt })) if prompt == "upbeat"
        ));
    }

    #[test]
    fn failures_release_the_slot_and_log() {
        let mut app = app_at_compose();
        app.handle_key(ctrl('g'));
        app.handle_event(AppEvent::Failed {
            operation: Operation::Prompt,
            message: "502 Bad Gateway".into(),
        });
        assert!(app.wizard.pending().is_none());
        let last = app.activity.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.message, "prompt generation failed: 502 Bad Gateway");
    }

    #[test]
    fn render_completion_moves_to_listen() {
        let mut app = app_at_compose();
        app.handle_event(AppEvent::PlanReady(json!({
            "sections": [{"section_name": "Intro", "duration_ms": 3000}]
        })));
        assert_eq!(app.compose_pane, ComposePane::Plan);

        let Some(Action::Command(AppCommand::Render { streaming, .. })) = app.handle_key(ctrl('r'))
        else {
            panic!("expected a render command");
        };
        assert!(streaming);
        app.handle_event(AppEvent::RenderProgress(RenderProgress {
            stage: "rendering".into(),
            percent: 40.0,
            message: "working".into(),
        }));
        assert_eq!(app.wizard.render_progress().unwrap().percent, 40.0);

        app.handle_event(AppEvent::RenderCompleted(audio()));
        assert_eq!(app.wizard.step(), WizardStep::Listen);
        assert!(matches!(
            app.handle_key(press(KeyCode::Enter)),
            Some(Action::Command(AppCommand::FetchAndPlay(_)))
        ));
    }

    #[test]
    fn edit_during_render_keeps_compose_step() {
        let mut app = app_at_compose();
        app.handle_event(AppEvent::PlanReady(json!({
            "sections": [{"section_name": "Intro", "duration_ms": 3000}]
        })));
        assert!(matches!(
            app.handle_key(ctrl('r')),
            Some(Action::Command(AppCommand::Render { .. }))
        ));
        app.handle_key(press(KeyCode::Char('a')));
        assert_eq!(app.wizard.document().unwrap().sections().len(), 2);

        app.handle_event(AppEvent::RenderCompleted(audio()));
        assert_eq!(app.wizard.step(), WizardStep::Compose);
        assert!(!app.wizard.has_fresh_audio());
        assert!(app.status_lines.last().unwrap().contains("render again"));
    }

    #[test]
    fn visual_editor_keys_edit_the_plan() {
        let mut app = app_at_compose();
        app.handle_event(AppEvent::PlanReady(json!({
            "sections": [
                {"section_name": "A", "duration_ms": 3000},
                {"section_name": "B", "duration_ms": 3000}
            ]
        })));

        app.handle_key(press(KeyCode::Char('a')));
        assert_eq!(app.selected_section, 2);
        app.handle_key(press(KeyCode::Char('K')));
        assert_eq!(app.selected_section, 1);

        app.handle_key(press(KeyCode::Char('p')));
        type_text(&mut app, " warm ");
        app.handle_key(press(KeyCode::Enter));
        app.handle_key(press(KeyCode::Char('+')));

        let document = app.wizard.document().unwrap();
        let names: Vec<_> = document.sections().iter().map(|s| s.section_name.as_str()).collect();
        assert_eq!(names, ["A", "Section 3", "B"]);
        assert_eq!(document.sections()[1].positive_local_styles, ["warm"]);
        assert_eq!(document.sections()[1].duration_ms, 5000);

        app.handle_key(press(KeyCode::Char('r')));
        app.handle_key(press(KeyCode::Esc));
        assert!(app.input.is_none());
        assert_eq!(app.wizard.document().unwrap().sections()[1].section_name, "Section 3");
    }

    #[test]
    fn json_mode_keeps_last_good_plan_while_typing() {
        let mut app = app_at_compose();
        app.handle_event(AppEvent::PlanReady(json!({"sections": []})));
        app.handle_key(ctrl('t'));
        assert_eq!(app.wizard.editor_mode(), EditorMode::Json);
        app.handle_key(press(KeyCode::Char('x')));
        assert!(app.wizard.plan().error().is_some());
        assert!(app.wizard.document().is_some());

        app.handle_key(ctrl('f'));
        assert!(app.status_lines.last().unwrap().contains("Cannot format"));
        app.handle_key(press(KeyCode::Backspace));
        assert!(app.wizard.plan().is_valid());
    }

    #[test]
    fn listen_reset_stops_playback() {
        let mut app = app_at_compose();
        app.handle_event(AppEvent::PlanReady(json!({"sections": []})));
        app.handle_key(ctrl('r'));
        app.handle_event(AppEvent::RenderCompleted(audio()));
        app.handle_event(AppEvent::PlaybackStarted {
            path: PathBuf::from("/tmp/a.mp3"),
            duration: Some(Duration::from_secs(3)),
        });
        assert!(matches!(
            app.handle_key(press(KeyCode::Char('r'))),
            Some(Action::Command(AppCommand::StopPlayback))
        ));
        assert_eq!(app.wizard.step(), WizardStep::Configure);
        assert!(app.wizard.audio().is_none());
        assert!(!app.playback.playing);
    }

    #[test]
    fn status_lines_are_capped() {
        let mut app = AppState::new(false);
        for index in 0..20 {
            app.log(LogLevel::Info, format!("line {index}"));
        }
        assert_eq!(app.status_lines.len(), MAX_STATUS_LINES);
        assert_eq!(app.status_lines.last().unwrap(), "line 19");
        assert_eq!(app.activity.len(), 20);
    }
}
