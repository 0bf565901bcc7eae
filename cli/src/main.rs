use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use composer_studio::{
    api,
    app::{AppCommand, AppEvent, AppState},
    audio::{audio_duration, AudioPlayer},
    backend::{render_streaming_with_timeout, ComposerBackend},
    config::{AppConfig, CliOverrides},
    mock::MockBackend,
    plan::{normalize, parse_text, CompositionPlanDocument},
    selections::{DeliveryAndControl, ProjectBlueprint, SelectionOption, Selections, SoundProfile},
    types::{AudioResult, PromptRequest, RenderProgress},
    ui,
};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io,
    path::PathBuf,
    sync::Arc,
};
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    time::{sleep, Duration},
};
use tracing::{error, info, warn};

const LOG_FILE_NAME: &str = "composer.log";

#[derive(Parser)]
#[command(name = "composer", version, about = "Configure, compose and render AI music")]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Run against the offline mock backend
    #[arg(long, global = true)]
    mock: bool,
    /// Where rendered audio is saved
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a prompt from selections and print it as JSON
    Prompt {
        #[arg(long)]
        blueprint: String,
        #[arg(long)]
        sound: String,
        #[arg(long)]
        delivery: String,
        #[arg(long)]
        instrumental: bool,
        #[arg(long, default_value = "")]
        narrative: String,
    },
    /// Generate a composition plan and print it normalized
    Plan {
        #[arg(long)]
        prompt: String,
    },
    /// Render a plan file and save the audio
    Render {
        plan: PathBuf,
        #[arg(long)]
        no_stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = cli.command.is_none();
    setup_tracing(interactive)?;

    let no_stream = matches!(cli.command, Some(Commands::Render { no_stream: true, .. }));
    let overrides = CliOverrides {
        api_url: cli.api_url.clone(),
        artifact_dir: cli.artifact_dir.clone(),
        mock_mode: cli.mock,
        no_stream,
    };
    let config = AppConfig::load(&overrides)?;
    let backend = build_backend(&config)?;

    match cli.command {
        None => run_wizard(config, backend).await,
        Some(command) => run_headless(command, &config, backend.as_ref()).await,
    }
}

fn build_backend(config: &AppConfig) -> Result<Arc<dyn ComposerBackend>> {
    if config.mock_mode() {
        info!("using mock backend");
        return Ok(Arc::new(MockBackend::new(config.artifact_dir().join("mock"))));
    }
    info!("using backend at {}", config.api_url());
    Ok(Arc::new(api::Client::new(Some(config.api_url()))?))
}

async fn run_wizard(config: AppConfig, backend: Arc<dyn ComposerBackend>) -> Result<()> {
    info!("starting composer wizard");

    let (event_tx, mut event_rx) = unbounded_channel();
    let (command_tx, command_rx) = unbounded_channel();

    let controller = Controller::new(backend, event_tx.clone(), config.clone());
    controller.spawn(command_rx);

    let mut app_state = AppState::new(config.streaming_render());
    let source = if config.mock_mode() {
        "mock backend (offline)".to_string()
    } else {
        config.api_url().to_string()
    };
    app_state.handle_event(AppEvent::Info(format!(
        "Using {source}; audio saves to {}",
        config.artifact_dir().display()
    )));

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    enable_raw_mode()?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;

    let ui_result = ui::run(&mut terminal, &mut app_state, &mut event_rx, command_tx.clone());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;

    ui_result
}

async fn run_headless(
    command: Commands,
    config: &AppConfig,
    backend: &dyn ComposerBackend,
) -> Result<()> {
    match command {
        Commands::Prompt { blueprint, sound, delivery, instrumental, narrative } => {
            let selections = Selections {
                project_blueprint: Some(parse_option::<ProjectBlueprint>(&blueprint)?),
                sound_profile: Some(parse_option::<SoundProfile>(&sound)?),
                delivery_and_control: Some(parse_option::<DeliveryAndControl>(&delivery)?),
                instrumental_only: instrumental,
            };
            let result = backend.generate_prompt(&PromptRequest::new(&selections, &narrative)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Plan { prompt } => {
            if prompt.trim().is_empty() {
                bail!("prompt cannot be empty");
            }
            let raw = backend.generate_plan(&prompt).await?;
            let document = normalize(raw).context("backend returned an unusable plan")?;
            println!("{}", document.to_pretty_json()?);
        }
        Commands::Render { plan, .. } => {
            let text = fs::read_to_string(&plan)
                .with_context(|| format!("failed to read {}", plan.display()))?;
            let document = parse_text(&text)
                .with_context(|| format!("{} is not a valid composition plan", plan.display()))?;
            let audio = render_document(backend, config, &document, |progress| {
                eprintln!("[{:>3.0}%] {}: {}", progress.percent, progress.stage, progress.message);
            })
            .await?;
            let path = backend.fetch_audio(&audio, config.artifact_dir()).await?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn render_document<F>(
    backend: &dyn ComposerBackend,
    config: &AppConfig,
    document: &CompositionPlanDocument,
    mut on_progress: F,
) -> Result<AudioResult>
where
    F: FnMut(&RenderProgress) + Send,
{
    if !config.streaming_render() {
        return backend.render(document).await;
    }
    let title = document.title().map(str::to_string);
    let audio = render_streaming_with_timeout(
        backend,
        document,
        title,
        config.render_timeout(),
        &mut on_progress,
    )
    .await?;
    Ok(audio)
}

fn parse_option<T: SelectionOption>(id: &str) -> Result<T> {
    T::from_id(id).ok_or_else(|| {
        let known: Vec<&str> = T::ALL.iter().map(|option| option.id()).collect();
        anyhow!("unknown {} {id:?}; expected one of: {}", T::KIND, known.join(", "))
    })
}

fn setup_tracing(interactive: bool) -> Result<()> {
    let init = |err: Box<dyn std::error::Error + Send + Sync>| {
        anyhow!("failed to initialise tracing: {err}")
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact();

    if !interactive {
        return builder.with_writer(io::stderr).try_init().map_err(init);
    }

    let log_dir = AppConfig::log_dir()?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let log_path = log_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;
    builder.with_ansi(false).with_writer(std::sync::Mutex::new(file)).try_init().map_err(init)
}

struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    backend: Arc<dyn ComposerBackend>,
    event_tx: UnboundedSender<AppEvent>,
    config: AppConfig,
    saved_paths: Mutex<HashMap<String, PathBuf>>,
    player: Mutex<Option<AudioPlayer>>,
}

impl Controller {
    fn new(
        backend: Arc<dyn ComposerBackend>,
        event_tx: UnboundedSender<AppEvent>,
        config: AppConfig,
    ) -> Self {
        let player = match AudioPlayer::new() {
            Ok(player) => Some(player),
            Err(err) => {
                warn!("audio output unavailable: {err:#}");
                None
            }
        };
        let inner = ControllerInner {
            backend,
            event_tx,
            config,
            saved_paths: Mutex::new(HashMap::new()),
            player: Mutex::new(player),
        };
        Self { inner: Arc::new(inner) }
    }

    fn spawn(self, mut command_rx: UnboundedReceiver<AppCommand>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command.operation() {
                    // Network work runs on its own task so playback commands stay responsive.
                    Some(operation) => {
                        let inner = inner.clone();
                        tokio::spawn(async move {
                            if let Err(err) = Controller::handle_command(inner.clone(), command).await {
                                error!("{operation} error: {err:#}");
                                let _ = inner
                                    .event_tx
                                    .send(AppEvent::Failed { operation, message: format!("{err:#}") });
                            }
                        });
                    }
                    None => {
                        if let Err(err) = Controller::handle_command(inner.clone(), command).await {
                            error!("command error: {err:#}");
                            let _ = inner.event_tx.send(AppEvent::Error(format!("{err:#}")));
                        }
                    }
                }
            }
        });
    }

    async fn handle_command(inner: Arc<ControllerInner>, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::GeneratePrompt(request) => {
                let result = inner.backend.generate_prompt(&request).await?;
                let _ = inner.event_tx.send(AppEvent::PromptReady(result));
            }
            AppCommand::GeneratePlan { prompt } => {
                let raw = inner.backend.generate_plan(&prompt).await?;
                let _ = inner.event_tx.send(AppEvent::PlanReady(raw));
            }
            AppCommand::Render { document, title, streaming } => {
                Controller::render(inner, document, title, streaming).await?;
            }
            AppCommand::FetchAndPlay(audio) => {
                Controller::fetch_and_play(inner, audio).await?;
            }
            AppCommand::Download(audio) => {
                let path = Controller::save_audio(&inner, &audio).await?;
                let _ = inner.event_tx.send(AppEvent::AudioSaved(path));
            }
            AppCommand::StopPlayback => {
                Controller::stop_playback(inner).await;
            }
        }
        Ok(())
    }

    async fn render(
        inner: Arc<ControllerInner>,
        document: CompositionPlanDocument,
        title: Option<String>,
        streaming: bool,
    ) -> Result<()> {
        {
            let mut player = inner.player.lock().await;
            if let Some(player) = player.as_mut() {
                player.stop();
            }
        }
        let audio = if streaming {
            let progress_tx = inner.event_tx.clone();
            let mut forward = move |progress: &RenderProgress| {
                let _ = progress_tx.send(AppEvent::RenderProgress(progress.clone()));
            };
            render_streaming_with_timeout(
                inner.backend.as_ref(),
                &document,
                title,
                inner.config.render_timeout(),
                &mut forward,
            )
            .await?
        } else {
            inner.backend.render(&document).await?
        };
        info!("render complete: {} ({})", audio.filename, audio.size_label());
        let _ = inner.event_tx.send(AppEvent::RenderCompleted(audio));
        Ok(())
    }

    /// Reuses an earlier download of the same render.
    async fn save_audio(inner: &ControllerInner, audio: &AudioResult) -> Result<PathBuf> {
        if let Some(path) = inner.saved_paths.lock().await.get(&audio.download_url).cloned() {
            if path.exists() {
                return Ok(path);
            }
        }
        let path = inner.backend.fetch_audio(audio, inner.config.artifact_dir()).await?;
        inner.saved_paths.lock().await.insert(audio.download_url.clone(), path.clone());
        Ok(path)
    }

    async fn fetch_and_play(inner: Arc<ControllerInner>, audio: AudioResult) -> Result<()> {
        let path = Controller::save_audio(&inner, &audio).await?;
        let _ = inner.event_tx.send(AppEvent::AudioSaved(path.clone()));

        let mut guard = inner.player.lock().await;
        let Some(player) = guard.as_mut() else {
            bail!("no audio output available; the file is at {}", path.display());
        };
        player.play(&path).with_context(|| format!("failed to play {}", path.display()))?;
        drop(guard);

        let duration = audio_duration(&path).ok();
        let _ = inner.event_tx.send(AppEvent::PlaybackStarted { path, duration });
        Controller::spawn_playback_monitor(inner.clone());
        Ok(())
    }

    async fn stop_playback(inner: Arc<ControllerInner>) {
        let mut player = inner.player.lock().await;
        if let Some(player) = player.as_mut() {
            player.stop();
        }
        let _ = inner.event_tx.send(AppEvent::PlaybackStopped);
    }

    fn spawn_playback_monitor(inner: Arc<ControllerInner>) {
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_millis(500)).await;
                let playing = {
                    let player = inner.player.lock().await;
                    player.as_ref().map(AudioPlayer::is_playing).unwrap_or(false)
                };
                if !playing {
                    let _ = inner.event_tx.send(AppEvent::PlaybackStopped);
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_headless_commands() {
        let cli = Cli::try_parse_from([
            "composer",
            "--mock",
            "prompt",
            "--blueprint",
            "ad_brand_fast_hook",
            "--sound",
            "bright_pop_electro",
            "--delivery",
            "balanced_studio",
            "--instrumental",
        ])
        .unwrap();
        assert!(cli.mock);
        assert!(matches!(cli.command, Some(Commands::Prompt { instrumental: true, .. })));

        let cli = Cli::try_parse_from(["composer", "render", "plan.json", "--no-stream"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Render { no_stream: true, .. })));
        assert!(Cli::try_parse_from(["composer"]).unwrap().command.is_none());
    }

    #[test]
    fn selection_ids_are_validated() {
        assert_eq!(
            parse_option::<SoundProfile>("lofi_cozy").unwrap(),
            SoundProfile::LofiCozy
        );
        let err = parse_option::<ProjectBlueprint>("polka").unwrap_err().to_string();
        assert!(err.starts_with("unknown project blueprint \"polka\""));
        assert!(err.contains("ad_brand_fast_hook"));
    }

    #[tokio::test]
    async fn headless_render_uses_mock_backend() {
        let dir = tempfile::tempdir().unwrap();
        let plan_path = dir.path().join("plan.json");
        fs::write(
            &plan_path,
            r#"{"sections":[{"section_name":"Intro","duration_ms":3000}],"song_metadata":{"title":"Test Tone"}}"#,
        )
        .unwrap();
        let config = AppConfig::load(&CliOverrides {
            api_url: None,
            artifact_dir: Some(dir.path().join("out")),
            mock_mode: true,
            no_stream: false,
        })
        .unwrap();
        let backend = build_backend(&config).unwrap();
        run_headless(Commands::Render { plan: plan_path, no_stream: false }, &config, backend.as_ref())
            .await
            .unwrap();
        assert!(dir.path().join("out").join("test-tone.wav").exists());
    }
}
