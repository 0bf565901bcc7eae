use crate::{
    app::{Action, AppCommand, AppEvent, AppState, ComposePane, ConfigureRow, EditTarget, LogLevel},
    plan::TagList,
    selections::{
        DeliveryAndControl, ProjectBlueprint, SelectionOption, SoundProfile,
        RECOMMENDED_COMBINATIONS,
    },
    wizard::{EditorMode, Operation, WizardStep},
};
use anyhow::{anyhow, bail, Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use std::{
    env, fs,
    io::Write,
    path::Path,
    process::{Command, ExitStatus},
    time::Duration,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const ACCENT: Color = Color::Cyan;
const MUTED: Color = Color::DarkGray;

pub fn run<W: Write>(
    terminal: &mut Terminal<CrosstermBackend<W>>,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
    command_tx: UnboundedSender<AppCommand>,
) -> Result<()> {
    loop {
        while let Ok(event) = event_rx.try_recv() {
            app.handle_event(event);
        }

        terminal.draw(|frame| draw(frame, app))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match app.handle_key(key) {
            Some(Action::Quit) => break,
            Some(Action::Command(command)) => {
                let operation = command.operation();
                if command_tx.send(command).is_err() {
                    match operation {
                        Some(operation) => app.handle_event(AppEvent::Failed {
                            operation,
                            message: "controller is not running".to_string(),
                        }),
                        None => app.log(LogLevel::Error, "controller is not running".to_string()),
                    }
                }
            }
            Some(Action::EditExternally(target)) => {
                let current = app.external_text(target);
                match edit_externally(terminal, &current, target) {
                    Ok(text) => app.apply_external_edit(target, text),
                    Err(err) => app.log(LogLevel::Error, format!("Editor failed: {err:#}")),
                }
            }
            None => {}
        }
    }

    Ok(())
}

/// Suspends the UI, opens the text in `$VISUAL`/`$EDITOR` and returns what was saved.
fn edit_externally<W: Write>(
    terminal: &mut Terminal<CrosstermBackend<W>>,
    text: &str,
    target: EditTarget,
) -> Result<String> {
    let mut file = tempfile::Builder::new()
        .prefix("composer-")
        .suffix(target.file_suffix())
        .tempfile()
        .context("failed to create temporary file")?;
    file.write_all(text.as_bytes()).context("failed to write temporary file")?;
    file.flush()?;

    let editor = env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    let status = launch_editor(&editor, file.path());
    enable_raw_mode()?;
    execute!(terminal.backend_mut(), EnterAlternateScreen, EnableMouseCapture)?;
    terminal.clear()?;

    let status = status?;
    if !status.success() {
        bail!("{editor} exited with {status}");
    }
    fs::read_to_string(file.path())
        .with_context(|| format!("failed to read {}", file.path().display()))
}

fn launch_editor(editor: &str, path: &Path) -> Result<ExitStatus> {
    let mut parts = editor.split_whitespace();
    let program = parts.next().ok_or_else(|| anyhow!("editor command is empty"))?;
    Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("failed to launch {program}"))
}

fn draw(frame: &mut Frame<'_>, app: &AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(8), Constraint::Length(1)].as_ref())
        .split(frame.size());

    draw_stepper(frame, app, rows[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
        .split(rows[1]);

    match app.wizard.step() {
        WizardStep::Configure => draw_configure(frame, app, body[0]),
        WizardStep::Story => draw_story(frame, app, body[0]),
        WizardStep::Compose => draw_compose(frame, app, body[0]),
        WizardStep::Listen => draw_listen(frame, app, body[0]),
    }
    draw_status(frame, app, body[1]);

    let hints = Paragraph::new(key_hints(app)).style(Style::default().fg(MUTED));
    frame.render_widget(hints, rows[2]);

    if let Some(input) = &app.input {
        let area = centered_rect(60, 3, frame.size());
        let block = Block::default()
            .title(input.target.label())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(format!("{}▏", input.buffer)).block(block), area);
    }
}

fn draw_stepper(frame: &mut Frame<'_>, app: &AppState, area: Rect) {
    let current = app.wizard.step();
    let titles: Vec<Line> = WizardStep::ALL
        .iter()
        .map(|step| {
            let marker = if step.index() < current.index() { "✓" } else { " " };
            Line::from(format!("{marker} {}. {}", step.index() + 1, step.label()))
        })
        .collect();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("Composer Studio").borders(Borders::ALL))
        .select(current.index())
        .style(Style::default().fg(MUTED))
        .highlight_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

fn draw_configure(frame: &mut Frame<'_>, app: &AppState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(4)].as_ref())
        .split(area);

    let selections = app.wizard.selections();
    let combo = RECOMMENDED_COMBINATIONS.get(app.combo_index);
    let rows = [
        (ConfigureRow::Blueprint, "Project blueprint", option_label(selections.project_blueprint)),
        (ConfigureRow::Sound, "Sound profile", option_label(selections.sound_profile)),
        (ConfigureRow::Delivery, "Delivery & control", option_label(selections.delivery_and_control)),
        (
            ConfigureRow::Instrumental,
            "Instrumental only",
            if selections.instrumental_only { "[x]".to_string() } else { "[ ]".to_string() },
        ),
        (
            ConfigureRow::Recommended,
            "Recommended preset",
            combo.map(|combo| combo.use_case.to_string()).unwrap_or_default(),
        ),
    ];
    let items: Vec<ListItem> = rows
        .iter()
        .map(|(_, label, value)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{label:<20}"), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(format!("◀ {value} ▶")),
            ]))
        })
        .collect();
    let selected = rows.iter().position(|(row, _, _)| *row == app.configure_row);
    let mut state = ListState::default().with_selected(selected);
    let list = List::new(items)
        .block(Block::default().title("Configure your music").borders(Borders::ALL))
        .highlight_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
        .highlight_symbol("› ");
    frame.render_stateful_widget(list, chunks[0], &mut state);

    let details: Vec<Line> = match app.configure_row {
        ConfigureRow::Blueprint => option_details(selections.project_blueprint),
        ConfigureRow::Sound => option_details(selections.sound_profile),
        ConfigureRow::Delivery => option_details(selections.delivery_and_control),
        ConfigureRow::Instrumental => vec![Line::from(
            "Ask for a track without vocals. Lyric lines in the plan are ignored by the renderer.",
        )],
        ConfigureRow::Recommended => RECOMMENDED_COMBINATIONS
            .iter()
            .enumerate()
            .map(|(index, combo)| {
                let style = if index == app.combo_index {
                    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::styled(format!("{:<22}", combo.use_case), style),
                    Span::styled(combo.description, Style::default().fg(MUTED)),
                ])
            })
            .collect(),
    };
    let details = Paragraph::new(details)
        .block(Block::default().title("Details").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    frame.render_widget(details, chunks[1]);
}

fn option_label<T: SelectionOption>(option: Option<T>) -> String {
    match option {
        Some(option) if option.recommended() => format!("{} ★", option.label()),
        Some(option) => option.label().to_string(),
        None => format!("choose a {}", T::KIND),
    }
}

fn option_details<T: SelectionOption>(option: Option<T>) -> Vec<Line<'static>> {
    match option {
        Some(option) => vec![
            Line::from(Span::styled(option.summary(), Style::default().add_modifier(Modifier::BOLD))),
            Line::from(""),
            Line::from(option.details()),
        ],
        None => vec![Line::from(format!(
            "{} options available; use ◀ ▶ to pick one.",
            T::ALL.len()
        ))],
    }
}

fn draw_story(frame: &mut Frame<'_>, app: &AppState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(4)].as_ref())
        .split(area);

    let selections = app.wizard.selections();
    let summary = vec![
        Line::from(format!("Blueprint: {}", option_label::<ProjectBlueprint>(selections.project_blueprint))),
        Line::from(format!("Sound:     {}", option_label::<SoundProfile>(selections.sound_profile))),
        Line::from(format!(
            "Delivery:  {}",
            option_label::<DeliveryAndControl>(selections.delivery_and_control)
        )),
    ];
    frame.render_widget(
        Paragraph::new(summary).block(Block::default().title("Your choices").borders(Borders::ALL)),
        chunks[0],
    );

    let narrative = app.wizard.narrative();
    let body = if narrative.is_empty() {
        Paragraph::new(Span::styled(
            "Optional: who is it for, what moment, what feeling? Type here or press Ctrl+E.",
            Style::default().fg(MUTED),
        ))
    } else {
        Paragraph::new(format!("{narrative}▏"))
    };
    let block = Block::default()
        .title("Tell your story")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));
    frame.render_widget(body.block(block).wrap(Wrap { trim: false }), chunks[1]);
}

fn draw_compose(frame: &mut Frame<'_>, app: &AppState, area: Rect) {
    let rendering = app.wizard.pending() == Some(Operation::Render);
    let mut constraints = vec![Constraint::Percentage(35), Constraint::Min(6)];
    if rendering {
        constraints.push(Constraint::Length(3));
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let focused = |pane: ComposePane| {
        if app.compose_pane == pane {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    };

    let mut prompt_title = "Prompt".to_string();
    if let Some(title) = app.wizard.title() {
        prompt_title.push_str(&format!(" · {title}"));
    }
    if app.wizard.pending() == Some(Operation::Prompt) {
        prompt_title.push_str(" · generating…");
    }
    let prompt = app.wizard.prompt();
    let prompt_body = if prompt.is_empty() {
        Paragraph::new(Span::styled(
            "Press Ctrl+G to generate a prompt from your choices, or type one.",
            Style::default().fg(MUTED),
        ))
    } else {
        Paragraph::new(prompt.to_string())
    };
    let prompt_block = Block::default()
        .title(prompt_title)
        .borders(Borders::ALL)
        .border_style(focused(ComposePane::Prompt));
    frame.render_widget(prompt_body.block(prompt_block).wrap(Wrap { trim: false }), chunks[0]);

    let mut plan_title = format!("Composition plan · {}", app.wizard.editor_mode().label());
    if app.wizard.pending() == Some(Operation::Plan) {
        plan_title.push_str(" · generating…");
    }
    let plan_block = Block::default()
        .title(plan_title)
        .borders(Borders::ALL)
        .border_style(focused(ComposePane::Plan));
    match app.wizard.editor_mode() {
        EditorMode::Json => {
            let mut lines: Vec<Line> = Vec::new();
            if let Some(err) = app.wizard.plan().error() {
                lines.push(Line::from(Span::styled(
                    format!("Invalid JSON: {err}"),
                    Style::default().fg(Color::Red),
                )));
            }
            lines.extend(app.wizard.plan().text().lines().map(|line| Line::from(line.to_string())));
            frame.render_widget(Paragraph::new(lines).block(plan_block), chunks[1]);
        }
        EditorMode::Visual => draw_visual_plan(frame, app, plan_block, chunks[1]),
    }

    if rendering {
        let (percent, label) = match app.wizard.render_progress() {
            Some(progress) => (
                progress.percent.clamp(0.0, 100.0) as u16,
                format!("{} · {}", progress.stage, progress.message),
            ),
            None => (0, "Connecting…".to_string()),
        };
        let gauge = Gauge::default()
            .block(Block::default().title("Creating music").borders(Borders::ALL))
            .gauge_style(Style::default().fg(ACCENT))
            .percent(percent)
            .label(label);
        frame.render_widget(gauge, chunks[2]);
    }
}

fn draw_visual_plan(frame: &mut Frame<'_>, app: &AppState, block: Block<'_>, area: Rect) {
    let Some(document) = app.wizard.document() else {
        let hint = Paragraph::new(Span::styled(
            "No plan yet. Press Ctrl+L to generate one from the prompt.",
            Style::default().fg(MUTED),
        ))
        .block(block);
        frame.render_widget(hint, area);
        return;
    };

    let inner = block.inner(area);
    frame.render_widget(block, area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(inner);

    let items: Vec<ListItem> = document
        .sections()
        .iter()
        .map(|section| {
            ListItem::new(format!(
                "{} ({:.1}s){}",
                section.section_name,
                section.duration_ms as f64 / 1000.0,
                if section.is_instrumental() { "" } else { " ♪" }
            ))
        })
        .collect();
    let selected = (!document.sections().is_empty())
        .then(|| app.selected_section.min(document.sections().len() - 1));
    let mut state = ListState::default().with_selected(selected);
    let list = List::new(items)
        .block(Block::default().title(format!(
            "Sections · {:.1}s",
            document.total_duration_ms() as f64 / 1000.0
        )))
        .highlight_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
        .highlight_symbol("› ");
    frame.render_stateful_widget(list, columns[0], &mut state);

    let mut lines = vec![
        Line::from(format!("Title: {}", document.title().unwrap_or("-"))),
        tag_line("Global +", document.tags(TagList::PositiveGlobal)),
        tag_line("Global −", document.tags(TagList::NegativeGlobal)),
        tag_line("Genres", document.tags(TagList::Genres)),
        tag_line("Moods", document.tags(TagList::Moods)),
        Line::from(""),
    ];
    if let Some(index) = selected {
        let section = &document.sections()[index];
        lines.push(Line::from(Span::styled(
            section.section_name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(tag_line("Local +", &section.positive_local_styles));
        lines.push(tag_line("Local −", &section.negative_local_styles));
        if section.lines.is_empty() {
            lines.push(Line::from(Span::styled("(instrumental)", Style::default().fg(MUTED))));
        }
        lines.extend(section.lines.iter().map(|line| Line::from(format!("  “{line}”"))));
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), columns[1]);
}

fn tag_line(label: &str, tags: &[String]) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<9}"), Style::default().fg(MUTED)),
        Span::raw(if tags.is_empty() { "-".to_string() } else { tags.join(", ") }),
    ])
}

fn draw_listen(frame: &mut Frame<'_>, app: &AppState, area: Rect) {
    let block = Block::default().title("Listen").borders(Borders::ALL);
    let Some(audio) = app.wizard.audio() else {
        let empty = Paragraph::new("No music yet. Go back and create some.").block(block);
        frame.render_widget(empty, area);
        return;
    };

    let title = app.wizard.title().unwrap_or("Your composition").to_string();
    let mut lines = vec![
        Line::from(Span::styled(title, Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(format!("File:     {}", audio.filename)),
        Line::from(format!("Format:   {}", audio.mime_type)),
        Line::from(format!("Size:     {}", audio.size_label())),
        Line::from(format!("Stream:   {}", audio.audio_url)),
    ];
    if let Some(path) = &app.playback.saved_path {
        lines.push(Line::from(format!("Saved:    {}", path.display())));
    }
    let state = if app.playback.playing { "▶ playing" } else { "■ stopped" };
    let duration = app
        .playback
        .duration
        .map(|duration| format!(" ({:.1}s)", duration.as_secs_f64()))
        .unwrap_or_default();
    lines.push(Line::from(""));
    lines.push(Line::from(format!("{state}{duration}")));
    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
}

fn draw_status(frame: &mut Frame<'_>, app: &AppState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(10), Constraint::Min(3)].as_ref())
        .split(area);

    let status_text = if app.status_lines.is_empty() {
        "Ready.".to_string()
    } else {
        app.status_lines.join("\n")
    };
    let status = Paragraph::new(status_text)
        .block(Block::default().title("Status").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(status, chunks[0]);

    let visible = chunks[1].height.saturating_sub(2) as usize;
    let lines: Vec<Line> = app
        .activity
        .iter()
        .rev()
        .take(visible)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Info => MUTED,
                LogLevel::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(entry.timestamp.format("%H:%M:%S ").to_string(), Style::default().fg(color)),
                Span::raw(entry.message.clone()),
            ])
        })
        .collect();
    let activity = Paragraph::new(lines)
        .block(Block::default().title("Activity").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(activity, chunks[1]);
}

fn key_hints(app: &AppState) -> String {
    if app.input.is_some() {
        return "Enter save · Esc cancel".to_string();
    }
    let step = match app.wizard.step() {
        WizardStep::Configure => "↑↓ row · ◀▶ choose · Space toggle · Enter next/apply preset · q quit",
        WizardStep::Story => "type your story · Ctrl+E editor",
        WizardStep::Compose => match (app.compose_pane, app.wizard.editor_mode()) {
            (ComposePane::Prompt, _) => {
                "Ctrl+G prompt · Ctrl+L plan · Ctrl+R create music · Ctrl+E editor · Tab plan"
            }
            (ComposePane::Plan, EditorMode::Json) => {
                "type JSON · Ctrl+F format · Ctrl+T visual · Ctrl+E editor · Ctrl+R create music"
            }
            (ComposePane::Plan, EditorMode::Visual) => {
                "a add · d del · J/K move · r rename · m/± length · p/n tag · l line · g/h global · t title · Ctrl+T JSON"
            }
        },
        WizardStep::Listen => "p play · s stop · d download · r start over · q quit",
    };
    format!("{step} · Ctrl+N next · Ctrl+P back · Ctrl+C quit")
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = area.width * percent_x / 100;
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height: height.min(area.height),
    }
}
