use crate::config::WallConfig;
use crate::display::{CellRect, DisplayLoop, Slot, ViewMode, grid_cells};
use crate::kitty::{KittySurface, detect_kitty_graphics_support, terminal_cell_pixel_size};
use crate::producer::ProducerHandle;
use crate::ptz::{OnvifPtz, PtzDirection};
use crate::rtsp::RtspConnector;
use crate::sink::SinkStatus;
use crate::transform::FrameTransform;
use crate::view::ViewController;
use crate::wall::ProducerSet;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

const UI_IDLE_SLEEP: Duration = Duration::from_millis(16);
/// Used when the terminal does not report its pixel size.
const FALLBACK_CELL_PX: (usize, usize) = (8, 16);
const PAN_STEP: f32 = 0.1;

const COLOR_TEXT: Color = Color::Rgb(231, 235, 243);
const COLOR_MUTED: Color = Color::Rgb(145, 152, 170);
const COLOR_BORDER: Color = Color::Rgb(88, 98, 120);
const COLOR_BORDER_ACTIVE: Color = Color::Rgb(114, 140, 255);
const COLOR_ACCENT: Color = Color::Rgb(102, 216, 255);
const COLOR_SUCCESS: Color = Color::Rgb(103, 212, 142);
const COLOR_WARNING: Color = Color::Rgb(255, 198, 109);
const COLOR_ERROR: Color = Color::Rgb(255, 121, 134);

const GLYPH_BULLET: &str = "•";

type AppTerminal = Terminal<CrosstermBackend<io::Stdout>>;
type Wall = ViewController<RtspConnector, OnvifPtz>;

pub async fn run_wall(config_path: PathBuf) -> Result<()> {
    let config = WallConfig::load(&config_path)?;
    let general = &config.general;
    let connector = Arc::new(RtspConnector::new(general.transport, general.connect_timeout()));
    let transform = Arc::new(FrameTransform::from_font_path(
        general.overlay_font.as_deref(),
        general.overlay_font_px,
    ));
    let ptz = Arc::new(OnvifPtz::new(&config.ptz).context("failed creating PTZ client")?);
    let producers = ProducerSet::new(connector, transform, general.producer_timing());
    let mut view = ViewController::new(producers, ptz, general.fullscreen_variant);
    view.reconcile(&config.endpoints());

    let graphics = detect_kitty_graphics_support();
    info!(graphics, cameras = view.producers().len(), "wall starting");
    let mut app = App::new(config_path, config, graphics);

    let run_result = match init_terminal() {
        Ok(mut terminal) => {
            let run_result = run_loop(&mut terminal, &mut app, &mut view).await;
            let restore_result = restore_terminal(&mut terminal);
            run_result.and(restore_result)
        }
        Err(err) => Err(err),
    };
    view.shutdown().await;
    info!("wall stopped");
    run_result
}

async fn run_loop(terminal: &mut AppTerminal, app: &mut App, view: &mut Wall) -> Result<()> {
    let mut force_ui_draw = true;

    loop {
        app.poll_ptz_results();

        let now = Instant::now();
        let tick_due = app.display.is_due(now);
        if force_ui_draw || tick_due {
            terminal
                .draw(|frame| app.draw(frame, view))
                .context("failed drawing TUI frame")?;
            force_ui_draw = false;
            let mode = if view.is_full_screen() {
                ViewMode::FullScreen
            } else {
                ViewMode::Grid
            };
            let slots = std::mem::take(&mut app.pending_slots);
            if app.display.set_layout(mode, slots) {
                app.surface.clear_images();
            }
        }

        if tick_due {
            let zoom = view.focus().map(|focus| &focus.zoom);
            let report = app.display.tick(now, view.producers(), zoom, &mut app.surface);
            if report.errors > 0 {
                app.status = format!("{} camera(s) failed to render", report.errors);
            }
            if let Err(err) = app.surface.write_to(terminal.backend_mut()) {
                warn!("graphics write failed: {err:#}");
                app.status = format!("graphics write failed: {err:#}");
                app.surface = KittySurface::new(false);
                app.display.invalidate();
                force_ui_draw = true;
            }
        }

        let mut running = true;
        while event::poll(Duration::ZERO).context("failed to poll input")? {
            match event::read().context("failed reading input")? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if app.handle_key(key, view) == AppCommand::Quit {
                        running = false;
                        break;
                    }
                    force_ui_draw = true;
                }
                Event::Resize(_, _) => {
                    terminal.clear().context("failed clearing terminal")?;
                    app.surface.clear_images();
                    app.display.invalidate();
                    force_ui_draw = true;
                }
                _ => {}
            }
        }
        if !running {
            break;
        }

        let wait = app.display.time_until_due(Instant::now()).min(UI_IDLE_SLEEP);
        tokio::time::sleep(wait).await;
    }

    app.surface.clear_images();
    let _ = app.surface.write_to(terminal.backend_mut());
    Ok(())
}

fn init_terminal() -> Result<AppTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("failed creating terminal")
}

fn restore_terminal(terminal: &mut AppTerminal) -> Result<()> {
    disable_raw_mode().context("failed disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed leaving alternate screen")?;
    terminal.show_cursor().context("failed showing cursor")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppCommand {
    None,
    Quit,
}

/// What a key press means in the current view.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Quit,
    Select(PtzDirection),
    Open,
    Reload,
    Close,
    Ptz(PtzDirection),
    ZoomIn,
    ZoomOut,
    ResetZoom,
    Pan(f32, f32),
    ToggleQuality,
}

fn key_action(key: KeyEvent, full_screen: bool) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c' | 'q')).then_some(Action::Quit);
    }
    let arrow = match key.code {
        KeyCode::Up => Some(PtzDirection::Up),
        KeyCode::Down => Some(PtzDirection::Down),
        KeyCode::Left => Some(PtzDirection::Left),
        KeyCode::Right => Some(PtzDirection::Right),
        _ => None,
    };

    if full_screen {
        if let Some(direction) = arrow {
            return Some(Action::Ptz(direction));
        }
        return match key.code {
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Enter => Some(Action::Close),
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('+' | '=') => Some(Action::ZoomIn),
            KeyCode::Char('-' | '_') => Some(Action::ZoomOut),
            KeyCode::Char('0') => Some(Action::ResetZoom),
            KeyCode::Char('w') => Some(Action::Pan(0.0, -PAN_STEP)),
            KeyCode::Char('s') => Some(Action::Pan(0.0, PAN_STEP)),
            KeyCode::Char('a') => Some(Action::Pan(-PAN_STEP, 0.0)),
            KeyCode::Char('d') => Some(Action::Pan(PAN_STEP, 0.0)),
            KeyCode::Char('t') => Some(Action::ToggleQuality),
            _ => None,
        };
    }

    let vim = match key.code {
        KeyCode::Char('k') => Some(PtzDirection::Up),
        KeyCode::Char('j') => Some(PtzDirection::Down),
        KeyCode::Char('h') => Some(PtzDirection::Left),
        KeyCode::Char('l') => Some(PtzDirection::Right),
        _ => None,
    };
    if let Some(direction) = arrow.or(vim) {
        return Some(Action::Select(direction));
    }
    match key.code {
        KeyCode::Enter => Some(Action::Open),
        KeyCode::Char('r') => Some(Action::Reload),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        _ => None,
    }
}

/// Moves a row-major grid selection, staying inside the grid.
fn move_selection(selected: usize, count: usize, cols: usize, direction: PtzDirection) -> usize {
    if count == 0 {
        return 0;
    }
    let cols = cols.max(1);
    let selected = selected.min(count - 1);
    match direction {
        PtzDirection::Left => selected.saturating_sub(1),
        PtzDirection::Right => (selected + 1).min(count - 1),
        PtzDirection::Up => selected.checked_sub(cols).unwrap_or(selected),
        PtzDirection::Down => {
            let next = selected + cols;
            if next < count { next } else { selected }
        }
    }
}

struct PtzOutcome {
    camera_id: String,
    direction: PtzDirection,
    moved: bool,
}

struct App {
    config_path: PathBuf,
    config: WallConfig,
    selected: usize,
    status: String,
    display: DisplayLoop,
    surface: KittySurface,
    /// Slots laid out by the last draw, handed to the display loop after it.
    pending_slots: Vec<Slot>,
    ptz_tx: mpsc::UnboundedSender<PtzOutcome>,
    ptz_rx: mpsc::UnboundedReceiver<PtzOutcome>,
}

impl App {
    fn new(config_path: PathBuf, config: WallConfig, graphics: bool) -> Self {
        let (ptz_tx, ptz_rx) = mpsc::unbounded_channel();
        let display = DisplayLoop::new(
            config.general.grid_refresh(),
            config.general.fullscreen_refresh(),
        );
        let status = if graphics {
            format!("loaded {}", config_path.display())
        } else {
            "Kitty graphics protocol not detected; showing stream status only".to_owned()
        };
        Self {
            config_path,
            config,
            selected: 0,
            status,
            display,
            surface: KittySurface::new(graphics),
            pending_slots: Vec::new(),
            ptz_tx,
            ptz_rx,
        }
    }

    fn poll_ptz_results(&mut self) {
        while let Ok(outcome) = self.ptz_rx.try_recv() {
            self.status = if outcome.moved {
                format!("PTZ {} sent to {}", outcome.direction, outcome.camera_id)
            } else {
                format!("PTZ {} failed for {}", outcome.direction, outcome.camera_id)
            };
        }
    }

    fn handle_key(&mut self, key: KeyEvent, view: &mut Wall) -> AppCommand {
        let Some(action) = key_action(key, view.is_full_screen()) else {
            return AppCommand::None;
        };
        match action {
            Action::Quit => return AppCommand::Quit,
            Action::Select(direction) => {
                let count = view.producers().len();
                let (cols, _) = crate::display::grid_dimensions(count);
                self.selected = move_selection(self.selected, count, cols, direction);
            }
            Action::Open => {
                let Some(id) = view
                    .producers()
                    .iter()
                    .nth(self.selected)
                    .map(|handle| handle.id().to_owned())
                else {
                    return AppCommand::None;
                };
                self.status = match view.enter_full_screen(&id) {
                    Ok(()) => format!("full-screen {id}"),
                    Err(err) => err.to_string(),
                };
            }
            Action::Reload => self.reload(view),
            Action::Close => {
                view.exit_full_screen();
                self.status.clear();
            }
            Action::Ptz(direction) => self.spawn_ptz(view, direction),
            Action::ZoomIn => self.report(view.zoom_in().map(|scale| format!("zoom x{scale:.2}"))),
            Action::ZoomOut => {
                self.report(view.zoom_out().map(|scale| format!("zoom x{scale:.2}")));
            }
            Action::ResetZoom => self.report(view.reset_zoom().map(|()| "zoom reset".to_owned())),
            Action::Pan(dx, dy) => self.report(view.pan(dx, dy).map(|()| String::new())),
            Action::ToggleQuality => self.report(
                view.toggle_quality()
                    .map(|variant| format!("switching to {variant} stream")),
            ),
        }
        AppCommand::None
    }

    fn report(&mut self, outcome: Result<String, crate::error::ViewError>) {
        match outcome {
            Ok(message) if message.is_empty() => {}
            Ok(message) => self.status = message,
            Err(err) => self.status = err.to_string(),
        }
    }

    fn spawn_ptz(&mut self, view: &Wall, direction: PtzDirection) {
        let command = match view.ptz_command(direction) {
            Ok(command) => command,
            Err(err) => {
                self.status = err.to_string();
                return;
            }
        };
        let camera_id = view
            .focus()
            .map(|focus| focus.camera_id.clone())
            .unwrap_or_default();
        self.status = format!("PTZ {direction} -> {camera_id}");
        let tx = self.ptz_tx.clone();
        tokio::spawn(async move {
            let moved = command.await;
            let _ = tx.send(PtzOutcome {
                camera_id,
                direction,
                moved,
            });
        });
    }

    fn reload(&mut self, view: &mut Wall) {
        match WallConfig::load(&self.config_path) {
            Ok(config) => {
                let summary = view.reconcile(&config.endpoints());
                view.set_fullscreen_variant(config.general.fullscreen_variant);
                self.display.set_intervals(
                    config.general.grid_refresh(),
                    config.general.fullscreen_refresh(),
                );
                self.selected = self.selected.min(view.producers().len().saturating_sub(1));
                self.status = if summary.is_noop() {
                    "reloaded: no camera changes".to_owned()
                } else {
                    format!(
                        "reloaded: {} started, {} stopped, {} kept",
                        summary.started.len(),
                        summary.stopped.len(),
                        summary.kept.len()
                    )
                };
                self.config = config;
            }
            Err(err) => {
                warn!("config reload failed: {err:#}");
                self.status = format!("reload failed: {err:#}");
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>, view: &Wall) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(3)])
            .split(frame.area());
        let body = layout[0];
        let cell_px = terminal_cell_pixel_size().unwrap_or(FALLBACK_CELL_PX);
        self.pending_slots.clear();

        if let Some(focus) = view.focus() {
            if let Some(handle) = view.producers().get(&focus.camera_id) {
                let title = format!(
                    "{}  {}  zoom x{:.2}",
                    camera_label(handle),
                    view.focused_variant()
                        .map(|variant| variant.to_string())
                        .unwrap_or_default(),
                    focus.zoom.scale()
                );
                self.draw_camera(frame, body, 0, handle, Some(title), true, cell_px);
            }
        } else if view.producers().is_empty() {
            let body_text = vec![
                Line::from(Span::styled(
                    "No enabled cameras.",
                    Style::default().fg(COLOR_TEXT).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    format!(
                        "Add one with `camwall cameras add <address>`, then press r. Config: {}",
                        self.config_path.display()
                    ),
                    Style::default().fg(COLOR_MUTED),
                )),
            ];
            let panel = Paragraph::new(body_text)
                .block(panel_block("Camera Wall", false))
                .wrap(Wrap { trim: false });
            frame.render_widget(panel, body);
        } else {
            let cells = grid_cells(to_cell_rect(body), view.producers().len());
            for (idx, (handle, cell)) in view.producers().iter().zip(cells).enumerate() {
                let selected = idx == self.selected;
                self.draw_camera(frame, to_rect(cell), idx, handle, None, selected, cell_px);
            }
        }

        let hints: &[(&str, &str)] = if view.is_full_screen() {
            &[
                ("Esc", "Grid"),
                ("Arrows", "PTZ"),
                ("+/-/0", "Zoom"),
                ("WASD", "Pan"),
                ("T", "Quality"),
                ("Q", "Quit"),
            ]
        } else {
            &[("Arrows", "Select"), ("Enter", "Full-screen"), ("R", "Reload"), ("Q", "Quit")]
        };
        let mut footer_spans = action_hint_spans(hints);
        if !self.status.is_empty() {
            footer_spans.push(Span::styled("  |  ", Style::default().fg(COLOR_BORDER)));
            footer_spans.push(Span::styled(
                self.status.clone(),
                status_message_style(&self.status).add_modifier(Modifier::BOLD),
            ));
        }
        let footer_title = footer_title(
            view.producers()
                .iter()
                .map(|handle| handle.current_sink().latest().status),
            self.config.cameras.len(),
        );
        let footer = Paragraph::new(Line::from(footer_spans))
            .style(Style::default().fg(COLOR_TEXT))
            .block(panel_block(&footer_title, false));
        frame.render_widget(footer, layout[1]);
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_camera(
        &mut self,
        frame: &mut ratatui::Frame<'_>,
        area: Rect,
        index: usize,
        handle: &ProducerHandle,
        title: Option<String>,
        selected: bool,
        cell_px: (usize, usize),
    ) {
        let snapshot = handle.current_sink().latest();
        let status_color = status_color(snapshot.status, handle.is_paused());
        let status_text = if handle.is_paused() {
            "paused"
        } else {
            snapshot.status.as_str()
        };
        let label = title.unwrap_or_else(|| camera_label(handle));
        let tile_title = Line::from(vec![
            Span::styled(
                format!(" {GLYPH_BULLET}{} ", index + 1),
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                label,
                Style::default().fg(COLOR_TEXT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {status_text} "), Style::default().fg(status_color)),
        ]);
        let border = if selected {
            COLOR_BORDER_ACTIVE
        } else {
            status_color
        };
        let block = Block::default()
            .title(tile_title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        self.pending_slots.push(Slot {
            index,
            camera_id: handle.id().to_owned(),
            label: camera_label(handle),
            cells: to_cell_rect(inner),
            px_width: usize::from(inner.width) * cell_px.0,
            px_height: usize::from(inner.height) * cell_px.1,
        });
    }
}

fn camera_label(handle: &ProducerHandle) -> String {
    let name = handle.endpoint().display_name.trim();
    if name.is_empty() {
        handle.id().to_owned()
    } else {
        name.to_owned()
    }
}

fn to_cell_rect(rect: Rect) -> CellRect {
    CellRect {
        col: rect.x,
        row: rect.y,
        cols: rect.width,
        rows: rect.height,
    }
}

fn to_rect(cell: CellRect) -> Rect {
    Rect::new(cell.col, cell.row, cell.cols, cell.rows)
}

fn panel_block(title: &str, focused: bool) -> Block<'_> {
    let border_color = if focused {
        COLOR_BORDER_ACTIVE
    } else {
        COLOR_BORDER
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(vec![
            Span::styled(
                " ◉ ",
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                title,
                Style::default().fg(COLOR_TEXT).add_modifier(Modifier::BOLD),
            ),
        ]))
}

fn action_hint_spans(hints: &[(&str, &str)]) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (idx, (key, label)) in hints.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled("  |  ", Style::default().fg(COLOR_BORDER)));
        }
        spans.push(Span::styled(
            format!("[{key}]"),
            Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(format!(" {label}"), Style::default().fg(COLOR_MUTED)));
    }
    spans
}

fn status_color(status: SinkStatus, paused: bool) -> Color {
    if paused {
        return COLOR_MUTED;
    }
    match status {
        SinkStatus::Ready => COLOR_SUCCESS,
        SinkStatus::Connecting => COLOR_WARNING,
        SinkStatus::Failed => COLOR_ERROR,
    }
}

fn status_message_style(status: &str) -> Style {
    let lower = status.to_ascii_lowercase();
    if lower.contains("fail") || lower.contains("error") || lower.contains("no active") {
        Style::default().fg(COLOR_ERROR)
    } else if lower.contains("reloaded") || lower.contains("loaded") || lower.contains("sent") {
        Style::default().fg(COLOR_SUCCESS)
    } else {
        Style::default().fg(COLOR_MUTED)
    }
}

/// Sink statuses of the running producers, against the configured count.
fn footer_title(statuses: impl IntoIterator<Item = SinkStatus>, configured: usize) -> String {
    let (mut streaming, mut enabled) = (0_usize, 0_usize);
    for status in statuses {
        enabled += 1;
        if status == SinkStatus::Ready {
            streaming += 1;
        }
    }
    format!("{streaming} of {enabled} cameras streaming ({configured} configured)")
}

#[cfg(test)]
mod tests {
    use super::{Action, PAN_STEP, footer_title, key_action, move_selection};
    use crate::ptz::PtzDirection;
    use crate::sink::SinkStatus;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn footer_counts_only_ready_sinks_as_streaming() {
        let statuses = [
            SinkStatus::Ready,
            SinkStatus::Connecting,
            SinkStatus::Failed,
            SinkStatus::Ready,
        ];
        assert_eq!(footer_title(statuses, 5), "2 of 4 cameras streaming (5 configured)");
        let none = std::iter::empty();
        assert_eq!(footer_title(none, 0), "0 of 0 cameras streaming (0 configured)");
    }

    #[test]
    fn arrows_select_in_grid_and_steer_ptz_in_full_screen() {
        assert_eq!(
            key_action(key(KeyCode::Left), false),
            Some(Action::Select(PtzDirection::Left))
        );
        assert_eq!(
            key_action(key(KeyCode::Char('j')), false),
            Some(Action::Select(PtzDirection::Down))
        );
        assert_eq!(
            key_action(key(KeyCode::Left), true),
            Some(Action::Ptz(PtzDirection::Left))
        );
    }

    #[test]
    fn full_screen_keys() {
        assert_eq!(key_action(key(KeyCode::Esc), true), Some(Action::Close));
        assert_eq!(key_action(key(KeyCode::Char('+')), true), Some(Action::ZoomIn));
        assert_eq!(key_action(key(KeyCode::Char('-')), true), Some(Action::ZoomOut));
        assert_eq!(key_action(key(KeyCode::Char('0')), true), Some(Action::ResetZoom));
        assert_eq!(
            key_action(key(KeyCode::Char('a')), true),
            Some(Action::Pan(-PAN_STEP, 0.0))
        );
        assert_eq!(key_action(key(KeyCode::Char('t')), true), Some(Action::ToggleQuality));
        assert_eq!(key_action(key(KeyCode::Char('r')), true), None);
    }

    #[test]
    fn grid_keys() {
        assert_eq!(key_action(key(KeyCode::Enter), false), Some(Action::Open));
        assert_eq!(key_action(key(KeyCode::Char('r')), false), Some(Action::Reload));
        assert_eq!(key_action(key(KeyCode::Esc), false), Some(Action::Quit));
        assert_eq!(
            key_action(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), true),
            Some(Action::Quit)
        );
    }

    #[test]
    fn selection_stays_inside_the_grid() {
        // 5 cameras in a 3x2 grid.
        assert_eq!(move_selection(0, 5, 3, PtzDirection::Left), 0);
        assert_eq!(move_selection(0, 5, 3, PtzDirection::Down), 3);
        assert_eq!(move_selection(2, 5, 3, PtzDirection::Down), 2);
        assert_eq!(move_selection(4, 5, 3, PtzDirection::Up), 1);
        assert_eq!(move_selection(4, 5, 3, PtzDirection::Right), 4);
        assert_eq!(move_selection(9, 5, 3, PtzDirection::Left), 3);
        assert_eq!(move_selection(0, 0, 0, PtzDirection::Right), 0);
    }
}
