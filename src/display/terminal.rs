use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io::{self, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::FrameClock;
use crate::app::App;
use crate::audio::PulseDevices;
use crate::color::Rgba;
use crate::config::Config;
use crate::controller::RenderLoop;
use crate::ipc::{self, IpcCommand};
use crate::renderer::Canvas;

/// Input poll interval while no frame is pending.
const IDLE_POLL: Duration = Duration::from_millis(100);

type TerminalApp = App<PulseDevices, Canvas, FrameClock>;

pub async fn run(
    config: Config,
    config_path: Option<PathBuf>,
    ipc_rx: mpsc::Receiver<IpcCommand>,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = {
        let _panics = PanicLogGuard::install();
        run_app(&mut terminal, config, config_path, ipc_rx).await
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: Config,
    config_path: Option<PathBuf>,
    mut ipc_rx: mpsc::Receiver<IpcCommand>,
) -> Result<()> {
    let controller = RenderLoop::new(
        PulseDevices::new(config.audio.sample_rate),
        Canvas::new(0, 0),
        FrameClock::new(config.display.fps),
        config.analyser.clone(),
        config.visualizer.clone(),
        config.display.clone(),
    );
    let mut app = App::new(controller, config.audio.device.clone(), config_path);

    if let Err(e) = app.start(None) {
        warn!("Could not start capture: {}", e);
    }
    info!("Control socket: {}", ipc::socket_path().display());

    loop {
        while let Ok(cmd) = ipc_rx.try_recv() {
            ipc::process_ipc_command(cmd, &mut app);
        }

        // Two pixel rows per cell, last row reserved for the status line
        let size = terminal.size()?;
        let rows = size.height.saturating_sub(1) as usize;
        app.controller_mut()
            .surface_mut()
            .resize(size.width as usize, rows * 2);

        let controller = app.controller_mut();
        if let Some(handle) = controller.scheduler_mut().take_due(Instant::now()) {
            controller.on_frame(handle);
        }

        terminal.draw(|frame| {
            let area = frame.area();
            let scope_area = Rect::new(area.x, area.y, area.width, area.height.saturating_sub(1));
            frame.render_widget(CanvasView(app.controller().surface()), scope_area);
            render_status(frame, area, &app);
        })?;

        let timeout = app
            .controller()
            .scheduler()
            .time_until_due(Instant::now())
            .unwrap_or(IDLE_POLL);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !handle_key(key, &mut app) {
                    break;
                }
            }
        }
    }

    app.stop();
    Ok(())
}

/// Sends panic reports to the log instead of stderr while the screen is in
/// raw mode. Dropping it restores the default hook.
struct PanicLogGuard;

impl PanicLogGuard {
    fn install() -> Self {
        std::panic::set_hook(Box::new(|info| {
            error!("{}", info);
        }));
        Self
    }
}

impl Drop for PanicLogGuard {
    fn drop(&mut self) {
        let _ = std::panic::take_hook();
    }
}

/// Apply a key press. Returns false when the user asked to quit.
fn handle_key(key: KeyEvent, app: &mut TerminalApp) -> bool {
    match key {
        KeyEvent {
            code: KeyCode::Char('q'),
            ..
        }
        | KeyEvent {
            code: KeyCode::Char('c'),
            modifiers: KeyModifiers::CONTROL,
            ..
        } => return false,
        KeyEvent {
            code: KeyCode::Char(' '),
            ..
        } => app.toggle(),
        KeyEvent {
            code: KeyCode::Char('s'),
            ..
        } => {
            app.next_style();
        }
        KeyEvent {
            code: KeyCode::Char('c'),
            modifiers: KeyModifiers::NONE,
            ..
        } => {
            app.next_color();
        }
        KeyEvent {
            code: KeyCode::Char('d'),
            ..
        } => {
            if let Err(e) = app.next_device() {
                warn!("Device switch failed: {}", e);
            }
        }
        _ => {}
    }
    true
}

/// Blits the canvas using upper half blocks: foreground is the top pixel,
/// background the bottom one.
struct CanvasView<'a>(&'a Canvas);

fn cell_color(px: Rgba) -> Color {
    Color::Rgb(px.r, px.g, px.b)
}

impl Widget for CanvasView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let canvas = self.0;
        for row in 0..area.height {
            for col in 0..area.width {
                let x = col as usize;
                let y = row as usize * 2;
                if let Some(cell) = buf.cell_mut((area.x + col, area.y + row)) {
                    cell.set_char('▀')
                        .set_fg(cell_color(canvas.get_pixel(x, y)))
                        .set_bg(cell_color(canvas.get_pixel(x, y + 1)));
                }
            }
        }
    }
}

fn render_status(frame: &mut Frame, area: Rect, app: &TerminalApp) {
    if area.height == 0 {
        return;
    }
    let status = app.status_line();
    let y = area.y + area.height - 1;
    let color = if app.controller().is_active() {
        Color::DarkGray
    } else {
        Color::Yellow
    };

    for (i, ch) in status.chars().enumerate() {
        if i < area.width as usize {
            let cell = frame.buffer_mut().cell_mut((area.x + i as u16, y));
            if let Some(cell) = cell {
                cell.set_char(ch);
                cell.set_fg(color);
            }
        }
    }
}
