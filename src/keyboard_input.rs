use crate::app::OperatorCommand;
use crate::error::Result;
use crate::events::{EventBus, EventFilter, ScannerEvent};
use crate::router::{CaptureTarget, CapturedValue};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const HELP: &str =
    "[1/2/3] select field  [Tab] next field  [x] reset field  [r] reset all  [s/Enter] submit  [c] restart camera  [q] quit";

/// Map a key press to an operator command
pub fn key_command(key: &KeyEvent) -> Option<OperatorCommand> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(OperatorCommand::Quit);
    }

    let command = match key.code {
        KeyCode::Char('1') => OperatorCommand::SelectTarget(CaptureTarget::PacketId),
        KeyCode::Char('2') => OperatorCommand::SelectTarget(CaptureTarget::StartSequence),
        KeyCode::Char('3') => OperatorCommand::SelectTarget(CaptureTarget::EndSequence),
        KeyCode::Tab => OperatorCommand::NextTarget,
        KeyCode::Char('x') => OperatorCommand::ResetActiveField,
        KeyCode::Char('r') => OperatorCommand::ResetAll,
        KeyCode::Char('s') | KeyCode::Enter => OperatorCommand::Submit,
        KeyCode::Char('c') => OperatorCommand::Restart,
        KeyCode::Char('q') | KeyCode::Esc => OperatorCommand::Quit,
        _ => return None,
    };

    Some(command)
}

/// What the console shows for the three fields
#[derive(Debug, Clone)]
pub struct FieldBoard {
    active: CaptureTarget,
    values: HashMap<CaptureTarget, CapturedValue>,
}

impl FieldBoard {
    pub fn new() -> Self {
        Self {
            active: CaptureTarget::PacketId,
            values: HashMap::new(),
        }
    }

    /// Track field changes; returns true when the board needs redrawing
    pub fn apply(&mut self, event: &ScannerEvent) -> bool {
        match event {
            ScannerEvent::TargetSelected { target } => {
                self.active = *target;
                true
            }
            ScannerEvent::FieldCaptured { target, value, .. } => {
                self.values.insert(*target, value.clone());
                true
            }
            ScannerEvent::FieldReset { target: Some(target) } => {
                self.values.remove(target);
                true
            }
            ScannerEvent::FieldReset { target: None } => {
                self.values.clear();
                true
            }
            _ => false,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Currently scanning: {}", self.active.label())];

        for (index, target) in CaptureTarget::ALL.iter().enumerate() {
            let marker = if *target == self.active { ">" } else { " " };
            let value = self
                .values
                .get(target)
                .map(|value| value.to_string())
                .unwrap_or_else(|| "Not scanned".to_string());
            lines.push(format!(
                "{} [{}] {}: {}",
                marker,
                index + 1,
                target.label(),
                value
            ));
        }

        lines
    }
}

impl Default for FieldBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal console: keys in, field board and status lines out
pub struct OperatorConsole {
    commands: mpsc::Sender<OperatorCommand>,
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl OperatorConsole {
    pub fn new(commands: mpsc::Sender<OperatorCommand>, event_bus: Arc<EventBus>) -> Self {
        Self {
            commands,
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start the renderer and the key reader
    pub async fn start(&self) -> Result<()> {
        info!("Starting operator console");

        self.spawn_renderer();
        self.spawn_key_reader();

        Ok(())
    }

    fn spawn_renderer(&self) {
        let mut receiver = self
            .event_bus
            .subscribe_filtered(EventFilter::All, "console");
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let mut board = FieldBoard::new();
            print_lines(&[HELP.dark_grey().to_string()]);
            print_lines(&board.lines());

            loop {
                let event = tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(event) => event,
                        Err(e) => {
                            debug!("Console renderer stopping: {}", e);
                            break;
                        }
                    },
                };

                if board.apply(&event) {
                    print_lines(&board.lines());
                    continue;
                }

                match event {
                    ScannerEvent::StatusChanged { message, is_error } => {
                        let stamp = chrono::Local::now().format("%H:%M:%S");
                        let line = if is_error {
                            format!("[{}] {}", stamp, message).red().to_string()
                        } else {
                            format!("[{}] {}", stamp, message).green().to_string()
                        };
                        print_lines(&[line]);
                    }
                    ScannerEvent::StreamStateChanged { state, .. } => {
                        print_lines(&[format!("Camera: {:?}", state).cyan().to_string()]);
                    }
                    _ => {}
                }
            }
        });
    }

    fn spawn_key_reader(&self) {
        let commands = self.commands.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for operator console: {}", e);
                return;
            }

            debug!("Raw mode enabled - operator console active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Operator console stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key)) = event::read() else {
                            continue;
                        };
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(command) = key_command(&key) else {
                            debug!("Key pressed: {:?}", key.code);
                            continue;
                        };

                        if commands.blocking_send(command).is_err() {
                            debug!("Session no longer accepts commands");
                            break;
                        }
                        if command == OperatorCommand::Quit {
                            info!("Quit key pressed - requesting shutdown");
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping operator console");
        self.cancellation_token.cancel();

        // Give the key reader a poll interval to leave raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

/// Raw mode needs explicit carriage returns
fn print_lines(lines: &[String]) {
    let mut stdout = std::io::stdout().lock();
    for line in lines {
        let _ = write!(stdout, "{}\r\n", line);
    }
    let _ = stdout.flush();
}
