use super::{OperatorCommand, ScannerSession, ShutdownReason};
use crate::error::Result;
use crate::router::ResetScope;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};

impl ScannerSession {
    /// Run the session loop until the operator quits or a signal arrives.
    ///
    /// Decode events and operator commands are handled one at a time. A
    /// closed command channel is treated like `Quit`.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<OperatorCommand>,
    ) -> Result<ShutdownReason> {
        info!("Packet scanner session is running");

        let (shutdown_sender, mut shutdown_receiver) = oneshot::channel();
        setup_signal_handlers(shutdown_sender);

        if let Err(e) = self.start_scanning().await {
            error!("Camera unavailable at startup: {}", e);
        }

        let reason = loop {
            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.unwrap_or_else(|_| ShutdownReason::Signal("unknown".to_string()));
                }
                command = commands.recv() => match command {
                    Some(OperatorCommand::Quit) => break ShutdownReason::UserRequest,
                    Some(command) => self.apply(command).await,
                    None => break ShutdownReason::ConsoleClosed,
                },
                Some(event) = self.next_decode_event() => {
                    self.handle_decode_event(event).await;
                }
            }
        };

        info!("Shutdown initiated: {:?}", reason);
        self.shutdown(&reason).await;

        Ok(reason)
    }

    /// Apply one operator command
    pub async fn apply(&mut self, command: OperatorCommand) {
        debug!("Operator command: {:?}", command);

        match command {
            OperatorCommand::SelectTarget(target) => self.select_target(target),
            OperatorCommand::NextTarget => self.select_next_target(),
            OperatorCommand::ResetField(target) => self.reset(target),
            OperatorCommand::ResetActiveField => {
                let target = self.router().active_target();
                self.reset(target);
            }
            OperatorCommand::ResetAll => self.reset(ResetScope::All),
            OperatorCommand::Submit => {
                let _ = self.submit().await;
            }
            OperatorCommand::Restart => {
                let _ = self.restart_scanning().await;
            }
            OperatorCommand::Quit => {}
        }
    }
}

fn setup_signal_handlers(shutdown_sender: oneshot::Sender<ShutdownReason>) {
    let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

    // SIGTERM (systemd stop), Unix only
    #[cfg(unix)]
    {
        let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };

            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM signal");
                if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }
        });
    }

    let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
            }
        }
    });
}
