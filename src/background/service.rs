use std::sync::mpsc::{self, Sender, TryRecvError};
use std::thread::JoinHandle;

use super::Orchestrator;
use crate::runtime::{RuntimeError, RuntimeInbox};
use crate::worker::{spawn_worker, ACTOR_POLL_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundCommand {
    /// Toolbar button or browser command.
    Toggle,
    Shutdown,
}

/// Runs the orchestrator on its own thread, serving toolbar commands and
/// content messages in arrival order.
pub struct BackgroundService {
    orchestrator: Orchestrator,
    inbox: RuntimeInbox,
}

impl BackgroundService {
    pub fn new(orchestrator: Orchestrator, inbox: RuntimeInbox) -> Self {
        Self {
            orchestrator,
            inbox,
        }
    }

    pub fn spawn(self) -> std::io::Result<BackgroundHandle> {
        let (tx, rx) = mpsc::channel();
        let thread = spawn_worker("got-clue-background", move || self.run(rx))?;
        Ok(BackgroundHandle {
            commands: tx,
            thread: Some(thread),
        })
    }

    fn run(mut self, commands: mpsc::Receiver<BackgroundCommand>) -> Orchestrator {
        self.orchestrator.on_startup();
        let mut inbox_open = true;
        loop {
            match commands.try_recv() {
                Ok(BackgroundCommand::Toggle) => {
                    let outcome = self.orchestrator.toggle_selection();
                    tracing::debug!(?outcome, "toolbar toggle handled");
                }
                Ok(BackgroundCommand::Shutdown) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if !inbox_open {
                std::thread::sleep(ACTOR_POLL_INTERVAL);
                continue;
            }
            match self.inbox.recv_timeout(ACTOR_POLL_INTERVAL) {
                Ok(Some(incoming)) => self.orchestrator.handle_message(incoming),
                Ok(None) => {}
                Err(RuntimeError::ContextInvalidated) => {
                    tracing::debug!("all content ports closed");
                    inbox_open = false;
                }
                Err(err) => tracing::warn!(%err, "runtime inbox error"),
            }
        }
        tracing::debug!("background service stopped");
        self.orchestrator
    }
}

pub struct BackgroundHandle {
    commands: Sender<BackgroundCommand>,
    thread: Option<JoinHandle<Orchestrator>>,
}

impl BackgroundHandle {
    pub fn toggle(&self) -> bool {
        self.commands.send(BackgroundCommand::Toggle).is_ok()
    }

    /// Stops the service and hands back the orchestrator.
    pub fn shutdown(mut self) -> Option<Orchestrator> {
        let _ = self.commands.send(BackgroundCommand::Shutdown);
        self.thread.take()?.join().ok()
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(BackgroundCommand::Shutdown);
            if thread.join().is_err() {
                tracing::warn!("background thread panicked");
            }
        }
    }
}
