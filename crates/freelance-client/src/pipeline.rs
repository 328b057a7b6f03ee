use std::time::Duration;

use freelance_common::transport::Router;
use freelance_common::{FreelanceError, Message};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::manager::Manager;

/// Outcome of one wait on the pipeline's inputs.
#[derive(Debug)]
enum Readiness {
    /// Whatever was ready on either input; at least one is set
    Messages {
        command: Option<Message>,
        reply: Option<Message>,
    },
    Timeout,
    /// The application or the transport went away for good
    Shutdown,
}

/// Event loop driving a [`Manager`].
///
/// One iteration:
/// 1. compute the wait budget from the manager's schedule;
/// 2. wait for an application command, a server message or the budget to run
///    out;
/// 3. exit on shutdown;
/// 4. hand the command, then the server message, to the manager;
/// 5. fail the in-flight request if it expired, otherwise (re)send it;
/// 6. evict servers past their TTL and ping those that are due.
///
/// All manager state is touched from this single task.
pub struct Pipeline<R: Router> {
    manager: Manager<R>,
    commands: mpsc::UnboundedReceiver<Message>,
}

impl<R: Router + 'static> Pipeline<R> {
    pub fn new(manager: Manager<R>, commands: mpsc::UnboundedReceiver<Message>) -> Self {
        Self { manager, commands }
    }

    /// Starts the loop on its own task. Aborting the handle cancels it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Runs until the application drops its command sender, the transport
    /// shuts down, or the application breaks the single-request contract.
    pub async fn run(mut self) {
        info!("Pipeline started");

        loop {
            let timeout = self.manager.next_timeout();

            match self.wait(timeout).await {
                Readiness::Shutdown => {
                    info!("Pipeline stopped: shutdown signalled");
                    break;
                }
                Readiness::Messages { command, reply } => {
                    if let Some(message) = command {
                        match self.manager.process_outbox(message) {
                            Ok(()) => {}
                            Err(FreelanceError::RequestInFlight) => {
                                error!("Request submitted while another one is in flight, stopping pipeline");
                                break;
                            }
                            Err(e) => warn!("Failed to process application message: {}", e),
                        }
                    }
                    if let Some(message) = reply {
                        self.manager.process_inbox(message);
                    }
                }
                Readiness::Timeout => {}
            }

            if self.manager.is_processing_request() {
                if self.manager.is_request_expired() {
                    self.manager.fail_current_request();
                } else {
                    self.manager.send_request_to_first_active_server();
                }
            }

            self.manager.evict_unresponsive_servers();
            self.manager.ping_all_servers();
        }
    }

    async fn wait(&mut self, timeout: Duration) -> Readiness {
        let commands = &mut self.commands;
        let router = self.manager.router_mut();

        let readiness = tokio::select! {
            command = commands.recv() => match command {
                Some(message) => Readiness::Messages { command: Some(message), reply: None },
                None => Readiness::Shutdown,
            },
            reply = router.recv() => match reply {
                Some(message) => Readiness::Messages { command: None, reply: Some(message) },
                None => Readiness::Shutdown,
            },
            _ = tokio::time::sleep(timeout) => Readiness::Timeout,
        };

        // one wake-up serves both inputs when both are ready
        match readiness {
            Readiness::Messages { command: Some(command), .. } => Readiness::Messages {
                command: Some(command),
                reply: self.poll_reply().await,
            },
            Readiness::Messages { reply: Some(reply), .. } => Readiness::Messages {
                command: self.commands.try_recv().ok(),
                reply: Some(reply),
            },
            other => other,
        }
    }

    /// A server message that is ready now, without waiting for one.
    async fn poll_reply(&mut self) -> Option<Message> {
        // the inner future is polled once before the zero deadline is checked
        tokio::time::timeout(Duration::ZERO, self.manager.router_mut().recv())
            .await
            .ok()
            .flatten()
    }
}
