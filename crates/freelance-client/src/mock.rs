//! In-memory router for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use freelance_common::transport::Router;
use freelance_common::{FreelanceError, Message, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Router recording everything it is asked to do.
#[derive(Debug)]
pub(crate) struct MockRouter {
    sent: Arc<Mutex<Vec<Message>>>,
    connected: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    inbound: mpsc::UnboundedReceiver<Message>,
}

/// Test-side view of a [`MockRouter`]. Dropping every handle shuts the router
/// down.
#[derive(Debug, Clone)]
pub(crate) struct MockHandle {
    sent: Arc<Mutex<Vec<Message>>>,
    connected: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    inbound: mpsc::UnboundedSender<Message>,
}

pub(crate) fn mock_router() -> (MockRouter, MockHandle) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let connected = Arc::new(Mutex::new(Vec::new()));
    let fail_sends = Arc::new(AtomicBool::new(false));

    let router = MockRouter {
        sent: sent.clone(),
        connected: connected.clone(),
        fail_sends: fail_sends.clone(),
        inbound: inbound_rx,
    };
    let handle = MockHandle {
        sent,
        connected,
        fail_sends,
        inbound: inbound_tx,
    };
    (router, handle)
}

impl MockHandle {
    /// Messages sent so far, frame 0 still naming the destination.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Queues an inbound message; frame 0 must be the sender's identity.
    pub fn deliver(&self, message: Message) {
        let _ = self.inbound.send(message);
    }
}

impl Router for MockRouter {
    fn connect(&mut self, endpoint: &str) -> Result<()> {
        if endpoint.is_empty() {
            return Err(FreelanceError::InvalidEndpoint(endpoint.to_string()));
        }
        self.connected.lock().push(endpoint.to_string());
        Ok(())
    }

    fn send(&mut self, message: Message) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(FreelanceError::Transport("send refused".to_string()));
        }
        self.sent.lock().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }
}
