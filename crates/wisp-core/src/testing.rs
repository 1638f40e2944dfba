//! In-memory transport for exercising the engine without hardware.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::transport::{ProvisioningDevice, Transport, TransportEvent, TransportKind};

type Responder = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

struct Inner {
    sent: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    silent: bool,
    connected: bool,
    discovering: bool,
}

/// Scriptable transport. Replies come from a queue of canned frames or a
/// responder closure; `silent` suppresses both so timeout paths can be
/// exercised.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
    events: mpsc::Sender<TransportEvent>,
}

impl MockTransport {
    /// Build a mock and the event receiver to hand the engine.
    pub fn new() -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let mock = Self {
            inner: Arc::new(Mutex::new(Inner {
                sent: Vec::new(),
                replies: VecDeque::new(),
                responder: None,
                silent: false,
                connected: false,
                discovering: false,
            })),
            events: tx,
        };
        (mock, rx)
    }

    /// Queue one canned reply frame for the next write.
    pub fn queue_reply(&self, frame: Vec<u8>) {
        self.inner.lock().replies.push_back(frame);
    }

    /// Compute replies from the written frame. Returning `None` leaves the
    /// write unanswered.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.inner.lock().responder = Some(Box::new(responder));
    }

    /// Swallow all writes without replying.
    pub fn set_silent(&self, silent: bool) {
        self.inner.lock().silent = silent;
    }

    /// Frames written so far, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.inner.lock().sent.clone()
    }

    /// Emit an advertisement as if discovery saw a device.
    pub fn inject_advertisement(&self, id: &str, name: &str, rssi: i16) {
        let device = ProvisioningDevice {
            id: id.to_owned(),
            name: name.to_owned(),
            rssi: Some(rssi),
            kind: TransportKind::Ble,
            service_id: "test-service".to_owned(),
        };
        let _ = self.events.try_send(TransportEvent::Advertisement(device));
    }

    /// Emit a raw frame event outside the request flow.
    pub fn inject_frame(&self, frame: Vec<u8>) {
        let _ = self.events.try_send(TransportEvent::Frame(frame));
    }

    /// Emit a disconnect event.
    pub fn inject_disconnect(&self) {
        let _ = self.events.try_send(TransportEvent::Disconnected);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_discovery(&self) -> Result<(), TransportError> {
        self.inner.lock().discovering = true;
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        self.inner.lock().discovering = false;
        Ok(())
    }

    async fn connect(&self, _device_id: &str) -> Result<(), TransportError> {
        self.inner.lock().connected = true;
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let reply = {
            let mut inner = self.inner.lock();
            inner.sent.push(frame.to_vec());
            if inner.silent {
                None
            } else if let Some(responder) = &inner.responder {
                responder(frame)
            } else {
                inner.replies.pop_front()
            }
        };
        if let Some(frame) = reply {
            let _ = self.events.send(TransportEvent::Frame(frame)).await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.lock().connected = false;
        Ok(())
    }

    async fn dispose(&self) {
        let mut inner = self.inner.lock();
        inner.connected = false;
        inner.discovering = false;
    }
}
