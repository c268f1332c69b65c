//! In-process [`MessageChannel`] for session tests.

use shuttler_core::{InboundMessage, MessageChannel, ShuttlerError, ShuttlerResult, WireFormat};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Shared {
    fail_writes: AtomicBool,
    closes: AtomicUsize,
    reads: AtomicUsize,
}

/// Server side of an in-memory connection.
pub struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<Result<InboundMessage, String>>,
    outbound: mpsc::UnboundedSender<(Vec<u8>, WireFormat)>,
    shared: Arc<Shared>,
}

/// Test side of an in-memory connection.
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Result<InboundMessage, String>>,
    outbound: mpsc::UnboundedReceiver<(Vec<u8>, WireFormat)>,
    shared: Arc<Shared>,
}

pub fn pair() -> (MemoryChannel, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    (
        MemoryChannel {
            inbound: in_rx,
            outbound: out_tx,
            shared: shared.clone(),
        },
        MemoryPeer {
            inbound: in_tx,
            outbound: out_rx,
            shared,
        },
    )
}

impl MemoryPeer {
    pub fn send_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(InboundMessage::text(text)));
    }

    pub fn send(&self, message: InboundMessage) {
        let _ = self.inbound.send(Ok(message));
    }

    /// Make the next read fail with a transport error.
    pub fn break_reads(&self) {
        let _ = self.inbound.send(Err("connection reset".into()));
    }

    pub fn break_writes(&self) {
        self.shared.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Next message written by the server, or `None` once the server side
    /// is dropped.
    pub async fn next(&mut self) -> Option<(Vec<u8>, WireFormat)> {
        self.outbound.recv().await
    }

    /// Next written message parsed as JSON.
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        let (data, _) = self.next().await?;
        Some(serde_json::from_slice(&data).expect("server wrote invalid JSON"))
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }
}

impl MessageChannel for MemoryChannel {
    fn recv(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = ShuttlerResult<Option<InboundMessage>>> + Send + '_>> {
        Box::pin(async move {
            self.shared.reads.fetch_add(1, Ordering::SeqCst);
            match self.inbound.recv().await {
                Some(Ok(message)) => Ok(Some(message)),
                Some(Err(e)) => Err(ShuttlerError::Transport(e)),
                None => Ok(None),
            }
        })
    }

    fn send<'a>(
        &'a mut self,
        data: &'a [u8],
        format: WireFormat,
    ) -> Pin<Box<dyn Future<Output = ShuttlerResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.shared.fail_writes.load(Ordering::SeqCst) {
                return Err(ShuttlerError::Transport("broken pipe".into()));
            }
            self.outbound
                .send((data.to_vec(), format))
                .map_err(|_| ShuttlerError::Transport("peer gone".into()))
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ShuttlerResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
