//! Per-turn event queue.
//!
//! An unbounded single-producer, single-consumer FIFO. The terminal
//! [`StreamEvent::Done`] cannot be sent through [`TurnSink::send`]; it is
//! emitted exactly once when the sink is closed or dropped.

use tokio::sync::mpsc;

use scout_core::StreamEvent;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("turn queue closed")]
    Closed,
    #[error("Done is emitted by closing the sink")]
    SentinelReserved,
}

/// Create a connected sink/stream pair for one turn.
pub fn turn_queue() -> (TurnSink, TurnStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TurnSink { tx: Some(tx) }, TurnStream { rx })
}

/// Producer half.
#[derive(Debug)]
pub struct TurnSink {
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl TurnSink {
    pub fn send(&self, event: StreamEvent) -> Result<(), QueueError> {
        if event.is_terminal() {
            return Err(QueueError::SentinelReserved);
        }
        match &self.tx {
            Some(tx) => tx.send(event).map_err(|_| QueueError::Closed),
            None => Err(QueueError::Closed),
        }
    }

    /// True once the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Push `Done` and release the sender.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Consumer may already be gone
            let _ = tx.send(StreamEvent::Done);
        }
    }
}

impl Drop for TurnSink {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct TurnStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl TurnStream {
    /// Next event in arrival order. `None` only if the sink vanished without
    /// running its destructor.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}
