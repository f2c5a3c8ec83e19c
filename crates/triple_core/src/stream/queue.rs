use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

use crate::error::QueueClosed;

struct Handoff<T> {
    value: T,
    delivered: oneshot::Sender<()>,
}

/// An unbuffered, in-order hand-off between one writer and one reader.
///
/// `put` returns only once a matching `get` has taken the value, so a value
/// is never parked in the queue on behalf of a writer that has moved on. A
/// `put` that is cancelled before its value is taken delivers nothing.
///
/// Closing the writer side is how the end of a direction is signalled:
/// readers drain whatever hand-off is in flight and then see `None`.
pub struct Rendezvous<T> {
    tx: Mutex<Option<mpsc::Sender<Handoff<T>>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Handoff<T>>>,
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Hand `value` to the reader, waiting until it has been taken.
    pub async fn put(&self, value: T) -> Result<(), QueueClosed> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| QueueClosed)?
            .clone()
            .ok_or(QueueClosed)?;

        let (delivered, taken) = oneshot::channel();
        tx.send(Handoff { value, delivered })
            .await
            .map_err(|_| QueueClosed)?;
        // only the queue itself may keep the writer side open
        drop(tx);

        taken.await.map_err(|_| QueueClosed)
    }

    /// Take the next value, or `None` once the writer side is closed.
    pub async fn get(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        loop {
            let handoff = rx.recv().await?;
            // skip values whose writer gave up waiting
            if handoff.delivered.send(()).is_ok() {
                return Some(handoff.value);
            }
        }
    }

    /// Close the writer side. Values already handed to `put` are still
    /// delivered.
    pub fn close_writer(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    /// Close both sides. Pending writers fail with [`QueueClosed`] unless a
    /// reader is already waiting for their value.
    pub fn close(&self) {
        self.close_writer();
        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
            while rx.try_recv().is_ok() {}
        }
    }

    pub fn is_writer_closed(&self) -> bool {
        self.tx.lock().map(|tx| tx.is_none()).unwrap_or(true)
    }
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}
