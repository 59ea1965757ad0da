//! Work and result channels
//!
//! Thin wrapper over tokio's mpsc channels that supports both the bounded and
//! unbounded flavours behind one type and allows any number of readers.
//!
//! ## Closure
//!
//! The channel closes when the last [`ItemSender`] is dropped. Readers keep
//! receiving buffered items after that point; `recv()` only yields `None`
//! once the buffer is empty *and* every sender is gone. Sources take their
//! sender by value, so the close event happens exactly once, when the
//! source returns, and nothing can be sent after it.
//!
//! ## Backpressure
//!
//! With a capacity, `send()` waits for room in the buffer. This is how the
//! queue source couples broker acknowledgements to downstream progress.

use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

enum Tx<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

enum Rx<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> Rx<T> {
    async fn recv(&mut self) -> Option<T> {
        match self {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Option<T> {
        match self {
            Rx::Bounded(rx) => rx.try_recv().ok(),
            Rx::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}

/// Writing half of an item channel
pub struct ItemSender<T> {
    tx: Tx<T>,
}

impl<T> Clone for ItemSender<T> {
    fn clone(&self) -> Self {
        let tx = match &self.tx {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        };
        Self { tx }
    }
}

impl<T> ItemSender<T> {
    /// Send one item
    ///
    /// Waits for capacity on bounded channels. Fails with
    /// [`Error::ChannelClosed`] once every receiver has been dropped; the
    /// item is lost in that case, which callers treat as "not enqueued".
    pub async fn send(&self, item: T) -> Result<()> {
        match &self.tx {
            Tx::Bounded(tx) => tx.send(item).await.map_err(|_| Error::ChannelClosed),
            Tx::Unbounded(tx) => tx.send(item).map_err(|_| Error::ChannelClosed),
        }
    }

    /// Whether all receivers are gone
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Tx::Bounded(tx) => tx.is_closed(),
            Tx::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Reading half of an item channel
///
/// Clones share the same underlying queue; each item is delivered to exactly
/// one reader.
pub struct ItemReceiver<T> {
    rx: Arc<Mutex<Rx<T>>>,
}

impl<T> Clone for ItemReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> ItemReceiver<T> {
    /// Receive the next item, or `None` once the channel is closed and drained
    ///
    /// Cancellation-safe: dropping the future never loses an item.
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Take an already buffered item without waiting
    ///
    /// Returns `None` when the buffer is empty or another reader currently
    /// holds the queue. Sinks use it to batch whatever is ready and flush
    /// once it runs out, before parking in [`recv`](Self::recv).
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv()
    }
}

/// Create an item channel
///
/// `capacity = None` gives an unbounded channel, `Some(n)` a bounded one
/// holding at most `n` buffered items (`n` is clamped to at least 1).
pub fn item_channel<T>(capacity: Option<usize>) -> (ItemSender<T>, ItemReceiver<T>) {
    let (tx, rx) = match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (Tx::Bounded(tx), Rx::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Tx::Unbounded(tx), Rx::Unbounded(rx))
        }
    };

    (
        ItemSender { tx },
        ItemReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn readers_drain_buffer_before_seeing_closure() {
        let (tx, rx) = item_channel(None);
        tx.send("a.com").await.unwrap();
        tx.send("b.com").await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some("a.com"));
        assert_eq!(rx.recv().await, Some("b.com"));
        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn send_fails_once_all_receivers_dropped() {
        let (tx, rx) = item_channel::<String>(Some(4));
        let second = rx.clone();
        drop(rx);
        assert!(!tx.is_closed());

        drop(second);
        assert!(tx.is_closed());
        assert!(matches!(
            tx.send("late.com".to_string()).await,
            Err(Error::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn bounded_channel_applies_backpressure() {
        let (tx, rx) = item_channel(Some(1));
        tx.send(1).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(2)).await;
        assert!(blocked.is_err(), "second send should wait for capacity");

        assert_eq!(rx.recv().await, Some(1));
        tx.send(3).await.unwrap();
        assert_eq!(rx.try_recv(), Some(3));
    }

    #[tokio::test]
    async fn cloned_readers_split_the_stream() {
        let (tx, rx) = item_channel(None);
        for n in 0..100 {
            tx.send(n).await.unwrap();
        }
        drop(tx);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let rx = rx.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(n) = rx.recv().await {
                    seen.push(n);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
