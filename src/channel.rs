// src/channel.rs
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Semaphore};
use tracing::trace;

use crate::error::{PipelineError, PipelineResult};

/// Buffering policy for a [`ResultChannel`].
///
/// `Rendezvous` gives synchronous handoff: a send completes only once a
/// matching receive has taken a value off the channel. `Bounded(c)` allows up
/// to `c` sends to complete without a waiting reader; `Unbounded` never makes
/// a sender wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Rendezvous,
    Bounded(usize),
    Unbounded,
}

impl Capacity {
    /// Maps a numeric capacity to a policy: 0 is a rendezvous channel,
    /// anything larger is a buffer of that size.
    pub fn of(capacity: usize) -> Self {
        if capacity == 0 {
            Capacity::Rendezvous
        } else {
            Capacity::Bounded(capacity)
        }
    }
}

/// Creates the sender/receiver halves of a result conduit.
///
/// The channel is FIFO: a single receiver observes values in the order they
/// were sent. Any number of senders may share the sending half by cloning it;
/// the channel serializes their writes internally, so callers never need
/// external locking.
pub fn result_channel<T>(capacity: Capacity) -> (ResultSender<T>, ResultReceiver<T>) {
    match capacity {
        Capacity::Rendezvous => {
            // One in-flight slot plus an ack permit per completed read. A
            // sender parks on the ack semaphore until some receive happens,
            // which is what makes the handoff synchronous.
            let (tx, rx) = mpsc::channel(1);
            let ack = Arc::new(Semaphore::new(0));
            (
                ResultSender {
                    tx: Tx::Bounded(tx),
                    ack: Some(ack.clone()),
                },
                ResultReceiver {
                    rx: Rx::Bounded(rx),
                    ack: Some(ack),
                },
            )
        }
        Capacity::Bounded(c) => {
            let (tx, rx) = mpsc::channel(c);
            (
                ResultSender {
                    tx: Tx::Bounded(tx),
                    ack: None,
                },
                ResultReceiver {
                    rx: Rx::Bounded(rx),
                    ack: None,
                },
            )
        }
        Capacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                ResultSender {
                    tx: Tx::Unbounded(tx),
                    ack: None,
                },
                ResultReceiver {
                    rx: Rx::Unbounded(rx),
                    ack: None,
                },
            )
        }
    }
}

enum Tx<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

enum Rx<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

/// The sending half of a result channel. Cloneable across workers.
pub struct ResultSender<T> {
    tx: Tx<T>,
    ack: Option<Arc<Semaphore>>,
}

impl<T> Clone for ResultSender<T> {
    fn clone(&self) -> Self {
        let tx = match &self.tx {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        };
        Self {
            tx,
            ack: self.ack.clone(),
        }
    }
}

impl<T> ResultSender<T> {
    /// Sends a value, waiting for buffer space (or, on a rendezvous channel,
    /// for a matching receive).
    ///
    /// Sending to a channel whose receiver was dropped or closed returns
    /// `ChannelClosed` and discards the value; it never panics, so workers
    /// whose batch was abandoned can finish quietly.
    pub async fn send(&self, value: T) -> PipelineResult<()> {
        match &self.tx {
            Tx::Bounded(tx) => {
                tx.send(value)
                    .await
                    .map_err(|_| PipelineError::ChannelClosed("receiver dropped".to_string()))?;
            }
            Tx::Unbounded(tx) => {
                tx.send(value)
                    .map_err(|_| PipelineError::ChannelClosed("receiver dropped".to_string()))?;
            }
        }

        if let Some(ack) = &self.ack {
            // The value is in the slot; wait for a read to claim it. A closed
            // ack semaphore means the receiver went away mid-handoff.
            match ack.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    trace!("rendezvous receiver dropped before handoff completed");
                    return Err(PipelineError::ChannelClosed(
                        "receiver dropped during handoff".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Attempts to send without waiting. Fails with `ChannelClosed` if the
    /// receiver is gone, or `InvalidInput` if the buffer is full (rendezvous
    /// channels always report full when no receive is pending).
    pub fn try_send(&self, value: T) -> PipelineResult<()> {
        if self.ack.is_some() {
            return Err(PipelineError::InvalidInput(
                "try_send is not supported on a rendezvous channel".to_string(),
            ));
        }
        match &self.tx {
            Tx::Bounded(tx) => tx.try_send(value).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    PipelineError::InvalidInput("channel full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    PipelineError::ChannelClosed("receiver dropped".to_string())
                }
            }),
            Tx::Unbounded(tx) => tx
                .send(value)
                .map_err(|_| PipelineError::ChannelClosed("receiver dropped".to_string())),
        }
    }

    /// True once the receiving half is gone and further sends would fail.
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Tx::Bounded(tx) => tx.is_closed(),
            Tx::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// The receiving half of a result channel.
pub struct ResultReceiver<T> {
    rx: Rx<T>,
    ack: Option<Arc<Semaphore>>,
}

impl<T> ResultReceiver<T> {
    /// Receives the next value, waiting until one is available. Returns
    /// `None` once every sender is dropped and the buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        let value = match &mut self.rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        };
        if value.is_some() {
            if let Some(ack) = &self.ack {
                ack.add_permits(1);
            }
        }
        value
    }

    /// Non-blocking receive of whatever is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        let value = match &mut self.rx {
            Rx::Bounded(rx) => rx.try_recv().ok(),
            Rx::Unbounded(rx) => rx.try_recv().ok(),
        };
        if value.is_some() {
            if let Some(ack) = &self.ack {
                ack.add_permits(1);
            }
        }
        value
    }

    /// Polls for the next value; used by the multiplexer so one loop can
    /// wait on several receivers at once.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let polled = match &mut self.rx {
            Rx::Bounded(rx) => rx.poll_recv(cx),
            Rx::Unbounded(rx) => rx.poll_recv(cx),
        };
        if let Poll::Ready(Some(_)) = &polled {
            if let Some(ack) = &self.ack {
                ack.add_permits(1);
            }
        }
        polled
    }

    /// Declares the batch complete: further sends fail immediately instead
    /// of blocking, while values already buffered remain receivable.
    pub fn close(&mut self) {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.close(),
            Rx::Unbounded(rx) => rx.close(),
        }
        if let Some(ack) = &self.ack {
            ack.close();
        }
    }
}

impl<T> Drop for ResultReceiver<T> {
    fn drop(&mut self) {
        // Wake any sender parked mid-handoff so it can observe the closure.
        if let Some(ack) = &self.ack {
            ack.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn buffered_channel_is_fifo() {
        let (tx, mut rx) = result_channel(Capacity::Bounded(4));
        for i in 0..4 {
            tx.send(i).await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn bounded_send_waits_for_reader() {
        let (tx, mut rx) = result_channel(Capacity::Bounded(1));
        tx.send(1).await.unwrap();

        let sender = tokio::spawn(async move {
            tx.send(2).await.unwrap();
        });

        // The second send cannot complete until the first value is read.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished());

        assert_eq!(rx.recv().await, Some(1));
        sender.await.unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn rendezvous_send_completes_only_on_receive() {
        let (tx, mut rx) = result_channel(Capacity::Rendezvous);

        let sender = tokio::spawn(async move {
            tx.send("hello").await.unwrap();
            "sent"
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished());

        assert_eq!(rx.recv().await, Some("hello"));
        assert_eq!(sender.await.unwrap(), "sent");
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_errors_without_panic() {
        let (tx, rx) = result_channel(Capacity::Bounded(1));
        drop(rx);
        assert!(matches!(
            tx.send(1).await,
            Err(PipelineError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn rendezvous_sender_unblocks_when_receiver_drops() {
        let (tx, rx) = result_channel(Capacity::Rendezvous);

        let sender = tokio::spawn(async move { tx.send(7).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(rx);

        assert!(matches!(
            sender.await.unwrap(),
            Err(PipelineError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn close_keeps_buffered_values_receivable() {
        let (tx, mut rx) = result_channel(Capacity::Bounded(4));
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        rx.close();

        assert!(tx.send(3).await.is_err());
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }
}
