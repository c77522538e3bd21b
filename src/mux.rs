// src/mux.rs
use std::future::Future;
use std::task::Poll;
use tokio::sync::watch;
use tracing::debug;

use crate::channel::ResultReceiver;

/// Outcome of one selection step.
#[derive(Debug, PartialEq)]
pub enum Selected<T> {
    /// A value arrived on the source with the given registration index.
    Item { source: usize, value: T },
    /// The cancellation signal was raised.
    Cancelled,
    /// Every registered source is drained and closed.
    Closed,
}

struct Source<T> {
    label: String,
    rx: ResultReceiver<T>,
    open: bool,
}

/// Single consuming loop over several result channels: each
/// [`select_next`](Self::select_next) call waits until whichever registered
/// source produces first, without busy-waiting.
///
/// When several sources are ready at once the pick among them is
/// deliberately unspecified, but the poll order rotates after every
/// delivery, so no continuously ready source is starved over repeated
/// iterations. An optional cancellation signal is selected alongside the
/// data sources, which is what lets a blocked loop exit within one step.
pub struct Multiplexer<T> {
    sources: Vec<Source<T>>,
    cancel: Option<watch::Receiver<bool>>,
    next: usize,
}

impl<T> Multiplexer<T> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cancel: None,
            next: 0,
        }
    }

    /// Attaches a cancellation source. Raising it (sending `true`) makes the
    /// current and all future selections resolve to [`Selected::Cancelled`].
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Registers a source and returns its index, echoed back by
    /// [`Selected::Item`].
    pub fn register(&mut self, label: impl Into<String>, rx: ResultReceiver<T>) -> usize {
        self.sources.push(Source {
            label: label.into(),
            rx,
            open: true,
        });
        self.sources.len() - 1
    }

    pub fn label(&self, source: usize) -> Option<&str> {
        self.sources.get(source).map(|s| s.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Waits for the next ready source and returns its value, or reports
    /// cancellation / exhaustion. Safe to call in an unbounded loop.
    pub async fn select_next(&mut self) -> Selected<T> {
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                return Selected::Cancelled;
            }
        }

        let Self {
            sources,
            cancel,
            next,
        } = self;

        let cancelled = async {
            match cancel {
                // A dropped cancel sender means cancellation can no longer
                // be raised; keep selecting on data alone.
                Some(rx) => {
                    if rx.wait_for(|raised| *raised).await.is_err() {
                        std::future::pending::<()>().await
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(cancelled);

        std::future::poll_fn(move |cx| {
            if cancelled.as_mut().poll(cx).is_ready() {
                debug!("multiplexer observed cancellation");
                return Poll::Ready(Selected::Cancelled);
            }

            let n = sources.len();
            if n == 0 {
                return Poll::Ready(Selected::Closed);
            }

            let mut exhausted = 0;
            for offset in 0..n {
                let idx = (*next + offset) % n;
                let source = &mut sources[idx];
                if !source.open {
                    exhausted += 1;
                    continue;
                }
                match source.rx.poll_recv(cx) {
                    Poll::Ready(Some(value)) => {
                        // Rotate the poll order so a busy neighbor cannot
                        // starve the other sources.
                        *next = (idx + 1) % n;
                        return Poll::Ready(Selected::Item { source: idx, value });
                    }
                    Poll::Ready(None) => {
                        source.open = false;
                        exhausted += 1;
                    }
                    Poll::Pending => {}
                }
            }

            if exhausted == n {
                debug!("all multiplexer sources closed");
                Poll::Ready(Selected::Closed)
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

impl<T> Default for Multiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}
