use crate::error::{AssistError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;

/// One side of a [`tee`]: a byte stream carrying the source's chunks in
/// order. A mirror branch that fell behind ends early.
pub struct TeeBranch {
    rx: mpsc::Receiver<Result<Bytes>>,
    pump: AbortHandle,
}

impl TeeBranch {
    /// Handle to the task reading the shared source. Aborting it drops the
    /// source and ends both branches.
    pub fn source_handle(&self) -> AbortHandle {
        self.pump.clone()
    }
}

impl Stream for TeeBranch {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Split one byte stream into a primary copy and a mirror copy.
///
/// Both branches buffer at most `capacity` chunks. The primary branch
/// backpressures the source: when it is full the source is not read again
/// until it drains. The mirror never holds up the primary; if it falls a
/// full buffer behind it is detached and ends. A dropped branch is detached
/// and the other keeps receiving. A source error is delivered to both
/// branches and ends them.
pub fn tee<S>(source: S, capacity: usize) -> (TeeBranch, TeeBranch)
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let capacity = capacity.max(1);
    let (primary_tx, primary_rx) = mpsc::channel(capacity);
    let (mirror_tx, mirror_rx) = mpsc::channel(capacity);

    let pump = tokio::spawn(run_pump(Box::pin(source), primary_tx, mirror_tx)).abort_handle();

    (
        TeeBranch {
            rx: primary_rx,
            pump: pump.clone(),
        },
        TeeBranch {
            rx: mirror_rx,
            pump,
        },
    )
}

type Branch = Option<mpsc::Sender<Result<Bytes>>>;

async fn run_pump<S>(
    mut source: Pin<Box<S>>,
    primary: mpsc::Sender<Result<Bytes>>,
    mirror: mpsc::Sender<Result<Bytes>>,
) where
    S: Stream<Item = Result<Bytes>> + Send,
{
    let mut primary: Branch = Some(primary);
    let mut mirror: Branch = Some(mirror);
    let mut forwarded = 0usize;

    while primary.is_some() || mirror.is_some() {
        let next = tokio::select! {
            item = source.next() => item,
            _ = all_closed(&primary, &mirror) => {
                tracing::debug!(forwarded, "Both tee branches dropped, releasing source");
                return;
            }
        };

        match next {
            Some(Ok(chunk)) => {
                forwarded += chunk.len();
                deliver(&mut primary, Ok(chunk.clone())).await;
                offer(&mut mirror, Ok(chunk));
            }
            Some(Err(e)) => {
                let message = e.to_string();
                tracing::warn!(error = %message, "Tee source failed");
                deliver(&mut primary, Err(AssistError::Transport(message.clone()))).await;
                offer(&mut mirror, Err(AssistError::Transport(message)));
                return;
            }
            None => break,
        }
    }

    tracing::debug!(forwarded, "Tee source exhausted");
}

/// Send with backpressure; a closed branch is detached.
async fn deliver(branch: &mut Branch, item: Result<Bytes>) {
    if let Some(tx) = branch.as_ref()
        && tx.send(item).await.is_err()
    {
        tracing::debug!("Tee branch dropped, detaching");
        *branch = None;
    }
}

/// Send without waiting; a full or closed branch is detached.
fn offer(branch: &mut Branch, item: Result<Bytes>) {
    let Some(tx) = branch.as_ref() else {
        return;
    };

    match tx.try_send(item) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Tee mirror fell behind, detaching");
            *branch = None;
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("Tee mirror dropped, detaching");
            *branch = None;
        }
    }
}

async fn all_closed(primary: &Branch, mirror: &Branch) {
    match (primary, mirror) {
        (Some(p), Some(m)) => {
            tokio::join!(p.closed(), m.closed());
        }
        (Some(p), None) => p.closed().await,
        (None, Some(m)) => m.closed().await,
        (None, None) => {}
    }
}
