//! One-shot completion handle returned by `play()`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::{AnimationError, Result};

/// Resolves once: `Ok(())` when the run completes, `Err` when it is
/// rejected or cancelled. Dropping it does not affect playback.
#[must_use = "a Deferred can be ignored, but then completion errors are lost"]
#[derive(Debug)]
pub struct Deferred {
    state: DeferredState,
}

#[derive(Debug)]
enum DeferredState {
    Pending(oneshot::Receiver<Result<()>>),
    Ready(Option<Result<()>>),
}

/// Sending half kept by the node.
#[derive(Debug)]
pub(crate) struct Resolver(oneshot::Sender<Result<()>>);

impl Resolver {
    pub(crate) fn settle(self, result: Result<()>) {
        // The caller may have dropped its Deferred.
        let _ = self.0.send(result);
    }
}

impl Deferred {
    pub(crate) fn channel() -> (Resolver, Deferred) {
        let (tx, rx) = oneshot::channel();
        (
            Resolver(tx),
            Deferred {
                state: DeferredState::Pending(rx),
            },
        )
    }

    /// Already settled.
    pub(crate) fn ready(result: Result<()>) -> Self {
        Self {
            state: DeferredState::Ready(Some(result)),
        }
    }

    /// Non-blocking check; `None` while the run is still in flight.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match &mut self.state {
            DeferredState::Ready(slot) => slot.clone(),
            DeferredState::Pending(rx) => match rx.try_recv() {
                Ok(Some(result)) => {
                    self.state = DeferredState::Ready(Some(result.clone()));
                    Some(result)
                }
                Ok(None) => None,
                Err(oneshot::Canceled) => {
                    self.state = DeferredState::Ready(Some(Err(AnimationError::Cancelled)));
                    Some(Err(AnimationError::Cancelled))
                }
            },
        }
    }
}

impl Future for Deferred {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            DeferredState::Ready(slot) => {
                Poll::Ready(slot.take().unwrap_or(Err(AnimationError::Cancelled)))
            }
            DeferredState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|res| res.unwrap_or(Err(AnimationError::Cancelled))),
        }
    }
}
