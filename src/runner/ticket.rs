use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::engine::UpdateSummary;
use crate::errors::{Result, RunnerError};

/// Completion handle of an asynchronous update.
///
/// Await it from async code or call [`UpdateTicket::wait_blocking`] from a
/// plain thread. Dropping the ticket does not cancel the update.
pub struct UpdateTicket {
    id: u64,
    inner: BoxFuture<'static, Result<UpdateSummary>>,
}

impl UpdateTicket {
    pub(crate) fn pending(id: u64, reply: flume::Receiver<Result<UpdateSummary>>) -> Self {
        let inner = reply
            .into_recv_async()
            .map(move |received| {
                received.unwrap_or_else(|_| {
                    Err(RunnerError::engine_fault(format!(
                        "update {} was dropped before completing",
                        id
                    )))
                })
            })
            .boxed();
        Self { id, inner }
    }

    pub(crate) fn failed(id: u64, error: RunnerError) -> Self {
        Self {
            id,
            inner: future::ready(Err(error)).boxed(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block the current thread until the update finishes.
    ///
    /// Must not be called from inside an async task.
    pub fn wait_blocking(self) -> Result<UpdateSummary> {
        futures::executor::block_on(self)
    }
}

impl Future for UpdateTicket {
    type Output = Result<UpdateSummary>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for UpdateTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateTicket").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_resolves_from_reply() {
        let (tx, rx) = flume::bounded(1);
        let ticket = UpdateTicket::pending(7, rx);
        tx.send(Ok(UpdateSummary::default())).unwrap();
        assert_eq!(ticket.id(), 7);
        assert!(ticket.wait_blocking().unwrap().is_noop());
    }

    #[test]
    fn test_dropped_reply_is_a_fault() {
        let (tx, rx) = flume::bounded::<Result<UpdateSummary>>(1);
        drop(tx);
        let err = UpdateTicket::pending(3, rx).wait_blocking().unwrap_err();
        assert!(err.to_string().contains("update 3"));
    }

    #[test]
    fn test_failed_ticket() {
        let ticket = UpdateTicket::failed(1, RunnerError::invalid_argument("nope"));
        assert_eq!(ticket.wait_blocking().unwrap_err().status_code(), -1);
    }
}
