//! Minimal actor runtime for the engine worker
//!
//! One task per actor, one flume mailbox, FIFO delivery. Senders either
//! await the reply or post and keep a receiver for it.

use flume::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(u64);

impl ActorId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

pub trait Message: Send + 'static {
    type Response: Send + 'static;
}

#[async_trait::async_trait]
pub trait Actor: Send + 'static {
    type Message: Message;

    async fn handle(&mut self, msg: Self::Message) -> <Self::Message as Message>::Response;

    async fn started(&mut self) {}

    async fn stopped(&mut self) {}
}

pub struct ActorAddr<A: Actor> {
    id: ActorId,
    sender: Sender<ActorEnvelope<A>>,
}

impl<A: Actor> Clone for ActorAddr<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sender: self.sender.clone(),
        }
    }
}

type Response<A> = <<A as Actor>::Message as Message>::Response;

impl<A: Actor> ActorAddr<A> {
    /// Send a message and wait for the reply.
    pub async fn send(&self, msg: A::Message) -> Result<Response<A>, ActorError> {
        let (tx, rx) = bounded(1);
        let envelope = ActorEnvelope {
            message: msg,
            response: tx,
        };

        self.sender
            .send_async(envelope)
            .await
            .map_err(|_| ActorError::Disconnected)?;

        rx.recv_async().await.map_err(|_| ActorError::Disconnected)
    }

    /// Queue a message without blocking; the reply arrives on the returned
    /// receiver once the actor has handled it.
    pub fn post(&self, msg: A::Message) -> Result<Receiver<Response<A>>, ActorError> {
        let (tx, rx) = bounded(1);
        let envelope = ActorEnvelope {
            message: msg,
            response: tx,
        };

        match self.sender.try_send(envelope) {
            Ok(()) => Ok(rx),
            Err(TrySendError::Full(_)) => Err(ActorError::MailboxFull),
            Err(TrySendError::Disconnected(_)) => Err(ActorError::Disconnected),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Messages waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

struct ActorEnvelope<A: Actor> {
    message: A::Message,
    response: Sender<Response<A>>,
}

struct ActorContext<A: Actor> {
    id: ActorId,
    actor: A,
    receiver: Receiver<ActorEnvelope<A>>,
}

impl<A: Actor> ActorContext<A> {
    async fn run(mut self) {
        tracing::debug!(actor = %self.id, "actor started");
        self.actor.started().await;

        while let Ok(envelope) = self.receiver.recv_async().await {
            let response = self.actor.handle(envelope.message).await;
            // The sender may have dropped its receiver; the work is done either way.
            let _ = envelope.response.send(response);
        }

        self.actor.stopped().await;
        tracing::debug!(actor = %self.id, "actor stopped");
    }
}

/// Spawns actors onto a tokio runtime.
pub struct ActorSystem {
    next_id: AtomicU64,
    runtime: tokio::runtime::Handle,
}

impl ActorSystem {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            runtime,
        }
    }

    /// Spawn `actor`; a `mailbox_size` of 0 gives an unbounded mailbox.
    pub fn spawn<A: Actor>(&self, actor: A, mailbox_size: usize) -> ActorAddr<A> {
        let id = ActorId::new(self.next_id.fetch_add(1, Ordering::Relaxed));

        let (tx, rx) = if mailbox_size > 0 {
            bounded(mailbox_size)
        } else {
            unbounded()
        };

        let context = ActorContext {
            id,
            actor,
            receiver: rx,
        };

        self.runtime.spawn(context.run());

        ActorAddr { id, sender: tx }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorError {
    Disconnected,
    MailboxFull,
}

impl fmt::Display for ActorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "actor disconnected"),
            Self::MailboxFull => write!(f, "actor mailbox full"),
        }
    }
}

impl std::error::Error for ActorError {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        count: i32,
    }

    enum CounterMsg {
        Increment,
        Get,
    }

    impl Message for CounterMsg {
        type Response = i32;
    }

    #[async_trait::async_trait]
    impl Actor for Counter {
        type Message = CounterMsg;

        async fn handle(&mut self, msg: CounterMsg) -> i32 {
            match msg {
                CounterMsg::Increment => {
                    self.count += 1;
                    self.count
                }
                CounterMsg::Get => self.count,
            }
        }
    }

    #[tokio::test]
    async fn test_send_and_post() {
        let system = ActorSystem::new(tokio::runtime::Handle::current());
        let addr = system.spawn(Counter { count: 0 }, 10);

        assert_eq!(addr.send(CounterMsg::Increment).await.unwrap(), 1);

        let first = addr.post(CounterMsg::Increment).unwrap();
        let second = addr.post(CounterMsg::Get).unwrap();
        assert_eq!(first.recv_async().await.unwrap(), 2);
        assert_eq!(second.recv_async().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_full_mailbox() {
        let system = ActorSystem::new(tokio::runtime::Handle::current());
        let addr = system.spawn(Counter { count: 0 }, 1);

        // current-thread runtime: the actor cannot drain until we yield
        let queued = addr.post(CounterMsg::Increment).unwrap();
        assert_eq!(addr.post(CounterMsg::Increment).unwrap_err(), ActorError::MailboxFull);
        assert_eq!(queued.recv_async().await.unwrap(), 1);
    }
}
