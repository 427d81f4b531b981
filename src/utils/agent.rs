//! Small implementation of the agent pattern.
//!
//! An agent owns some state and processes messages one at a time on its own task. Construct a
//! type implementing `Agent`, hand it to `spawn_agent`, and keep the returned `Addr` around. The
//! `Addr` can be cheaply cloned and used to send messages, or cast to a `dyn Sender<M>` to
//! abstract over the agent type.
//!
//! Messages are types that implement `Message`. Agents process them in implementations of
//! `Handler<M>`, and reply through the `Context` they are given.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;
use tokio::sync::{mpsc, oneshot};

/// A trait for messages that can be sent to an agent.
pub trait Message: Send + 'static {
    /// The type of reply sent back by the agent.
    type Reply: Send + 'static;
}

/// Message delivered to an agent once, right after it was spawned.
pub struct AgentStarted;
impl Message for AgentStarted {
    type Reply = ();
}

/// A trait for types that represent agents.
pub trait Agent: Send + Sized + 'static {
    /// Called once the agent is running.
    ///
    /// Agents can implement this to start async tasks, such as maintenance at an interval.
    fn started(&mut self, cx: Context<Self, AgentStarted>) {
        cx.reply(());
    }
}

/// Trait implemented by agents for each message type they handle.
pub trait Handler<M: Message>: Agent {
    /// Handle the message.
    ///
    /// Handlers are called one-by-one as messages arrive, with mutable access to the agent. The
    /// context must be consumed with either `reply` or `reply_later`.
    fn handle(&mut self, message: M, cx: Context<Self, M>);
}

impl<A: Agent> Handler<AgentStarted> for A {
    fn handle(&mut self, _message: AgentStarted, cx: Context<Self, AgentStarted>) {
        self.started(cx);
    }
}

/// Context passed to handlers, used to send the reply.
pub struct Context<A, M: Message> {
    addr: Addr<A>,
    tx: oneshot::Sender<M::Reply>,
}

impl<A, M: Message> Context<A, M> {
    /// Address of the agent handling the message.
    pub fn addr(&self) -> &Addr<A> {
        &self.addr
    }

    /// Send the reply right away.
    pub fn reply(self, reply: M::Reply) {
        let _ = self.tx.send(reply);
    }

    /// Spawn a task that produces the reply later, freeing the agent for the next message.
    pub fn reply_later<F>(self, f: F)
    where
        F: Future<Output = M::Reply> + Send + 'static,
    {
        let tx = self.tx;
        tokio::spawn(async move {
            let _ = tx.send(f.await);
        });
    }
}

type Envelope<A> = Box<dyn FnOnce(&mut A, Addr<A>) + Send>;

/// An address to an agent.
pub struct Addr<A> {
    tx: mpsc::UnboundedSender<Envelope<A>>,
}

impl<A> Clone for Addr<A> {
    fn clone(&self) -> Self {
        Addr {
            tx: self.tx.clone(),
        }
    }
}

impl<A: Agent> Addr<A> {
    /// Send a message to the agent. The returned future resolves to the reply.
    pub fn send<M>(&self, message: M) -> ReplyReceiver<M::Reply>
    where
        M: Message,
        A: Handler<M>,
    {
        let (tx, rx) = oneshot::channel();
        let envelope: Envelope<A> = Box::new(move |agent: &mut A, addr: Addr<A>| {
            agent.handle(message, Context { addr, tx });
        });
        if self.tx.send(envelope).is_err() {
            panic!("agent has stopped");
        }
        ReplyReceiver { rx }
    }
}

/// Future that resolves to the reply of an agent.
pub struct ReplyReceiver<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for ReplyReceiver<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|val| val.expect("agent did not send a reply"))
    }
}

/// Start an agent on its own task, and wait for it to finish starting.
pub async fn spawn_agent<A: Agent>(agent: A) -> Addr<A> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<A>>();
    let addr = Addr { tx };
    let loop_addr = addr.clone();
    tokio::spawn(async move {
        let mut agent = agent;
        while let Some(envelope) = rx.recv().await {
            envelope(&mut agent, loop_addr.clone());
        }
    });
    addr.send(AgentStarted).await;
    addr
}

/// Trait implemented by `Addr` that allows trait objects to be created per message.
pub trait Sender<M: Message>: Send + Sync {
    /// Sends a message of this type to the agent.
    fn send(&self, message: M) -> ReplyReceiver<M::Reply>;
}

impl<M, A> Sender<M> for Addr<A>
where
    M: Message,
    A: Handler<M>,
{
    fn send(&self, message: M) -> ReplyReceiver<M::Reply> {
        Addr::<A>::send(self, message)
    }
}
