use crate::agents::*;
use crate::utils::agent::*;
use crate::web::Session;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Combines any type with an `Instant` expiry time.
struct Expiring<T> {
    value: T,
    expires: Instant,
}

impl<T> Expiring<T> {
    /// Create a value from a duration.
    fn from_duration(value: T, duration: Duration) -> Self {
        let expires = Instant::now() + duration;
        Expiring { value, expires }
    }

    /// Whether this value has not yet expired.
    fn is_alive(&self) -> bool {
        self.expires > Instant::now()
    }
}

/// Message sent at an interval to collect garbage.
struct Gc;
impl Message for Gc {
    type Reply = ();
}

/// Store implementation using memory.
pub struct MemoryStore {
    /// TTL of sessions
    expire_sessions: Duration,
    /// Session storage.
    sessions: HashMap<String, Expiring<Session>>,
}

impl MemoryStore {
    pub fn new(expire_sessions: Duration) -> Self {
        log::warn!("Storing sessions in memory.");
        log::warn!("Note that these will be lost on restart!");

        MemoryStore {
            expire_sessions,
            sessions: HashMap::new(),
        }
    }
}

impl Agent for MemoryStore {
    fn started(&mut self, cx: Context<Self, AgentStarted>) {
        // Start the garbage collection loop.
        let addr = cx.addr().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            // Ignore the first (immediate) tick, because we'll always be empty.
            interval.tick().await;
            loop {
                interval.tick().await;
                addr.send(Gc).await;
            }
        });
        cx.reply(());
    }
}

impl Handler<Gc> for MemoryStore {
    fn handle(&mut self, _message: Gc, cx: Context<Self, Gc>) {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.is_alive());
        let removed = before - self.sessions.len();
        if removed > 0 {
            log::debug!("Removed {} expired sessions", removed);
        }
        cx.reply(());
    }
}

impl Handler<SaveSession> for MemoryStore {
    fn handle(&mut self, message: SaveSession, cx: Context<Self, SaveSession>) {
        self.sessions.insert(
            message.session_id,
            Expiring::from_duration(message.data, self.expire_sessions),
        );
        cx.reply(Ok(()));
    }
}

impl Handler<GetSession> for MemoryStore {
    fn handle(&mut self, message: GetSession, cx: Context<Self, GetSession>) {
        let data = self
            .sessions
            .get(&message.session_id)
            .filter(|entry| entry.is_alive())
            .map(|entry| entry.value.clone());
        cx.reply(Ok(data));
    }
}

impl Handler<DeleteSession> for MemoryStore {
    fn handle(&mut self, message: DeleteSession, cx: Context<Self, DeleteSession>) {
        self.sessions.remove(&message.session_id);
        cx.reply(Ok(()));
    }
}

impl StoreSender for Addr<MemoryStore> {}
