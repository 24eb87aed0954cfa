mod db;
mod events;
mod games;
mod locks;
mod notifier;
mod rooms;
mod util;

use std::sync::Arc;

pub use db::*;
pub use events::*;
pub use games::*;
pub use locks::EntityLocks;
pub use notifier::*;
pub use rooms::*;
pub use util::random_string;

/// The parlor collab system, facilitating rooms, game sessions, and the
/// events that mirror them to realtime clients.
pub struct Collab {
    context: CollabContext,

    pub rooms: RoomManager,
    pub games: GameManager,
}

/// A type passed to the managers to access the store, emit events, and
/// reach the notification seam.
#[derive(Clone)]
pub struct CollabContext {
    pub database: Arc<dyn Database>,
    pub events: Events,
    pub notifier: Arc<dyn Notifier>,

    /// One serialization domain per room id
    pub room_locks: Arc<EntityLocks>,
    /// One serialization domain per game session id
    pub session_locks: Arc<EntityLocks>,
}

impl Collab {
    pub fn new(database: Arc<dyn Database>, notifier: Arc<dyn Notifier>) -> Self {
        let context = CollabContext {
            database,
            notifier,
            events: Events::default(),
            room_locks: Default::default(),
            session_locks: Default::default(),
        };

        let rooms = RoomManager::new(&context);
        let games = GameManager::new(&context);

        Self {
            context,
            rooms,
            games,
        }
    }

    /// A handle the realtime gateway drains to observe committed changes
    pub fn events(&self) -> EventReceiver {
        self.context.events.receiver()
    }

    /// Resolves a live (unexpired) session token to its session
    pub async fn session(&self, token: &str) -> Result<SessionData> {
        self.context.database.session_by_token(token).await
    }
}
