//! Socket to seat bindings.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::game::{SeatIndex, UserId};
use crate::wallet::TableId;

pub type SocketId = Uuid;

/// A socket seated at a table. Created on join, dropped on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub socket_id: SocketId,
    pub user_id: UserId,
    pub table_id: TableId,
    pub seat: SeatIndex,
    pub game_id: Option<Uuid>,
    pub bound_at: DateTime<Utc>,
}

/// Which socket plays which seat.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SocketId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a socket to a seat, replacing any earlier binding of that socket.
    pub async fn bind(
        &self,
        socket_id: SocketId,
        user_id: UserId,
        table_id: TableId,
        seat: SeatIndex,
        game_id: Option<Uuid>,
    ) -> Session {
        let session = Session {
            socket_id,
            user_id,
            table_id,
            seat,
            game_id,
            bound_at: Utc::now(),
        };
        self.sessions
            .write()
            .await
            .insert(socket_id, session.clone());
        session
    }

    pub async fn get(&self, socket_id: SocketId) -> Option<Session> {
        self.sessions.read().await.get(&socket_id).cloned()
    }

    /// Removes a socket's binding.
    ///
    /// # Returns
    ///
    /// * `Option<(Session, bool)>` - The removed session and whether the user
    ///   still has another socket bound to the same table
    pub async fn unbind(&self, socket_id: SocketId) -> Option<(Session, bool)> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(&socket_id)?;
        let still_bound = sessions
            .values()
            .any(|s| s.user_id == session.user_id && s.table_id == session.table_id);
        Some((session, still_bound))
    }

    /// Records the game a table is playing on every socket bound to it.
    pub async fn set_game(&self, table_id: TableId, game_id: Option<Uuid>) {
        for session in self.sessions.write().await.values_mut() {
            if session.table_id == table_id {
                session.game_id = game_id;
            }
        }
    }

    pub async fn sessions_of(&self, user_id: UserId) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_unbind() {
        let registry = SessionRegistry::new();
        let socket = Uuid::new_v4();
        registry.bind(socket, 7, 1, 0, None).await;

        assert_eq!(registry.get(socket).await.map(|s| s.seat), Some(0));
        let (session, still_bound) = registry.unbind(socket).await.unwrap();
        assert_eq!(session.user_id, 7);
        assert!(!still_bound);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_second_socket_keeps_user_bound() {
        let registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        registry.bind(first, 7, 1, 2, None).await;
        registry.bind(second, 7, 1, 2, None).await;

        let (_, still_bound) = registry.unbind(first).await.unwrap();
        assert!(still_bound);
        assert_eq!(registry.sessions_of(7).await.len(), 1);
    }

    #[tokio::test]
    async fn test_set_game_updates_table_sessions() {
        let registry = SessionRegistry::new();
        let socket = Uuid::new_v4();
        let other = Uuid::new_v4();
        registry.bind(socket, 7, 1, 0, None).await;
        registry.bind(other, 8, 2, 0, None).await;

        let game_id = Uuid::new_v4();
        registry.set_game(1, Some(game_id)).await;
        assert_eq!(registry.get(socket).await.unwrap().game_id, Some(game_id));
        assert_eq!(registry.get(other).await.unwrap().game_id, None);
    }
}
