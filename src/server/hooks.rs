//! Lifecycle hooks the host can attach to a session.
//!
//! Hooks never run inside a session operation. The session queues a
//! [`GameEvent`] and a dedicated worker task awaits the hooks one event at a
//! time, so a slow hook delays later hooks but never a connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::Player;

/// Something that happened to a player, as seen by hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    PlayerRegistered(Player),
    PlayerUnregistered(Player),
    PlayerMadeAGuess { player: Player, correct: bool },
}

/// Host callbacks. Every method defaults to doing nothing.
#[async_trait]
pub trait GameHooks: Send + Sync {
    async fn on_player_registered(&self, _player: &Player) {}

    async fn on_player_unregistered(&self, _player: &Player) {}

    async fn on_player_made_a_guess(&self, _player: &Player, _correct: bool) {}
}

/// Logs every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

#[async_trait]
impl GameHooks for LoggingHooks {
    async fn on_player_registered(&self, player: &Player) {
        info!(name = %player.name, ip = %player.ip_addr, "A new player has registered");
    }

    async fn on_player_unregistered(&self, player: &Player) {
        info!(name = %player.name, score = player.score, "Player has unregistered");
    }

    async fn on_player_made_a_guess(&self, player: &Player, correct: bool) {
        info!(name = %player.name, correct, "Player made a guess");
    }
}

/// Forwards every event into a queue the host drains at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelHooks {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl ChannelHooks {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: GameEvent) {
        // The host dropping its receiver just means nobody is listening.
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl GameHooks for ChannelHooks {
    async fn on_player_registered(&self, player: &Player) {
        self.forward(GameEvent::PlayerRegistered(player.clone()));
    }

    async fn on_player_unregistered(&self, player: &Player) {
        self.forward(GameEvent::PlayerUnregistered(player.clone()));
    }

    async fn on_player_made_a_guess(&self, player: &Player, correct: bool) {
        self.forward(GameEvent::PlayerMadeAGuess {
            player: player.clone(),
            correct,
        });
    }
}

/// Queue in front of the hook worker task.
#[derive(Debug)]
pub(crate) struct HookDispatcher {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl HookDispatcher {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub(crate) fn spawn(hooks: Arc<dyn GameHooks>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<GameEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match &event {
                    GameEvent::PlayerRegistered(player) => hooks.on_player_registered(player).await,
                    GameEvent::PlayerUnregistered(player) => {
                        hooks.on_player_unregistered(player).await
                    }
                    GameEvent::PlayerMadeAGuess { player, correct } => {
                        hooks.on_player_made_a_guess(player, *correct).await
                    }
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn fire(&self, event: GameEvent) {
        if self.tx.send(event).is_err() {
            warn!("Hook worker has stopped, dropping event");
        }
    }
}
