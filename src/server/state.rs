//! Authoritative session state.
//!
//! [`Game`] owns the player roster, every live connection and the current
//! question. All of it lives behind one mutex: each public operation takes
//! the lock once and applies its changes completely before releasing it.
//! Outbound events go into per-connection unbounded queues, so nothing here
//! waits on a socket while holding the lock.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::{ChannelFailure, GameError};
use crate::models::{Player, PlayerId};
use crate::protocol::Event;

use super::hooks::{GameEvent, GameHooks, HookDispatcher};

pub type ConnectionId = Uuid;

/// Items queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(Event),
    /// Close the channel after everything queued before it has been sent.
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// What a connection should be told about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub registered: bool,
    /// Variants of the active question, when the bound player still owes an answer.
    pub pending_question: Option<u32>,
}

impl Status {
    pub const UNREGISTERED: Status = Status {
        registered: false,
        pending_question: None,
    };

    /// `status`, followed by the question re-send when one is pending.
    pub fn events(&self) -> Vec<Event> {
        let mut events = vec![Event::status(self.registered)];
        if let Some(variants) = self.pending_question {
            events.push(Event::question(variants));
        }
        events
    }
}

/// Result of an accepted guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessOutcome {
    pub score: u64,
    pub correct: bool,
}

/// Why a guess was not scored, with what the connection must be told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessRejected {
    NotRegistered(Status),
    /// No question is active. Carries the player's unchanged score.
    NoActiveQuestion { score: u64 },
}

impl GuessRejected {
    pub fn error(&self) -> GameError {
        match self {
            GuessRejected::NotRegistered(_) => GameError::NotRegistered,
            GuessRejected::NoActiveQuestion { .. } => GameError::NoActiveQuestion,
        }
    }
}

#[derive(Debug)]
struct ActiveQuestion {
    number_of_variants: u32,
    correct_answers: HashSet<u32>,
    started_at: Instant,
}

#[derive(Debug)]
struct ConnectionEntry {
    id: ConnectionId,
    ip_addr: IpAddr,
    sender: OutboundSender,
    player: Option<PlayerId>,
}

impl ConnectionEntry {
    fn send(&self, event: Event) -> Result<(), ChannelFailure> {
        self.sender
            .send(Outbound::Event(event))
            .map_err(|_| ChannelFailure(self.id))
    }

    fn send_all(&self, events: Vec<Event>) -> Result<(), ChannelFailure> {
        events.into_iter().try_for_each(|event| self.send(event))
    }
}

#[derive(Debug, Default)]
struct GameState {
    accepting_new_players: bool,
    question: Option<ActiveQuestion>,
    /// Registered players in registration order.
    players: Vec<Player>,
    /// Unregistered players that another connection is still bound to.
    detached: HashMap<PlayerId, Player>,
    /// Live connections in arrival order.
    connections: Vec<ConnectionEntry>,
}

impl GameState {
    fn connection(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.iter().find(|c| c.id == id)
    }

    fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut ConnectionEntry> {
        self.connections.iter_mut().find(|c| c.id == id)
    }

    fn bound_player_id(&self, id: ConnectionId) -> Option<PlayerId> {
        self.connection(id).and_then(|c| c.player)
    }

    fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.id == id)
            .or_else(|| self.detached.get(&id))
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        match self.players.iter_mut().find(|p| p.id == id) {
            Some(player) => Some(player),
            None => self.detached.get_mut(&id),
        }
    }

    fn is_bound_anywhere(&self, player: PlayerId) -> bool {
        self.connections.iter().any(|c| c.player == Some(player))
    }

    /// Queue `events` for one connection. A vanished or closed connection
    /// simply misses them.
    fn reply(&self, id: ConnectionId, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        if let Some(Err(e)) = self.connection(id).map(|c| c.send_all(events)) {
            debug!("Dropping reply: {}", e);
        }
    }

    fn status(&self, id: ConnectionId) -> Status {
        let Some(player) = self.bound_player_id(id).and_then(|p| self.player(p)) else {
            return Status::UNREGISTERED;
        };

        let pending_question = match &self.question {
            Some(question) if !player.answered_last_question => {
                Some(question.number_of_variants)
            }
            _ => None,
        };

        Status {
            registered: true,
            pending_question,
        }
    }
}

/// The shared quiz session.
pub struct Game {
    config: GameConfig,
    state: Mutex<GameState>,
    hooks: Option<HookDispatcher>,
}

impl Game {
    /// Create a session without hooks.
    pub fn new(config: GameConfig) -> Self {
        let state = GameState {
            accepting_new_players: config.accepting_new_players,
            ..GameState::default()
        };

        Self {
            config,
            state: Mutex::new(state),
            hooks: None,
        }
    }

    /// Create a session whose lifecycle events are delivered to `hooks`.
    ///
    /// Spawns the hook worker, so this must run inside a tokio runtime.
    pub fn with_hooks(config: GameConfig, hooks: Arc<dyn GameHooks>) -> Self {
        Self {
            hooks: Some(HookDispatcher::spawn(hooks)),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    fn fire(&self, event: GameEvent) {
        if let Some(hooks) = &self.hooks {
            hooks.fire(event);
        }
    }

    /// Track a new connection and send it its status.
    ///
    /// The connection is bound to the first registered player sharing its
    /// address, even when another connection is bound to that player too.
    pub async fn new_connection(&self, ip_addr: IpAddr, sender: OutboundSender) -> ConnectionId {
        let mut state = self.state.lock().await;

        let player = state
            .players
            .iter()
            .find(|p| p.ip_addr == ip_addr)
            .map(|p| (p.id, p.name.clone()));

        let entry = ConnectionEntry {
            id: Uuid::new_v4(),
            ip_addr,
            sender,
            player: player.as_ref().map(|(id, _)| *id),
        };
        let id = entry.id;
        state.connections.push(entry);

        match player {
            Some((_, name)) => info!(connection = %id, %ip_addr, %name, "Connection rejoined player"),
            None => info!(connection = %id, %ip_addr, "New connection"),
        }

        let status = state.status(id);
        if let Some(entry) = state.connection(id) {
            if let Err(e) = entry.send_all(status.events()) {
                warn!("Failed to send status: {}", e);
            }
        }

        id
    }

    /// Forget a connection whose channel has closed. Its player, if any,
    /// stays registered.
    pub async fn drop_connection(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;

        let Some(index) = state.connections.iter().position(|c| c.id == id) else {
            return;
        };
        let entry = state.connections.remove(index);

        if let Some(player) = entry.player {
            if state.detached.contains_key(&player) && !state.is_bound_anywhere(player) {
                state.detached.remove(&player);
            }
        }

        debug!(connection = %id, ip_addr = %entry.ip_addr, "Connection dropped");
    }

    /// Start a question and broadcast it to every connection with a player.
    ///
    /// Returns the number of connections the question was delivered to.
    pub async fn ask_a_question(
        &self,
        number_of_variants: u32,
        correct_answers: impl IntoIterator<Item = u32>,
    ) -> usize {
        let mut state = self.state.lock().await;

        state.question = Some(ActiveQuestion {
            number_of_variants,
            correct_answers: correct_answers.into_iter().collect(),
            started_at: Instant::now(),
        });

        for player in state.players.iter_mut() {
            player.answered_last_question = false;
        }
        for player in state.detached.values_mut() {
            player.answered_last_question = false;
        }

        let mut delivered = 0;
        for connection in state.connections.iter().filter(|c| c.player.is_some()) {
            match connection.send(Event::question(number_of_variants)) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send an event: {}", e),
            }
        }

        info!(number_of_variants, delivered, "Question asked");
        delivered
    }

    /// End the active question. Returns false if none was active.
    pub async fn finish_question(&self) -> bool {
        let mut state = self.state.lock().await;
        let finished = state.question.take().is_some();
        if finished {
            info!("Question finished");
        }
        finished
    }

    pub async fn is_question_active(&self) -> bool {
        self.state.lock().await.question.is_some()
    }

    pub async fn set_accepting_new_players(&self, accepting: bool) {
        self.state.lock().await.accepting_new_players = accepting;
        info!(accepting, "Registration toggled");
    }

    pub async fn accepting_new_players(&self) -> bool {
        self.state.lock().await.accepting_new_players
    }

    /// Snapshot of the registered players, in registration order.
    pub async fn players(&self) -> Vec<Player> {
        self.state.lock().await.players.clone()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Current status of a connection.
    pub async fn status(&self, id: ConnectionId) -> Status {
        self.state.lock().await.status(id)
    }

    /// Register a new player on behalf of a connection.
    pub async fn register(&self, id: ConnectionId, name: &str) -> Result<Status, GameError> {
        self.register_and_reply(id, name, |_| Vec::new()).await
    }

    /// Like [`Game::register`], queueing `reply(&result)` to the connection
    /// before the lock is released.
    pub async fn register_and_reply<F>(
        &self,
        id: ConnectionId,
        name: &str,
        reply: F,
    ) -> Result<Status, GameError>
    where
        F: FnOnce(&Result<Status, GameError>) -> Vec<Event>,
    {
        let mut state = self.state.lock().await;
        let result = self.register_locked(&mut state, id, name);
        state.reply(id, reply(&result));
        result
    }

    /// Remove the connection's player from the roster.
    pub async fn unregister(&self, id: ConnectionId) -> Result<Status, GameError> {
        self.unregister_and_reply(id, |_| Vec::new()).await
    }

    pub async fn unregister_and_reply<F>(&self, id: ConnectionId, reply: F) -> Result<Status, GameError>
    where
        F: FnOnce(&Result<Status, GameError>) -> Vec<Event>,
    {
        let mut state = self.state.lock().await;
        let result = self.unregister_locked(&mut state, id);
        state.reply(id, reply(&result));
        result
    }

    /// Score a guess for the connection's player.
    pub async fn guess(&self, id: ConnectionId, variant: u32) -> Result<GuessOutcome, GuessRejected> {
        self.guess_and_reply(id, variant, |_| Vec::new()).await
    }

    pub async fn guess_and_reply<F>(
        &self,
        id: ConnectionId,
        variant: u32,
        reply: F,
    ) -> Result<GuessOutcome, GuessRejected>
    where
        F: FnOnce(&Result<GuessOutcome, GuessRejected>) -> Vec<Event>,
    {
        let mut state = self.state.lock().await;
        let result = self.guess_locked(&mut state, id, variant);
        state.reply(id, reply(&result));
        result
    }

    fn register_locked(
        &self,
        state: &mut GameState,
        id: ConnectionId,
        name: &str,
    ) -> Result<Status, GameError> {
        let Some(connection) = state.connection(id) else {
            return Err(GameError::NotRegistered);
        };
        if connection.player.is_some() {
            return Err(GameError::AlreadyRegistered);
        }
        if !state.accepting_new_players {
            return Err(GameError::RegistrationClosed);
        }

        let player = Player::new(name, connection.ip_addr);
        if let Some(connection) = state.connection_mut(id) {
            connection.player = Some(player.id);
        }
        state.players.push(player.clone());

        info!(connection = %id, name = %player.name, "Player registered");
        self.fire(GameEvent::PlayerRegistered(player));

        Ok(state.status(id))
    }

    fn unregister_locked(&self, state: &mut GameState, id: ConnectionId) -> Result<Status, GameError> {
        let Some(player_id) = state.bound_player_id(id) else {
            return Err(GameError::NotRegistered);
        };
        if let Some(connection) = state.connection_mut(id) {
            connection.player = None;
        }

        let player = match state.players.iter().position(|p| p.id == player_id) {
            Some(index) => Some(state.players.remove(index)),
            None => state.detached.get(&player_id).cloned(),
        };

        if let Some(player) = player {
            // Other connections from the same address may still hold it.
            if state.is_bound_anywhere(player_id) {
                state.detached.insert(player_id, player.clone());
            } else {
                state.detached.remove(&player_id);
            }

            info!(connection = %id, name = %player.name, "Player unregistered");
            self.fire(GameEvent::PlayerUnregistered(player));
        }

        Ok(state.status(id))
    }

    fn guess_locked(
        &self,
        state: &mut GameState,
        id: ConnectionId,
        variant: u32,
    ) -> Result<GuessOutcome, GuessRejected> {
        let Some(player_id) = state.bound_player_id(id) else {
            return Err(GuessRejected::NotRegistered(state.status(id)));
        };
        let question = state
            .question
            .as_ref()
            .map(|q| (q.started_at, q.correct_answers.contains(&variant)));
        let Some(player) = state.player_mut(player_id) else {
            return Err(GuessRejected::NotRegistered(Status::UNREGISTERED));
        };
        let Some((started_at, correct)) = question else {
            return Err(GuessRejected::NoActiveQuestion {
                score: player.score,
            });
        };

        player.answered_last_question = true;

        if correct {
            let elapsed = started_at.elapsed();
            let reward = self.config.reward_for(elapsed);
            info!(
                name = %player.name,
                elapsed = elapsed.as_secs_f64(),
                multiplier = reward.multiplier,
                bonus = reward.bonus,
                "Calculated bonus points"
            );
            player.award(reward.total());
        }

        let outcome = GuessOutcome {
            score: player.score,
            correct,
        };
        self.fire(GameEvent::PlayerMadeAGuess {
            player: player.clone(),
            correct,
        });

        Ok(outcome)
    }

    /// Tell every connection why it is being closed, then close it.
    pub async fn close_all(&self, reason: &str) {
        let state = self.state.lock().await;
        for connection in &state.connections {
            let closed = connection
                .send(Event::connection_closed(reason))
                .and_then(|()| {
                    connection
                        .sender
                        .send(Outbound::Close)
                        .map_err(|_| ChannelFailure(connection.id))
                });
            if let Err(e) = closed {
                warn!("Failed to close connection: {}", e);
            }
        }
    }
}
