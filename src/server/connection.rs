//! Per-connection protocol handling.
//!
//! A [`Connection`] turns inbound events into [`Game`] operations and
//! the results into outbound events. Replies to game operations are queued
//! by the game before its lock is released, so a broadcast can never land
//! between an operation and its reply.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ChannelFailure, GameError, ProtocolError};
use crate::protocol::{Event, Request};

use super::state::{ConnectionId, Game, GuessOutcome, GuessRejected, Outbound, OutboundSender};

pub struct Connection {
    id: ConnectionId,
    ip_addr: IpAddr,
    sender: OutboundSender,
    game: Arc<Game>,
}

impl Connection {
    /// Attach a new channel to the game. The game sends the initial status.
    pub async fn open(game: Arc<Game>, ip_addr: IpAddr, sender: OutboundSender) -> Self {
        let id = game.new_connection(ip_addr, sender.clone()).await;
        Self {
            id,
            ip_addr,
            sender,
            game,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn ip_addr(&self) -> IpAddr {
        self.ip_addr
    }

    /// Decode and handle one text frame.
    pub async fn handle_text(&self, text: &str) {
        match Event::decode(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!(connection = %self.id, "Received a malformed message: {}", e);
                self.reply(vec![Event::error(e.to_string())]);
            }
        }
    }

    /// Handle one decoded event. Unknown event types are ignored.
    pub async fn handle_event(&self, event: Event) {
        let request = match Request::from_event(&event) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(connection = %self.id, event_type = %event.event_type, "Ignoring unknown event");
                return;
            }
            Err(e) => {
                self.reject_malformed(e);
                return;
            }
        };

        debug!(connection = %self.id, ?request, "Handling request");

        match request {
            Request::Register { name } => self.handle_register(&name).await,
            Request::Unregister => self.handle_unregister().await,
            Request::Guess { variant } => self.handle_guess(variant).await,
        }
    }

    async fn handle_register(&self, name: &str) {
        self.game
            .register_and_reply(self.id, name, |result| match result {
                Ok(status) => status.events(),
                Err(e) => vec![rule_error("register", *e)],
            })
            .await
            .ok();
    }

    async fn handle_unregister(&self) {
        self.game
            .unregister_and_reply(self.id, |result| match result {
                Ok(status) => status.events(),
                Err(e) => vec![rule_error("unregister", *e)],
            })
            .await
            .ok();
    }

    async fn handle_guess(&self, variant: u32) {
        self.game
            .guess_and_reply(self.id, variant, guess_reply)
            .await
            .ok();
    }

    fn reject_malformed(&self, error: ProtocolError) {
        warn!(connection = %self.id, "Rejected event: {}", error);
        self.reply(vec![Event::error(error.to_string())]);
    }

    /// Send the current status (and any pending question).
    pub async fn send_status(&self) -> Result<(), ChannelFailure> {
        let status = self.game.status(self.id).await;
        self.send_events(status.events())
    }

    pub fn send_event(&self, event: Event) -> Result<(), ChannelFailure> {
        self.sender
            .send(Outbound::Event(event))
            .map_err(|_| ChannelFailure(self.id))
    }

    fn send_events(&self, events: Vec<Event>) -> Result<(), ChannelFailure> {
        events.into_iter().try_for_each(|event| self.send_event(event))
    }

    fn reply(&self, events: Vec<Event>) {
        if let Err(e) = self.send_events(events) {
            debug!("Dropping reply: {}", e);
        }
    }

    /// Tell the client why, close the channel and leave the game.
    pub async fn close(self, reason: &str) {
        let sent = self
            .send_event(Event::connection_closed(reason))
            .and_then(|()| {
                self.sender
                    .send(Outbound::Close)
                    .map_err(|_| ChannelFailure(self.id))
            });
        if let Err(e) = sent {
            debug!("Channel already gone while closing: {}", e);
        }
        self.game.drop_connection(self.id).await;
    }

    /// The channel ended on its own.
    pub async fn disconnected(self) {
        self.game.drop_connection(self.id).await;
    }
}

fn guess_reply(result: &Result<GuessOutcome, GuessRejected>) -> Vec<Event> {
    match result {
        Ok(outcome) => vec![Event::guessed(outcome.score, outcome.correct)],
        Err(rejected @ GuessRejected::NotRegistered(status)) => {
            let mut events = vec![rule_error("guess", rejected.error())];
            events.extend(status.events());
            events
        }
        // Clients rely on always getting a `guessed` back, even out of phase.
        Err(rejected @ GuessRejected::NoActiveQuestion { score }) => vec![
            Event::error(rejected.error().to_string()),
            Event::guessed(*score, false),
        ],
    }
}

fn rule_error(action: &str, error: GameError) -> Event {
    Event::error(format!("Failed to {}: {}", action, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use tokio::sync::mpsc;

    use crate::config::GameConfig;
    use crate::protocol::{GUESS, REGISTER, UNREGISTER};
    use crate::server::state::OutboundReceiver;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn open_game() -> Arc<Game> {
        Arc::new(Game::new(GameConfig {
            accepting_new_players: true,
            ..GameConfig::default()
        }))
    }

    async fn connect(game: &Arc<Game>, addr: IpAddr) -> (Connection, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::open(Arc::clone(game), addr, tx).await;
        (connection, rx)
    }

    fn events(rx: &mut OutboundReceiver) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Event(event) = item {
                events.push(event);
            }
        }
        events
    }

    fn register(name: &str) -> Event {
        Event::new(REGISTER).with_arg("name", name)
    }

    fn guess(variant: u32) -> Event {
        Event::new(GUESS).with_arg("variant", variant)
    }

    #[tokio::test]
    async fn test_register_replies_with_status() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        assert_eq!(events(&mut rx), vec![Event::status(false)]);

        conn.handle_event(register("Alice")).await;
        assert_eq!(events(&mut rx), vec![Event::status(true)]);

        conn.handle_event(register("Alice")).await;
        assert_eq!(
            events(&mut rx),
            vec![Event::error("Failed to register: already registered")]
        );
        assert_eq!(game.players().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_when_closed() {
        let game = Arc::new(Game::new(GameConfig::default()));
        let (conn, mut rx) = connect(&game, ip(1)).await;
        events(&mut rx);

        conn.handle_event(register("Alice")).await;
        assert_eq!(
            events(&mut rx),
            vec![Event::error(
                "Failed to register: the game is not accepting new players"
            )]
        );
    }

    #[tokio::test]
    async fn test_unregister_flow() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        events(&mut rx);

        conn.handle_event(Event::new(UNREGISTER)).await;
        assert_eq!(
            events(&mut rx),
            vec![Event::error("Failed to unregister: not registered")]
        );

        conn.handle_event(register("Alice")).await;
        conn.handle_event(Event::new(UNREGISTER)).await;
        assert_eq!(
            events(&mut rx),
            vec![Event::status(true), Event::status(false)]
        );
        assert!(game.players().await.is_empty());
    }

    #[tokio::test]
    async fn test_guess_flow() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        conn.handle_event(register("Alice")).await;
        events(&mut rx);

        game.ask_a_question(4, [1]).await;
        assert_eq!(events(&mut rx), vec![Event::question(4)]);

        conn.handle_event(guess(1)).await;
        assert_eq!(events(&mut rx), vec![Event::guessed(1200, true)]);

        conn.handle_event(guess(0)).await;
        assert_eq!(events(&mut rx), vec![Event::guessed(1200, false)]);
    }

    #[tokio::test]
    async fn test_guess_out_of_phase_sends_error_and_guessed() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        conn.handle_event(register("Alice")).await;
        events(&mut rx);

        conn.handle_event(guess(0)).await;
        assert_eq!(
            events(&mut rx),
            vec![
                Event::error("No question is being asked at the moment"),
                Event::guessed(0, false)
            ]
        );
    }

    #[tokio::test]
    async fn test_guess_unregistered_sends_error_and_status() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        events(&mut rx);
        game.ask_a_question(2, [0]).await;

        conn.handle_event(guess(0)).await;
        assert_eq!(
            events(&mut rx),
            vec![
                Event::error("Failed to guess: not registered"),
                Event::status(false)
            ]
        );
    }

    #[tokio::test]
    async fn test_protocol_errors_are_reported() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        events(&mut rx);

        conn.handle_event(Event::new(REGISTER)).await;
        conn.handle_text("{\"event_type\": 5}").await;
        conn.handle_event(Event::new(GUESS).with_arg("variant", "one")).await;

        let replies = events(&mut rx);
        assert_eq!(replies.len(), 3);
        assert!(replies.iter().all(|e| e.event_type == "error"));
        assert!(game.players().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_events_are_ignored() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        events(&mut rx);

        conn.handle_text(r#"{"event_type":"emote","args":{"kind":"wave"}}"#).await;
        assert!(events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_from_same_address() {
        let game = open_game();
        let (first, _rx1) = connect(&game, ip(3)).await;
        first.handle_event(register("Alice")).await;
        game.ask_a_question(3, [2]).await;
        first.disconnected().await;

        let (second, mut rx2) = connect(&game, ip(3)).await;
        assert_eq!(events(&mut rx2), vec![Event::status(true), Event::question(3)]);

        second.send_status().await.unwrap();
        assert_eq!(events(&mut rx2), vec![Event::status(true), Event::question(3)]);

        second.handle_event(guess(2)).await;
        events(&mut rx2);
        second.send_status().await.unwrap();
        assert_eq!(events(&mut rx2), vec![Event::status(true)]);
    }

    #[tokio::test]
    async fn test_close_sends_reason_and_leaves_game() {
        let game = open_game();
        let (conn, mut rx) = connect(&game, ip(1)).await;
        events(&mut rx);

        conn.close("unknown error").await;
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Event(Event::connection_closed("unknown error"))
        );
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert_eq!(game.connection_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_register_racing_a_question_ends_on_the_question() {
        for _ in 0..500 {
            let game = open_game();
            let (conn, mut rx) = connect(&game, ip(1)).await;
            let conn = Arc::new(conn);

            let registering = {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.handle_event(register("Alice")).await })
            };
            let asking = {
                let game = Arc::clone(&game);
                tokio::spawn(async move { game.ask_a_question(3, [1]).await })
            };
            registering.await.unwrap();
            asking.await.unwrap();

            let received = events(&mut rx);
            assert_eq!(
                received.last(),
                Some(&Event::question(3)),
                "sequence: {:?}",
                received
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_guessed_reply_precedes_next_question() {
        for _ in 0..200 {
            let game = open_game();
            let (conn, mut rx) = connect(&game, ip(1)).await;
            conn.handle_event(register("Alice")).await;
            game.ask_a_question(2, [0]).await;
            events(&mut rx);
            let conn = Arc::new(conn);

            let guessing = {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.handle_event(guess(0)).await })
            };
            let asking = {
                let game = Arc::clone(&game);
                tokio::spawn(async move { game.ask_a_question(4, [0]).await })
            };
            guessing.await.unwrap();
            asking.await.unwrap();

            // A guess scored against the first question is answered before
            // the second question arrives; one scored against the second
            // follows it.
            let received = events(&mut rx);
            assert_eq!(received.len(), 2, "sequence: {:?}", received);
            let answered_second = game.players().await[0].answered_last_question;
            let expected = if answered_second {
                ["question", "guessed"]
            } else {
                ["guessed", "question"]
            };
            let types: Vec<&str> = received.iter().map(|e| e.event_type.as_str()).collect();
            assert_eq!(types, expected);
        }
    }
}
