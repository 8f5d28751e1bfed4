use std::net::IpAddr;

use serde::Serialize;
use uuid::Uuid;

pub type PlayerId = Uuid;

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    /// Display name, not necessarily unique.
    pub name: String,
    /// Address the player registered from, used to rebind reconnects.
    pub ip_addr: IpAddr,
    pub score: u64,
    pub answered_last_question: bool,
}

impl Player {
    pub fn new(name: impl Into<String>, ip_addr: IpAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ip_addr,
            score: 0,
            answered_last_question: false,
        }
    }

    pub fn award(&mut self, points: u64) {
        self.score = self.score.saturating_add(points);
    }
}
