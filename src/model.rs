//! Session record data model.
//!
//! A [`SessionRecord`] is the single shared document describing one game's
//! full state. Both participants read and write it whole through the record
//! store; there is no server-side arbitration, so every field transition is
//! governed by the session manager's state machine.

use crate::board::{Board, Mark};
use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Unique identifier for a game session.
pub type SessionId = String;

/// Unique identifier for a player.
pub type PlayerId = String;

/// ARGB color assigned to the session creator's mark.
pub const CREATOR_COLOR: u32 = 0xFF00_0000;

/// ARGB color assigned to the joining player's mark.
pub const JOINER_COLOR: u32 = 0xFFF4_4336;

/// Lifecycle status of a session.
///
/// `Waiting → InProgress → {Won, Drawn}`; a terminal session returns to
/// `InProgress` only through a rematch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// No second participant yet.
    Waiting,
    /// Both participants present, moves being exchanged.
    InProgress,
    /// A participant completed a winning line.
    Won,
    /// Board filled with no winning line.
    Drawn,
}

impl GameStatus {
    /// True for the two terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Won | GameStatus::Drawn)
    }
}

/// A participant in a session.
///
/// Identity (`id`, `name`) comes from the caller's identity provider. The
/// `score` field is an informational snapshot taken at sign-in; the score
/// ledger is the authoritative source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Player {
    /// Stable player id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Assigned mark; fixed when the player enters the session.
    #[new(value = "Mark::X")]
    pub mark: Mark,
    /// ARGB color for the player's mark.
    #[new(value = "CREATOR_COLOR")]
    pub color: u32,
    /// Cumulative score snapshot (informational, not authoritative).
    #[new(default)]
    pub score: i64,
}

/// A chat message attached to a session.
///
/// Messages are append-only with no ordering guarantee stronger than the
/// store's write order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct ChatMessage {
    /// Message id.
    #[new(value = "uuid::Uuid::new_v4().to_string()")]
    pub id: String,
    /// Sender's player id.
    pub sender_id: PlayerId,
    /// Sender's display name.
    pub sender_name: String,
    /// Message text.
    pub text: String,
    /// Time the message was composed (sender's clock).
    #[new(value = "Utc::now()")]
    pub timestamp: DateTime<Utc>,
}

/// The shared session document, keyed by session id in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id, generated at creation, stable for the session lifetime.
    pub session_id: SessionId,
    /// 3x3 board, row-major.
    pub board: Board,
    /// The session creator. Always present; always moves first.
    pub player_a: Player,
    /// The joining player, absent while the session is `Waiting`.
    pub player_b: Option<Player>,
    /// Player whose move is currently valid; `None` when terminal.
    pub turn_holder: Option<PlayerId>,
    /// Player who completed a winning line; set iff `status == Won`.
    pub winner: Option<PlayerId>,
    /// Lifecycle status.
    pub status: GameStatus,
    /// True once score settlement has been applied for the current
    /// terminal outcome. Guards against double counting on redundant
    /// writes and re-observations.
    pub settled: bool,
    /// Append-only chat log.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl SessionRecord {
    /// Builds the initial `Waiting` record for a fresh session.
    ///
    /// The creator becomes participant A with mark X and the creator color.
    pub fn waiting(session_id: SessionId, creator: Player) -> Self {
        let turn_holder = Some(creator.id.clone());
        let player_a = Player {
            mark: Mark::X,
            color: CREATOR_COLOR,
            ..creator
        };
        Self {
            session_id,
            board: Board::new(),
            player_a,
            player_b: None,
            turn_holder,
            winner: None,
            status: GameStatus::Waiting,
            settled: false,
            messages: Vec::new(),
        }
    }

    /// Gets the participant with the given id.
    pub fn participant(&self, player_id: &str) -> Option<&Player> {
        if self.player_a.id == player_id {
            Some(&self.player_a)
        } else {
            self.player_b.as_ref().filter(|p| p.id == player_id)
        }
    }

    /// Gets the opponent of the participant with the given id.
    pub fn opponent(&self, player_id: &str) -> Option<&Player> {
        if self.player_a.id == player_id {
            self.player_b.as_ref()
        } else if self.player_b.as_ref().is_some_and(|p| p.id == player_id) {
            Some(&self.player_a)
        } else {
            None
        }
    }

    /// True iff the given id belongs to either participant.
    pub fn is_participant(&self, player_id: &str) -> bool {
        self.participant(player_id).is_some()
    }

    /// Resets the record for a rematch.
    ///
    /// Clears board, winner, and the settlement guard; restores the turn to
    /// participant A. Participant identities, marks, colors, and the chat
    /// log are preserved.
    pub fn reset_for_rematch(&mut self) {
        self.board = Board::new();
        self.turn_holder = Some(self.player_a.id.clone());
        self.winner = None;
        self.status = GameStatus::InProgress;
        self.settled = false;
    }

    /// Resets the record to `Waiting` after participant B leaves.
    ///
    /// The session becomes rejoinable by a new second participant. The
    /// settlement guard is cleared so a settled outcome from the previous
    /// pairing cannot suppress settlement of the next one.
    pub fn reset_to_waiting(&mut self) {
        self.board = Board::new();
        self.player_b = None;
        self.turn_holder = Some(self.player_a.id.clone());
        self.winner = None;
        self.status = GameStatus::Waiting;
        self.settled = false;
    }
}
