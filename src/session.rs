//! Session lifecycle and the move-validation state machine.
//!
//! The [`SessionManager`] owns every invariant of the shared session record.
//! Each operation is one store read, one local derivation, and one
//! unconditional store write; no lock is held across the span, so two
//! operations on the same session from different clients form a classic
//! read-modify-write race in which the later write wins in full. The
//! alternating-turn workload makes this acceptable for `make_move` (only
//! the turn holder's move survives validation); concurrent `join` and
//! `leave`/`move` races are a documented consistency gap, not arbitrated
//! here.

use crate::board::{Mark, Square};
use crate::ledger::ScoreLedger;
use crate::model::{ChatMessage, GameStatus, JOINER_COLOR, Player, SessionId, SessionRecord};
use crate::observer::SessionUpdates;
use crate::store::{RecordStore, StoreError};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Errors reported by session operations.
///
/// `make_move` and `leave_session` never report validation failures: they
/// degrade to silent no-ops (logged at `warn`), and the caller's own
/// observation of the authoritative record reconciles its view.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum SessionError {
    /// No record exists for the session id.
    #[display("Session not found")]
    NotFound,
    /// The session already has two participants.
    #[display("Session already has two players")]
    SessionFull,
    /// A player attempted to join their own session.
    #[display("Cannot join your own session")]
    SelfJoin,
    /// The record store failed.
    #[display("Record store failure: {_0}")]
    #[from]
    Store(StoreError),
    /// A stored document could not be decoded as a session record.
    #[display("Malformed session record: {_0}")]
    #[from]
    Codec(serde_json::Error),
}

/// Orchestrates create/join/move/leave/rematch over the shared record store.
///
/// Cheap to clone; clones share the same store and ledger handles. Hold one
/// per client task rather than stashing it in global state.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn RecordStore>,
    ledger: Arc<dyn ScoreLedger>,
}

impl SessionManager {
    /// Creates a manager over the given store and ledger adapters.
    pub fn new(store: Arc<dyn RecordStore>, ledger: Arc<dyn ScoreLedger>) -> Self {
        Self { store, ledger }
    }

    /// Creates a new session with `creator` as participant A.
    ///
    /// Writes a fresh `Waiting` record under a generated 6-letter session id
    /// and returns the id. The id keyspace (26^6) is large relative to the
    /// expected number of live sessions, so no pre-write existence check is
    /// made; a collision silently overwrites the older session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the write fails.
    #[instrument(skip(self, creator), fields(creator_id = %creator.id))]
    pub async fn create_session(&self, creator: Player) -> Result<SessionId, SessionError> {
        let session_id = generate_session_id();
        let record = SessionRecord::waiting(session_id.clone(), creator);
        self.write(&record).await?;
        info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    /// Joins an existing session as participant B.
    ///
    /// The joiner receives mark O and the joiner color; the session moves to
    /// `InProgress` with the turn on participant A. The updated record is a
    /// single unconditional overwrite: if two joiners race, the later write
    /// wins and the earlier joiner's assignment is silently lost.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for a missing session,
    /// [`SessionError::SessionFull`] when participant B is already set, and
    /// [`SessionError::SelfJoin`] when the joiner created the session.
    #[instrument(skip(self, joiner), fields(joiner_id = %joiner.id))]
    pub async fn join_session(&self, session_id: &str, joiner: Player) -> Result<(), SessionError> {
        let mut record = self.read(session_id).await?.ok_or(SessionError::NotFound)?;

        if record.player_b.is_some() {
            warn!(session_id, "Session already has two players");
            return Err(SessionError::SessionFull);
        }
        if record.player_a.id == joiner.id {
            warn!(session_id, "Player attempted to join own session");
            return Err(SessionError::SelfJoin);
        }

        record.player_b = Some(Player {
            mark: Mark::O,
            color: JOINER_COLOR,
            ..joiner
        });
        record.status = GameStatus::InProgress;
        record.turn_holder = Some(record.player_a.id.clone());

        self.write(&record).await?;
        info!(session_id, "Player joined session");
        Ok(())
    }

    /// Applies a move for `player_id` at `position` (0-8, row-major).
    ///
    /// Fail-closed: when the session is missing, the game is not in
    /// progress, it is not the caller's turn, the position is out of range,
    /// or the cell is occupied, nothing is written and no error is reported.
    /// A winning move settles scores (once per outcome, guarded by the
    /// record's `settled` flag) before the record is written back.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] or [`SessionError::Codec`] only for
    /// adapter failures; validation failures are silent no-ops.
    #[instrument(skip(self))]
    pub async fn make_move(
        &self,
        session_id: &str,
        position: usize,
        player_id: &str,
    ) -> Result<(), SessionError> {
        let Some(mut record) = self.read(session_id).await? else {
            warn!(session_id, "Move on missing session ignored");
            return Ok(());
        };

        // Fail-closed validation: any miss leaves the record untouched.
        if record.status != GameStatus::InProgress {
            warn!(session_id, status = ?record.status, "Move ignored: game not in progress");
            return Ok(());
        }
        if record.turn_holder.as_deref() != Some(player_id) {
            warn!(
                session_id,
                player_id,
                turn_holder = ?record.turn_holder,
                "Move ignored: not player's turn"
            );
            return Ok(());
        }
        if position >= 9 {
            warn!(session_id, position, "Move ignored: position out of range");
            return Ok(());
        }
        if !record.board.is_empty(position) {
            warn!(session_id, position, "Move ignored: cell occupied");
            return Ok(());
        }
        let Some(mark) = record.participant(player_id).map(|p| p.mark) else {
            warn!(session_id, player_id, "Move ignored: turn holder is not a participant");
            return Ok(());
        };

        record
            .board
            .set(position, Square::Marked(mark))
            .map_err(StoreError::new)?;

        // Win check precedes the draw check: a full board whose last move
        // completes a line is a win.
        if record.board.has_win(mark) {
            record.status = GameStatus::Won;
            record.winner = Some(player_id.to_string());
            record.turn_holder = None;
            if !record.settled {
                if let Some(loser) = record.opponent(player_id).map(|p| p.id.clone()) {
                    self.settle_scores(player_id, &loser).await;
                }
                record.settled = true;
            }
        } else if record.board.is_full() {
            record.status = GameStatus::Drawn;
            record.turn_holder = None;
        } else if let Some(next) = record.opponent(player_id).map(|p| p.id.clone()) {
            record.turn_holder = Some(next);
        }

        self.write(&record).await?;
        info!(
            session_id,
            player_id,
            position,
            status = ?record.status,
            "Move applied"
        );
        Ok(())
    }

    /// Resets a session for a rematch.
    ///
    /// Board, winner, turn, and the settlement guard reset; participants,
    /// marks, colors, cumulative scores, and the chat log are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for a missing session.
    #[instrument(skip(self))]
    pub async fn rematch(&self, session_id: &str) -> Result<(), SessionError> {
        let mut record = self.read(session_id).await?.ok_or(SessionError::NotFound)?;
        record.reset_for_rematch();
        self.write(&record).await?;
        info!(session_id, "Session reset for rematch");
        Ok(())
    }

    /// Removes a player from a session.
    ///
    /// Participant A leaving deletes the record outright (the owner leaving
    /// ends the session for everyone). Participant B leaving resets the
    /// session to `Waiting`, rejoinable by a new second participant. Any
    /// other id, or a missing session, is a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] or [`SessionError::Codec`] only for
    /// adapter failures.
    #[instrument(skip(self))]
    pub async fn leave_session(&self, session_id: &str, player_id: &str) -> Result<(), SessionError> {
        let Some(mut record) = self.read(session_id).await? else {
            warn!(session_id, "Leave on missing session ignored");
            return Ok(());
        };

        if record.player_a.id == player_id {
            self.store.delete(session_id).await?;
            info!(session_id, player_id, "Owner left; session deleted");
        } else if record.player_b.as_ref().is_some_and(|p| p.id == player_id) {
            record.reset_to_waiting();
            self.write(&record).await?;
            info!(session_id, player_id, "Guest left; session reset to waiting");
        } else {
            warn!(session_id, player_id, "Leave by non-participant ignored");
        }
        Ok(())
    }

    /// Appends a chat message to the session's message log.
    ///
    /// Read-modify-write with no ordering guarantee stronger than the
    /// store's write order; two messages sent near-simultaneously can lose
    /// one to the race, like every other non-move write.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for a missing session.
    #[instrument(skip(self, text))]
    pub async fn send_message(
        &self,
        session_id: &str,
        sender_id: &str,
        sender_name: &str,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let mut record = self.read(session_id).await?.ok_or(SessionError::NotFound)?;
        record.messages.push(ChatMessage::new(
            sender_id.to_string(),
            sender_name.to_string(),
            text.into(),
        ));
        self.write(&record).await?;
        debug!(session_id, sender_id, "Chat message appended");
        Ok(())
    }

    /// Observes a session's record as a stream of validated snapshots.
    ///
    /// See [`SessionUpdates`] for delivery and cancellation semantics. The
    /// observer never mutates the record and is independent of any in-flight
    /// operation on the same session.
    #[instrument(skip(self))]
    pub fn observe(&self, session_id: &str) -> SessionUpdates {
        debug!(session_id, "Attaching session observer");
        SessionUpdates::new(session_id.to_string(), self.store.subscribe(session_id))
    }

    /// Reads and decodes the session record at `session_id`.
    async fn read(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        match self.store.get(session_id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encodes and writes the record under its own session id.
    async fn write(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let value = serde_json::to_value(record)?;
        self.store.set(&record.session_id, value).await?;
        Ok(())
    }

    /// Applies the one-time score settlement for a winning outcome.
    ///
    /// Two independent keyed updates, not atomic with each other or with
    /// the session write. A ledger failure leaves that player's score
    /// permanently under-recorded: it is logged and never retried, and the
    /// session record still transitions to settled.
    async fn settle_scores(&self, winner_id: &str, loser_id: &str) {
        for (player_id, delta) in [(winner_id, 1), (loser_id, -1)] {
            if let Err(err) = self.adjust_score(player_id, delta).await {
                error!(
                    player_id,
                    delta,
                    error = %err,
                    "Score settlement failed; ledger is under-recorded for this player"
                );
            }
        }
    }

    /// Read-modify-write of one player's cumulative score.
    async fn adjust_score(&self, player_id: &str, delta: i64) -> Result<(), StoreError> {
        let current = self.ledger.score(player_id).await?;
        self.ledger.set_score(player_id, current + delta).await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

/// Generates a 6-character uppercase alphabetic session id.
fn generate_session_id() -> SessionId {
    let mut rng = rand::thread_rng();
    (0..6).map(|_| rng.gen_range('A'..='Z')).collect()
}
