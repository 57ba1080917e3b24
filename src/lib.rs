//! Strategy Squares - shared-store session manager for a two-player grid game.
//!
//! Two clients play 3x3 win-by-line against each other through a shared,
//! remotely-readable/writable record store with change notifications and
//! **no** compare-and-swap. The hard part is not the win arithmetic but the
//! session state machine under concurrent, non-transactional mutation: every
//! operation is a single read-derive-write against the store, and the design
//! documents exactly which races it tolerates.
//!
//! # Architecture
//!
//! - **Board**: pure win/draw evaluation over a board snapshot
//! - **Model**: the session record both clients read and write as a whole
//! - **Store**: the record store adapter boundary (`get`/`set`/`delete`/
//!   `subscribe`), plus an in-process implementation
//! - **Ledger**: the cumulative-score adapter boundary
//! - **Session**: the manager that owns all invariant enforcement
//! - **Observer**: cancellable streams of validated record snapshots
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use strategy_squares::{MemoryLedger, MemoryStore, Player, SessionManager};
//!
//! # async fn example() -> Result<(), strategy_squares::SessionError> {
//! let store = Arc::new(MemoryStore::new());
//! let ledger = Arc::new(MemoryLedger::new());
//! let manager = SessionManager::new(store, ledger);
//!
//! let alice = Player::new("alice-uid".to_string(), "Alice".to_string());
//! let session_id = manager.create_session(alice).await?;
//!
//! let bob = Player::new("bob-uid".to_string(), "Bob".to_string());
//! manager.join_session(&session_id, bob).await?;
//! manager.make_move(&session_id, 4, "alice-uid").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod board;
mod ledger;
mod model;
mod observer;
mod session;
mod store;

// Crate-level exports - Board evaluation
pub use board::{Board, Mark, Square};

// Crate-level exports - Data model
pub use model::{
    CREATOR_COLOR, ChatMessage, GameStatus, JOINER_COLOR, Player, PlayerId, SessionId,
    SessionRecord,
};

// Crate-level exports - Record store boundary
pub use store::{MemoryStore, RecordEvent, RecordStore, RecordWatch, StoreError};

// Crate-level exports - Score ledger boundary
pub use ledger::{MemoryLedger, ScoreLedger};

// Crate-level exports - Session management
pub use session::{SessionError, SessionManager};

// Crate-level exports - Observation
pub use observer::{ObserveError, SessionUpdates};
