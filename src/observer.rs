//! Session observation as a cancellable snapshot stream.
//!
//! An observer republishes validated session snapshots pushed by the record
//! store. It never mutates the record and runs independently of any
//! in-flight manager operation on the same session.

use crate::model::{SessionId, SessionRecord};
use crate::store::{RecordWatch, StoreError};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Errors that terminate an observation stream.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ObserveError {
    /// The store's subscription reported a transport or authorization
    /// failure. The stream ends; retrying is a caller concern.
    #[display("Observation failed: {_0}")]
    ObservationFailed(StoreError),
}

/// Lazy, unbounded stream of session record snapshots.
///
/// Deliveries preserve the store's per-key write order, but rapid updates
/// may be coalesced by the backend to "latest wins" — intermediate writes
/// are not guaranteed. Snapshots that are absent (no record at the key) or
/// fail to decode are skipped with a logged warning. A backend failure
/// yields one terminal [`ObserveError`] item, after which the stream is
/// exhausted.
///
/// Dropping the stream detaches the underlying listener deterministically;
/// no deliveries are observable after the drop returns.
#[derive(Debug)]
pub struct SessionUpdates {
    session_id: SessionId,
    watch: RecordWatch,
    done: bool,
}

impl SessionUpdates {
    /// Wraps a raw record watch for the given session.
    pub(crate) fn new(session_id: SessionId, watch: RecordWatch) -> Self {
        Self {
            session_id,
            watch,
            done: false,
        }
    }

    /// The observed session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Receives the next snapshot; `None` once the stream is exhausted.
    pub async fn recv(&mut self) -> Option<Result<SessionRecord, ObserveError>> {
        futures::StreamExt::next(self).await
    }
}

impl Stream for SessionUpdates {
    type Item = Result<SessionRecord, ObserveError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match this.watch.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(err))) => {
                    warn!(session_id = %this.session_id, error = %err, "Observation failed");
                    this.done = true;
                    return Poll::Ready(Some(Err(ObserveError::ObservationFailed(err))));
                }
                Poll::Ready(Some(Ok(None))) => {
                    // Missing or deleted record; nothing to republish.
                    debug!(session_id = %this.session_id, "No record at key; skipping delivery");
                }
                Poll::Ready(Some(Ok(Some(value)))) => {
                    match serde_json::from_value::<SessionRecord>(value) {
                        Ok(record) => {
                            debug!(
                                session_id = %this.session_id,
                                status = ?record.status,
                                "Snapshot delivered"
                            );
                            return Poll::Ready(Some(Ok(record)));
                        }
                        Err(err) => {
                            warn!(
                                session_id = %this.session_id,
                                error = %err,
                                "Undecodable snapshot skipped"
                            );
                        }
                    }
                }
            }
        }
    }
}
