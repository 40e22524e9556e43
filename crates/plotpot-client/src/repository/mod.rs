//! Typed repositories over a [`Backend`](plotpot_types::Backend).
//!
//! Each repository owns the slots its operations publish into. An operation
//! either fails its pre-flight checks (published directly as `Error`, no
//! request sent) or runs `Loading -> Success | Error` on its slot, and in
//! every case returns the same outcome to the caller.
//!
//! Requests run on their own task (see `detached`). A caller that stops
//! waiting gives up the returned value, never the slot update.

pub mod animation;
pub mod auth;
pub mod challenge;
pub mod contribution;
pub mod profile;
pub mod story;
pub mod vote;

pub use animation::AnimationRepository;
pub use auth::AuthRepository;
pub use challenge::ChallengeRepository;
pub use contribution::ContributionRepository;
pub use profile::ProfileRepository;
pub use story::{StoryFilter, StoryRepository};
pub use vote::VoteRepository;

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use plotpot_types::{BackendError, UiState};

use crate::error::ClientError;
use crate::slot::{Slot, Ticket};

pub(crate) fn decode_row<T: DeserializeOwned>(entity: &'static str, row: Value) -> Result<T, ClientError> {
    serde_json::from_value(row).map_err(|e| ClientError::Decode(entity, e.to_string()))
}

pub(crate) fn decode_rows<T: DeserializeOwned>(entity: &'static str, rows: Vec<Value>) -> Result<Vec<T>, ClientError> {
    rows.into_iter().map(|row| decode_row(entity, row)).collect()
}

/// First row of a write's representation, or `NotFound` if nothing matched.
pub(crate) fn first_row<T: DeserializeOwned>(entity: &'static str, rows: Vec<Value>) -> Result<T, ClientError> {
    match rows.into_iter().next() {
        Some(row) => decode_row(entity, row),
        None => Err(ClientError::NotFound(entity)),
    }
}

pub(crate) fn encode<T: Serialize>(entity: &'static str, value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::Decode(entity, e.to_string()))
}

/// Gate an operation on a check that runs before any request. A failure is
/// published straight to `slot`, superseding whatever was in flight.
pub(crate) fn preflight<T, U, E>(slot: &Slot<T>, check: Result<U, E>) -> Result<U, ClientError>
where
    E: Into<ClientError>,
{
    check.map_err(|e| {
        let e = e.into();
        debug!("Rejected before sending: {}", e);
        slot.set(UiState::Error(e.user_message()));
        e
    })
}

/// Publish the outcome of the operation behind `ticket` and hand it back.
pub(crate) fn settle<T: Clone>(slot: &Slot<T>, ticket: Ticket, result: Result<T, ClientError>) -> Result<T, ClientError> {
    match &result {
        Ok(value) => {
            slot.finish(ticket, UiState::Success(value.clone()));
        }
        Err(e) => {
            warn!("Operation failed: {}", e);
            slot.finish(ticket, UiState::Error(e.user_message()));
        }
    }
    result
}

/// Run `op` on a task of its own and wait for its outcome.
///
/// Dropping the returned future, say on a timeout, detaches the operation
/// instead of cancelling it, so every slot it moved to `Loading` still
/// settles. Must be called from within a Tokio runtime.
pub(crate) async fn detached<T, F>(op: F) -> Result<T, ClientError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ClientError>> + Send + 'static,
{
    match tokio::spawn(op).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            error!("Repository task join error: {}", e);
            Err(BackendError::Other(format!("operation cancelled: {}", e)).into())
        }
    }
}

/// Outcome of a spawned fetch as a slot state.
pub(crate) fn to_state<T>(result: Result<T, ClientError>) -> UiState<T> {
    if let Err(e) = &result {
        warn!("Fetch failed: {}", e);
    }
    UiState::from_result(result, |e| e.user_message())
}
