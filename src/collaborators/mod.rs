//! Contracts for the external services the coordinator calls out to.
//!
//! All calls are synchronous from the caller's view and run on the host's
//! single logical thread, so implementations take `&self` and keep any
//! bookkeeping behind interior mutability.

pub mod memory;

use std::rc::Rc;

use chrono::TimeDelta;
use thiserror::Error;
use tracing::warn;

use crate::clock::Clock;
use crate::model::{ActorId, ZoneSpec};

pub const GROUP_DIRECTORY: &str = "group directory";
pub const ZONE_SERVICE: &str = "zone service";
pub const CLAIM_STORE: &str = "claim store";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    #[error("{service} did not answer within {elapsed_ms}ms")]
    TimedOut {
        service: &'static str,
        elapsed_ms: i64,
    },
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::Unavailable { service, .. } | Self::TimedOut { service, .. } => service,
        }
    }
}

/// Resolves actors to their group ("clan") tag.
pub trait GroupDirectory {
    /// `Ok(None)` means the actor is not in any group.
    fn resolve_group(&self, actor: ActorId) -> Result<Option<String>, CollaboratorError>;
}

/// Creates and erases protected zones.
pub trait ZoneService {
    /// Idempotent create-or-update. `Ok(false)` is an explicit refusal.
    fn create_or_update_zone(&self, spec: &ZoneSpec) -> Result<bool, CollaboratorError>;

    /// Best-effort erase.
    fn erase_zone(&self, zone_id: &str) -> Result<(), CollaboratorError>;

    fn list_zone_ids(&self) -> Result<Vec<String>, CollaboratorError>;
}

/// Renders a single-button prompt bound to a command.
pub trait PromptUi {
    fn show(&self, actor: ActorId, command: &str);
    fn destroy(&self, actor: ActorId);
}

pub trait PermissionStore {
    fn has_permission(&self, actor: ActorId, key: &str) -> bool;
    fn register(&self, key: &str);
}

/// Shared handles to every collaborator.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Rc<dyn GroupDirectory>,
    pub zones: Rc<dyn ZoneService>,
    pub prompts: Rc<dyn PromptUi>,
    pub permissions: Rc<dyn PermissionStore>,
}

/// Run a collaborator call under a time budget.
///
/// The call itself cannot be interrupted; an answer that arrives after
/// `limit` is discarded and reported as [`CollaboratorError::TimedOut`].
pub fn bounded<T>(
    clock: &dyn Clock,
    limit: TimeDelta,
    service: &'static str,
    call: impl FnOnce() -> Result<T, CollaboratorError>,
) -> Result<T, CollaboratorError> {
    let started = clock.now();
    let result = call();
    let elapsed = clock.now() - started;
    if elapsed > limit {
        warn!(
            service,
            elapsed_ms = elapsed.num_milliseconds(),
            limit_ms = limit.num_milliseconds(),
            "collaborator call exceeded its time budget"
        );
        return Err(CollaboratorError::TimedOut {
            service,
            elapsed_ms: elapsed.num_milliseconds(),
        });
    }
    result
}
