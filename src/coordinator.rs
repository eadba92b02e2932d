use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::collaborators::{
    CLAIM_STORE, CollaboratorError, Collaborators, GROUP_DIRECTORY, ZONE_SERVICE, bounded,
};
use crate::config::{ExistingZoneCheck, Policy};
use crate::eligibility::{Eligibility, Ineligible, evaluate};
use crate::error::{Result, SafeZoneError};
use crate::model::{ActorId, ClaimRecord, Position, ZoneRequest, ZoneSpec, expand_flags, zone_id_for};
use crate::scheduler::{Deferred, Scheduler};
use crate::store::registry::{ClaimRegistry, GroupLock};

/// Why a confirm action did not produce a zone. Every variant carries its own
/// player-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ClaimRejection {
    #[error("You do not have permission to create a safe zone.")]
    NoPermission,

    #[error(transparent)]
    Ineligible {
        #[from]
        detail: Ineligible,
    },

    #[error("The {service} is unavailable right now; please try again later.")]
    CollaboratorUnavailable { service: &'static str },

    #[error("The safe zone could not be created; please try again.")]
    ZoneServiceFailure { detail: String },

    #[error("Another safe zone request for your clan is being processed.")]
    ClaimInProgress,
}

impl ClaimRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPermission => "no_permission",
            Self::Ineligible { detail } => detail.code(),
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            Self::ZoneServiceFailure { .. } => "zone_service_failure",
            Self::ClaimInProgress => "claim_in_progress",
        }
    }
}

impl From<CollaboratorError> for ClaimRejection {
    fn from(err: CollaboratorError) -> Self {
        Self::CollaboratorUnavailable {
            service: err.service(),
        }
    }
}

/// A zone that was created and recorded for a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimReceipt {
    pub group: String,
    pub zone_id: String,
    pub position: Position,
    pub radius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ClaimReceipt {
    pub fn message(&self) -> String {
        match self.expires_at {
            Some(_) => "Clan safe zone created. Protection will expire at the end of the activation window.".into(),
            None => "Clan safe zone created.".into(),
        }
    }
}

/// Runs a confirm action end to end: permission, group lookup, eligibility,
/// zone creation and claim bookkeeping. Collaborator failures never escape;
/// they come back as a [`ClaimRejection`].
pub struct ZoneClaimCoordinator {
    policy: Policy,
    registry: ClaimRegistry,
    collaborators: Collaborators,
    clock: Rc<dyn Clock>,
    reference_start: DateTime<Utc>,
}

impl ZoneClaimCoordinator {
    /// The window's reference start comes from the policy when set, otherwise
    /// from the claim store (recorded on first start).
    pub fn new(
        policy: Policy,
        registry: ClaimRegistry,
        collaborators: Collaborators,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        policy.validate()?;
        let reference_start = match policy.window_started_at {
            Some(start) => start,
            None => registry.reference_start_or_init(clock.now())?,
        };
        Ok(Self {
            policy,
            registry,
            collaborators,
            clock,
            reference_start,
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn registry(&self) -> &ClaimRegistry {
        &self.registry
    }

    pub fn reference_start(&self) -> DateTime<Utc> {
        self.reference_start
    }

    pub fn window_deadline(&self) -> Option<DateTime<Utc>> {
        self.policy.window_deadline(self.reference_start)
    }

    fn resolve_group(&self, actor: ActorId) -> std::result::Result<Option<String>, CollaboratorError> {
        bounded(
            self.clock.as_ref(),
            self.policy.collaborator_timeout(),
            GROUP_DIRECTORY,
            || self.collaborators.directory.resolve_group(actor),
        )
    }

    fn enter_group(&mut self, group: &str) -> std::result::Result<GroupLock, ClaimRejection> {
        let lock = self.registry.lock_group(group).map_err(|err| match err {
            SafeZoneError::Locked(_) => ClaimRejection::ClaimInProgress,
            other => {
                warn!(group, error = %other, "claim store lock failed");
                ClaimRejection::CollaboratorUnavailable {
                    service: CLAIM_STORE,
                }
            }
        })?;
        self.registry.refresh(group).map_err(|err| {
            warn!(group, error = %err, "claim store read failed");
            ClaimRejection::CollaboratorUnavailable {
                service: CLAIM_STORE,
            }
        })?;
        Ok(lock)
    }

    /// Handle a confirm action. On success the group's claim is consumed and
    /// the zone exists; on any rejection nothing was changed.
    pub fn request_claim(
        &mut self,
        request: &ZoneRequest,
        scheduler: &mut Scheduler<Deferred>,
    ) -> std::result::Result<ClaimReceipt, ClaimRejection> {
        let actor = request.actor;
        let now = self.clock.now();

        if !self
            .collaborators
            .permissions
            .has_permission(actor, &self.policy.permission)
        {
            info!(%actor, "claim rejected: missing permission");
            return Err(ClaimRejection::NoPermission);
        }

        let group = self.resolve_group(actor).map_err(|err| {
            warn!(%actor, error = %err, "group lookup failed");
            ClaimRejection::from(err)
        })?;
        let group = group.as_deref().filter(|g| !g.is_empty());

        // Held until return: spans the uniqueness check and the commit.
        let _lock = group.map(|g| self.enter_group(g)).transpose()?;

        if let Eligibility::Rejected(reason) =
            evaluate(group, now, &self.registry, &self.policy, self.reference_start)
        {
            info!(%actor, group = group.unwrap_or("-"), reason = reason.code(), "claim rejected");
            return Err(reason.into());
        }
        let Some(group) = group else {
            return Err(Ineligible::NotInGroup.into());
        };

        if self.policy.existing_zone_check == ExistingZoneCheck::ScanZoneIds {
            let zone_ids = bounded(
                self.clock.as_ref(),
                self.policy.collaborator_timeout(),
                ZONE_SERVICE,
                || self.collaborators.zones.list_zone_ids(),
            )
            .map_err(|err| {
                warn!(%actor, group, error = %err, "zone listing failed");
                ClaimRejection::from(err)
            })?;
            let prefix = self.policy.zone_id_prefix.as_str();
            if zone_ids
                .iter()
                .any(|id| id.strip_prefix(prefix).unwrap_or(id.as_str()).contains(group))
            {
                info!(%actor, group, "claim rejected: zone already present");
                return Err(Ineligible::AlreadyClaimed.into());
            }
        }

        let expires_at = self.window_deadline();
        let zone_id = zone_id_for(&self.policy.zone_id_prefix, group);
        let spec = ZoneSpec {
            zone_id: zone_id.clone(),
            position: request.position,
            radius: self.policy.zone_radius,
            flags: expand_flags(&self.policy.zone_flags, group),
        };
        let created = bounded(
            self.clock.as_ref(),
            self.policy.collaborator_timeout(),
            ZONE_SERVICE,
            || self.collaborators.zones.create_or_update_zone(&spec),
        );
        match created {
            Ok(true) => {}
            Ok(false) => {
                warn!(%actor, group, zone_id = %zone_id, "zone service refused zone");
                return Err(ClaimRejection::ZoneServiceFailure {
                    detail: format!("zone service refused {zone_id}"),
                });
            }
            Err(err @ CollaboratorError::TimedOut { .. }) => {
                // The late create may have gone through; no claim backs it.
                warn!(%actor, group, zone_id = %zone_id, error = %err, "zone creation timed out; erasing");
                if let Err(erase_err) = self.collaborators.zones.erase_zone(&zone_id) {
                    warn!(group, zone_id = %zone_id, error = %erase_err, "zone erase failed");
                }
                return Err(err.into());
            }
            Err(err) => {
                warn!(%actor, group, zone_id = %zone_id, error = %err, "zone creation failed");
                return Err(err.into());
            }
        }

        let record = ClaimRecord {
            group: group.to_string(),
            zone_id: zone_id.clone(),
            claimed_by: actor,
            position: request.position,
            radius: self.policy.zone_radius,
            claimed_at: now,
            expires_at,
            zone_erased: false,
        };
        if let Err(err) = self.registry.commit(record) {
            error!(group, error = %err, "claim not persisted; it holds until restart only");
        }

        if self.policy.schedule_zone_erase
            && let Some(deadline) = expires_at
        {
            let handle = scheduler.schedule_at(
                deadline.max(now),
                Deferred::EraseZone {
                    group: group.to_string(),
                    zone_id: zone_id.clone(),
                },
            );
            self.registry.set_erase_handle(group, handle);
        }

        info!(%actor, group, zone_id = %zone_id, position = %request.position, "safe zone created");
        Ok(ClaimReceipt {
            group: group.to_string(),
            zone_id,
            position: request.position,
            radius: self.policy.zone_radius,
            expires_at,
        })
    }

    /// Whether to offer the prompt to `actor`. Cosmetic only: the confirm
    /// action repeats every check.
    pub fn prompt_eligible(&self, actor: ActorId, now: DateTime<Utc>) -> bool {
        if !self
            .collaborators
            .permissions
            .has_permission(actor, &self.policy.permission)
        {
            return false;
        }
        let group = match self.resolve_group(actor) {
            Ok(group) => group,
            Err(err) => {
                warn!(%actor, error = %err, "group lookup failed; hiding prompt");
                return false;
            }
        };
        evaluate(
            group.as_deref(),
            now,
            &self.registry,
            &self.policy,
            self.reference_start,
        )
        .is_approved()
    }

    /// An erase scheduled for `group` fell due.
    pub fn zone_erase_due(&mut self, group: &str, zone_id: &str) {
        let erased = bounded(
            self.clock.as_ref(),
            self.policy.collaborator_timeout(),
            ZONE_SERVICE,
            || self.collaborators.zones.erase_zone(zone_id),
        );
        match erased {
            Ok(()) => {
                info!(group, zone_id = %zone_id, "safe zone expired and was erased");
                if let Err(err) = self.registry.mark_erased(group) {
                    error!(group, error = %err, "zone erasure not persisted");
                }
            }
            Err(err) => warn!(group, zone_id = %zone_id, error = %err, "zone erase failed"),
        }
    }

    /// Re-arm erasures for persisted claims whose zone is still up. Lapsed
    /// ones are scheduled for `now` and fire on the next tick.
    pub fn restore_erasures(&mut self, scheduler: &mut Scheduler<Deferred>, now: DateTime<Utc>) -> usize {
        if !self.policy.schedule_zone_erase {
            return 0;
        }
        let pending: Vec<(String, String, DateTime<Utc>)> = self
            .registry
            .pending_erasures()
            .into_iter()
            .filter(|record| self.registry.erase_handle(&record.group).is_none())
            .filter_map(|record| {
                record
                    .expires_at
                    .map(|at| (record.group.clone(), record.zone_id.clone(), at))
            })
            .collect();

        let restored = pending.len();
        for (group, zone_id, expires_at) in pending {
            let handle = scheduler.schedule_at(
                expires_at.max(now),
                Deferred::EraseZone {
                    group: group.clone(),
                    zone_id,
                },
            );
            self.registry.set_erase_handle(&group, handle);
        }
        if restored > 0 {
            info!(restored, "re-armed zone erasures from claim store");
        }
        restored
    }

    /// Drop a group's claim: cancel its pending erase, erase the zone now and
    /// let the group claim again.
    pub fn invalidate_claim(
        &mut self,
        group: &str,
        scheduler: &mut Scheduler<Deferred>,
    ) -> Result<ClaimRecord> {
        let (record, erase) = self
            .registry
            .forget(group)?
            .ok_or_else(|| SafeZoneError::ClaimNotFound(group.to_string()))?;
        if let Some(handle) = erase {
            scheduler.cancel(handle);
        }
        if !record.zone_erased {
            let erased = bounded(
                self.clock.as_ref(),
                self.policy.collaborator_timeout(),
                ZONE_SERVICE,
                || self.collaborators.zones.erase_zone(&record.zone_id),
            );
            if let Err(err) = erased {
                warn!(group, zone_id = record.zone_id.as_str(), error = %err, "zone erase failed");
            }
        }
        info!(group, "claim invalidated");
        Ok(record)
    }
}
