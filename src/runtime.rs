use std::rc::Rc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::collaborators::Collaborators;
use crate::config::Policy;
use crate::coordinator::{ClaimReceipt, ClaimRejection, ZoneClaimCoordinator};
use crate::error::Result;
use crate::model::{ActorId, Position, ZoneRequest};
use crate::scheduler::{Deferred, Scheduler};
use crate::session::InteractionSessionTracker;
use crate::store::registry::ClaimRegistry;

/// Entry point for the host event loop. Every host event and timer tick is
/// handled here, on one logical thread, so no locking is needed in memory.
pub struct SafeZone {
    clock: Rc<dyn Clock>,
    collaborators: Collaborators,
    tracker: InteractionSessionTracker,
    coordinator: ZoneClaimCoordinator,
    scheduler: Scheduler<Deferred>,
}

impl SafeZone {
    /// Register the permission key and re-arm erasures for persisted claims.
    pub fn start(
        policy: Policy,
        registry: ClaimRegistry,
        collaborators: Collaborators,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        collaborators.permissions.register(&policy.permission);
        let tracker =
            InteractionSessionTracker::new(policy.target_kinds.clone(), policy.prompt_delay());
        let mut coordinator =
            ZoneClaimCoordinator::new(policy, registry, collaborators.clone(), clock.clone())?;
        let mut scheduler = Scheduler::new();
        coordinator.restore_erasures(&mut scheduler, clock.now());

        info!(
            reference_start = %coordinator.reference_start(),
            claims = coordinator.registry().len(),
            "safe zone coordinator started"
        );
        Ok(Self {
            clock,
            collaborators,
            tracker,
            coordinator,
            scheduler,
        })
    }

    pub fn on_session_open(&mut self, actor: ActorId, target_kind: &str) -> bool {
        let now = self.clock.now();
        self.tracker
            .on_session_open(actor, target_kind, now, &mut self.scheduler)
    }

    pub fn on_session_close(&mut self, actor: ActorId, target_kind: &str) -> bool {
        self.tracker.on_session_close(
            actor,
            target_kind,
            &mut self.scheduler,
            self.collaborators.prompts.as_ref(),
        )
    }

    /// The player pressed the prompt (or typed the command).
    pub fn on_confirm(
        &mut self,
        actor: ActorId,
        position: Position,
    ) -> std::result::Result<ClaimReceipt, ClaimRejection> {
        let request = ZoneRequest { actor, position };
        let outcome = self.coordinator.request_claim(&request, &mut self.scheduler);
        if outcome.is_ok() && self.tracker.is_prompt_shown(actor) {
            self.collaborators.prompts.destroy(actor);
        }
        outcome
    }

    /// Run every deferred task that is due. Returns how many ran.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let due = self.scheduler.take_due(now);
        let fired = due.len();
        for task in due {
            match task {
                Deferred::ShowPrompt(actor) => {
                    if !self.tracker.prompt_due(actor) {
                        continue;
                    }
                    if self.coordinator.prompt_eligible(actor, now) {
                        self.collaborators
                            .prompts
                            .show(actor, &self.coordinator.policy().command);
                        self.tracker.mark_shown(actor);
                    } else {
                        debug!(%actor, "prompt withheld: actor cannot claim");
                    }
                }
                Deferred::EraseZone { group, zone_id } => {
                    self.coordinator.zone_erase_due(&group, &zone_id);
                }
            }
        }
        fired
    }

    /// Tear down every open prompt and drop pending timers.
    pub fn shutdown(&mut self) -> Vec<ActorId> {
        let closed = self
            .tracker
            .on_shutdown(&mut self.scheduler, self.collaborators.prompts.as_ref());
        let dropped = self.scheduler.clear();
        info!(
            sessions = closed.len(),
            dropped_tasks = dropped,
            "safe zone coordinator stopped"
        );
        closed
    }

    pub fn tracker(&self) -> &InteractionSessionTracker {
        &self.tracker
    }

    pub fn coordinator(&self) -> &ZoneClaimCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> (&mut ZoneClaimCoordinator, &mut Scheduler<Deferred>) {
        (&mut self.coordinator, &mut self.scheduler)
    }

    pub fn scheduler(&self) -> &Scheduler<Deferred> {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::memory::{
        MemoryDirectory, MemoryPermissions, MemoryPrompts, MemoryZoneService,
    };
    use chrono::{TimeDelta, Utc};

    const CUPBOARD: &str = "cupboard.tool.deployed";

    fn runtime() -> (SafeZone, ManualClock, Rc<MemoryPrompts>, Rc<MemoryPermissions>, Rc<MemoryDirectory>) {
        let clock = ManualClock::new(Utc::now());
        let prompts = Rc::new(MemoryPrompts::default());
        let permissions = Rc::new(MemoryPermissions::default());
        let directory = Rc::new(MemoryDirectory::default());
        let collaborators = Collaborators {
            directory: directory.clone(),
            zones: Rc::new(MemoryZoneService::default()),
            prompts: prompts.clone(),
            permissions: permissions.clone(),
        };
        let rt = SafeZone::start(
            Policy::default(),
            ClaimRegistry::in_memory().unwrap(),
            collaborators,
            Rc::new(clock.clone()),
        )
        .unwrap();
        (rt, clock, prompts, permissions, directory)
    }

    #[test]
    fn start_registers_permission() {
        let (_rt, _clock, _prompts, permissions, _dir) = runtime();
        assert!(permissions.is_registered("clansafezone.use"));
    }

    #[test]
    fn prompt_shows_after_delay_for_eligible_actor() {
        let (mut rt, clock, prompts, permissions, dir) = runtime();
        dir.assign(ActorId(1), "Alpha");
        permissions.grant(ActorId(1), "clansafezone.use");

        rt.on_session_open(ActorId(1), CUPBOARD);
        assert_eq!(rt.tick(), 0);
        clock.advance(TimeDelta::milliseconds(200));
        assert_eq!(rt.tick(), 1);

        assert_eq!(prompts.show_count(ActorId(1)), 1);
        assert!(rt.tracker().is_prompt_shown(ActorId(1)));
    }

    #[test]
    fn prompt_withheld_from_ineligible_actor() {
        let (mut rt, clock, prompts, _permissions, _dir) = runtime();
        rt.on_session_open(ActorId(2), CUPBOARD);
        clock.advance(TimeDelta::seconds(1));
        rt.tick();

        assert_eq!(prompts.show_count(ActorId(2)), 0);
        assert!(rt.tracker().is_open(ActorId(2)));
    }

    #[test]
    fn successful_confirm_removes_prompt() {
        let (mut rt, clock, prompts, permissions, dir) = runtime();
        dir.assign(ActorId(1), "Alpha");
        permissions.grant(ActorId(1), "clansafezone.use");
        rt.on_session_open(ActorId(1), CUPBOARD);
        clock.advance(TimeDelta::seconds(1));
        rt.tick();

        rt.on_confirm(ActorId(1), Position::new(1.0, 2.0, 3.0)).unwrap();
        assert!(!prompts.is_visible(ActorId(1)));
    }

    #[test]
    fn shutdown_clears_sessions_and_timers() {
        let (mut rt, _clock, prompts, _permissions, _dir) = runtime();
        rt.on_session_open(ActorId(1), CUPBOARD);
        rt.on_session_open(ActorId(2), CUPBOARD);

        let closed = rt.shutdown();
        assert_eq!(closed.len(), 2);
        assert!(rt.tracker().is_empty());
        assert!(rt.scheduler().is_empty());
        assert_eq!(prompts.destroy_count(ActorId(1)), 1);
        assert_eq!(prompts.destroy_count(ActorId(2)), 1);
    }
}
