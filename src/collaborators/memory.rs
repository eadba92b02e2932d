//! In-process collaborators that record every call.
//!
//! Used by the scenario simulator and by tests; each service can be switched
//! to "unavailable" to exercise the degraded paths.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::TimeDelta;
use serde::Serialize;

use super::{
    CollaboratorError, GROUP_DIRECTORY, GroupDirectory, PermissionStore, PromptUi, ZONE_SERVICE,
    ZoneService,
};
use crate::clock::ManualClock;
use crate::model::{ActorId, ZoneSpec};

#[derive(Debug)]
pub struct MemoryDirectory {
    groups: RefCell<HashMap<ActorId, String>>,
    available: Cell<bool>,
    latency: RefCell<Option<(ManualClock, TimeDelta)>>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self {
            groups: RefCell::new(HashMap::new()),
            available: Cell::new(true),
            latency: RefCell::new(None),
        }
    }
}

impl MemoryDirectory {
    pub fn assign(&self, actor: ActorId, group: impl Into<String>) {
        self.groups.borrow_mut().insert(actor, group.into());
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Make every lookup advance `clock` by `delay`.
    pub fn set_latency(&self, clock: ManualClock, delay: TimeDelta) {
        *self.latency.borrow_mut() = Some((clock, delay));
    }
}

impl GroupDirectory for MemoryDirectory {
    fn resolve_group(&self, actor: ActorId) -> Result<Option<String>, CollaboratorError> {
        if let Some((clock, delay)) = self.latency.borrow().as_ref() {
            clock.advance(*delay);
        }
        if !self.available.get() {
            return Err(CollaboratorError::unavailable(
                GROUP_DIRECTORY,
                "plugin not loaded",
            ));
        }
        Ok(self.groups.borrow().get(&actor).cloned())
    }
}

#[derive(Debug)]
pub struct MemoryZoneService {
    zones: RefCell<BTreeMap<String, ZoneSpec>>,
    creates: RefCell<Vec<ZoneSpec>>,
    erases: RefCell<Vec<String>>,
    available: Cell<bool>,
    refuse_creates: Cell<bool>,
    create_latency: RefCell<Option<(ManualClock, TimeDelta)>>,
}

impl Default for MemoryZoneService {
    fn default() -> Self {
        Self {
            zones: RefCell::new(BTreeMap::new()),
            creates: RefCell::new(Vec::new()),
            erases: RefCell::new(Vec::new()),
            available: Cell::new(true),
            refuse_creates: Cell::new(false),
            create_latency: RefCell::new(None),
        }
    }
}

impl MemoryZoneService {
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Answer `Ok(false)` to every create.
    pub fn set_refuse_creates(&self, refuse: bool) {
        self.refuse_creates.set(refuse);
    }

    /// Make every create advance `clock` by `delay` before it lands.
    pub fn set_create_latency(&self, clock: ManualClock, delay: TimeDelta) {
        *self.create_latency.borrow_mut() = Some((clock, delay));
    }

    /// Register a zone that exists before the coordinator starts.
    pub fn seed_zone(&self, spec: ZoneSpec) {
        self.zones.borrow_mut().insert(spec.zone_id.clone(), spec);
    }

    pub fn create_calls(&self) -> Vec<ZoneSpec> {
        self.creates.borrow().clone()
    }

    pub fn erase_calls(&self) -> Vec<String> {
        self.erases.borrow().clone()
    }

    pub fn zone(&self, zone_id: &str) -> Option<ZoneSpec> {
        self.zones.borrow().get(zone_id).cloned()
    }

    pub fn live_zone_ids(&self) -> Vec<String> {
        self.zones.borrow().keys().cloned().collect()
    }

    fn check_available(&self) -> Result<(), CollaboratorError> {
        if self.available.get() {
            Ok(())
        } else {
            Err(CollaboratorError::unavailable(ZONE_SERVICE, "plugin not loaded"))
        }
    }
}

impl ZoneService for MemoryZoneService {
    fn create_or_update_zone(&self, spec: &ZoneSpec) -> Result<bool, CollaboratorError> {
        if let Some((clock, delay)) = self.create_latency.borrow().as_ref() {
            clock.advance(*delay);
        }
        self.check_available()?;
        self.creates.borrow_mut().push(spec.clone());
        if self.refuse_creates.get() {
            return Ok(false);
        }
        self.zones
            .borrow_mut()
            .insert(spec.zone_id.clone(), spec.clone());
        Ok(true)
    }

    fn erase_zone(&self, zone_id: &str) -> Result<(), CollaboratorError> {
        self.check_available()?;
        self.erases.borrow_mut().push(zone_id.to_string());
        self.zones.borrow_mut().remove(zone_id);
        Ok(())
    }

    fn list_zone_ids(&self) -> Result<Vec<String>, CollaboratorError> {
        self.check_available()?;
        Ok(self.live_zone_ids())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PromptCall {
    Show { actor: ActorId, command: String },
    Destroy { actor: ActorId },
}

#[derive(Debug, Default)]
pub struct MemoryPrompts {
    calls: RefCell<Vec<PromptCall>>,
    visible: RefCell<BTreeSet<ActorId>>,
}

impl MemoryPrompts {
    pub fn calls(&self) -> Vec<PromptCall> {
        self.calls.borrow().clone()
    }

    pub fn show_count(&self, actor: ActorId) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, PromptCall::Show { actor: a, .. } if *a == actor))
            .count()
    }

    pub fn destroy_count(&self, actor: ActorId) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, PromptCall::Destroy { actor: a } if *a == actor))
            .count()
    }

    pub fn is_visible(&self, actor: ActorId) -> bool {
        self.visible.borrow().contains(&actor)
    }
}

impl PromptUi for MemoryPrompts {
    fn show(&self, actor: ActorId, command: &str) {
        self.calls.borrow_mut().push(PromptCall::Show {
            actor,
            command: command.to_string(),
        });
        self.visible.borrow_mut().insert(actor);
    }

    fn destroy(&self, actor: ActorId) {
        self.calls.borrow_mut().push(PromptCall::Destroy { actor });
        self.visible.borrow_mut().remove(&actor);
    }
}

#[derive(Debug, Default)]
pub struct MemoryPermissions {
    grants: RefCell<HashMap<ActorId, BTreeSet<String>>>,
    registered: RefCell<BTreeSet<String>>,
}

impl MemoryPermissions {
    pub fn grant(&self, actor: ActorId, key: impl Into<String>) {
        self.grants
            .borrow_mut()
            .entry(actor)
            .or_default()
            .insert(key.into());
    }

    pub fn revoke(&self, actor: ActorId, key: &str) {
        if let Some(keys) = self.grants.borrow_mut().get_mut(&actor) {
            keys.remove(key);
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.registered.borrow().contains(key)
    }
}

impl PermissionStore for MemoryPermissions {
    fn has_permission(&self, actor: ActorId, key: &str) -> bool {
        self.grants
            .borrow()
            .get(&actor)
            .is_some_and(|keys| keys.contains(key))
    }

    fn register(&self, key: &str) {
        self.registered.borrow_mut().insert(key.to_string());
    }
}
