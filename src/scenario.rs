//! Scripted host simulation.
//!
//! A scenario lists actors, collaborator availability and timed host events.
//! [`run`] replays it against a [`SafeZone`] on a manual clock with the
//! in-memory collaborators and reports every outcome and external call.

use std::path::Path;
use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, ManualClock};
use crate::collaborators::Collaborators;
use crate::collaborators::memory::{
    MemoryDirectory, MemoryPermissions, MemoryPrompts, MemoryZoneService, PromptCall,
};
use crate::config::Policy;
use crate::error::{Result, SafeZoneError};
use crate::model::{ActorId, ClaimRecord, Position, ZoneSpec};
use crate::runtime::SafeZone;
use crate::store::registry::ClaimRegistry;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Wall-clock instant of `at_secs: 0`. Defaults to now.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Replaces the configured policy for this run.
    #[serde(default)]
    pub policy: Option<Policy>,
    #[serde(default)]
    pub actors: Vec<ScenarioActor>,
    #[serde(default)]
    pub services: ServiceState,
    pub steps: Vec<Step>,
    /// Keep ticking until this offset after the last step.
    #[serde(default)]
    pub run_until_secs: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioActor {
    pub id: ActorId,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_true")]
    pub permitted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceState {
    pub directory_available: bool,
    pub zone_service_available: bool,
    pub refuse_creates: bool,
    /// Zone ids present before the run starts.
    pub existing_zones: Vec<String>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            directory_available: true,
            zone_service_available: true,
            refuse_creates: false,
            existing_zones: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub at_secs: f64,
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Action {
    SessionOpen {
        actor: ActorId,
        #[serde(default)]
        target: Option<String>,
    },
    SessionClose {
        actor: ActorId,
        #[serde(default)]
        target: Option<String>,
    },
    Confirm {
        actor: ActorId,
        #[serde(default)]
        position: Option<Position>,
    },
    SetServices {
        #[serde(default)]
        directory_available: Option<bool>,
        #[serde(default)]
        zone_service_available: Option<bool>,
        #[serde(default)]
        refuse_creates: Option<bool>,
    },
    Shutdown,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionOpen { actor, .. } => write!(f, "session_open {actor}"),
            Self::SessionClose { actor, .. } => write!(f, "session_close {actor}"),
            Self::Confirm { actor, .. } => write!(f, "confirm {actor}"),
            Self::SetServices { .. } => write!(f, "set_services"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub at_secs: f64,
    pub action: String,
    /// Deferred tasks that fired just before this step.
    pub timers_fired: usize,
    /// `applied`, `ignored`, `created`, or a rejection code.
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub reference_start: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub timers_fired_after: usize,
    pub zone_creates: Vec<ZoneSpec>,
    pub zone_erases: Vec<String>,
    pub live_zones: Vec<String>,
    pub prompt_calls: Vec<PromptCall>,
    pub claims: Vec<ClaimRecord>,
}

impl Scenario {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        let mut last = 0.0;
        for (index, step) in self.steps.iter().enumerate() {
            if !step.at_secs.is_finite() || step.at_secs < last {
                return Err(SafeZoneError::Scenario(format!(
                    "step {index} at {}s is out of order (steps must not go back in time)",
                    step.at_secs
                )));
            }
            last = step.at_secs;
        }
        if let Some(until) = self.run_until_secs
            && !(until.is_finite() && until >= last)
        {
            return Err(SafeZoneError::Scenario(format!(
                "run_until_secs {until} is before the last step at {last}s"
            )));
        }
        Ok(())
    }
}

fn offset(secs: f64) -> TimeDelta {
    TimeDelta::milliseconds((secs * 1000.0).round() as i64)
}

fn rejected(code: &str, message: String) -> (String, Option<String>, Option<String>) {
    (code.to_string(), Some(message), None)
}

/// Replay `scenario`. `policy` applies unless the scenario carries its own.
pub fn run(scenario: &Scenario, policy: Policy, registry: ClaimRegistry) -> Result<ScenarioReport> {
    let policy = scenario.policy.clone().unwrap_or(policy);
    let default_target = policy.target_kinds.first().cloned().unwrap_or_default();

    let start = scenario.start.unwrap_or_else(Utc::now);
    let clock = ManualClock::new(start);

    let directory = Rc::new(MemoryDirectory::default());
    let zones = Rc::new(MemoryZoneService::default());
    let prompts = Rc::new(MemoryPrompts::default());
    let permissions = Rc::new(MemoryPermissions::default());

    for actor in &scenario.actors {
        if let Some(group) = &actor.group {
            directory.assign(actor.id, group.clone());
        }
        if actor.permitted {
            permissions.grant(actor.id, policy.permission.clone());
        }
    }
    directory.set_available(scenario.services.directory_available);
    zones.set_available(scenario.services.zone_service_available);
    zones.set_refuse_creates(scenario.services.refuse_creates);
    for zone_id in &scenario.services.existing_zones {
        zones.seed_zone(ZoneSpec {
            zone_id: zone_id.clone(),
            position: Position::default(),
            radius: policy.zone_radius,
            flags: Default::default(),
        });
    }

    let collaborators = Collaborators {
        directory: directory.clone(),
        zones: zones.clone(),
        prompts: prompts.clone(),
        permissions: permissions.clone(),
    };
    let mut rt = SafeZone::start(policy, registry, collaborators, Rc::new(clock.clone()))?;

    let position_of = |id: ActorId| {
        scenario
            .actors
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.position)
            .unwrap_or_default()
    };

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for step in &scenario.steps {
        clock.set(start + offset(step.at_secs));
        let timers_fired = rt.tick();

        let (result, message, zone_id) = match &step.action {
            Action::SessionOpen { actor, target } => {
                let target = target.as_deref().unwrap_or(&default_target);
                let changed = rt.on_session_open(*actor, target);
                (applied(changed), None, None)
            }
            Action::SessionClose { actor, target } => {
                let target = target.as_deref().unwrap_or(&default_target);
                let changed = rt.on_session_close(*actor, target);
                (applied(changed), None, None)
            }
            Action::Confirm { actor, position } => {
                let position = position.unwrap_or_else(|| position_of(*actor));
                match rt.on_confirm(*actor, position) {
                    Ok(receipt) => (
                        "created".to_string(),
                        Some(receipt.message()),
                        Some(receipt.zone_id),
                    ),
                    Err(rejection) => rejected(rejection.code(), rejection.to_string()),
                }
            }
            Action::SetServices {
                directory_available,
                zone_service_available,
                refuse_creates,
            } => {
                if let Some(available) = directory_available {
                    directory.set_available(*available);
                }
                if let Some(available) = zone_service_available {
                    zones.set_available(*available);
                }
                if let Some(refuse) = refuse_creates {
                    zones.set_refuse_creates(*refuse);
                }
                (applied(true), None, None)
            }
            Action::Shutdown => {
                let closed = rt.shutdown();
                (
                    applied(true),
                    Some(format!("closed {} session(s)", closed.len())),
                    None,
                )
            }
        };

        steps.push(StepReport {
            at_secs: step.at_secs,
            action: step.action.to_string(),
            timers_fired,
            result,
            message,
            zone_id,
        });
    }

    let mut timers_fired_after = 0;
    if let Some(until) = scenario.run_until_secs {
        clock.set(start + offset(until));
        timers_fired_after = rt.tick();
    }

    Ok(ScenarioReport {
        reference_start: rt.coordinator().reference_start(),
        steps,
        timers_fired_after,
        zone_creates: zones.create_calls(),
        zone_erases: zones.erase_calls(),
        live_zones: zones.live_zone_ids(),
        prompt_calls: prompts.calls(),
        claims: rt
            .coordinator()
            .registry()
            .records()
            .into_iter()
            .cloned()
            .collect(),
    })
}

fn applied(changed: bool) -> String {
    if changed { "applied" } else { "ignored" }.to_string()
}
