//! Decides whether a group may claim its zone right now.
//!
//! Checks run in a fixed order: membership, allow-list, uniqueness, then
//! the activation window. The first failing check decides the reason.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::Policy;
use crate::store::registry::ClaimRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum Ineligible {
    #[error("You must be in a clan to use this feature.")]
    NotInGroup,

    #[error("Your clan is not allowed to create a safe zone.")]
    GroupNotAllowed,

    #[error("Your clan has already used its safe zone.")]
    AlreadyClaimed,

    #[error("The safe zone feature is no longer available.")]
    WindowExpired,
}

impl Ineligible {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInGroup => "not_in_group",
            Self::GroupNotAllowed => "group_not_allowed",
            Self::AlreadyClaimed => "already_claimed",
            Self::WindowExpired => "window_expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Approved,
    Rejected(Ineligible),
}

impl Eligibility {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Evaluate a claim request. Pure: no I/O, no mutation.
pub fn evaluate(
    actor_group: Option<&str>,
    now: DateTime<Utc>,
    registry: &ClaimRegistry,
    policy: &Policy,
    reference_start: DateTime<Utc>,
) -> Eligibility {
    let Some(group) = actor_group.filter(|g| !g.is_empty()) else {
        return Eligibility::Rejected(Ineligible::NotInGroup);
    };

    if let Some(allowed) = policy.allow_list()
        && !allowed.iter().any(|g| g == group)
    {
        return Eligibility::Rejected(Ineligible::GroupNotAllowed);
    }

    if registry.is_claimed(group) {
        return Eligibility::Rejected(Ineligible::AlreadyClaimed);
    }

    if let Some(window) = policy.activation_window()
        && now - reference_start > window
    {
        return Eligibility::Rejected(Ineligible::WindowExpired);
    }

    Eligibility::Approved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActorId, ClaimRecord, Position};
    use chrono::{TimeDelta, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 18, 0, 0).unwrap()
    }

    fn registry_with(groups: &[&str]) -> ClaimRegistry {
        let mut registry = ClaimRegistry::in_memory().unwrap();
        for group in groups {
            registry
                .commit(ClaimRecord {
                    group: group.to_string(),
                    zone_id: format!("clansafezone_{group}"),
                    claimed_by: ActorId(1),
                    position: Position::default(),
                    radius: 50.0,
                    claimed_at: start(),
                    expires_at: None,
                    zone_erased: false,
                })
                .unwrap();
        }
        registry
    }

    fn allow(groups: &[&str]) -> Policy {
        Policy {
            allowed_groups: Some(groups.iter().map(|g| g.to_string()).collect()),
            ..Policy::default()
        }
    }

    fn late() -> DateTime<Utc> {
        start() + TimeDelta::hours(10)
    }

    #[test]
    fn missing_group_is_rejected_first() {
        // Every later check would also fail here.
        let registry = registry_with(&["Alpha"]);
        for group in [None, Some("")] {
            assert_eq!(
                evaluate(group, late(), &registry, &allow(&["Beta"]), start()),
                Eligibility::Rejected(Ineligible::NotInGroup)
            );
        }
    }

    #[test]
    fn allow_list_beats_uniqueness_and_window() {
        let registry = registry_with(&["Gamma"]);
        assert_eq!(
            evaluate(Some("Gamma"), late(), &registry, &allow(&["Alpha"]), start()),
            Eligibility::Rejected(Ineligible::GroupNotAllowed)
        );
        assert_eq!(
            evaluate(Some("Beta"), start(), &registry_with(&[]), &allow(&["Alpha"]), start()),
            Eligibility::Rejected(Ineligible::GroupNotAllowed)
        );
    }

    #[test]
    fn already_claimed_beats_window() {
        let registry = registry_with(&["Alpha"]);
        assert_eq!(
            evaluate(Some("Alpha"), late(), &registry, &allow(&["Alpha"]), start()),
            Eligibility::Rejected(Ineligible::AlreadyClaimed)
        );
        assert_eq!(
            evaluate(Some("Alpha"), start(), &registry, &Policy::default(), start()),
            Eligibility::Rejected(Ineligible::AlreadyClaimed)
        );
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let registry = registry_with(&[]);
        let policy = Policy {
            activation_window_secs: Some(3600.0),
            ..Policy::default()
        };

        let at_edge = start() + TimeDelta::seconds(3600);
        assert!(evaluate(Some("Alpha"), at_edge, &registry, &policy, start()).is_approved());

        let past = start() + TimeDelta::seconds(3601);
        assert_eq!(
            evaluate(Some("Alpha"), past, &registry, &policy, start()),
            Eligibility::Rejected(Ineligible::WindowExpired)
        );
    }

    #[test]
    fn no_window_never_expires() {
        let policy = Policy {
            activation_window_secs: None,
            ..Policy::default()
        };
        let far_future = start() + TimeDelta::days(365);
        assert!(
            evaluate(Some("Alpha"), far_future, &registry_with(&[]), &policy, start())
                .is_approved()
        );
    }

    #[test]
    fn empty_allow_list_admits_everyone() {
        assert!(
            evaluate(Some("Anyone"), start(), &registry_with(&[]), &allow(&[]), start())
                .is_approved()
        );
    }

    #[test]
    fn messages_are_distinct() {
        let all = [
            Ineligible::NotInGroup,
            Ineligible::GroupNotAllowed,
            Ineligible::AlreadyClaimed,
            Ineligible::WindowExpired,
        ];
        let mut messages: Vec<String> = all.iter().map(|r| r.to_string()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), all.len());
    }
}
