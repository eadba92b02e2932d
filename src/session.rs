use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::collaborators::PromptUi;
use crate::model::ActorId;
use crate::scheduler::{Deferred, Scheduler, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenSession {
    pending_show: Option<TaskHandle>,
    prompt_shown: bool,
}

/// Tracks which actors currently have an interaction session open on a
/// recognized target. Owns membership only; rendering belongs to [`PromptUi`].
#[derive(Debug)]
pub struct InteractionSessionTracker {
    target_kinds: HashSet<String>,
    prompt_delay: TimeDelta,
    sessions: BTreeMap<ActorId, OpenSession>,
}

impl InteractionSessionTracker {
    pub fn new<I, S>(target_kinds: I, prompt_delay: TimeDelta) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_kinds: target_kinds.into_iter().map(Into::into).collect(),
            prompt_delay,
            sessions: BTreeMap::new(),
        }
    }

    pub fn recognizes(&self, target_kind: &str) -> bool {
        self.target_kinds.contains(target_kind)
    }

    /// Record a newly opened session and schedule the prompt. Returns `false`
    /// for unrecognized targets and for actors already recorded, so at most
    /// one show is pending per open session.
    pub fn on_session_open(
        &mut self,
        actor: ActorId,
        target_kind: &str,
        now: DateTime<Utc>,
        scheduler: &mut Scheduler<Deferred>,
    ) -> bool {
        if !self.recognizes(target_kind) || self.sessions.contains_key(&actor) {
            return false;
        }
        let handle = scheduler.schedule_after(now, self.prompt_delay, Deferred::ShowPrompt(actor));
        self.sessions.insert(
            actor,
            OpenSession {
                pending_show: Some(handle),
                prompt_shown: false,
            },
        );
        debug!(%actor, target_kind, "interaction session opened");
        true
    }

    /// Forget a session, cancel its pending show and tear down the prompt.
    /// A recorded session always gets exactly one destroy, shown or not.
    pub fn on_session_close(
        &mut self,
        actor: ActorId,
        target_kind: &str,
        scheduler: &mut Scheduler<Deferred>,
        prompts: &dyn PromptUi,
    ) -> bool {
        if !self.recognizes(target_kind) {
            return false;
        }
        let Some(session) = self.sessions.remove(&actor) else {
            return false;
        };
        if let Some(handle) = session.pending_show {
            scheduler.cancel(handle);
        }
        prompts.destroy(actor);
        debug!(%actor, target_kind, "interaction session closed");
        true
    }

    /// A scheduled show fired. Returns whether the session is still open.
    pub fn prompt_due(&mut self, actor: ActorId) -> bool {
        match self.sessions.get_mut(&actor) {
            Some(session) => {
                session.pending_show = None;
                true
            }
            None => false,
        }
    }

    pub fn mark_shown(&mut self, actor: ActorId) {
        if let Some(session) = self.sessions.get_mut(&actor) {
            session.prompt_shown = true;
        }
    }

    /// Force-close every session, destroying each actor's prompt.
    pub fn on_shutdown(
        &mut self,
        scheduler: &mut Scheduler<Deferred>,
        prompts: &dyn PromptUi,
    ) -> Vec<ActorId> {
        let sessions = std::mem::take(&mut self.sessions);
        let mut closed = Vec::with_capacity(sessions.len());
        for (actor, session) in sessions {
            if let Some(handle) = session.pending_show {
                scheduler.cancel(handle);
            }
            prompts.destroy(actor);
            closed.push(actor);
        }
        debug!(closed = closed.len(), "closed all interaction sessions");
        closed
    }

    pub fn is_open(&self, actor: ActorId) -> bool {
        self.sessions.contains_key(&actor)
    }

    pub fn is_prompt_shown(&self, actor: ActorId) -> bool {
        self.sessions.get(&actor).is_some_and(|s| s.prompt_shown)
    }

    pub fn open_actors(&self) -> Vec<ActorId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::MemoryPrompts;

    const CUPBOARD: &str = "cupboard.tool.deployed";

    fn tracker() -> InteractionSessionTracker {
        InteractionSessionTracker::new([CUPBOARD], TimeDelta::milliseconds(200))
    }

    #[test]
    fn unrecognized_target_is_ignored() {
        let mut tracker = tracker();
        let mut sched = Scheduler::new();
        let prompts = MemoryPrompts::default();

        assert!(!tracker.on_session_open(ActorId(1), "box.wooden.large", Utc::now(), &mut sched));
        assert!(sched.is_empty());
        assert!(!tracker.on_session_close(ActorId(1), "box.wooden.large", &mut sched, &prompts));
        assert!(prompts.calls().is_empty());
    }

    #[test]
    fn open_schedules_one_show_after_delay() {
        let mut tracker = tracker();
        let mut sched = Scheduler::new();
        let t0 = Utc::now();

        assert!(tracker.on_session_open(ActorId(1), CUPBOARD, t0, &mut sched));
        assert!(!tracker.on_session_open(ActorId(1), CUPBOARD, t0, &mut sched));
        assert_eq!(sched.len(), 1);
        assert!(sched.take_due(t0 + TimeDelta::milliseconds(199)).is_empty());
        assert_eq!(
            sched.take_due(t0 + TimeDelta::milliseconds(200)),
            vec![Deferred::ShowPrompt(ActorId(1))]
        );
    }

    #[test]
    fn close_before_delay_cancels_show_and_destroys_once() {
        let mut tracker = tracker();
        let mut sched = Scheduler::new();
        let prompts = MemoryPrompts::default();
        let t0 = Utc::now();

        tracker.on_session_open(ActorId(1), CUPBOARD, t0, &mut sched);
        assert!(tracker.on_session_close(ActorId(1), CUPBOARD, &mut sched, &prompts));

        assert!(sched.take_due(t0 + TimeDelta::seconds(1)).is_empty());
        assert_eq!(prompts.show_count(ActorId(1)), 0);
        assert_eq!(prompts.destroy_count(ActorId(1)), 1);
        assert!(!tracker.is_open(ActorId(1)));
    }

    #[test]
    fn rapid_reopen_leaves_single_pending_show() {
        let mut tracker = tracker();
        let mut sched = Scheduler::new();
        let prompts = MemoryPrompts::default();
        let t0 = Utc::now();

        tracker.on_session_open(ActorId(1), CUPBOARD, t0, &mut sched);
        tracker.on_session_close(ActorId(1), CUPBOARD, &mut sched, &prompts);
        tracker.on_session_open(ActorId(1), CUPBOARD, t0, &mut sched);

        assert_eq!(sched.len(), 1);
        let fired = sched.take_due(t0 + TimeDelta::seconds(1));
        assert_eq!(fired, vec![Deferred::ShowPrompt(ActorId(1))]);
        assert!(tracker.prompt_due(ActorId(1)));
    }

    #[test]
    fn close_of_unknown_actor_is_noop() {
        let mut tracker = tracker();
        let mut sched = Scheduler::new();
        let prompts = MemoryPrompts::default();

        assert!(!tracker.on_session_close(ActorId(9), CUPBOARD, &mut sched, &prompts));
        assert_eq!(prompts.destroy_count(ActorId(9)), 0);
    }

    #[test]
    fn shutdown_destroys_every_open_prompt() {
        let mut tracker = tracker();
        let mut sched = Scheduler::new();
        let prompts = MemoryPrompts::default();
        let t0 = Utc::now();

        tracker.on_session_open(ActorId(1), CUPBOARD, t0, &mut sched);
        tracker.on_session_open(ActorId(2), CUPBOARD, t0, &mut sched);
        sched.take_due(t0 + TimeDelta::seconds(1));
        tracker.prompt_due(ActorId(1));
        tracker.mark_shown(ActorId(1));
        tracker.on_session_open(ActorId(3), CUPBOARD, t0 + TimeDelta::seconds(1), &mut sched);

        let closed = tracker.on_shutdown(&mut sched, &prompts);
        assert_eq!(closed, vec![ActorId(1), ActorId(2), ActorId(3)]);
        assert!(tracker.is_empty());
        assert!(sched.is_empty());
        for actor in closed {
            assert_eq!(prompts.destroy_count(actor), 1);
        }
    }

    #[test]
    fn prompt_due_for_closed_session_is_false() {
        let mut tracker = tracker();
        assert!(!tracker.prompt_due(ActorId(4)));
        tracker.mark_shown(ActorId(4));
        assert!(!tracker.is_prompt_shown(ActorId(4)));
    }

    #[test]
    fn oversized_prompt_delay_does_not_overflow() {
        let mut tracker = InteractionSessionTracker::new([CUPBOARD], TimeDelta::MAX);
        let mut sched = Scheduler::new();
        let t0 = Utc::now();

        assert!(tracker.on_session_open(ActorId(1), CUPBOARD, t0, &mut sched));
        assert_eq!(sched.len(), 1);
        assert!(sched.take_due(t0 + TimeDelta::days(1)).is_empty());
    }
}
