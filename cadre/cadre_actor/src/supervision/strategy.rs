//! Supervisor strategies and the directive decision.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadre_core::{ActorError, ActorId};

use super::history::RestartHistory;
use crate::mailbox::SystemMessage;

/// What a supervisor does about a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Keep the instance and continue with the next message
    Resume,
    /// Replace the instance with a fresh one from the recipe
    Restart,
    /// Terminate the child
    Stop,
    /// Fail the supervisor itself with the same cause
    Escalate,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resume => "Resume",
            Self::Restart => "Restart",
            Self::Stop => "Stop",
            Self::Escalate => "Escalate",
        };
        f.write_str(name)
    }
}

/// Which children a directive applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Only the failing child
    OneForOne,
    /// Every child of the supervisor
    AllForOne,
}

/// Maps a failure to a directive.
pub type Decider = Arc<dyn Fn(&ActorError) -> Directive + Send + Sync>;

/// The decider used when none is given: failed initialization and `Kill`
/// stop the actor, everything else restarts it.
pub fn default_decider(cause: &ActorError) -> Directive {
    match cause {
        ActorError::Initialization(_) | ActorError::Killed => Directive::Stop,
        _ => Directive::Restart,
    }
}

/// A directive after the restart budget has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The directive to apply
    pub directive: Directive,
    /// The decider said Restart but the budget was spent, so this is a Stop
    pub budget_exhausted: bool,
}

/// What the supervisor has to do to apply a decision.
#[derive(Debug)]
pub(crate) enum Effect {
    /// Deliver these control messages
    Send(Vec<(ActorId, SystemMessage)>),
    /// Fail the supervisor with the child's cause
    Escalate,
}

/// The policy a supervisor applies to its failing children.
#[derive(Clone)]
pub struct SupervisorStrategy {
    kind: StrategyKind,
    max_retries: Option<usize>,
    within: Option<Duration>,
    decider: Decider,
    stop_children_on_restart: bool,
}

impl SupervisorStrategy {
    fn with_kind<F>(kind: StrategyKind, decider: F) -> Self
    where
        F: Fn(&ActorError) -> Directive + Send + Sync + 'static,
    {
        Self {
            kind,
            max_retries: None,
            within: None,
            decider: Arc::new(decider),
            stop_children_on_restart: true,
        }
    }

    /// Apply directives to the failing child only. Unlimited restarts until
    /// a budget is set.
    pub fn one_for_one<F>(decider: F) -> Self
    where
        F: Fn(&ActorError) -> Directive + Send + Sync + 'static,
    {
        Self::with_kind(StrategyKind::OneForOne, decider)
    }

    /// Apply directives to every child of the supervisor.
    pub fn all_for_one<F>(decider: F) -> Self
    where
        F: Fn(&ActorError) -> Directive + Send + Sync + 'static,
    {
        Self::with_kind(StrategyKind::AllForOne, decider)
    }

    /// Allow at most `max_retries` restarts per child.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Only count restarts within this window.
    pub fn within(mut self, window: Duration) -> Self {
        self.within = Some(window);
        self
    }

    /// Keep children alive across a restart of their parent.
    pub fn with_stop_children_on_restart(mut self, stop: bool) -> Self {
        self.stop_children_on_restart = stop;
        self
    }

    /// Scope of this strategy.
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Restart budget.
    pub fn max_retries(&self) -> Option<usize> {
        self.max_retries
    }

    /// Restart counting window.
    pub fn within_time_window(&self) -> Option<Duration> {
        self.within
    }

    /// Whether a restarting actor stops its children first.
    pub fn stop_children_on_restart(&self) -> bool {
        self.stop_children_on_restart
    }

    /// Ask the decider and apply the restart budget.
    ///
    /// `histories` are the restart histories of every child the directive
    /// would affect. A Restart records one restart in each; if any of them
    /// is over budget the directive becomes Stop.
    pub fn decide<'a, I>(&self, cause: &ActorError, histories: I, now: Instant) -> Decision
    where
        I: IntoIterator<Item = &'a mut RestartHistory>,
    {
        let directive = (self.decider)(cause);
        if directive != Directive::Restart {
            return Decision {
                directive,
                budget_exhausted: false,
            };
        }

        let permitted = histories.into_iter().fold(true, |permitted, history| {
            history.request_restart_permission(self.max_retries, self.within, now) && permitted
        });

        if permitted {
            Decision {
                directive: Directive::Restart,
                budget_exhausted: false,
            }
        } else {
            Decision {
                directive: Directive::Stop,
                budget_exhausted: true,
            }
        }
    }

    /// The children a directive for `failed` applies to.
    pub fn affected(&self, failed: ActorId, children: &[ActorId]) -> Vec<ActorId> {
        match self.kind {
            StrategyKind::OneForOne => vec![failed],
            StrategyKind::AllForOne => children.to_vec(),
        }
    }

    /// Translate a decision into control messages.
    pub(crate) fn effect(
        &self,
        directive: Directive,
        failed: ActorId,
        children: &[ActorId],
        cause: &Arc<ActorError>,
    ) -> Effect {
        match directive {
            // Siblings were never suspended, so only the failing child resumes
            Directive::Resume => Effect::Send(vec![(failed, SystemMessage::Resume)]),
            Directive::Restart => Effect::Send(
                self.affected(failed, children)
                    .into_iter()
                    .map(|child| {
                        (
                            child,
                            SystemMessage::Recreate {
                                cause: Arc::clone(cause),
                                stop_children: self.stop_children_on_restart,
                            },
                        )
                    })
                    .collect(),
            ),
            Directive::Stop => Effect::Send(
                self.affected(failed, children)
                    .into_iter()
                    .map(|child| (child, SystemMessage::Terminate))
                    .collect(),
            ),
            Directive::Escalate => Effect::Escalate,
        }
    }
}

impl Default for SupervisorStrategy {
    /// One-for-one with the default decider, 10 restarts within 60 seconds.
    fn default() -> Self {
        Self::one_for_one(default_decider)
            .with_max_retries(10)
            .within(Duration::from_secs(60))
    }
}

impl fmt::Debug for SupervisorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorStrategy")
            .field("kind", &self.kind)
            .field("max_retries", &self.max_retries)
            .field("within", &self.within)
            .field("stop_children_on_restart", &self.stop_children_on_restart)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("corrupted state")]
    struct Corrupted;

    #[test]
    fn test_default_decider() {
        assert_eq!(default_decider(&ActorError::Killed), Directive::Stop);
        assert_eq!(
            default_decider(&ActorError::Initialization("no db".into())),
            Directive::Stop
        );
        assert_eq!(default_decider(&ActorError::msg("oops")), Directive::Restart);
        assert_eq!(
            default_decider(&ActorError::Panicked("boom".into())),
            Directive::Restart
        );
    }

    #[test]
    fn test_decider_sees_typed_error() {
        let strategy = SupervisorStrategy::one_for_one(|cause| {
            if cause.downcast_ref::<Corrupted>().is_some() {
                Directive::Stop
            } else {
                Directive::Resume
            }
        });
        let mut history = RestartHistory::new();
        let now = Instant::now();

        let decision = strategy.decide(&ActorError::new(Corrupted), [&mut history], now);
        assert_eq!(decision.directive, Directive::Stop);
        assert!(!decision.budget_exhausted);

        let decision = strategy.decide(&ActorError::msg("meh"), [&mut history], now);
        assert_eq!(decision.directive, Directive::Resume);
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn test_restart_downgraded_when_budget_spent() {
        let strategy = SupervisorStrategy::one_for_one(|_| Directive::Restart)
            .with_max_retries(2)
            .within(Duration::from_secs(10));
        let mut history = RestartHistory::new();
        let now = Instant::now();
        let cause = ActorError::msg("fail");

        for _ in 0..2 {
            let decision = strategy.decide(&cause, [&mut history], now);
            assert_eq!(decision.directive, Directive::Restart);
        }
        let decision = strategy.decide(&cause, [&mut history], now);
        assert_eq!(
            decision,
            Decision {
                directive: Directive::Stop,
                budget_exhausted: true
            }
        );
    }

    #[test]
    fn test_all_for_one_checks_every_history() {
        let strategy = SupervisorStrategy::all_for_one(|_| Directive::Restart).with_max_retries(1);
        let now = Instant::now();
        let mut fresh = RestartHistory::new();
        let mut spent = RestartHistory::new();
        assert!(spent.request_restart_permission(Some(1), None, now));

        let decision = strategy.decide(&ActorError::msg("x"), [&mut fresh, &mut spent], now);
        assert!(decision.budget_exhausted);
        assert_eq!(fresh.count(), 1);
    }

    #[test]
    fn test_effects_follow_scope() {
        let a = ActorId::new();
        let b = ActorId::new();
        let c = ActorId::new();
        let children = [a, b, c];
        let cause = Arc::new(ActorError::msg("x"));

        let one = SupervisorStrategy::one_for_one(|_| Directive::Restart);
        match one.effect(Directive::Restart, b, &children, &cause) {
            Effect::Send(messages) => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].0, b);
                assert!(matches!(
                    messages[0].1,
                    SystemMessage::Recreate { stop_children: true, .. }
                ));
            }
            Effect::Escalate => panic!("expected messages"),
        }

        let all = SupervisorStrategy::all_for_one(|_| Directive::Stop);
        match all.effect(Directive::Stop, b, &children, &cause) {
            Effect::Send(messages) => {
                let targets: Vec<ActorId> = messages.iter().map(|(id, _)| *id).collect();
                assert_eq!(targets, children.to_vec());
            }
            Effect::Escalate => panic!("expected messages"),
        }

        match all.effect(Directive::Resume, b, &children, &cause) {
            Effect::Send(messages) => assert_eq!(messages.len(), 1),
            Effect::Escalate => panic!("expected messages"),
        }

        assert!(matches!(
            all.effect(Directive::Escalate, b, &children, &cause),
            Effect::Escalate
        ));
    }

    #[test]
    fn test_default_strategy() {
        let strategy = SupervisorStrategy::default();
        assert_eq!(strategy.kind(), StrategyKind::OneForOne);
        assert_eq!(strategy.max_retries(), Some(10));
        assert_eq!(strategy.within_time_window(), Some(Duration::from_secs(60)));
        assert!(strategy.stop_children_on_restart());
    }
}
