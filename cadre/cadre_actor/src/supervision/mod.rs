//! Actor supervision and failure recovery.
//!
//! When an actor fails, its supervisor's strategy turns the failure into a
//! [`Directive`]. Restarts are counted per child in a [`RestartHistory`]; a
//! Restart that would exceed the budget is downgraded to Stop. The directive
//! is then delivered to the affected children as control messages, so it is
//! processed ahead of their pending user messages.

mod history;
mod strategy;

pub use history::RestartHistory;
pub(crate) use strategy::Effect;
pub use strategy::{default_decider, Decider, Decision, Directive, StrategyKind, SupervisorStrategy};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cadre_core::{ActorError, ActorId};
use log::error;

/// Decide what to do about `failed` and log the decision.
///
/// `histories` holds the restart history of each child of `supervisor`.
pub(crate) fn supervise(
    strategy: &SupervisorStrategy,
    supervisor: &str,
    failed: ActorId,
    children: &[ActorId],
    histories: &mut HashMap<ActorId, RestartHistory>,
    cause: &Arc<ActorError>,
) -> Effect {
    let affected = strategy.affected(failed, children);
    for child in &affected {
        histories.entry(*child).or_default();
    }

    let decision = strategy.decide(
        cause,
        histories
            .iter_mut()
            .filter(|(child, _)| affected.contains(*child))
            .map(|(_, history)| history),
        Instant::now(),
    );

    if decision.budget_exhausted {
        error!(
            "{}: restart budget exhausted for {} ({:?} retries within {:?}), stopping: {}",
            supervisor,
            failed,
            strategy.max_retries(),
            strategy.within_time_window(),
            cause
        );
    } else {
        error!(
            "{}: child {} failed, applying {:?} {}: {}",
            supervisor,
            failed,
            strategy.kind(),
            decision.directive,
            cause
        );
    }

    strategy.effect(decision.directive, failed, children, cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::SystemMessage;

    #[test]
    fn test_supervise_tracks_each_child() {
        let strategy = SupervisorStrategy::one_for_one(|_| Directive::Restart).with_max_retries(1);
        let a = ActorId::new();
        let b = ActorId::new();
        let mut histories = HashMap::new();
        let cause = Arc::new(ActorError::msg("x"));

        let effect = supervise(&strategy, "parent", a, &[a, b], &mut histories, &cause);
        assert!(matches!(effect, Effect::Send(ref m) if matches!(m[0].1, SystemMessage::Recreate { .. })));

        // b has its own budget
        let effect = supervise(&strategy, "parent", b, &[a, b], &mut histories, &cause);
        assert!(matches!(effect, Effect::Send(ref m) if matches!(m[0].1, SystemMessage::Recreate { .. })));

        let effect = supervise(&strategy, "parent", a, &[a, b], &mut histories, &cause);
        assert!(matches!(effect, Effect::Send(ref m) if matches!(m[0].1, SystemMessage::Terminate)));
        assert_eq!(histories[&a].count(), 2);
        assert_eq!(histories[&b].count(), 1);
    }
}
