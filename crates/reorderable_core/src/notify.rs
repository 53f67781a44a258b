//! Pre/post reorder notifications.
//!
//! # Responsibility
//! - Deliver `ReorderEvent`s to registered observers synchronously, in
//!   registration order.
//!
//! # Invariants
//! - Observer failures are logged and swallowed; they never decide whether a
//!   reorder transaction commits.
//! - `Post` events are only delivered for committed changes.

use crate::logging::sanitize_message;
use crate::model::record::{Partition, Rank};
use log::warn;
use std::error::Error;

const MAX_OBSERVER_ERROR_CHARS: usize = 200;

/// Error type observers may return.
pub type ObserverError = Box<dyn Error + Send + Sync>;

/// Whether the event precedes or follows the rank writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderPhase {
    Pre,
    Post,
}

/// Which engine operation produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOperation {
    Move,
    Deduplicate,
}

/// Affected rank span of one move or deduplication pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderEvent {
    pub phase: ReorderPhase,
    pub operation: ReorderOperation,
    pub from_rank: Rank,
    pub to_rank: Rank,
    pub partition: Partition,
}

impl ReorderEvent {
    pub(crate) fn with_phase(&self, phase: ReorderPhase) -> Self {
        Self {
            phase,
            ..self.clone()
        }
    }
}

/// Receiver of reorder notifications (cache invalidation, audit logs, ...).
pub trait ReorderObserver {
    fn on_reorder(&self, event: &ReorderEvent) -> Result<(), ObserverError>;
}

struct FnObserver<F>(F);

impl<F> ReorderObserver for FnObserver<F>
where
    F: Fn(&ReorderEvent) -> Result<(), ObserverError>,
{
    fn on_reorder(&self, event: &ReorderEvent) -> Result<(), ObserverError> {
        (self.0)(event)
    }
}

/// Ordered observer list owned by the reorder service.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Box<dyn ReorderObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn ReorderObserver>) {
        self.observers.push(observer);
    }

    pub fn subscribe_fn<F>(&mut self, observer: F)
    where
        F: Fn(&ReorderEvent) -> Result<(), ObserverError> + 'static,
    {
        self.observers.push(Box::new(FnObserver(observer)));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers `event` to every observer; returns how many failed.
    pub fn emit(&self, event: &ReorderEvent) -> usize {
        let mut failures = 0;
        for (index, observer) in self.observers.iter().enumerate() {
            if let Err(err) = observer.on_reorder(event) {
                failures += 1;
                warn!(
                    "event=observer_failed module=notify status=error observer={} phase={:?} operation={:?} partition={} error={}",
                    index,
                    event.phase,
                    event.operation,
                    event.partition,
                    sanitize_message(&err.to_string(), MAX_OBSERVER_ERROR_CHARS)
                );
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn event() -> ReorderEvent {
        ReorderEvent {
            phase: ReorderPhase::Pre,
            operation: ReorderOperation::Move,
            from_rank: 3,
            to_rank: 1,
            partition: Partition::Whole,
        }
    }

    #[test]
    fn emit_continues_after_failing_observer() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ObserverRegistry::new();
        registry.subscribe_fn(|_| Err("cache offline".into()));
        let sink = Rc::clone(&seen);
        registry.subscribe_fn(move |event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });

        assert_eq!(registry.emit(&event()), 1);
        assert_eq!(seen.borrow().as_slice(), &[event()]);
    }

    #[test]
    fn with_phase_keeps_payload() {
        let post = event().with_phase(ReorderPhase::Post);
        assert_eq!(post.phase, ReorderPhase::Post);
        assert_eq!((post.from_rank, post.to_rank), (3, 1));
    }
}
