//! Mutation Observer Loop
//!
//! Each child-list record runs the engine's steps with the observer
//! disconnected, so the engine's own writes never re-enter the loop. Records
//! are counted as active (a step changed something) or idle (nothing to do),
//! and exceeding either ceiling halts the loop for the rest of the page load.

use log::{error, trace};

use crate::dom::MutationKind;
use crate::types::MutationLimits;

/// Connection to the platform mutation observer.
pub trait MutationObserverHandle {
    /// Start (or resume) observing child-list changes below the body.
    fn observe(&mut self);
    /// Stop observing and discard queued records.
    fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Built but not started.
    Stopped,
    Observing,
    /// Disconnected while the engine mutates the page.
    Suspended,
    /// A ceiling was exceeded; never reconnected.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    IdleCeiling,
    ActiveCeiling,
}

pub struct ObserverLoop<O> {
    observer: O,
    state: LoopState,
    limits: MutationLimits,
    idle_mutations: u64,
    active_mutations: u64,
    halt_reason: Option<HaltReason>,
}

impl<O: MutationObserverHandle> ObserverLoop<O> {
    pub fn new(observer: O, limits: MutationLimits) -> Self {
        Self {
            observer,
            state: LoopState::Stopped,
            limits,
            idle_mutations: 0,
            active_mutations: 0,
            halt_reason: None,
        }
    }

    /// Connect the observer. A halted loop stays halted.
    pub fn start(&mut self) {
        if self.state == LoopState::Stopped {
            self.observer.observe();
            self.state = LoopState::Observing;
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn idle_mutations(&self) -> u64 {
        self.idle_mutations
    }

    pub fn active_mutations(&self) -> u64 {
        self.active_mutations
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt_reason
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Disconnect until the returned guard is dropped.
    ///
    /// Only an observing loop is actually suspended. Acquiring a guard while
    /// already suspended, stopped or halted yields a guard that does nothing
    /// on drop.
    pub fn suspend(&mut self) -> Suspension<'_, O> {
        let active = self.state == LoopState::Observing;
        if active {
            self.observer.disconnect();
            self.state = LoopState::Suspended;
        }
        Suspension { owner: self, active }
    }

    /// Run `f` with the observer disconnected.
    pub fn with_suspended<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let _guard = self.suspend();
        f()
    }

    /// Handle one delivered batch. `step` runs once per child-list record and
    /// reports whether it changed the page.
    ///
    /// Any other record type ends processing of the whole batch.
    pub fn process_batch(&mut self, records: &[MutationKind], mut step: impl FnMut() -> bool) {
        for record in records {
            if self.state != LoopState::Observing {
                return;
            }
            if *record != MutationKind::ChildList {
                trace!("Ignoring {:?} batch", record);
                return;
            }

            let changed = self.with_suspended(&mut step);

            if changed {
                self.active_mutations += 1;
            } else {
                self.idle_mutations += 1;
            }

            if let Some(reason) = self.exceeded_ceiling() {
                self.halt(reason);
                return;
            }
        }
    }

    fn exceeded_ceiling(&self) -> Option<HaltReason> {
        if self.idle_mutations > self.limits.max_idle {
            Some(HaltReason::IdleCeiling)
        } else if self.active_mutations > self.limits.max_active {
            Some(HaltReason::ActiveCeiling)
        } else {
            None
        }
    }

    fn halt(&mut self, reason: HaltReason) {
        self.observer.disconnect();
        self.state = LoopState::Halted;
        self.halt_reason = Some(reason);
        error!(
            "Mutation ceiling exceeded ({:?}: {} idle, {} active). Filtering stops until the page is reloaded",
            reason, self.idle_mutations, self.active_mutations
        );
    }
}

/// Scoped disconnection of an [`ObserverLoop`]; reconnects on drop,
/// including when the suspended work unwinds.
pub struct Suspension<'a, O: MutationObserverHandle> {
    owner: &'a mut ObserverLoop<O>,
    active: bool,
}

impl<O: MutationObserverHandle> Suspension<'_, O> {
    /// Whether this guard disconnected the observer.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<O: MutationObserverHandle> Drop for Suspension<'_, O> {
    fn drop(&mut self) {
        if self.active && self.owner.state == LoopState::Suspended {
            self.owner.observer.observe();
            self.owner.state = LoopState::Observing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Spy {
        connected: bool,
        observes: usize,
        disconnects: usize,
    }

    impl MutationObserverHandle for Spy {
        fn observe(&mut self) {
            self.connected = true;
            self.observes += 1;
        }

        fn disconnect(&mut self) {
            self.connected = false;
            self.disconnects += 1;
        }
    }

    fn limits(max_idle: u64, max_active: u64) -> MutationLimits {
        MutationLimits { max_idle, max_active }
    }

    fn started(limits: MutationLimits) -> ObserverLoop<Spy> {
        let mut observer_loop = ObserverLoop::new(Spy::default(), limits);
        observer_loop.start();
        observer_loop
    }

    #[test]
    fn steps_run_disconnected_and_reconnect_afterwards() {
        let mut observer_loop = started(MutationLimits::default());
        let mut calls = 0;

        observer_loop.process_batch(&[MutationKind::ChildList, MutationKind::ChildList], || {
            calls += 1;
            true
        });

        assert_eq!(calls, 2);
        assert_eq!(observer_loop.state(), LoopState::Observing);
        assert!(observer_loop.observer().connected);
        assert_eq!(observer_loop.observer().disconnects, 2);
        assert_eq!(observer_loop.observer().observes, 3);
        assert_eq!(observer_loop.active_mutations(), 2);
        assert_eq!(observer_loop.idle_mutations(), 0);
    }

    #[test]
    fn non_child_list_record_aborts_the_batch() {
        let mut observer_loop = started(MutationLimits::default());
        let mut calls = 0;

        observer_loop.process_batch(
            &[MutationKind::ChildList, MutationKind::Attributes, MutationKind::ChildList],
            || {
                calls += 1;
                false
            },
        );

        assert_eq!(calls, 1);
        assert_eq!(observer_loop.idle_mutations(), 1);
    }

    #[test]
    fn idle_ceiling_halts_regardless_of_active_count() {
        let mut observer_loop = started(limits(3, 1_000));

        observer_loop.process_batch(&[MutationKind::ChildList; 5], || true);
        assert_eq!(observer_loop.active_mutations(), 5);

        let mut calls = 0;
        for _ in 0..10 {
            observer_loop.process_batch(&[MutationKind::ChildList], || {
                calls += 1;
                false
            });
        }

        // Three idle records are tolerated, the fourth halts.
        assert_eq!(calls, 4);
        assert_eq!(observer_loop.state(), LoopState::Halted);
        assert_eq!(observer_loop.halt_reason(), Some(HaltReason::IdleCeiling));
        assert!(!observer_loop.observer().connected);
    }

    #[test]
    fn active_ceiling_halts_mid_batch() {
        let mut observer_loop = started(limits(1_000, 2));
        let mut calls = 0;

        observer_loop.process_batch(&[MutationKind::ChildList; 6], || {
            calls += 1;
            true
        });

        assert_eq!(calls, 3);
        assert_eq!(observer_loop.halt_reason(), Some(HaltReason::ActiveCeiling));
        assert!(!observer_loop.observer().connected);
    }

    #[test]
    fn halted_loop_is_never_reconnected() {
        let mut observer_loop = started(limits(0, 0));
        observer_loop.process_batch(&[MutationKind::ChildList], || false);
        assert_eq!(observer_loop.state(), LoopState::Halted);

        let observes = observer_loop.observer().observes;
        let guard = observer_loop.suspend();
        assert!(!guard.is_active());
        drop(guard);
        observer_loop.start();

        assert_eq!(observer_loop.observer().observes, observes);
        assert_eq!(observer_loop.state(), LoopState::Halted);
    }

    #[test]
    fn guard_reconnects_when_work_panics() {
        let mut observer_loop = started(MutationLimits::default());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            observer_loop.with_suspended(|| panic!("host page changed shape"));
        }));

        assert!(result.is_err());
        assert_eq!(observer_loop.state(), LoopState::Observing);
        assert!(observer_loop.observer().connected);
    }

    #[test]
    fn stopped_loop_ignores_batches() {
        let mut observer_loop = ObserverLoop::new(Spy::default(), MutationLimits::default());
        let mut calls = 0;
        observer_loop.process_batch(&[MutationKind::ChildList], || {
            calls += 1;
            true
        });
        assert_eq!(calls, 0);
        assert_eq!(observer_loop.observer().observes, 0);
    }
}
