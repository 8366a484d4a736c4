//! Entry/exit correlation for in-flight open calls.
//!
//! The probes only ever touch the shared table through [`CorrelationTable`],
//! so the same state machine drives the kernel BPF map and a bounded mock in
//! host tests. All three operations must be non-blocking; capacity exhaustion
//! and double deletes are silent by contract.

use crate::{CallerId, FilterConfig, PendingCall, policy};

/// Bounded shared store keyed by thread id.
pub trait CorrelationTable {
    /// Insert or overwrite. Silently drops the record when the table is full.
    fn insert(&self, tid: u32, call: &PendingCall);

    /// Copy out the pending record for `tid`, if any.
    fn lookup(&self, tid: u32) -> Option<PendingCall>;

    /// Idempotent delete; removing an absent key is a no-op.
    fn remove(&self, tid: u32);
}

/// Entry-probe side of the state machine.
///
/// Runs the identity filters first and captures arguments only for accepted
/// calls; `capture` returning `None` (an unreadable context) stores nothing.
/// An existing entry for a recycled thread id is overwritten, since an id is
/// never reused while its previous call is still in flight.
///
/// Returns whether a pending record was stored.
pub fn record_entry<T, U, C>(
    table: &T,
    cfg: &FilterConfig,
    id: CallerId,
    current_uid: U,
    capture: C,
) -> bool
where
    T: CorrelationTable,
    U: FnOnce() -> u32,
    C: FnOnce() -> Option<PendingCall>,
{
    if !policy::entry_allowed(cfg, id, current_uid) {
        return false;
    }
    let Some(call) = capture() else {
        return false;
    };
    table.insert(id.tid(), &call);
    true
}

/// What the exit probe should do for a completed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitAction {
    /// No pending record: entry was filtered out or the table was full.
    Miss,
    /// Correlated, but the outcome filter rejected it. Entry released.
    Suppressed,
    /// Correlated and accepted. Entry released; emit an event built from the
    /// captured arguments.
    Emit(PendingCall),
}

/// Exit-probe side of the state machine.
///
/// On a hit the table entry is released exactly once no matter which branch
/// is taken; the pending record is copied out first, so emission never reads
/// through the table after the delete.
pub fn correlate_exit<T>(table: &T, cfg: &FilterConfig, tid: u32, ret: i32) -> ExitAction
where
    T: CorrelationTable,
{
    let Some(call) = table.lookup(tid) else {
        return ExitAction::Miss;
    };
    table.remove(tid);
    if policy::exit_emits(cfg, ret) {
        ExitAction::Emit(call)
    } else {
        ExitAction::Suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;

    const O_RDONLY: i32 = 0;

    /// Fixed-slot stand-in for the kernel hash map, with the same contract:
    /// insert-or-overwrite, silent drop when full, idempotent delete.
    struct FixedTable<const N: usize> {
        slots: RefCell<[Option<(u32, PendingCall)>; N]>,
    }

    impl<const N: usize> FixedTable<N> {
        fn new() -> Self {
            Self {
                slots: RefCell::new([None; N]),
            }
        }

        fn len(&self) -> usize {
            self.slots.borrow().iter().filter(|s| s.is_some()).count()
        }
    }

    impl<const N: usize> CorrelationTable for FixedTable<N> {
        fn insert(&self, tid: u32, call: &PendingCall) {
            let mut slots = self.slots.borrow_mut();
            if let Some(slot) = slots
                .iter_mut()
                .find(|s| matches!(s, Some((k, _)) if *k == tid))
            {
                *slot = Some((tid, *call));
                return;
            }
            if let Some(slot) = slots.iter_mut().find(|s| s.is_none()) {
                *slot = Some((tid, *call));
            }
        }

        fn lookup(&self, tid: u32) -> Option<PendingCall> {
            self.slots
                .borrow()
                .iter()
                .find_map(|s| match s {
                    Some((k, call)) if *k == tid => Some(*call),
                    _ => None,
                })
        }

        fn remove(&self, tid: u32) {
            for slot in self.slots.borrow_mut().iter_mut() {
                if matches!(slot, Some((k, _)) if *k == tid) {
                    *slot = None;
                }
            }
        }
    }

    fn unfiltered() -> FilterConfig {
        FilterConfig::UNFILTERED
    }

    fn failed_only() -> FilterConfig {
        FilterConfig {
            failed_only: 1,
            ..FilterConfig::UNFILTERED
        }
    }

    fn call(fname: u64, flags: i32) -> PendingCall {
        PendingCall::new(fname, flags)
    }

    #[test]
    fn unfiltered_successful_open_emits_captured_args() {
        let table = FixedTable::<8>::new();
        let cfg = unfiltered();
        let id = CallerId::from_parts(100, 101);

        assert!(record_entry(&table, &cfg, id, || 0, || {
            Some(call(0xdead, O_RDONLY))
        }));
        assert_eq!(table.len(), 1);

        assert_eq!(
            correlate_exit(&table, &cfg, id.tid(), 3),
            ExitAction::Emit(call(0xdead, O_RDONLY))
        );
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn mismatched_tgid_stores_nothing_and_exit_misses() {
        let table = FixedTable::<8>::new();
        let cfg = FilterConfig {
            tgid: 42,
            ..FilterConfig::UNFILTERED
        };
        let id = CallerId::from_parts(100, 101);

        assert!(!record_entry(&table, &cfg, id, || 0, || {
            Some(call(1, O_RDONLY))
        }));
        assert_eq!(table.len(), 0);
        assert_eq!(correlate_exit(&table, &cfg, id.tid(), 3), ExitAction::Miss);
    }

    #[test]
    fn failed_only_suppresses_success_but_still_cleans_up() {
        let table = FixedTable::<8>::new();
        let cfg = failed_only();
        let id = CallerId::from_parts(100, 101);

        assert!(record_entry(&table, &cfg, id, || 0, || {
            Some(call(1, O_RDONLY))
        }));
        assert_eq!(table.len(), 1);

        assert_eq!(
            correlate_exit(&table, &cfg, id.tid(), 3),
            ExitAction::Suppressed
        );
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn failed_only_emits_failures() {
        let table = FixedTable::<8>::new();
        let cfg = failed_only();
        let id = CallerId::from_parts(100, 101);

        record_entry(&table, &cfg, id, || 0, || Some(call(7, O_RDONLY)));
        assert_eq!(
            correlate_exit(&table, &cfg, id.tid(), -2),
            ExitAction::Emit(call(7, O_RDONLY))
        );
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn capacity_exhaustion_drops_overflow_without_corruption() {
        const CAP: usize = 4;
        let table = FixedTable::<CAP>::new();
        let cfg = unfiltered();

        for tid in 1..=CAP as u32 {
            record_entry(
                &table,
                &cfg,
                CallerId::from_parts(100, tid),
                || 0,
                || Some(call(tid as u64, O_RDONLY)),
            );
        }
        assert_eq!(table.len(), CAP);

        // One past capacity: silently dropped.
        record_entry(
            &table,
            &cfg,
            CallerId::from_parts(100, 99),
            || 0,
            || Some(call(99, O_RDONLY)),
        );
        assert_eq!(table.len(), CAP);

        // The overflowing call's exit observes a miss.
        assert_eq!(correlate_exit(&table, &cfg, 99, 0), ExitAction::Miss);

        // Earlier entries survived intact and drain to empty.
        for tid in 1..=CAP as u32 {
            assert_eq!(
                correlate_exit(&table, &cfg, tid, 0),
                ExitAction::Emit(call(tid as u64, O_RDONLY))
            );
        }
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn no_leak_across_interleaved_calls() {
        let table = FixedTable::<16>::new();
        let cfg = unfiltered();

        for tid in 1..=10u32 {
            record_entry(
                &table,
                &cfg,
                CallerId::from_parts(1, tid),
                || 0,
                || Some(call(tid as u64, O_RDONLY)),
            );
        }
        // Completions arrive in an unrelated order.
        for tid in [4u32, 9, 1, 10, 2, 7, 3, 8, 5, 6] {
            assert_ne!(correlate_exit(&table, &cfg, tid, 0), ExitAction::Miss);
        }
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn repeated_exit_is_harmless() {
        let table = FixedTable::<8>::new();
        let cfg = unfiltered();
        let id = CallerId::from_parts(100, 101);

        record_entry(&table, &cfg, id, || 0, || Some(call(1, O_RDONLY)));
        assert_ne!(correlate_exit(&table, &cfg, id.tid(), 0), ExitAction::Miss);
        assert_eq!(correlate_exit(&table, &cfg, id.tid(), 0), ExitAction::Miss);
        assert_eq!(table.len(), 0);

        // Direct delete of an absent key is a no-op too.
        table.remove(id.tid());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn recycled_tid_supersedes_stale_entry() {
        let table = FixedTable::<8>::new();
        let cfg = unfiltered();
        let id = CallerId::from_parts(100, 101);

        record_entry(&table, &cfg, id, || 0, || Some(call(1, 0)));
        record_entry(&table, &cfg, id, || 0, || Some(call(2, 2)));
        assert_eq!(table.len(), 1);
        assert_eq!(
            correlate_exit(&table, &cfg, id.tid(), 0),
            ExitAction::Emit(call(2, 2))
        );
    }

    #[test]
    fn unreadable_arguments_store_nothing() {
        let table = FixedTable::<8>::new();
        let cfg = unfiltered();
        let id = CallerId::from_parts(100, 101);

        assert!(!record_entry(&table, &cfg, id, || 0, || None));
        assert_eq!(table.len(), 0);
    }
}
