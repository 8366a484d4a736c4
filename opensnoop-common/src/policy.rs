//! Pure filter predicates over call identity and outcome.

use crate::{CallerId, FilterConfig};

/// Identity check run by the entry probe before anything is stored.
///
/// Filters short-circuit in a fixed order: tgid, then tid, then uid. The uid
/// is fetched through the closure only when a uid filter is configured, so an
/// unfiltered run never pays for the credential lookup.
pub fn entry_allowed<U>(cfg: &FilterConfig, id: CallerId, current_uid: U) -> bool
where
    U: FnOnce() -> u32,
{
    if cfg.tgid != 0 && cfg.tgid != id.tgid() {
        return false;
    }
    if cfg.pid != 0 && cfg.pid != id.tid() {
        return false;
    }
    if cfg.uid != 0 && cfg.uid != current_uid() {
        return false;
    }
    true
}

/// Outcome check run by the exit probe on a correlated call.
pub fn exit_emits(cfg: &FilterConfig, ret: i32) -> bool {
    cfg.failed_only == 0 || ret < 0
}
