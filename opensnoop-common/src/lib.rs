#![no_std]

#[cfg(test)]
extern crate std;

pub mod correlate;
pub mod policy;

pub use correlate::{CorrelationTable, ExitAction, correlate_exit, record_entry};

/// Kernel task comm length, including the trailing NUL.
pub const TASK_COMM_LEN: usize = 16;

/// Longest file name copied into an event, matching NAME_MAX.
pub const NAME_MAX: usize = 255;

/// Upper bound on concurrently in-flight open calls tracked for correlation.
pub const MAX_INFLIGHT_CALLS: u32 = 10240;

/// One traced open attempt, emitted on the perf channel after the exit probe
/// has correlated and filtered the call.
///
/// Field order and widths are the wire contract with the collector. The
/// explicit pad byte keeps the struct free of implicit padding so reading it
/// as plain bytes in userspace is well-defined.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpenEvent {
    /// Process id (tgid) of the caller.
    pub pid: u32,
    pub uid: u32,
    pub comm: [u8; TASK_COMM_LEN],
    /// NUL-terminated, truncated copy of the path passed to open.
    pub fname: [u8; NAME_MAX],
    pub _pad: u8,
    pub flags: i32,
    /// Non-negative: descriptor number. Negative: -errno.
    pub ret: i32,
}

impl OpenEvent {
    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            uid: 0,
            comm: [0; TASK_COMM_LEN],
            fname: [0; NAME_MAX],
            _pad: 0,
            flags: 0,
            ret: 0,
        }
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for OpenEvent {}

/// Filter parameters, written once by the collector before the probes attach
/// and read-only afterwards.
///
/// Zero means "unfiltered" for every identity field, as in the reference
/// tool; a consequence is that uid 0 cannot be targeted. `min_us` is carried
/// for a future latency filter and is not enforced by the probes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    /// Target process id (tgid), 0 = any.
    pub tgid: u32,
    /// Target thread id, 0 = any.
    pub pid: u32,
    /// Target user id, 0 = any.
    pub uid: u32,
    /// Non-zero: only report opens that returned an error.
    pub failed_only: u8,
    pub _pad: [u8; 3],
    /// Reserved minimum-duration threshold, microseconds.
    pub min_us: u64,
}

impl FilterConfig {
    pub const UNFILTERED: Self = Self {
        tgid: 0,
        pid: 0,
        uid: 0,
        failed_only: 0,
        _pad: [0; 3],
        min_us: 0,
    };
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for FilterConfig {}

/// Arguments captured at entry, parked in the correlation table until the
/// matching exit fires. The filename pointer is only dereferenced by the exit
/// probe while the traced call is still executing on the same thread.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingCall {
    /// Userspace address of the path argument.
    pub fname: u64,
    pub flags: i32,
    pub _pad: u32,
}

impl PendingCall {
    pub const fn new(fname: u64, flags: i32) -> Self {
        Self {
            fname,
            flags,
            _pad: 0,
        }
    }
}

/// The packed pid_tgid value identifying the calling execution context.
///
/// The high half is the tgid (process id in user terms), the low half the
/// thread id; the thread id is the correlation key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallerId(u64);

impl CallerId {
    pub const fn new(pid_tgid: u64) -> Self {
        Self(pid_tgid)
    }

    pub const fn from_parts(tgid: u32, tid: u32) -> Self {
        Self(((tgid as u64) << 32) | tid as u64)
    }

    pub const fn tgid(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn tid(self) -> u32 {
        self.0 as u32
    }
}
