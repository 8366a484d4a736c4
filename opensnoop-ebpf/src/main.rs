#![no_std]
#![no_main]

use aya_ebpf::{
    cty::c_long,
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_uid_gid,
        bpf_probe_read_user_str_bytes,
    },
    macros::{map, tracepoint},
    maps::{HashMap, PerfEventArray},
    programs::TracePointContext,
};
use opensnoop_common::{
    CallerId, CorrelationTable, ExitAction, FilterConfig, MAX_INFLIGHT_CALLS, OpenEvent,
    PendingCall, correlate_exit, record_entry,
};

/// Filter parameters, patched into .rodata by the loader before the program
/// is verified. Read through a volatile load so the compiler cannot fold the
/// placeholder value.
#[unsafe(no_mangle)]
static FILTER_CONFIG: FilterConfig = FilterConfig::UNFILTERED;

/// In-flight calls keyed by thread id, entry arguments parked until the
/// matching exit fires.
#[map]
static START: HashMap<u32, PendingCall> = HashMap::with_max_entries(MAX_INFLIGHT_CALLS, 0);

#[map]
static EVENTS: PerfEventArray<OpenEvent> = PerfEventArray::new(0);

// syscalls:sys_enter_* layout: 16-byte header, then one 8-byte slot per
// argument (see the tracepoint's format file). sys_enter_openat has dfd in
// the first slot, pushing filename and flags one slot further than
// sys_enter_open. sys_exit_* carries ret as an i64 at offset 16.
const OPEN_FILENAME_OFFSET: usize = 16;
const OPEN_FLAGS_OFFSET: usize = 24;
const OPENAT_FILENAME_OFFSET: usize = 24;
const OPENAT_FLAGS_OFFSET: usize = 32;
const EXIT_RET_OFFSET: usize = 16;

fn filter_config() -> FilterConfig {
    unsafe { core::ptr::read_volatile(&FILTER_CONFIG) }
}

/// The shared map behind the state machine's table seam.
struct StartTable;

impl CorrelationTable for StartTable {
    fn insert(&self, tid: u32, call: &PendingCall) {
        // Capacity exhaustion is an accepted lossy mode; the exit side will
        // simply miss.
        let _ = START.insert(&tid, call, 0);
    }

    fn lookup(&self, tid: u32) -> Option<PendingCall> {
        unsafe { START.get(&tid) }.copied()
    }

    fn remove(&self, tid: u32) {
        let _ = START.remove(&tid);
    }
}

#[tracepoint]
pub fn sys_enter_open(ctx: TracePointContext) -> u32 {
    handle_enter(&ctx, OPEN_FILENAME_OFFSET, OPEN_FLAGS_OFFSET);
    0
}

#[tracepoint]
pub fn sys_enter_openat(ctx: TracePointContext) -> u32 {
    handle_enter(&ctx, OPENAT_FILENAME_OFFSET, OPENAT_FLAGS_OFFSET);
    0
}

#[tracepoint]
pub fn sys_exit_open(ctx: TracePointContext) -> u32 {
    match try_exit(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_exit_openat(ctx: TracePointContext) -> u32 {
    match try_exit(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn handle_enter(ctx: &TracePointContext, fname_off: usize, flags_off: usize) {
    let id = CallerId::new(bpf_get_current_pid_tgid());
    record_entry(
        &StartTable,
        &filter_config(),
        id,
        || bpf_get_current_uid_gid() as u32,
        || {
            // An unreadable context stores nothing; the exit will miss.
            let fname: u64 = unsafe { ctx.read_at(fname_off) }.ok()?;
            let flags: i64 = unsafe { ctx.read_at(flags_off) }.ok()?;
            Some(PendingCall::new(fname, flags as i32))
        },
    );
}

fn try_exit(ctx: &TracePointContext) -> Result<(), c_long> {
    let id = CallerId::new(bpf_get_current_pid_tgid());
    let ret: i64 = unsafe { ctx.read_at(EXIT_RET_OFFSET) }?;
    let ret = ret as i32;

    let call = match correlate_exit(&StartTable, &filter_config(), id.tid(), ret) {
        ExitAction::Emit(call) => call,
        // Missed entry (filtered or table full) or failed-only rejection;
        // either way there is nothing left to release.
        ExitAction::Miss | ExitAction::Suppressed => return Ok(()),
    };

    let mut event = OpenEvent::zeroed();
    event.pid = id.tgid();
    event.uid = bpf_get_current_uid_gid() as u32;
    event.flags = call.flags;
    event.ret = ret;
    if let Ok(comm) = bpf_get_current_comm() {
        event.comm = comm;
    }
    // Defensive copy: the pointer captured at entry only stays valid while
    // the traced call is still executing.
    if call.fname != 0 {
        let _ = unsafe { bpf_probe_read_user_str_bytes(call.fname as *const u8, &mut event.fname) };
    }

    // Fire and forget; a full ring drops the event without touching the
    // traced call.
    EVENTS.output(ctx, &event, 0);

    Ok(())
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}

#[unsafe(link_section = "license")]
#[unsafe(no_mangle)]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
