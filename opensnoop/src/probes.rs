//! Tracepoint attachment on the file-open syscall path.

use std::path::Path;

use anyhow::{Context, Result};
use aya::{Ebpf, programs::TracePoint};
use log::{info, warn};

pub struct TracepointConfig<'a> {
    pub program_name: &'a str,
    pub category: &'a str,
    pub name: &'a str,
}

/// Entry and exit interception points. open(2) is absent on some
/// architectures, so its pair is attached only when the tracepoint exists.
pub static ATTACH_POINTS: &[TracepointConfig<'static>] = &[
    TracepointConfig {
        program_name: "sys_enter_open",
        category: "syscalls",
        name: "sys_enter_open",
    },
    TracepointConfig {
        program_name: "sys_exit_open",
        category: "syscalls",
        name: "sys_exit_open",
    },
    TracepointConfig {
        program_name: "sys_enter_openat",
        category: "syscalls",
        name: "sys_enter_openat",
    },
    TracepointConfig {
        program_name: "sys_exit_openat",
        category: "syscalls",
        name: "sys_exit_openat",
    },
];

fn tracepoint_exists(category: &str, name: &str) -> bool {
    const TRACEFS_MOUNT_POINTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

    TRACEFS_MOUNT_POINTS.iter().any(|base| {
        Path::new(base)
            .join("events")
            .join(category)
            .join(name)
            .exists()
    })
}

pub fn attach_tracepoint(bpf: &mut Ebpf, config: &TracepointConfig) -> Result<bool> {
    if !tracepoint_exists(config.category, config.name) {
        warn!(
            "Tracepoint {}:{} not available; skipping {}",
            config.category, config.name, config.program_name
        );
        return Ok(false);
    }

    info!("Loading program {}", config.program_name);
    let program: &mut TracePoint = bpf
        .program_mut(config.program_name)
        .with_context(|| format!("Failed to find {} program", config.program_name))?
        .try_into()?;
    program.load()?;
    program
        .attach(config.category, config.name)
        .with_context(|| format!("Failed to attach {}", config.name))?;
    Ok(true)
}
