use clap::Parser;
use opensnoop_common::FilterConfig;

/// Trace open() syscalls system-wide.
#[derive(Debug, Clone, Parser)]
#[command(name = "opensnoop", version, about)]
pub struct Opts {
    /// Trace this process id only
    #[arg(short = 'p', long)]
    pub pid: Option<u32>,

    /// Trace this thread id only
    #[arg(short = 't', long)]
    pub tid: Option<u32>,

    /// Trace this user id only
    #[arg(short = 'u', long)]
    pub uid: Option<u32>,

    /// Show only failed opens
    #[arg(short = 'x', long)]
    pub failed: bool,

    /// Minimum duration to report, microseconds (reserved, not yet enforced)
    #[arg(short = 'd', long)]
    pub duration: Option<u64>,

    /// Include a wall-clock timestamp column
    #[arg(short = 'T', long)]
    pub timestamp: bool,

    /// Include a UID column
    #[arg(short = 'U', long)]
    pub print_uid: bool,

    /// Include the open flags column, in octal
    #[arg(short = 'e', long)]
    pub extended: bool,

    /// Verbose log output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Opts {
    /// The filter block written into the probe's read-only config before
    /// load. Absent flags become the zero "unfiltered" sentinel the kernel
    /// side expects.
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            tgid: self.pid.unwrap_or(0),
            pid: self.tid.unwrap_or(0),
            uid: self.uid.unwrap_or(0),
            failed_only: self.failed as u8,
            _pad: [0; 3],
            min_us: self.duration.unwrap_or(0),
        }
    }
}
