pub mod opts;
pub mod output;
pub mod probes;

use std::mem;

use anyhow::{Context, Result, ensure};
use aya::maps::perf::PerfEventArray;
use aya::util::online_cpus;
use aya::{Ebpf, EbpfLoader};
use bytes::BytesMut;
use log::{info, warn};
use opensnoop_common::OpenEvent;
use tokio::signal;

use crate::opts::Opts;

pub struct OpenSnoop {
    opts: Opts,
    bpf: Ebpf,
}

impl OpenSnoop {
    /// Load the probe program with the CLI's filter block patched into its
    /// read-only config. The config must be in place before load so every
    /// probe invocation observes the same values.
    pub fn load(opts: Opts, bytecode: &[u8]) -> Result<Self> {
        bump_memlock_rlimit();

        let cfg = opts.filter_config();
        let bpf = EbpfLoader::new()
            .set_global("FILTER_CONFIG", &cfg, true)
            .load(bytecode)
            .context("Failed to load eBPF bytecode")?;

        Ok(Self { opts, bpf })
    }

    pub async fn run(mut self) -> Result<()> {
        let mut attached = 0;
        for config in probes::ATTACH_POINTS {
            if probes::attach_tracepoint(&mut self.bpf, config)? {
                attached += 1;
            }
        }
        ensure!(attached > 0, "no open syscall tracepoints available");

        self.spawn_readers()?;

        println!("{}", output::header(&self.opts));
        info!("Tracing open syscalls. Press Ctrl-C to exit.");
        signal::ctrl_c().await?;
        info!("Exiting...");

        Ok(())
    }

    /// One blocking reader per online CPU: the probes emit on whichever
    /// processor the traced thread is running on, and each CPU has its own
    /// perf buffer.
    fn spawn_readers(&mut self) -> Result<()> {
        let mut perf_array = PerfEventArray::try_from(
            self.bpf
                .take_map("EVENTS")
                .context("Failed to get EVENTS map")?,
        )?;

        let cpus = online_cpus().map_err(|(_, e)| e)?;
        for cpu_id in cpus {
            let mut buf = perf_array.open(cpu_id, None)?;
            let opts = self.opts.clone();

            tokio::task::spawn_blocking(move || {
                // Room for the sample header on top of the event payload.
                let mut buffers = (0..10)
                    .map(|_| BytesMut::with_capacity(mem::size_of::<OpenEvent>() + 128))
                    .collect::<Vec<_>>();

                loop {
                    let events = match buf.read_events(&mut buffers) {
                        Ok(events) => events,
                        Err(_) => break,
                    };
                    if events.lost > 0 {
                        warn!("Lost {} events on CPU {}", events.lost, cpu_id);
                    }
                    for buf in buffers.iter().take(events.read) {
                        let ptr = buf.as_ptr() as *const OpenEvent;
                        let event = unsafe { ptr.read_unaligned() };
                        println!("{}", output::format_event(&opts, &event));
                    }
                }
            });
        }

        Ok(())
    }
}

fn bump_memlock_rlimit() {
    // eBPF maps live in locked kernel memory; remove the MEMLOCK cap so the
    // correlation table fits on older kernels without cgroup accounting.
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("Failed to increase rlimit");
    }
}
