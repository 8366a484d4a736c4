use anyhow::Result;
use clap::Parser;
use opensnoop::{OpenSnoop, opts::Opts};

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if opts.verbose { "info" } else { "warn" },
    ))
    .init();

    let snoop = OpenSnoop::load(
        opts,
        aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/opensnoop")),
    )?;
    snoop.run().await
}
