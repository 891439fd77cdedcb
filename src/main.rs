use anyhow::Context;
use warden::{Config, run};

fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("warden-worker");

    if config.general.worker_threads > 0 {
        builder.worker_threads(config.general.worker_threads);
    }

    builder.build()?.block_on(run(config))
}
