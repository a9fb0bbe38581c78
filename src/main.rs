// src/main.rs

//! `conductor` runs one orchestration for one entity and prints its summary.
//!
//! Exit status is 1 when the config cannot be loaded or the request is
//! rejected (unknown module or entity, dependency cycle). Units that fail
//! are reported in the summary and do not change the exit status.

use conductor::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("conductor error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
