pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod notify;
pub mod render;
pub mod session;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub async fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting taskdeck CLI"
    );
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.taskdeckrc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides.into_iter().chain(
            cli.rc_overrides
                .into_iter()
                .map(|kv| (kv.key, kv.value)),
        ),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = session::SessionStore::open(&data_dir).with_context(|| {
        format!("failed to open session store at {}", data_dir.display())
    })?;

    let base = config::resolve_api_base(&cfg);
    let mut renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(&store, &cfg, &mut renderer, &base, cli.assume_yes, inv).await?;

    info!("done");
    Ok(())
}
