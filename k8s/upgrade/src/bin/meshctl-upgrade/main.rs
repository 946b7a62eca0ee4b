use crate::{
    common::{
        constants::{DEFAULT_TRACING_FILTER, PRODUCT},
        error::{Result, TracingSubscriberFilter},
    },
    opts::validators::{validate_helm_chart_dir, validate_helmv3_in_path},
    upgrade::upgrade,
};
use clap::Parser;
use opts::CliArgs;
use snafu::ResultExt;
use std::{io, process};
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod common;
mod helm;
mod mesh_config;
mod opts;
mod upgrade;
mod user_prompt;

#[tokio::main]
async fn main() {
    let opts = CliArgs::parse();

    if let Err(error) = run(&opts).await {
        error!(%error, "Failed to upgrade {PRODUCT}");
        console_logger::error(format!("Error: {error}").as_str());
        process::exit(1);
    }
}

async fn run(opts: &CliArgs) -> Result<()> {
    init_logging(opts.ansi_colours())?;

    validate_cli_args(opts)?;

    upgrade(opts).await
}

/// Initialize logging components -- tracing.
fn init_logging(ansi_colours: bool) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(ansi_colours)
        .with_writer(io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_TRACING_FILTER))
        .context(TracingSubscriberFilter {
            filter: DEFAULT_TRACING_FILTER.to_string(),
        })?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

/// Validates the arguments which can be checked before talking to the cluster.
fn validate_cli_args(opts: &CliArgs) -> Result<()> {
    validate_helmv3_in_path()?;
    validate_helm_chart_dir(opts.chart_dir().as_path())?;

    info!("Validated all inputs");

    Ok(())
}
