#![deny(clippy::all)]

use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use wheelhouse_core::{CommandContext, GlobalOptions, SystemEffects};

mod cli;
mod dispatch;
mod output;
mod style;

pub use cli::*;

use crate::dispatch::{classify_error, dispatch_command, info_for};
use crate::output::{emit_output, OutputOptions};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = match WheelhouseCli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // help and --version are not usage errors
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        config: cli
            .config
            .as_ref()
            .map(|path| path.to_string_lossy().to_string()),
    };
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };

    let (info, outcome) = match CommandContext::new(&global, Arc::new(SystemEffects::new())) {
        Ok(ctx) => dispatch_command(&ctx, &cli.command)?,
        Err(err) => (info_for(&cli.command), classify_error(&err)),
    };
    let code = emit_output(&opts, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!(
        "wheelhouse={level},wheelhouse_cli={level},wheelhouse_core={level},wheelhouse_domain={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
