//! kubestrap CLI binary

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use kubestrap::cli::{self, Cli, EXIT_FAILURE};
use kubestrap::commands;
use kubestrap::tracing::{TracingConfig, init_tracing};

fn main() {
    // NOTE: eprintln! in the panic hook is intentional, the subscriber may
    // be unusable during a panic.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig {
        format: cli.format,
        level: cli.level.into(),
        filter: None,
    }) {
        eprintln!("{e:?}");
        std::process::exit(EXIT_FAILURE);
    }

    let exit_code = run_with_tokio(cli);
    std::process::exit(exit_code);
}

/// Create the tokio runtime and run the command on it
fn run_with_tokio(cli: Cli) -> i32 {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            return EXIT_FAILURE;
        }
    };

    match rt.block_on(commands::execute(cli)) {
        Ok(code) => code,
        Err(err) => {
            let code = cli::exit_code_for(&err);
            cli::render_error(err);
            code
        }
    }
}
