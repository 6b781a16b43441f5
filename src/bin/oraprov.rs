//! oraprov entry point
//!
//! The run itself is blocking; it executes on the blocking pool while the
//! runtime waits for Ctrl-C. Cancellation stops the run at the next step and
//! rollback guards remove whatever was created.

use oraprov::cli::{run_command, Cli};
use oraprov::connection::oracle::OracleConnector;
use oraprov::observability::init_logging;
use oraprov::provisioning::{ConsoleReporter, ProvisionError, Reporter, RunContext};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(err) = init_logging(&cli.log_level) {
        ConsoleReporter.fail(&err.to_string());
        std::process::exit(err.exit_code());
    }

    let ctx = RunContext::new();
    let cancel = ctx.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let command = cli.command;
    let result = tokio::task::spawn_blocking(move || {
        run_command(&command, &OracleConnector, &ConsoleReporter, &ctx)
    })
    .await
    .unwrap_or_else(|e| {
        Err(ProvisionError::Server {
            step: "run".to_string(),
            message: e.to_string(),
        })
    });

    if let Err(err) = result {
        ConsoleReporter.fail(&err.to_string());
        std::process::exit(err.exit_code());
    }
}
