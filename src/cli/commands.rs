//! CLI command implementations
//!
//! Each command loads its configuration before any server contact, opens one
//! connection, runs inside a `provision` span and optionally writes a report.
//! The connection is dropped on every exit path.

use std::path::Path;

use crate::config::Config;
use crate::connection::{Connection, Connector};
use crate::provisioning::{
    Marker, PrincipalRun, ProvisionError, ProvisionReport, ProvisionResult, Reporter, RunContext,
    RunKind, TenancyLifecycle, TimestampNameGenerator,
};

use super::args::Command;

/// Run the appropriate command based on CLI args
pub fn run_command(
    cmd: &Command,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
    ctx: &RunContext,
) -> ProvisionResult<()> {
    match cmd {
        Command::Principal {
            config,
            teardown,
            report,
        } => principal(config, *teardown, report.as_deref(), connector, reporter, ctx),
        Command::Tenancy {
            config,
            keep,
            report,
        } => tenancy(config, *keep, report.as_deref(), connector, reporter, ctx),
        Command::CheckSeed { config, report } => {
            check_seed(config, report.as_deref(), connector, reporter, ctx)
        }
    }
}

fn connect(
    config: &Config,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
) -> ProvisionResult<Box<dyn Connection>> {
    let descriptor = &config.oracle_connection;
    reporter.step(&format!(
        "connecting to {} as {}",
        descriptor.connect_string(),
        descriptor.username
    ));
    let conn = connector
        .connect(descriptor)
        .map_err(|e| ProvisionError::at_step("connect", e))?;
    reporter.ok("connected");
    Ok(conn)
}

/// Stamp the report and write it when a path was given. A write failure
/// never hides the run's own error.
fn conclude(
    mut report: ProvisionReport,
    result: ProvisionResult<()>,
    path: Option<&Path>,
    reporter: &dyn Reporter,
) -> ProvisionResult<()> {
    report.finish(&result);
    if let Some(path) = path {
        match report.write_to(path) {
            Ok(()) => reporter.info(&format!("report written to {}", path.display())),
            Err(err) => {
                tracing::warn!(error = %err, "run report not written");
                if result.is_ok() {
                    return Err(err);
                }
            }
        }
    }
    result
}

/// Provision a throwaway account
pub fn principal(
    config_path: &Path,
    teardown: bool,
    report_path: Option<&Path>,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
    ctx: &RunContext,
) -> ProvisionResult<()> {
    let span = tracing::info_span!("provision", run_id = %ctx.run_id(), kind = "principal");
    let _entered = span.enter();

    let mut report = ProvisionReport::new(ctx, RunKind::Principal);
    let result = run_principal(config_path, teardown, connector, reporter, ctx, &mut report);
    conclude(report, result, report_path, reporter)
}

fn run_principal(
    config_path: &Path,
    teardown: bool,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
    ctx: &RunContext,
    report: &mut ProvisionReport,
) -> ProvisionResult<()> {
    let config = Config::load(config_path)?;
    let settings = config.principal()?;
    let classifier = config.classifier.classifier()?;
    let teardown = teardown || settings.teardown;

    let conn = connect(&config, connector, reporter)?;
    let names = TimestampNameGenerator::principal();
    let mut run = PrincipalRun::new(&*conn, reporter, &names, &classifier, ctx, settings)
        .with_limits(config.limits);

    let result = run.run(teardown);
    let outcome = run.outcome();
    report.record_principal(outcome);

    if result.is_ok() {
        let granted: usize = outcome.grants.iter().map(|g| g.succeeded).sum();
        let failed: usize = outcome.grants.iter().map(|g| g.failed).sum();
        reporter.line(
            Marker::Summary,
            &format!(
                "user {}: grants OK={}, failed={}; artifacts compiled={}; {}",
                outcome.identifier.as_deref().unwrap_or("-"),
                granted,
                failed,
                outcome.artifacts.len(),
                if outcome.torn_down { "dropped" } else { "kept" }
            ),
        );
    }
    result
}

/// Provision (and by default tear down) a pluggable database
pub fn tenancy(
    config_path: &Path,
    keep: bool,
    report_path: Option<&Path>,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
    ctx: &RunContext,
) -> ProvisionResult<()> {
    let span = tracing::info_span!("provision", run_id = %ctx.run_id(), kind = "tenancy");
    let _entered = span.enter();

    let mut report = ProvisionReport::new(ctx, RunKind::Tenancy);
    let result = run_tenancy(config_path, keep, connector, reporter, ctx, &mut report);
    conclude(report, result, report_path, reporter)
}

fn run_tenancy(
    config_path: &Path,
    keep: bool,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
    ctx: &RunContext,
    report: &mut ProvisionReport,
) -> ProvisionResult<()> {
    let config = Config::load(config_path)?;
    let settings = config.tenancy()?;
    let teardown = settings.teardown && !keep;

    let conn = connect(&config, connector, reporter)?;
    let names = TimestampNameGenerator::tenancy();
    let mut lifecycle = TenancyLifecycle::new(&*conn, reporter, &names, ctx, settings);

    let result = lifecycle.run(teardown);
    lifecycle.release();
    report.record_tenancy(&lifecycle);

    if result.is_ok() {
        reporter.line(
            Marker::Summary,
            &format!(
                "tenancy {}: {}",
                lifecycle.name().unwrap_or("-"),
                lifecycle.state()
            ),
        );
    }
    result
}

/// Verify the root container and the seed layout only
pub fn check_seed(
    config_path: &Path,
    report_path: Option<&Path>,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
    ctx: &RunContext,
) -> ProvisionResult<()> {
    let span = tracing::info_span!("provision", run_id = %ctx.run_id(), kind = "check_seed");
    let _entered = span.enter();

    let mut report = ProvisionReport::new(ctx, RunKind::CheckSeed);
    let result = run_check_seed(config_path, connector, reporter, ctx, &mut report);
    conclude(report, result, report_path, reporter)
}

fn run_check_seed(
    config_path: &Path,
    connector: &dyn Connector,
    reporter: &dyn Reporter,
    ctx: &RunContext,
    report: &mut ProvisionReport,
) -> ProvisionResult<()> {
    let config = Config::load(config_path)?;
    let settings = config.tenancy()?;

    let conn = connect(&config, connector, reporter)?;
    let names = TimestampNameGenerator::tenancy();
    let mut lifecycle = TenancyLifecycle::new(&*conn, reporter, &names, ctx, settings);

    let result = lifecycle.verify().map(|paths| {
        reporter.line(Marker::Summary, &format!("root directory: {}", paths.root));
        reporter.line(Marker::Summary, &format!("seed directory: {}", paths.actual_seed));
    });
    report.record_tenancy(&lifecycle);
    result
}
