//! One scenario run from parsed arguments to verdict.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use devicetest_control_plane::AwsControlPlane;
use devicetest_core::DeviceTestConfig;
use devicetest_harness::{Orchestrator, RunReport, ScenarioPlan, Verdict};

use crate::cli::Cli;
use crate::error::CliError;
use crate::{logging, metrics_export};

/// Everything resolved before the first control-plane call.
pub struct Prepared {
    pub config: DeviceTestConfig,
    pub plan: ScenarioPlan,
}

/// Merges configuration sources and builds the plan.
///
/// Every error here is a configuration error: nothing exists in the cloud yet.
pub async fn prepare(cli: &Cli) -> Result<Prepared, CliError> {
    let mut config = DeviceTestConfig::load_or_default(cli.config.as_deref()).await?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let request = cli.request(&config.general.region)?;
    let plan =
        ScenarioPlan::build(&config, &request).map_err(|e| CliError::Config(e.to_string()))?;

    Ok(Prepared { config, plan })
}

/// Runs the prepared plan against the live control plane.
pub async fn execute(prepared: Prepared) -> Result<Verdict, CliError> {
    let Prepared { config, plan } = prepared;

    let metrics = if config.metrics.enabled {
        Some(metrics_export::install_metrics_recorder().map_err(|e| CliError::Init(e.to_string()))?)
    } else {
        None
    };

    tracing::info!(
        scenario = %plan.kind,
        run_id = %plan.run_id,
        identity = %plan.identity_name,
        region = %plan.region,
        scenario_file = %plan.scenario_path.display(),
        "devicetest starting"
    );

    let plane = AwsControlPlane::connect(&plan.region)
        .await
        .map_err(|e| CliError::ControlPlane(e.to_string()))?;

    let orchestrator = Orchestrator::new(
        Arc::new(plane.secrets),
        Arc::new(plane.registry),
        Arc::new(plane.query),
        &config.driver,
    );
    let report = orchestrator.run(&plan).await;
    print_report(&report);

    if let Some(handle) = metrics {
        export_metrics(&handle, &config).await;
    }

    Ok(report.verdict)
}

/// Diagnostic lines on stdout, one per failure reason.
fn print_report(report: &RunReport) {
    if !report.driver_output.is_empty() {
        println!("--- last {} line(s) of driven process output ---", report.driver_output.len());
        for line in &report.driver_output {
            println!("{line}");
        }
        println!("---");
    }
    for line in report.summary_lines() {
        println!("{line}");
    }
    println!(
        "{} {} ({}): {}",
        report.scenario,
        report.run_id,
        report.identity_name,
        report.verdict.label().to_uppercase()
    );
}

/// Metrics are best-effort: a failed write never changes the verdict.
async fn export_metrics(handle: &PrometheusHandle, config: &DeviceTestConfig) {
    if let Err(e) = metrics_export::write_exposition(handle, &config.metrics.output_path).await {
        tracing::warn!(
            path = %config.metrics.output_path.display(),
            error = %e,
            "failed to write metrics file"
        );
    }
}

/// Logging comes up after config so it honours the configured format; a
/// failure to set it up is reported on stderr and the run continues.
pub fn init_logging(config: &DeviceTestConfig) {
    if let Err(e) = logging::init_tracing(&config.general) {
        eprintln!("warning: {e}");
    }
}
