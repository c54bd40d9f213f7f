//! CLI argument parsing using clap derive API
//!
//! Purely declarative: turning arguments into a [`ScenarioRequest`] is the
//! only logic here, and it does no I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use devicetest_core::{DeviceTestConfig, MqttVersion, RunId, ScenarioKind};
use devicetest_harness::{ScenarioRequest, ScenarioVariant};

use crate::error::CliError;

/// devicetest -- drives one device SDK sample against an ephemeral identity.
///
/// Use `devicetest <SCENARIO> --help` for scenario flags.
#[derive(Parser, Debug)]
#[command(name = "devicetest", version, about, long_about = None)]
pub struct Cli {
    /// Path to a devicetest.toml configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Write Prometheus metrics of this run to a file.
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision a device through a fleet provisioning template.
    FleetProvisioning(FleetArgs),

    /// Run a job to completion on a freshly provisioned device.
    Jobs(CommonArgs),

    /// Report shadow state from a freshly provisioned device.
    Shadow(ShadowArgs),
}

/// Flags shared by every scenario.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Run identifier; a fresh UUID is generated when absent.
    #[arg(long)]
    pub input_uuid: Option<String>,

    /// Control-plane region (default us-east-1).
    #[arg(long)]
    pub region: Option<String>,

    /// MQTT protocol version of the sample (3 or 5).
    #[arg(long, value_parser = parse_mqtt_version)]
    pub mqtt_version: MqttVersion,

    /// Explicit scenario descriptor instead of the built-in mapping.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

// ---- fleet-provisioning ----

#[derive(Args, Debug)]
pub struct FleetArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Prefix the provisioning template puts before the run id.
    #[arg(long)]
    pub thing_name_prefix: Option<String>,

    /// Provision from a certificate signing request.
    #[arg(long)]
    pub use_csr: bool,
}

// ---- shadow ----

#[derive(Args, Debug)]
pub struct ShadowArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Use the named shadow instead of the classic one.
    #[arg(long)]
    pub use_named_shadow: bool,
}

fn parse_mqtt_version(value: &str) -> Result<MqttVersion, String> {
    value.parse().map_err(|e: devicetest_core::ConfigError| e.to_string())
}

impl Cli {
    /// Applies the global flags on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut DeviceTestConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(region) = &self.common().region {
            config.general.region = region.clone();
        }
        if let Some(path) = &self.metrics_file {
            config.metrics.enabled = true;
            config.metrics.output_path = path.clone();
        }
    }

    pub fn common(&self) -> &CommonArgs {
        match &self.command {
            Commands::FleetProvisioning(args) => &args.common,
            Commands::Jobs(args) => args,
            Commands::Shadow(args) => &args.common,
        }
    }

    pub fn kind(&self) -> ScenarioKind {
        match self.command {
            Commands::FleetProvisioning(_) => ScenarioKind::FleetProvisioning,
            Commands::Jobs(_) => ScenarioKind::Jobs,
            Commands::Shadow(_) => ScenarioKind::Shadow,
        }
    }

    pub fn variant(&self) -> ScenarioVariant {
        match &self.command {
            Commands::FleetProvisioning(args) if args.use_csr => ScenarioVariant::Csr,
            Commands::Shadow(args) if args.use_named_shadow => ScenarioVariant::NamedShadow,
            _ => ScenarioVariant::Standard,
        }
    }

    /// Builds the run request. `region` is the already merged setting.
    pub fn request(&self, region: &str) -> Result<ScenarioRequest, CliError> {
        let common = self.common();
        let run_id = RunId::from_option(common.input_uuid.clone())
            .map_err(|e| CliError::Config(e.to_string()))?;
        let thing_name_prefix = match &self.command {
            Commands::FleetProvisioning(args) => args.thing_name_prefix.clone(),
            _ => None,
        };

        Ok(ScenarioRequest {
            kind: self.kind(),
            mqtt_version: common.mqtt_version,
            variant: self.variant(),
            run_id,
            region: region.to_owned(),
            scenario_file: common.file.clone(),
            thing_name_prefix,
        })
    }
}
