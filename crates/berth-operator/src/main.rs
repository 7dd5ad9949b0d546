//! berth operator - reconciles LRPs into StatefulSets and Tasks into Jobs

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use berth_common::config::ControllerConfig;
use berth_common::kube_utils::create_client;
use berth_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use berth_operator::controller_runner::build_controllers;
use berth_operator::startup::{crds_yaml, ensure_crds_installed};

/// berth - runs long-running processes and one-shot tasks on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "berth", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Controller configuration file (YAML)
    #[arg(short, long, env = "BERTH_CONFIG")]
    config: Option<PathBuf>,

    /// Kubeconfig path; overrides the configuration file
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogOutput::Json)]
    log_format: LogOutput,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogOutput {
    Json,
    Text,
}

impl From<LogOutput> for LogFormat {
    fn from(value: LogOutput) -> Self {
        match value {
            LogOutput::Json => LogFormat::Json,
            LogOutput::Text => LogFormat::Text,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The kube client's TLS stack needs a process-wide crypto provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}. \
             The operator cannot reach the API server without a working TLS implementation.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crds_yaml()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: "berth-operator".to_string(),
        format: cli.log_format.into(),
    })?;

    run_controllers(cli).await
}

async fn run_controllers(cli: Cli) -> anyhow::Result<()> {
    let mut config = ControllerConfig::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))?;
    if cli.kubeconfig.is_some() {
        config.kube_config_path = cli.kubeconfig;
    }

    let client = create_client(config.kube_config_path.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("failed to create kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    tracing::info!("Starting berth controllers...");
    let controllers = build_controllers(client, &config);
    futures::future::join_all(controllers).await;

    tracing::info!("Shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("text", LogFormat::Text)]
    fn log_format_flag_maps_to_telemetry_format(#[case] flag: &str, #[case] expected: LogFormat) {
        let cli = Cli::try_parse_from(["berth", "--log-format", flag]).expect("valid args");
        assert_eq!(LogFormat::from(cli.log_format), expected);
    }

    #[test]
    fn config_path_accepts_short_flag() {
        let cli = Cli::try_parse_from(["berth", "-c", "/etc/berth/config.yml"]).expect("valid args");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/berth/config.yml")));
        assert!(!cli.crd);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["berth", "--log-format", "xml"]).is_err());
    }
}
