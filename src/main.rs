use hostpulse::{
    features::{
        agent::AgentLoop,
        reporter::HttpReporter,
        sampler::{Sampler, SystemMetricSource},
    },
    shared::{config::AgentConfig, traits::DataCollector},
};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

const CONFIG_PATH: &str = "config/agent.yaml";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AgentConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let reporter = match HttpReporter::from_config(&config) {
        Ok(reporter) => reporter,
        Err(e) => {
            error!("Failed to initialize reporter: {}", e);
            std::process::exit(1);
        }
    };

    let sampler = Sampler::from_config(SystemMetricSource::new(), &config);
    if let Err(e) = sampler.validate() {
        warn!("Sampler health check failed, cycles will be skipped: {}", e);
    }

    info!(
        "Starting host metrics agent on {}: reporting to {} every {}s (mount {})",
        whoami::fallible::hostname().unwrap_or_else(|_| String::from("unknown")),
        reporter.endpoint(),
        config.interval_secs,
        config.mount_path.display()
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current cycle");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let mut agent = AgentLoop::new(&config, sampler, reporter);
    agent.run(cancel).await;
}
