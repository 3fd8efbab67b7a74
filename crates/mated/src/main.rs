// # mated - mate daemon
//
// Thin integration layer around mate-core:
// 1. Read configuration from environment variables
// 2. Initialize logging and the runtime
// 3. Register providers and endpoint sources
// 4. Run the startup sync, then watch until a signal arrives
//
// No reconciliation logic lives here.
//
// ## Configuration
//
// ### Zone
// - `MATE_ZONE`: Managed zone name (required)
// - `MATE_GROUP_ID`: Record group id written into ownership markers (required)
// - `MATE_RECORD_TTL`: TTL of every record written (default 300)
//
// ### Provider
// - `MATE_PROVIDER_TYPE`: `google` (default) or `memory` (dry run)
// - `MATE_GOOGLE_PROJECT`: Project owning the managed zone
// - `MATE_GOOGLE_ACCESS_TOKEN`: OAuth2 bearer token
//
// ### Endpoint Source
// - `MATE_SOURCE_TYPE`: `http` (default)
// - `MATE_SOURCE_URL`: URL serving the endpoint list
// - `MATE_SOURCE_INTERVAL`: Poll interval in seconds (default 30)
//
// ### Controller
// - `MATE_SYNC_ONLY`: Exit after the startup sync (default false)
// - `MATE_RESYNC_INTERVAL`: Periodic full resync in seconds (default off)
// - `MATE_PROCESS_POLICY`: `trusting` (default) or `guarded`
// - `MATE_STOP_ON_PROCESS_ERROR`: Exit on the first failed update (default false)
// - `MATE_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export MATE_ZONE=example-com
// export MATE_GROUP_ID=cluster-a
// export MATE_GOOGLE_PROJECT=my-project
// export MATE_GOOGLE_ACCESS_TOKEN="$(gcloud auth print-access-token)"
// export MATE_SOURCE_URL=http://registry.internal/endpoints
//
// mated
// ```

use anyhow::{Context, Result};
use mate_core::{
    Controller, ControllerEvent, ControllerState, EndpointSourceConfig, MateConfig,
    ProcessPolicy, ProviderConfig, ProviderRegistry, Reconciler,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound for finishing the in-flight operation after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum MateExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error
    ConfigError = 1,
    /// Runtime error (failed sync, failed update with stop-on-error)
    RuntimeError = 2,
}

impl From<MateExitCode> for ExitCode {
    fn from(code: MateExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    zone: String,
    group_id: String,
    record_ttl: u32,
    provider_type: String,
    google_project: Option<String>,
    google_access_token: Option<String>,
    source_type: String,
    source_url: Option<String>,
    source_interval: u64,
    sync_only: bool,
    resync_interval: Option<u64>,
    process_policy: ProcessPolicy,
    stop_on_process_error: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            zone: var("MATE_ZONE").unwrap_or_default(),
            group_id: var("MATE_GROUP_ID").unwrap_or_default(),
            record_ttl: parse(&var, "MATE_RECORD_TTL")?.unwrap_or(300),
            provider_type: var("MATE_PROVIDER_TYPE").unwrap_or_else(|| "google".to_string()),
            google_project: var("MATE_GOOGLE_PROJECT"),
            google_access_token: var("MATE_GOOGLE_ACCESS_TOKEN"),
            source_type: var("MATE_SOURCE_TYPE").unwrap_or_else(|| "http".to_string()),
            source_url: var("MATE_SOURCE_URL"),
            source_interval: parse(&var, "MATE_SOURCE_INTERVAL")?.unwrap_or(30),
            sync_only: parse_bool(&var, "MATE_SYNC_ONLY")?,
            resync_interval: parse(&var, "MATE_RESYNC_INTERVAL")?,
            process_policy: match var("MATE_PROCESS_POLICY").as_deref() {
                None | Some("trusting") => ProcessPolicy::Trusting,
                Some("guarded") => ProcessPolicy::Guarded,
                Some(other) => anyhow::bail!(
                    "MATE_PROCESS_POLICY '{}' is not valid. Valid policies: trusting, guarded",
                    other
                ),
            },
            stop_on_process_error: parse_bool(&var, "MATE_STOP_ON_PROCESS_ERROR")?,
            log_level: var("MATE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.zone.is_empty() {
            anyhow::bail!("MATE_ZONE is required. Set it via: export MATE_ZONE=example-com");
        }
        if self.group_id.is_empty() {
            anyhow::bail!(
                "MATE_GROUP_ID is required. Set it via: export MATE_GROUP_ID=my-cluster"
            );
        }

        match self.provider_type.as_str() {
            "google" => {
                if self.google_project.is_none() {
                    anyhow::bail!("MATE_GOOGLE_PROJECT is required when MATE_PROVIDER_TYPE=google");
                }
                if self.google_access_token.is_none() {
                    anyhow::bail!(
                        "MATE_GOOGLE_ACCESS_TOKEN is required when MATE_PROVIDER_TYPE=google"
                    );
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "MATE_PROVIDER_TYPE '{}' is not supported. Supported providers: google, memory",
                self.provider_type
            ),
        }

        match self.source_type.as_str() {
            "http" => {
                let Some(url) = &self.source_url else {
                    anyhow::bail!("MATE_SOURCE_URL is required when MATE_SOURCE_TYPE=http");
                };
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    anyhow::bail!("MATE_SOURCE_URL must use HTTP or HTTPS scheme. Got: {}", url);
                }
            }
            _ => anyhow::bail!(
                "MATE_SOURCE_TYPE '{}' is not supported. Supported types: http",
                self.source_type
            ),
        }

        if log_level(&self.log_level).is_none() {
            anyhow::bail!(
                "MATE_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        self.to_mate_config()
            .validate()
            .context("Invalid configuration")?;

        Ok(())
    }

    /// Build the library configuration
    fn to_mate_config(&self) -> MateConfig {
        let provider = match self.provider_type.as_str() {
            "google" => ProviderConfig::Google {
                project: self.google_project.clone().unwrap_or_default(),
                zone: self.zone.clone(),
                access_token: self.google_access_token.clone().unwrap_or_default(),
                base_url: None,
            },
            _ => ProviderConfig::Memory {
                zone: self.zone.clone(),
            },
        };

        let mut config = MateConfig::new(provider, self.group_id.clone());
        config.source = EndpointSourceConfig::Http {
            url: self.source_url.clone().unwrap_or_default(),
            interval_secs: self.source_interval,
        };
        config.record_ttl = self.record_ttl;
        config.sync_only = self.sync_only;
        config.controller.resync_interval_secs = self.resync_interval;
        config.controller.process_policy = self.process_policy;
        config.controller.stop_on_process_error = self.stop_on_process_error;
        config
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} '{}' is not valid: {}", name, value, e)),
    }
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<bool> {
    match var(name).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => anyhow::bail!("{} '{}' is not a boolean", name, other),
    }
}

fn log_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return MateExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return MateExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&config.log_level).unwrap_or(Level::INFO))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MateExitCode::ConfigError.into();
    }

    info!("Starting mated");
    info!(
        "Zone {} via {}, record group {}",
        config.zone, config.provider_type, config.group_id
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MateExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            MateExitCode::RuntimeError
        } else {
            MateExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let mate_config = config.to_mate_config();

    let registry = ProviderRegistry::with_builtins();

    #[cfg(feature = "google")]
    {
        info!("Registering Google Cloud DNS provider");
        mate_provider_google::register(&registry);
    }

    #[cfg(feature = "http")]
    {
        info!("Registering HTTP endpoint source");
        mate_source_http::register(&registry);
    }

    let provider = registry.create_provider(&mate_config.provider)?;
    let source = registry.create_endpoint_source(&mate_config.source)?;

    let reconciler = Arc::new(Reconciler::new(provider, &mate_config)?);
    let (controller, events) = Controller::new(source, reconciler, &mate_config)?;
    tokio::spawn(log_events(events));

    let mut handle = controller.start().await.context("Initial sync failed")?;

    if handle.state() == ControllerState::Terminated {
        info!("Sync complete, exiting");
        return handle.join().await.map_err(Into::into);
    }

    let signal = tokio::select! {
        signal = wait_for_shutdown() => Some(signal?),
        _ = handle.wait_for(ControllerState::Terminated) => None,
    };

    match signal {
        Some(signal) => {
            info!("Received shutdown signal: {}", signal);
            handle.stop();
        }
        None => warn!("Controller stopped on its own"),
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.join()).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(anyhow::anyhow!(
            "Shutdown timeout after {:?}",
            SHUTDOWN_TIMEOUT
        )),
    }
}

/// Log controller events until the controller goes away
async fn log_events(mut events: mpsc::Receiver<ControllerEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Controller event: {:?}", event);
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    const COMPLETE: &[(&str, &str)] = &[
        ("MATE_ZONE", "example-com"),
        ("MATE_GROUP_ID", "g1"),
        ("MATE_GOOGLE_PROJECT", "my-project"),
        ("MATE_GOOGLE_ACCESS_TOKEN", "ya29.token"),
        ("MATE_SOURCE_URL", "http://registry.local/endpoints"),
    ];

    #[test]
    fn complete_configuration_is_valid() {
        let cfg = config(COMPLETE).unwrap();
        cfg.validate().unwrap();

        let mate = cfg.to_mate_config();
        assert_eq!(mate.record_ttl, 300);
        assert_eq!(mate.provider.type_name(), "google");
        assert_eq!(mate.source.type_name(), "http");
        assert!(!mate.sync_only);
    }

    #[test]
    fn missing_group_id_is_rejected() {
        let vars: Vec<_> = COMPLETE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "MATE_GROUP_ID")
            .collect();
        assert!(config(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn missing_project_is_rejected() {
        let vars: Vec<_> = COMPLETE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "MATE_GOOGLE_PROJECT")
            .collect();
        assert!(config(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn memory_provider_needs_no_credentials() {
        let cfg = config(&[
            ("MATE_ZONE", "example-com"),
            ("MATE_GROUP_ID", "g1"),
            ("MATE_PROVIDER_TYPE", "memory"),
            ("MATE_SOURCE_URL", "http://registry.local/endpoints"),
        ])
        .unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn controller_options_are_parsed() {
        let mut vars = COMPLETE.to_vec();
        vars.extend([
            ("MATE_SYNC_ONLY", "true"),
            ("MATE_RECORD_TTL", "60"),
            ("MATE_RESYNC_INTERVAL", "600"),
            ("MATE_PROCESS_POLICY", "guarded"),
        ]);
        let mate = config(&vars).unwrap().to_mate_config();

        assert!(mate.sync_only);
        assert_eq!(mate.record_ttl, 60);
        assert_eq!(mate.controller.resync_interval_secs, Some(600));
        assert_eq!(mate.controller.process_policy, ProcessPolicy::Guarded);
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let mut vars = COMPLETE.to_vec();
        vars.push(("MATE_RECORD_TTL", "five minutes"));
        assert!(config(&vars).is_err());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut vars = COMPLETE.to_vec();
        vars.push(("MATE_RECORD_TTL", "0"));
        assert!(config(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut vars = COMPLETE.to_vec();
        vars.push(("MATE_LOG_LEVEL", "loud"));
        assert!(config(&vars).unwrap().validate().is_err());
    }
}
