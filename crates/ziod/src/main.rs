// # ziod - zio pipeline host
//
// Thin host around zio-core: it reads configuration from the environment,
// registers the compiled-in handlers, runs one pipeline and maps the outcome
// to an exit code. Resolution logic is not part of this binary; every work
// item is emitted as its own result line.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Handlers
// - `ZIO_INPUT_HANDLER`: Input handler name (file, amqp, rabbitmq). Default: file
// - `ZIO_OUTPUT_HANDLER`: Output handler name (file). Default: file
// - `ZIO_INPUT_HANDLER_CONFIG`: Handler config file (required by amqp)
//
// ### Files
// - `ZIO_INPUT_FILE`: Input path, empty or "-" for stdin. Default: -
// - `ZIO_OUTPUT_FILE`: Output path, empty or "-" for stdout. Default: -
// - `ZIO_ZONE_FILE`: Parse input as a DNS zone file (true/false). Default: false
//
// ### Pipeline
// - `ZIO_CHANNEL_CAPACITY`: Channel capacity, unset for unbounded
// - `ZIO_WORKERS`: Number of workers. Default: 1
// - `ZIO_SHUTDOWN_TIMEOUT_SECS`: Grace period after cancellation. Default: 10
// - `ZIO_FAILURE_POLICY`: abort or drain. Default: abort
// - `ZIO_LOG_LEVEL`: trace, debug, info, warn, error. Default: info
//
// Logs go to stderr so that stdout can carry results.
//
// ## Example
//
// ```bash
// export ZIO_INPUT_HANDLER=amqp
// export ZIO_INPUT_HANDLER_CONFIG=/etc/zio/rabbitmq.yaml
// export ZIO_OUTPUT_FILE=/var/lib/zio/results.txt
//
// ziod
// ```

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zio_core::{
    CancellationToken, FailurePolicy, GlobalConfig, HandlerRegistry, InputMode, InputSource,
    OutputSink, PassthroughProcessor, Pipeline, PipelineConfig,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum ZioExitCode {
    /// Every participant finished cleanly
    CleanShutdown = 0,
    /// Configuration error or handler setup failure
    ConfigError = 1,
    /// A participant failed while streaming
    RuntimeError = 2,
}

impl From<ZioExitCode> for ExitCode {
    fn from(code: ZioExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Host configuration
struct Config {
    global: GlobalConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mut global = GlobalConfig::new();

        if let Ok(name) = env::var("ZIO_INPUT_HANDLER") {
            global.input_handler = name.trim().to_string();
        }
        if let Ok(name) = env::var("ZIO_OUTPUT_HANDLER") {
            global.output_handler = name.trim().to_string();
        }
        if let Ok(path) = env::var("ZIO_INPUT_FILE") {
            global.input_file_path = path;
        }
        if let Ok(path) = env::var("ZIO_OUTPUT_FILE") {
            global.output_file_path = path;
        }
        global.input_handler_config = env::var("ZIO_INPUT_HANDLER_CONFIG")
            .ok()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        if let Some(zone) = parse_var::<Flag>("ZIO_ZONE_FILE")?
            && zone.0
        {
            global.input_mode = InputMode::ZoneFile;
        }
        global.channel_capacity = parse_var("ZIO_CHANNEL_CAPACITY")?;
        if let Some(workers) = parse_var("ZIO_WORKERS")? {
            global.workers = workers;
        }
        if let Some(secs) = parse_var("ZIO_SHUTDOWN_TIMEOUT_SECS")? {
            global.shutdown_timeout_secs = secs;
        }
        if let Some(policy) = parse_var::<FailurePolicy>("ZIO_FAILURE_POLICY")? {
            global.failure_policy = policy;
        }

        Ok(Self {
            global,
            log_level: env::var("ZIO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.global.validate()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ZIO_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn tracing_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Boolean environment flag (1/0, true/false, yes/no, on/off)
struct Flag(bool);

impl FromStr for Flag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Flag(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Flag(false)),
            other => anyhow::bail!("expected true or false, got '{}'", other),
        }
    }
}

/// Parse an optional environment variable, failing on malformed values
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ZioExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ZioExitCode::ConfigError.into();
    }

    // stdout may be the output sink
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.tracing_level())
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ZioExitCode::ConfigError.into();
    }

    info!("Starting ziod");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZioExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run(config.global)).into()
}

/// Set up the handlers and run the pipeline to completion
async fn run(config: GlobalConfig) -> ZioExitCode {
    let registry = HandlerRegistry::new();
    register_handlers(&registry);

    let (source, sink) = match create_handlers(&registry, &config).await {
        Ok(handlers) => handlers,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return ZioExitCode::ConfigError;
        }
    };

    let pipeline = Pipeline::new(PipelineConfig::from(&config));
    let cancel = pipeline.cancellation_token();
    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = pipeline
        .run(source, vec![sink], Arc::new(PassthroughProcessor))
        .await;
    signals.abort();

    match result {
        Ok(report) => {
            info!(
                "Done: {} item(s) processed, {} result(s) written",
                report.items_processed, report.results_emitted
            );
            ZioExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Pipeline error: {}", e);
            ZioExitCode::RuntimeError
        }
    }
}

/// Register every handler compiled into this binary
fn register_handlers(registry: &HandlerRegistry) {
    #[cfg(feature = "file")]
    {
        info!("Registering file handlers");
        zio_file::register(registry);
    }

    #[cfg(feature = "amqp")]
    {
        info!("Registering queue input handler");
        zio_amqp::register(registry);
    }

    info!(
        "Available handlers: input {:?}, output {:?}",
        registry.list_sources(),
        registry.list_sinks()
    );
}

async fn create_handlers(
    registry: &HandlerRegistry,
    config: &GlobalConfig,
) -> Result<(Box<dyn InputSource>, Box<dyn OutputSink>)> {
    let source = registry
        .create_source(&config.input_handler, config)
        .await
        .with_context(|| format!("initializing input handler '{}'", config.input_handler))?;
    let sink = registry
        .create_sink(&config.output_handler, config)
        .await
        .with_context(|| format!("initializing output handler '{}'", config.output_handler))?;

    info!(
        "Input handler '{}', output handler '{}'",
        source.name(),
        sink.name()
    );
    Ok((source, sink))
}

/// Cancel the pipeline on the first shutdown signal
async fn cancel_on_signal(cancel: CancellationToken) {
    match wait_for_shutdown_signal().await {
        Ok(signal) => {
            info!("Received shutdown signal: {}", signal);
            cancel.cancel();
        }
        Err(e) => warn!("Shutdown signals unavailable: {}", e),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
