use crate::config::GatewayConfig;
use crate::context::{Arguments, CallerIdentity, Environment, RequestContext, ResolvedCall};
use crate::echo::echo_target;
use crate::envelope::ResponseEnvelope;
use crate::invoker::MiddlewareRegistry;
use crate::pipeline::Pipeline;
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Command-line interface for brrtgate
///
/// Validates gateway configuration and dispatches calls against the built-in echo
/// handler, printing the envelopes a transport would send.
#[derive(Parser, Debug)]
#[command(name = "brrtgate")]
#[command(about = "brrtgate dispatch pipeline CLI", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a configuration file and build the pipeline from it
    Check {
        /// Path to the gateway configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Dispatch a call to a configured method, answered by the echo handler
    Call {
        /// Path to the gateway configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Service class to call
        #[arg(long)]
        class: String,

        /// Method name on the service class
        #[arg(short, long)]
        method: String,

        /// HTTP method of the call (defaults to the method's configured one)
        #[arg(long)]
        http_method: Option<String>,

        /// Caller identity used by rate and access control
        #[arg(long)]
        caller: Option<String>,

        /// Named argument as key=value; values are parsed as JSON when possible
        #[arg(long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, Value)>,

        /// Environment override for this call (production/development)
        #[arg(long, value_parser = parse_environment)]
        environment: Option<Environment>,

        /// Number of identical calls to dispatch
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
}

fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty argument name in '{s}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn parse_environment(s: &str) -> Result<Environment, String> {
    Environment::parse(s).ok_or_else(|| format!("unknown environment '{s}'"))
}

/// Parse the process arguments and run the selected command, writing to stdout.
///
/// # Errors
///
/// Returns an error if the configuration is unusable or a dispatch fails fatally.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

/// Run `cli`, writing command output to `out`.
///
/// # Errors
///
/// Returns an error if the configuration is unusable, a dispatch fails fatally or
/// `out` cannot be written.
pub fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    match cli.command {
        Commands::Check { config } => {
            let cfg = GatewayConfig::load(&config)
                .with_context(|| format!("checking {}", config.display()))?;
            let pipeline = Pipeline::from_config(&cfg, &MiddlewareRegistry::new())?;
            writeln!(out, "config: {}", config.display())?;
            writeln!(out, "environment: {}", cfg.environment)?;
            writeln!(
                out,
                "services: {} ({} methods)",
                cfg.services.len(),
                cfg.method_count()
            )?;
            writeln!(
                out,
                "middleware: {}",
                pipeline.middleware_name().unwrap_or("none")
            )?;
            writeln!(
                out,
                "cache: {}",
                if cfg.cache.enabled {
                    format!("enabled (capacity {})", cfg.cache.capacity)
                } else {
                    "disabled".to_string()
                }
            )?;
            writeln!(
                out,
                "rate control: {}",
                if cfg.rate_control.limit > 0 {
                    format!(
                        "{} calls / {}s",
                        cfg.rate_control.limit, cfg.rate_control.interval_secs
                    )
                } else {
                    "off".to_string()
                }
            )?;
            writeln!(out, "OK")?;
            Ok(())
        }
        Commands::Call {
            config,
            class,
            method,
            http_method,
            caller,
            args,
            environment,
            repeat,
        } => {
            let cfg = GatewayConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let pipeline = Pipeline::from_config(&cfg, &MiddlewareRegistry::new())?;
            let caller = caller.map_or_else(CallerIdentity::anonymous, CallerIdentity::new);
            let environment = environment.unwrap_or(cfg.environment);
            let arguments = args
                .into_iter()
                .fold(Arguments::new(), |acc, (k, v)| acc.named(k, v));

            for _ in 0..repeat.max(1) {
                let ctx = route(
                    &cfg,
                    &class,
                    &method,
                    http_method.as_deref(),
                    &caller,
                    &arguments,
                )?
                .with_environment(environment);
                let envelope = pipeline.dispatch(ctx)?;
                writeln!(out, "{}", serde_json::to_string_pretty(&render(&envelope))?)?;
            }
            info!(metrics = ?pipeline.metrics().snapshot(), "Calls complete");
            Ok(())
        }
    }
}

/// Resolve `class.method` against the configured services, the way a router would.
///
/// A method that is not configured, or is configured for a different HTTP method,
/// produces an unmatched context.
fn route(
    cfg: &GatewayConfig,
    class: &str,
    method: &str,
    http_method: Option<&str>,
    caller: &CallerIdentity,
    arguments: &Arguments,
) -> anyhow::Result<RequestContext> {
    let requested = http_method
        .map(|m| http::Method::from_bytes(m.to_ascii_uppercase().as_bytes()))
        .transpose()
        .with_context(|| format!("invalid HTTP method {http_method:?}"))?;

    if let Some((service, m)) = cfg.find_method(class, method) {
        let configured = http::Method::from_bytes(m.http_method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid configured HTTP method '{}'", m.http_method))?;
        let http_method = requested.unwrap_or_else(|| configured.clone());
        if http_method == configured {
            let call = ResolvedCall::new(
                echo_target(&m.name, arguments.clone()),
                m.metadata(&service.version),
            );
            return Ok(RequestContext::resolved(
                class,
                http_method,
                caller.clone(),
                call,
            ));
        }
        return Ok(RequestContext::unmatched(
            class,
            service.version.as_str(),
            http_method,
            caller.clone(),
        ));
    }

    let version = cfg
        .find_service(class)
        .map(|s| s.version.clone())
        .unwrap_or_default();
    Ok(RequestContext::unmatched(
        class,
        version,
        requested.unwrap_or(http::Method::GET),
        caller.clone(),
    ))
}

/// What a transport would send for `envelope`.
#[must_use]
pub fn render(envelope: &ResponseEnvelope) -> Value {
    let headers: serde_json::Map<String, Value> = envelope
        .response_headers()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    json!({
        "status": envelope.status(),
        "reason": envelope.reason(),
        "headers": headers,
        "body": envelope.body(),
    })
}
