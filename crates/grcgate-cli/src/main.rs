//! GRC Gate
//!
//! Command-line front end for the policy engine: validate policy documents,
//! evaluate resources against them, and verify audit logs.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use grcgate_core::{Error, PolicyResource, Value};
use grcgate_policy::{validate_policy, PathResolver, PolicyContext, PolicyEnforcer, PolicyStore};
use grcgate_telemetry::{
    describe_metrics, read_jsonl, verify_chain, AuditTrail, CompositeAuditLogger, EvaluationMetrics,
    JsonlAuditLog, TracingAuditLogger,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{debug, error, info};

mod config;
mod store;

use config::{GateConfig, LogFormat};
use store::FilePolicyStore;

#[derive(Parser, Debug)]
#[command(name = "grcgate", version)]
#[command(about = "Policy enforcement for governance, risk and compliance records", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "grcgate.yaml", global = true)]
    config: PathBuf,

    /// Policy document, overrides the configuration file
    #[arg(short, long, global = true)]
    policy: Option<PathBuf>,

    /// Maximum number of cached compiled paths
    #[arg(long, global = true)]
    path_cache_capacity: Option<usize>,

    /// Append decisions to this JSONL audit log
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Disable the in-memory audit trail
    #[arg(long, global = true)]
    no_audit: bool,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a policy document for structural problems
    Validate,

    /// Evaluate a resource against the policy
    Evaluate(EvaluateArgs),

    /// Verify the hash chain of a JSONL audit log
    VerifyAudit {
        /// Audit log to check
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Resource JSON file, `-` for stdin
    #[arg(short, long)]
    resource: PathBuf,

    /// Resource type, e.g. Evidence, Risk, Control
    #[arg(short = 't', long = "type")]
    resource_type: String,

    /// Action being attempted
    #[arg(short, long)]
    action: String,

    /// Target environment
    #[arg(short, long, default_value = "dev")]
    env: String,

    /// Acting principal id
    #[arg(long)]
    principal: Option<String>,

    /// Principal role (repeatable)
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Read the resource as a typed GRC resource (id, title, type, metadata)
    #[arg(long)]
    typed: bool,

    /// Fail with exit code 2 when the policy denies
    #[arg(long)]
    enforce: bool,

    /// Print evaluation metrics after the decision
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = GateConfig::load(&cli.config, &cli)?;
    init_tracing(cli.verbose, config.logging.format);
    debug!(?config, "configuration loaded");

    match &cli.command {
        Command::Validate => validate(&config).await,
        Command::Evaluate(args) => evaluate(&config, args).await,
        Command::VerifyAudit { path } => verify_audit(path),
    }
}

async fn validate(config: &GateConfig) -> Result<ExitCode> {
    let store = FilePolicyStore::new(&config.policy_path);
    let policy = store
        .get_policy()
        .await
        .with_context(|| format!("failed to load {}", store.path().display()))?;

    let issues = validate_policy(&policy);
    if issues.is_empty() {
        println!(
            "{} {}: ok ({} rules, {} exceptions)",
            policy.metadata.name,
            policy.metadata.version,
            policy.spec.rules.len(),
            policy.spec.exceptions.len()
        );
        return Ok(ExitCode::SUCCESS);
    }

    for issue in &issues {
        println!("{}", issue);
    }
    error!(policy = %policy.metadata.name, issues = issues.len(), "policy failed validation");
    Ok(ExitCode::from(1))
}

async fn evaluate(config: &GateConfig, args: &EvaluateArgs) -> Result<ExitCode> {
    let metrics_handle = if args.metrics { Some(init_metrics()?) } else { None };

    let input = read_resource(&args.resource)?;
    let resource = if args.typed {
        let typed: PolicyResource =
            serde_json::from_value(input).context("resource is not a typed GRC resource")?;
        typed.to_value()
    } else {
        Value::from(input)
    };

    let mut ctx = PolicyContext::new(&args.action, &args.env, &args.resource_type, resource);
    if let Some(principal) = &args.principal {
        ctx = ctx.with_principal(principal, args.roles.iter().cloned());
    }

    let metrics = EvaluationMetrics::new();
    let trail = Arc::new(AuditTrail::new());
    let mut audit = CompositeAuditLogger::new()
        .with(Arc::new(TracingAuditLogger))
        .with(Arc::new(metrics.clone()));
    if config.audit.enabled {
        audit = audit.with(trail.clone());
    }
    if let Some(path) = &config.audit.log_path {
        let log = JsonlAuditLog::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        audit = audit.with(Arc::new(log));
    }

    let enforcer = PolicyEnforcer::with_path_resolver(
        Arc::new(FilePolicyStore::new(&config.policy_path)),
        Arc::new(audit),
        Arc::new(PathResolver::with_capacity(config.path_cache_capacity)),
    );

    let outcome = if args.enforce {
        enforcer.enforce(&mut ctx).await
    } else {
        enforcer.evaluate(&mut ctx).await
    };

    let code = match outcome {
        Ok(decision) => {
            let resource = if args.typed {
                serde_json::to_value(PolicyResource::from_value(&ctx.resource)?)?
            } else {
                ctx.resource.to_json()
            };

            let mut output = serde_json::Map::new();
            output.insert("decision".into(), serde_json::to_value(&decision)?);
            output.insert("resource".into(), resource);
            if args.metrics {
                output.insert("metrics".into(), serde_json::to_value(metrics.snapshot())?);
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
            ExitCode::SUCCESS
        }
        Err(Error::Violation(violation)) => {
            eprintln!("denied: {}", violation);
            eprintln!("hint: {}", violation.remediation_hint);
            ExitCode::from(2)
        }
        Err(e) => return Err(e).context("policy evaluation failed"),
    };

    if config.audit.enabled {
        info!(
            entries = trail.len(),
            head = trail.head().as_deref().unwrap_or("-"),
            intact = trail.verify(),
            "audit trail"
        );
    }
    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    Ok(code)
}

fn verify_audit(path: &Path) -> Result<ExitCode> {
    let entries = read_jsonl(path).with_context(|| format!("failed to read {}", path.display()))?;

    if verify_chain(&entries) {
        println!("{}: {} entries, chain intact", path.display(), entries.len());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}: chain broken", path.display());
        error!(path = %path.display(), "audit log failed verification");
        Ok(ExitCode::from(1))
    }
}

fn read_resource(path: &Path) -> Result<serde_json::Value> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).context("resource is not valid JSON")
}

/// Initialize tracing/logging on stderr, leaving stdout for results
fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("grcgate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grcgate=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Install the Prometheus recorder and return a handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;
    describe_metrics();

    Ok(handle)
}
