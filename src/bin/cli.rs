use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use journey_actions::engine::Installed;
use journey_actions::prelude::*;
use journey_actions::workflow::StepKind;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "journey-actions")]
#[command(about = "Compile and run user-journey workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        /// Path to the workflow file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Path to the engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the result trace as JSON to this path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Skip screenshots on failed steps
        #[arg(long)]
        no_evidence: bool,
    },

    /// Compile workflow files without running them
    Validate {
        /// Path to workflow file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Path to the engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check workflow text for literal element queries and timeouts
    Lint {
        /// Path to workflow file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// List registered action keywords
    Actions {
        /// Path to the engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[cfg(feature = "otel")]
fn init_otel_tracing(verbose: bool) {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::runtime::Tokio;
    use opentelemetry_sdk::trace::TracerProvider;

    let filter = if verbose {
        "journey_actions=debug"
    } else {
        "journey_actions=info"
    };

    let otlp_endpoint =
        std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| "http://localhost:4317".to_string());

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("Failed to create OTLP exporter ({}), tracing to stdout only", e);
            init_tracing(verbose);
            return;
        }
    };

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .build();

    let tracer = provider.tracer("journey-actions");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    opentelemetry::global::set_tracer_provider(provider);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "journey_actions=debug"
    } else {
        "journey_actions=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "otel")]
    init_otel_tracing(cli.verbose);

    #[cfg(not(feature = "otel"))]
    init_tracing(cli.verbose);

    let result = run(cli).await;

    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();

    match result {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "journey-actions failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            file,
            config,
            report,
            no_evidence,
        } => run_workflow(file, config, report, no_evidence).await,
        Commands::Validate { path, config } => validate(path, config),
        Commands::Lint { path } => lint(path),
        Commands::Actions { config } => list_actions(config),
    }
}

/// Load config and wire in every configured adapter
fn prepare(config_path: Option<&Path>) -> anyhow::Result<(EngineConfig, Installed)> {
    let config = match config_path {
        Some(path) => {
            let mut config = EngineConfig::load(path)?;
            if let Some(base) = path.parent() {
                config.rebase_paths(base);
            }
            config
        }
        None => EngineConfig::default(),
    };

    let mut adapters: Vec<Box<dyn Adapter>> = Vec::new();
    for path in &config.adapters {
        adapters.push(Box::new(DeclarativeAdapter::load(path)?));
    }
    let mut installed = install_adapters(ActionRegistry::with_builtins(), &adapters)?;

    for path in &config.locator_packs {
        installed
            .packs
            .push(WorkflowLoader::load_locator_pack(Path::new(path))?);
    }

    Ok((config, installed))
}

fn compile_path(path: &Path, registry: &ActionRegistry, config: &EngineConfig) -> anyhow::Result<Vec<Workflow>> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }
    let compiler = Compiler::new(registry)
        .with_timeout_profiles(config.timeouts.profiles.keys().cloned());

    let mut workflows = Vec::new();
    for file in WorkflowLoader::resolve_path(path)? {
        workflows.extend(WorkflowLoader::load_file(&compiler, &file)?);
    }
    Ok(workflows)
}

async fn run_workflow(
    file: PathBuf,
    config_path: Option<PathBuf>,
    report: Option<PathBuf>,
    no_evidence: bool,
) -> anyhow::Result<bool> {
    let (config, installed) = prepare(config_path.as_deref())?;
    let workflows = compile_path(&file, &installed.registry, &config)?;
    if workflows.is_empty() {
        println!("No workflows found in: {}", file.display());
        return Ok(true);
    }

    let backend = PlaywrightBridge::start(&config.playwright).await?;
    let mut executor = Executor::from_installed(installed, Box::new(backend)).with_config(config);
    if !no_evidence {
        executor = executor.with_evidence_collector(Box::new(ScreenshotCollector));
    }

    let cancel = executor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling at the next step boundary");
            cancel.cancel();
        }
    });

    let mut results = Vec::new();
    let mut all_passed = true;
    for workflow in &workflows {
        let result = match executor.run(workflow).await {
            Ok(result) => result,
            Err(e) => {
                executor.shutdown().await.ok();
                return Err(e.into());
            }
        };
        print_workflow_result(&result);
        all_passed &= result.success();
        results.push(result);
    }

    if let Err(e) = executor.shutdown().await {
        tracing::warn!("Failed to close browser backend: {}", e);
    }

    if let Some(path) = report {
        let json = if results.len() == 1 {
            results[0].to_json()?
        } else {
            serde_json::to_string_pretty(&results)?
        };
        std::fs::write(&path, json)?;
        println!("Report written to {}", path.display());
    }

    Ok(all_passed)
}

fn validate(path: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<bool> {
    let (config, installed) = prepare(config_path.as_deref())?;
    let workflows = compile_path(&path, &installed.registry, &config)?;
    if workflows.is_empty() {
        println!("No workflows found in: {}", path.display());
        return Ok(true);
    }

    let mut valid = true;
    for workflow in &workflows {
        if let Some(pack) = &workflow.locator_pack {
            if !installed.packs.iter().any(|p| &p.id == pack) {
                println!("✗ {}: locator pack '{}' is not loaded", workflow.name, pack);
                valid = false;
                continue;
            }
        }
        for step in workflow.steps() {
            if let StepKind::Semantic = step.kind {
                if !installed.expander.has(&step.keyword) {
                    println!(
                        "✗ {}: unknown semantic action '{}' ({})",
                        workflow.name, step.keyword, step.source
                    );
                    valid = false;
                }
            }
        }
        println!(
            "✓ {} ({} phases, {} steps, digest {})",
            workflow.name,
            workflow.phases.len(),
            workflow.steps().count(),
            &workflow.digest[..12.min(workflow.digest.len())]
        );
    }

    Ok(valid)
}

fn lint(path: PathBuf) -> anyhow::Result<bool> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }
    let violations = WorkflowLoader::lint_path(&path)?;
    for violation in &violations {
        println!("{}", violation);
        println!("    {}", violation.line);
    }
    if violations.is_empty() {
        println!("✓ {} is clean", path.display());
    } else {
        println!("\n{} violation(s)", violations.len());
    }
    Ok(violations.is_empty())
}

fn list_actions(config_path: Option<PathBuf>) -> anyhow::Result<bool> {
    let (_, installed) = prepare(config_path.as_deref())?;

    let mut specs: Vec<_> = installed.registry.iter().collect();
    specs.sort_by(|a, b| a.keyword.cmp(&b.keyword));

    println!("Actions:");
    for spec in specs {
        let params = spec.required_params.join(", ");
        println!("  {:<24} [{}] {}", spec.keyword, params, spec.description);
    }

    let mut semantic: Vec<_> = installed.expander.keywords().collect();
    if !semantic.is_empty() {
        semantic.sort();
        println!("\nSemantic actions:");
        for keyword in semantic {
            println!("  {}", keyword);
        }
    }

    Ok(true)
}

fn print_workflow_result(result: &WorkflowResult) {
    println!("\n=== Workflow Result: {} ===\n", result.workflow);
    println!("Success: {}", if result.success() { "YES" } else { "NO" });
    println!("Run ID: {}\n", result.run_id);

    for phase in &result.phases {
        let status = if phase.skipped {
            "-"
        } else if phase.success {
            "✓"
        } else {
            "✗"
        };
        println!(
            "{} Phase: {} ({} failures, tolerance {})",
            status, phase.name, phase.failures, phase.tolerance
        );

        for step in &phase.steps {
            let step_status = if step.skipped {
                "  -"
            } else if step.success {
                "  ✓"
            } else {
                "  ✗"
            };
            println!("  {} {} ({})", step_status, step.label, step.source);
            if let Some(err) = &step.error {
                println!("      Error: {}", err.message);
            }
        }
    }

    if let Some(cause) = &result.root_cause {
        println!("\nRoot cause: {} [{}]", cause.message, cause.kind);
        if let Some(source) = &cause.source {
            println!("  at {}", source);
        }
    }

    let metrics = &result.locator_metrics;
    println!(
        "\nLocators: {} primary, {} secondary, {} tertiary, {} failed",
        metrics.primary, metrics.secondary, metrics.tertiary, metrics.failures
    );
}
