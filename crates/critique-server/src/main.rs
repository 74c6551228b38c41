use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use critique_core::aggregate::{ScoreAggregator, TotalPossible};
use critique_core::providers::llm::openai::ChatCompletionsClient;
use critique_core::{Essay, Evaluator, RubricSet, ServiceConfig, Strategy};
use critique_server::logging::{self, LogFormat};
use critique_server::{build_router, exit_codes, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "critique",
    version,
    about = "Rubric-based critique of application essays via an LLM"
)]
struct Cli {
    /// YAML config file
    #[arg(long, global = true, env = "CRITIQUE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "CRITIQUE_LOG_FORMAT")]
    log_format: LogFormat,

    /// Rubric directory or merged rubric file
    #[arg(long, global = true)]
    rubrics: Option<PathBuf>,

    /// fan_out or combined
    #[arg(long, global = true)]
    strategy: Option<Strategy>,

    /// Fixed total possible score
    #[arg(long, global = true)]
    total_possible: Option<u32>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Evaluate one essay and print the report as JSON
    Evaluate(EvaluateArgs),
    /// Load the rubric corpus and print a summary
    Rubrics,
}

#[derive(Args)]
struct ServeArgs {
    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Essay file, or `-` for stdin
    #[arg(long)]
    essay: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal");
            eprintln!("fatal: {e:#}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut cfg = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(rubrics) = cli.rubrics {
        cfg.rubrics = rubrics;
    }
    if let Some(strategy) = cli.strategy {
        cfg.strategy = strategy;
    }
    if let Some(total) = cli.total_possible {
        cfg.total_possible = Some(total);
    }
    if let Command::Serve(ServeArgs { bind: Some(bind) }) = &cli.cmd {
        cfg.server.bind = bind.clone();
    }
    cfg.validate()?;

    let rubrics = Arc::new(RubricSet::load(&cfg.rubrics)?);

    match cli.cmd {
        Command::Rubrics => print_rubrics(&rubrics, &cfg),
        Command::Serve(_) => serve(rubrics, &cfg).await,
        Command::Evaluate(args) => evaluate(rubrics, &cfg, &args).await,
    }
}

fn evaluator(rubrics: Arc<RubricSet>, cfg: &ServiceConfig) -> anyhow::Result<Evaluator> {
    let api_key = cfg.llm.require_api_key()?;
    let client = ChatCompletionsClient::new(&cfg.llm, Some(api_key))?;
    Ok(Evaluator::new(rubrics, Arc::new(client), cfg)?)
}

fn print_rubrics(rubrics: &RubricSet, cfg: &ServiceConfig) -> anyhow::Result<i32> {
    let total = TotalPossible::from_config(cfg.total_possible, rubrics);
    let aggregator = ScoreAggregator::new(total, rubrics)?;

    println!("{:<24} {:<28} {:>5} {:>8}", "KEY", "CATEGORY", "ITEMS", "MAX");
    for c in rubrics.categories() {
        println!(
            "{:<24} {:<28} {:>5} {:>8}",
            c.key,
            c.category,
            c.items.len(),
            c.max_score()
        );
    }
    println!(
        "total possible: {} (rubric maximum {})",
        aggregator.total_possible(),
        rubrics.derived_total()
    );
    Ok(exit_codes::SUCCESS)
}

async fn serve(rubrics: Arc<RubricSet>, cfg: &ServiceConfig) -> anyhow::Result<i32> {
    let evaluator = Arc::new(evaluator(rubrics, cfg)?);
    let app = build_router(AppState::new(evaluator), cfg.server.max_body_bytes);

    let listener = TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("config error: failed to bind {}", cfg.server.bind))?;
    info!(
        bind = %cfg.server.bind,
        strategy = %cfg.strategy,
        model = %cfg.llm.model,
        "critique listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("server failed")?;
    info!("critique stopped");
    Ok(exit_codes::SUCCESS)
}

async fn evaluate(
    rubrics: Arc<RubricSet>,
    cfg: &ServiceConfig,
    args: &EvaluateArgs,
) -> anyhow::Result<i32> {
    let evaluator = evaluator(rubrics, cfg)?;

    let text = if args.essay.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read essay from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(&args.essay)
            .await
            .with_context(|| format!("failed to read essay {}", args.essay.display()))?
    };
    let essay = match Essay::new(text) {
        Ok(essay) => essay,
        Err(e) => {
            eprintln!("{e}");
            return Ok(exit_codes::for_error(&e));
        }
    };

    match evaluator.evaluate(&essay).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(exit_codes::for_error(&e.cause))
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
