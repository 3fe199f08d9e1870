use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};

use kubesift_analysis::{AzureOpenAiGenerator, Classifier, generate_insights};
use kubesift_k8s::KubeClient;
use kubesift_logs::{LogCollector, LogStore};
use kubesift_types::{RetrievalTarget, TimeRange};

mod config;
mod output;

use config::Config;
use output::ConsoleSink;

/// Kubesift - collect Kubernetes pod logs, classify them and summarise the findings
#[derive(Parser, Debug)]
#[command(name = "kubesift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to kubeconfig file (defaults to $KUBECONFIG or ~/.kube/config)
    #[arg(long, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Kubernetes context name (defaults to the current context)
    #[arg(long)]
    context: Option<String>,

    /// Kubernetes namespace
    #[arg(short, long)]
    namespace: Option<String>,

    /// Specific pod name (all pods in the namespace if omitted)
    #[arg(short, long)]
    pod: Option<String>,

    /// Specific container name (requires --pod)
    #[arg(short, long)]
    container: Option<String>,

    /// Label selector restricting which pods are read
    #[arg(short = 'l', long)]
    selector: Option<String>,

    /// Print the retrieved log lines instead of analysing them
    #[arg(long)]
    print_raw: bool,

    /// Print the analysis report without calling the insight service
    #[arg(long, conflicts_with = "print_raw")]
    report: bool,

    /// Maximum number of concurrent cluster calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Number of log lines to fetch per container
    #[arg(long)]
    tail_lines: Option<i64>,

    /// Only fetch lines newer than this (5m, 15m, 30m, 1h, 6h, 24h, all)
    #[arg(long)]
    since: Option<TimeRange>,

    /// Config file (defaults to ~/.kubesift/config.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let target = RetrievalTarget::new(
        args.namespace.clone(),
        args.pod.clone(),
        args.container.clone(),
        args.selector.clone(),
    )?;

    let mut config = Config::load(args.config.as_deref())?;
    config.insight.apply_env();
    apply_overrides(&mut config, &args);
    debug!(?config, "configuration loaded");

    let client = KubeClient::new(args.kubeconfig.as_deref(), args.context.as_deref()).await?;
    debug!(context = ?client.context(), "connected to cluster");

    let store = LogStore::new();
    let collector = LogCollector::new(Arc::new(client), config.retrieval.clone());
    let summary = collector
        .collect(&target, &store, &ConsoleSink)
        .await
        .context("log retrieval failed")?;
    if summary.failures > 0 {
        warn!(
            failures = summary.failures,
            entries = summary.entries,
            "some pods or containers could not be read"
        );
    }

    let entries = store.snapshot();
    if args.print_raw {
        output::print_raw(&entries);
        return Ok(());
    }

    let classifier =
        Classifier::new(&config.patterns).context("invalid classification pattern in config")?;
    let analysis = classifier.analyze(&entries);

    if args.report {
        print!("{}", analysis.report());
        return Ok(());
    }

    let generator =
        AzureOpenAiGenerator::new(&config.insight).context("failed to create insight client")?;
    let insights = generate_insights(&generator, &analysis, &config.insight)
        .await
        .context("failed to generate insights")?;
    println!("{}", insights);

    Ok(())
}

/// Command line flags win over the config file
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(concurrency) = args.concurrency {
        config.retrieval.max_concurrency = concurrency;
    }
    if let Some(tail_lines) = args.tail_lines {
        config.retrieval.tail_lines = Some(tail_lines);
    }
    if let Some(since) = args.since {
        config.retrieval.since = since;
    }
}
