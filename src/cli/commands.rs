//! CLI command definitions for treatment-bench.
//!
//! Three commands cover the benchmark workflow: `run` executes a manifest of
//! jobs, `aggregate` turns the recorded runs into a ranked snapshot, and
//! `snapshot show` reads the history back.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::aggregate::{Aggregator, BenchmarkSnapshot};
use crate::job::{JobConfig, RawJobInputs};
use crate::metrics::{export_metrics, init_metrics};
use crate::scheduler::{
    BatchOutcome, BatchVerdict, BenchmarkExecutor, BenchmarkJob, BenchmarkRun, HarnessExecutor,
    HashedScores, SyntheticExecutor, WorkerPool,
};
use crate::settings::BenchSettings;
use crate::storage::{SnapshotStore, SqliteSnapshotStore};

/// Default file the `run` command writes its run records to.
const DEFAULT_RUNS_FILE: &str = "./runs.json";

/// Placeholder credential for synthetic runs, which never spawn the executor.
const SYNTHETIC_CREDENTIAL: &str = "synthetic-run";

/// Measures the effect of repository treatments on agent benchmark scores.
#[derive(Parser)]
#[command(name = "treatment-bench")]
#[command(about = "Benchmark repository treatments against their baselines")]
#[command(version)]
#[command(
    long_about = "treatment-bench runs an agent benchmark on baseline and treated copies of each repository,\nthen ranks treatments by their mean score delta across repositories.\n\nExample usage:\n  treatment-bench run --manifest jobs.yaml --output runs.json\n  treatment-bench aggregate --runs runs.json\n  treatment-bench snapshot show"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Execute every job in a manifest and record the runs.
    Run(RunArgs),

    /// Aggregate recorded runs into a snapshot and append it to the store.
    #[command(alias = "agg")]
    Aggregate(AggregateArgs),

    /// Inspect stored snapshots.
    Snapshot(SnapshotArgs),
}

/// Arguments for `treatment-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML manifest listing the jobs to run.
    #[arg(short = 'm', long)]
    pub manifest: String,

    /// File the run records (successful and failed) are written to.
    #[arg(short = 'o', long, default_value = DEFAULT_RUNS_FILE)]
    pub output: String,

    /// Override the number of concurrent jobs (default: BENCH_MAX_WORKERS or 4).
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Produce deterministic synthetic scores instead of running the executor.
    #[arg(long)]
    pub synthetic: bool,

    /// Write Prometheus metrics for the batch to this file.
    #[arg(long)]
    pub metrics_file: Option<String>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `treatment-bench aggregate`.
#[derive(Parser, Debug)]
pub struct AggregateArgs {
    /// Run records written by `treatment-bench run`.
    #[arg(short = 'r', long, default_value = DEFAULT_RUNS_FILE)]
    pub runs: String,

    /// Snapshot store database (default: BENCH_STORE_PATH).
    #[arg(long)]
    pub store: Option<String>,

    /// Significance threshold in (0, 1) (default: BENCH_SIGNIFICANCE_THRESHOLD).
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Snapshot entrypoint arguments.
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotSubcommand,
}

/// Snapshot subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum SnapshotSubcommand {
    /// Print a stored snapshot, the latest one by default.
    Show(SnapshotShowArgs),
}

/// Arguments for `treatment-bench snapshot show`.
#[derive(Parser, Debug)]
pub struct SnapshotShowArgs {
    /// Snapshot id to show.
    #[arg(long)]
    pub id: Option<String>,

    /// Snapshot store database (default: BENCH_STORE_PATH).
    #[arg(long)]
    pub store: Option<String>,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_batch_command(args).await,
        Commands::Aggregate(args) => run_aggregate_command(args).await,
        Commands::Snapshot(args) => match args.command {
            SnapshotSubcommand::Show(args) => run_snapshot_show_command(args).await,
        },
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// One job entry of a YAML manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub repository: String,
    #[serde(default)]
    pub treatment: Option<String>,
    pub model: String,
    pub agent: String,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<i64>,
}

fn parse_manifest(content: &str) -> anyhow::Result<Vec<ManifestEntry>> {
    let entries: Vec<ManifestEntry> = serde_yaml::from_str(content)?;
    if entries.is_empty() {
        bail!("manifest contains no jobs");
    }
    Ok(entries)
}

fn load_manifest(path: &Path) -> anyhow::Result<Vec<ManifestEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse_manifest(&content).with_context(|| format!("Invalid manifest {}", path.display()))
}

/// Validates every entry; relative output directories resolve against
/// `base_dir`. Two entries may not share an output directory.
fn build_jobs(
    entries: &[ManifestEntry],
    base_dir: &Path,
    credential: &str,
) -> anyhow::Result<Vec<BenchmarkJob>> {
    let mut claimed: HashMap<PathBuf, usize> = HashMap::new();
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let mut raw = RawJobInputs::new()
                .with_model(entry.model.as_str())
                .with_agent(entry.agent.as_str())
                .with_output_dir(entry.output_dir.as_path())
                .with_base_dir(base_dir)
                .with_credential(credential);
            if let Some(secs) = entry.timeout_secs {
                raw = raw.with_timeout(Duration::from_secs(secs));
            }
            if let Some(hint) = entry.concurrency {
                raw = raw.with_concurrency_hint(hint);
            }

            let config = JobConfig::build(raw).with_context(|| {
                format!("manifest entry {} ({})", index + 1, entry.repository)
            })?;

            if let Some(first) = claimed.insert(config.output_dir().to_path_buf(), index + 1) {
                bail!(
                    "manifest entry {} ({}): output_dir {} is already used by entry {}",
                    index + 1,
                    entry.repository,
                    config.output_dir().display(),
                    first
                );
            }

            Ok(match &entry.treatment {
                Some(treatment) => {
                    BenchmarkJob::treated(entry.repository.as_str(), treatment.as_str(), config)
                }
                None => BenchmarkJob::baseline(entry.repository.as_str(), config),
            })
        })
        .collect()
}

// ============================================================================
// run
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct FailureEntry {
    repository: String,
    treatment: Option<String>,
    kind: String,
    reason: String,
}

#[derive(Debug, Clone, Serialize)]
struct RunSummaryOutput {
    status: String,
    total: usize,
    succeeded: usize,
    failed: usize,
    synthetic: bool,
    max_workers: usize,
    peak_in_flight: usize,
    average_job_secs: f64,
    output: String,
    failures: Vec<FailureEntry>,
}

impl RunSummaryOutput {
    fn from_outcome(outcome: &BatchOutcome, synthetic: bool, output: &str) -> Self {
        let status = match outcome.verdict() {
            BatchVerdict::AllSucceeded => "all_succeeded",
            BatchVerdict::PartialFailure => "partial_failure",
            BatchVerdict::TotalFailure => "total_failure",
            BatchVerdict::Empty => "empty",
        };
        Self {
            status: status.to_string(),
            total: outcome.total(),
            succeeded: outcome.successes.len(),
            failed: outcome.failures.len(),
            synthetic,
            max_workers: outcome.stats.max_workers,
            peak_in_flight: outcome.stats.peak_in_flight,
            average_job_secs: outcome.stats.average_job_duration.as_secs_f64(),
            output: output.to_string(),
            failures: outcome
                .failures
                .iter()
                .map(|f| FailureEntry {
                    repository: f.repository_ref().to_string(),
                    treatment: f.treatment_id().map(str::to_string),
                    kind: f.kind.to_string(),
                    reason: f.reason.clone(),
                })
                .collect(),
        }
    }
}

async fn run_batch_command(args: RunArgs) -> anyhow::Result<()> {
    let mut settings = BenchSettings::from_env()?;
    if let Some(max) = args.max_workers {
        settings = settings.with_max_workers(max);
        settings.validate()?;
    }

    if args.metrics_file.is_some() {
        init_metrics()?;
    }

    let manifest_path = Path::new(&args.manifest);
    let entries = load_manifest(manifest_path)?;
    let manifest_dir = manifest_path.parent().unwrap_or_else(|| Path::new(""));
    let base_dir = if manifest_dir.is_absolute() {
        manifest_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(manifest_dir)
    };

    let credential = if args.synthetic {
        Zeroizing::new(SYNTHETIC_CREDENTIAL.to_string())
    } else {
        Zeroizing::new(std::env::var(&settings.credential_var).map_err(|_| {
            anyhow!(
                "Credential not found: set {} (or use --synthetic)",
                settings.credential_var
            )
        })?)
    };
    let jobs = build_jobs(&entries, &base_dir, &credential)?;
    drop(credential);
    debug!(manifest = %manifest_path.display(), jobs = jobs.len(), "Manifest loaded");

    let executor: Arc<dyn BenchmarkExecutor> = if args.synthetic {
        Arc::new(SyntheticExecutor::new(HashedScores::default()))
    } else {
        Arc::new(HarnessExecutor::new(settings.invocation()))
    };

    let pool = WorkerPool::new(settings.pool_config(), executor)?;
    let outcome = pool.run_all(jobs).await;

    let runs = outcome.all_runs();
    fs::write(&args.output, serde_json::to_string_pretty(&runs)?)
        .with_context(|| format!("Failed to write runs to {}", args.output))?;

    if let Some(path) = &args.metrics_file {
        fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write metrics to {path}"))?;
    }

    let summary = RunSummaryOutput::from_outcome(&outcome, args.synthetic, &args.output);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Benchmark Batch ===");
        println!("Total jobs:     {}", summary.total);
        println!("Succeeded:      {}", summary.succeeded);
        println!("Failed:         {}", summary.failed);
        println!("Peak in flight: {}/{}", summary.peak_in_flight, summary.max_workers);
        println!("Avg job time:   {:.1}s", summary.average_job_secs);
        println!("Runs written:   {}", summary.output);
        if summary.synthetic {
            println!("Scores are synthetic.");
        }

        for failure in &summary.failures {
            println!(
                "  {} [{}] {}: {}",
                failure.repository,
                failure.treatment.as_deref().unwrap_or("baseline"),
                failure.kind,
                failure.reason
            );
        }
    }

    if outcome.verdict() == BatchVerdict::TotalFailure {
        bail!("All {} jobs failed; no scores were produced", outcome.total());
    }

    Ok(())
}

// ============================================================================
// aggregate / snapshot show
// ============================================================================

fn load_runs(path: &Path) -> anyhow::Result<Vec<BenchmarkRun>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read runs {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid runs file {}", path.display()))
}

async fn open_store(
    settings: &BenchSettings,
    store: Option<&str>,
) -> anyhow::Result<SqliteSnapshotStore> {
    let path = store.map(PathBuf::from).unwrap_or_else(|| settings.store_path.clone());
    let path = path
        .to_str()
        .ok_or_else(|| anyhow!("Store path is not valid UTF-8: {}", path.display()))?;
    Ok(SqliteSnapshotStore::open(path).await?)
}

async fn run_aggregate_command(args: AggregateArgs) -> anyhow::Result<()> {
    let settings = BenchSettings::from_env()?;
    let threshold = args.threshold.unwrap_or(settings.significance_threshold);
    let aggregator = Aggregator::new(threshold)?;

    let runs = load_runs(Path::new(&args.runs))?;
    let snapshot = aggregator.aggregate(&runs)?;

    let store = open_store(&settings, args.store.as_deref()).await?;
    store.append(&snapshot).await?;

    print_snapshot(&snapshot, args.json)
}

async fn run_snapshot_show_command(args: SnapshotShowArgs) -> anyhow::Result<()> {
    let settings = BenchSettings::from_env()?;
    let store = open_store(&settings, args.store.as_deref()).await?;

    let snapshot = match &args.id {
        Some(id) => {
            let id = Uuid::parse_str(id).with_context(|| format!("Invalid snapshot id {id}"))?;
            store
                .get(id)
                .await?
                .ok_or_else(|| anyhow!("Snapshot {id} not found"))?
        }
        None => store
            .latest()
            .await?
            .ok_or_else(|| anyhow!("No snapshots stored yet"))?,
    };

    print_snapshot(&snapshot, args.json)
}

fn print_snapshot(snapshot: &BenchmarkSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    println!("\n=== Benchmark Snapshot ===");
    println!("Snapshot:      {}", snapshot.snapshot_id);
    println!("Created:       {}", snapshot.created_at.to_rfc3339());
    println!("Repositories:  {}", snapshot.repository_count);
    println!("Failed runs:   {}", snapshot.failed_runs);
    println!("Excluded runs: {}", snapshot.excluded_count());
    println!();

    if snapshot.rankings.is_empty() {
        println!("  No treatment could be paired with a baseline.");
    } else {
        println!(
            "  {:<4} {:<24} {:>10} {:>10} {:>10} {:>4}  sig",
            "rank", "treatment", "mean", "median", "std", "n"
        );
        for (rank, stat) in snapshot.rankings.iter().enumerate() {
            println!(
                "  {:<4} {:<24} {:>+10.4} {:>+10.4} {:>10.4} {:>4}  {}",
                rank + 1,
                stat.treatment_id,
                stat.mean_delta,
                stat.median_delta,
                stat.std_delta,
                stat.sample_size,
                if stat.significant { "*" } else { "" }
            );
        }
    }

    for exclusion in &snapshot.exclusions {
        println!(
            "  excluded: {} [{}] has no baseline",
            exclusion.repository_ref, exclusion.treatment_id
        );
    }

    println!();
    println!(
        "* {}: |mean delta| > {}. This is a heuristic, not a statistical test.",
        snapshot.significance_method, snapshot.significance_threshold
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
- repository: github.com/acme/widgets
  model: anthropic/claude-haiku-4-5
  agent: claude-code
  output_dir: out/widgets/baseline
- repository: github.com/acme/widgets
  treatment: lint-config
  model: anthropic/claude-haiku-4-5
  agent: claude-code
  output_dir: out/widgets/lint-config
  timeout_secs: 600
  concurrency: 2
"#;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::try_parse_from(["treatment-bench", "run", "--manifest", "jobs.yaml"])
            .expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.manifest, "jobs.yaml");
                assert_eq!(args.output, DEFAULT_RUNS_FILE);
                assert!(args.max_workers.is_none());
                assert!(!args.synthetic);
                assert!(!args.json);
            }
            _ => panic!("Expected Run command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_run_command_with_all_options() {
        let cli = Cli::try_parse_from([
            "treatment-bench",
            "run",
            "-m",
            "jobs.yaml",
            "-o",
            "out.json",
            "--max-workers",
            "8",
            "--synthetic",
            "--metrics-file",
            "metrics.prom",
            "-j",
            "--log-level",
            "debug",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.output, "out.json");
                assert_eq!(args.max_workers, Some(8));
                assert!(args.synthetic);
                assert_eq!(args.metrics_file.as_deref(), Some("metrics.prom"));
                assert!(args.json);
            }
            _ => panic!("Expected Run command"),
        }
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_aggregate_alias_and_snapshot_show() {
        let cli = Cli::try_parse_from(["treatment-bench", "agg", "--threshold", "0.1"])
            .expect("should parse with alias");
        match cli.command {
            Commands::Aggregate(args) => {
                assert_eq!(args.runs, DEFAULT_RUNS_FILE);
                assert_eq!(args.threshold, Some(0.1));
                assert!(args.store.is_none());
            }
            _ => panic!("Expected Aggregate command"),
        }

        let cli = Cli::try_parse_from(["treatment-bench", "snapshot", "show", "--store", "h.db"])
            .expect("should parse");
        match cli.command {
            Commands::Snapshot(SnapshotArgs {
                command: SnapshotSubcommand::Show(args),
            }) => {
                assert!(args.id.is_none());
                assert_eq!(args.store.as_deref(), Some("h.db"));
            }
            _ => panic!("Expected Snapshot command"),
        }
    }

    #[test]
    fn test_parse_manifest() {
        let entries = parse_manifest(MANIFEST).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].treatment.is_none());
        assert_eq!(entries[1].treatment.as_deref(), Some("lint-config"));
        assert_eq!(entries[1].timeout_secs, Some(600));
        assert_eq!(entries[1].concurrency, Some(2));

        assert!(parse_manifest("[]").is_err());
        assert!(parse_manifest("- repository: x\n  colour: blue\n").is_err());
    }

    #[test]
    fn test_build_jobs_resolves_output_dirs() {
        let dir = TempDir::new().unwrap();
        let entries = parse_manifest(MANIFEST).unwrap();

        let jobs = build_jobs(&entries, dir.path(), "sk-test").unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].is_baseline());
        assert_eq!(jobs[1].treatment_label(), "lint-config");
        assert!(jobs[0].config.output_dir().starts_with(dir.path()));
        assert_eq!(jobs[1].config.timeout(), Duration::from_secs(600));
        assert_eq!(jobs[1].config.concurrency_hint(), 2);
    }

    #[test]
    fn test_build_jobs_reports_entry() {
        let dir = TempDir::new().unwrap();
        let mut entries = parse_manifest(MANIFEST).unwrap();
        entries[1].model = "openai/gpt-4o".to_string();

        let err = build_jobs(&entries, dir.path(), "sk-test").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("manifest entry 2"));
        assert!(message.contains("anthropic/claude-haiku-4-5"));

        let err = build_jobs(&entries[..1], dir.path(), "  ").unwrap_err();
        assert!(!format!("{err:#}").contains("sk-test"));
    }

    #[test]
    fn test_build_jobs_rejects_shared_output_dir() {
        let dir = TempDir::new().unwrap();
        let mut entries = parse_manifest(MANIFEST).unwrap();
        // same directory once normalized
        entries[1].output_dir = PathBuf::from("out/./widgets/baseline");

        let err = build_jobs(&entries, dir.path(), "sk-test").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("manifest entry 2"), "{message}");
        assert!(message.contains("already used by entry 1"), "{message}");
    }

    #[tokio::test]
    async fn test_synthetic_run_then_aggregate() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("jobs.yaml");
        fs::write(&manifest, MANIFEST).unwrap();
        let runs_file = dir.path().join("runs.json");
        let store = dir.path().join("history.db");

        run_batch_command(RunArgs {
            manifest: manifest.to_string_lossy().into_owned(),
            output: runs_file.to_string_lossy().into_owned(),
            max_workers: Some(2),
            synthetic: true,
            metrics_file: None,
            json: true,
        })
        .await
        .unwrap();

        let runs = load_runs(&runs_file).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.result().is_some_and(|res| res.is_synthetic())));

        run_aggregate_command(AggregateArgs {
            runs: runs_file.to_string_lossy().into_owned(),
            store: Some(store.to_string_lossy().into_owned()),
            threshold: Some(0.05),
            json: true,
        })
        .await
        .unwrap();

        let settings = BenchSettings::default();
        let store = open_store(&settings, store.to_str()).await.unwrap();
        let snapshot = store.latest().await.unwrap().unwrap();
        assert_eq!(snapshot.repository_count, 1);
        assert_eq!(snapshot.rankings.len(), 1);
        assert_eq!(snapshot.rankings[0].treatment_id, "lint-config");
        assert_eq!(snapshot.rankings[0].sample_size, 1);
    }

    #[test]
    fn test_run_summary_serialization() {
        let outcome = BatchOutcome {
            successes: vec![],
            failures: vec![],
            stats: Default::default(),
        };
        let summary = RunSummaryOutput::from_outcome(&outcome, true, "runs.json");
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["total"], 0);
        assert_eq!(json["synthetic"], true);
    }
}
