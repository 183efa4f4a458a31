use clap::{Args, Parser, Subcommand};
use hiring_pipeline::config::AppConfig;
use hiring_pipeline::error::AppError;
use hiring_pipeline::telemetry;
use hiring_pipeline::workflows::pipeline::{
    ApplicationId, ApplicationStageId, EvidenceRefs, HiringPipeline, HttpEvaluationGateway,
    JobId, MemoryPipelineStore, PipelineSnapshot, RetryPolicy, StageId,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

type Pipeline = HiringPipeline<MemoryPipelineStore, HttpEvaluationGateway>;

#[derive(Parser, Debug)]
#[command(
    name = "hiring-pipeline",
    about = "Operate the candidate pipeline against a JSON snapshot of the store",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the weighted ranking of a job's applications
    Rank(RankArgs),
    /// Close application stages and open the applications in another stage
    Move(MoveArgs),
    /// Dispatch an AI evaluation, wait for it and apply the result
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
struct SnapshotArgs {
    /// Path to the pipeline snapshot (JSON)
    #[arg(long)]
    snapshot: PathBuf,
}

#[derive(Args, Debug)]
struct RankArgs {
    #[command(flatten)]
    store: SnapshotArgs,
    #[arg(long)]
    job: String,
    /// Override the configured ranking limit
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args, Debug)]
struct MoveArgs {
    #[command(flatten)]
    store: SnapshotArgs,
    #[arg(long)]
    to_stage: String,
    /// Application stage ids, either `as-000001` or `1`
    #[arg(required = true, value_parser = parse_application_stage_id)]
    application_stages: Vec<ApplicationStageId>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[command(flatten)]
    store: SnapshotArgs,
    #[arg(long)]
    application: String,
    #[arg(long)]
    stage: String,
    #[arg(long)]
    resume: Option<String>,
    #[arg(long)]
    audio: Option<String>,
    #[arg(long)]
    transcript: Option<String>,
    #[arg(long)]
    document: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error [{}]: {err}", err.code());
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    info!(?config.environment, ai_base_url = %config.ai.base_url, "hiring pipeline configured");

    match cli.command {
        Command::Rank(args) => run_rank(&config, args),
        Command::Move(args) => run_move(&config, args),
        Command::Evaluate(args) => run_evaluate(&config, args).await,
    }
}

fn run_rank(config: &AppConfig, args: RankArgs) -> Result<(), AppError> {
    let pipeline = open_pipeline(config, &args.store.snapshot)?;
    let limit = args.limit.unwrap_or(config.ranking.limit);
    let ranking = pipeline
        .scores()
        .job_ranking_with_limit(&JobId(args.job), limit)?;
    print_json(&ranking)
}

fn run_move(config: &AppConfig, args: MoveArgs) -> Result<(), AppError> {
    let pipeline = open_pipeline(config, &args.store.snapshot)?;
    let summary = pipeline
        .ledger()
        .move_bulk(&args.application_stages, &StageId(args.to_stage))?;
    save_snapshot(&pipeline, &args.store.snapshot)?;
    print_json(&summary)
}

async fn run_evaluate(config: &AppConfig, args: EvaluateArgs) -> Result<(), AppError> {
    let pipeline = open_pipeline(config, &args.store.snapshot)?;
    let evidence = EvidenceRefs {
        resume: args.resume,
        audio: args.audio,
        transcript: args.transcript,
        document: args.document,
    };

    let evaluations = pipeline.evaluations();
    let handle = evaluations
        .dispatch(
            &ApplicationId(args.application),
            &StageId(args.stage),
            evidence,
        )
        .await?;
    // Persist the dispatched run before waiting so an interrupted poll can be resumed.
    save_snapshot(&pipeline, &args.store.snapshot)?;
    info!(
        application_stage_id = %handle.application_stage_id,
        run_id = %handle.run_id,
        "waiting for evaluation run"
    );

    evaluations
        .poll_until_settled(&handle.run_id, RetryPolicy::from(&config.polling))
        .await?;
    let outcome = evaluations
        .reconcile(handle.application_stage_id, &handle.run_id)
        .await?;
    save_snapshot(&pipeline, &args.store.snapshot)?;

    let aggregate = pipeline.scores().stage_aggregate(handle.application_stage_id)?;
    print_json(&json!({
        "application_stage_id": handle.application_stage_id.to_string(),
        "run_id": handle.run_id,
        "reconcile": outcome,
        "stage_aggregate": aggregate,
    }))
}

fn open_pipeline(config: &AppConfig, path: &Path) -> Result<Pipeline, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let snapshot: PipelineSnapshot = serde_json::from_str(&raw)?;
    let store = MemoryPipelineStore::from_snapshot(snapshot)?;
    let gateway = HttpEvaluationGateway::from_config(&config.ai)?;
    Ok(HiringPipeline::new(
        Arc::new(store),
        Arc::new(gateway),
        config.ranking.limit,
    ))
}

fn save_snapshot(pipeline: &Pipeline, path: &Path) -> Result<(), AppError> {
    let snapshot = pipeline.repository().snapshot()?;
    let rendered = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, rendered)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_application_stage_id(raw: &str) -> Result<ApplicationStageId, String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("as-").unwrap_or(trimmed);
    digits
        .parse::<u64>()
        .map(ApplicationStageId)
        .map_err(|err| format!("failed to parse '{raw}' as an application stage id ({err})"))
}
