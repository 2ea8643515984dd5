use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use thumbgate_contracts::events::EventWriter;
use thumbgate_contracts::policy::{
    AuditErrorPolicy, EscalationPolicy, InfraFailurePolicy, DEFAULT_MAX_ATTEMPTS,
};
use thumbgate_contracts::runs::{PipelineResult, RunReport};
use thumbgate_engine::pipeline::DEFAULT_OUTPUT_DIR;
use thumbgate_engine::{EngineConfig, Pipeline, PipelineConfig};
use tracing_subscriber::EnvFilter;

const EXIT_FAILED_RESULT: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "thumbgate", version, about = "Quality-gated video thumbnail generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Batch(BatchArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    out: PathBuf,
    /// Keep a copy of every attempt's background and composite here.
    #[arg(long)]
    history: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
    /// Fail the integrity check when the vision audit errors.
    #[arg(long)]
    strict_audit: bool,
    /// Stop on the first adapter error instead of spending another attempt.
    #[arg(long)]
    abort_on_adapter_error: bool,
}

#[derive(Debug, Parser)]
struct BatchArgs {
    /// One prompt per line; blank lines are skipped.
    #[arg(long)]
    prompts: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("thumbgate error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Batch(args) => run_batch(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let engine = EngineConfig::from_env()?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let config = PipelineConfig {
        output_dir: args.out.clone(),
        history_dir: args.history.clone(),
        max_attempts: args.max_attempts,
        audit_errors: if args.strict_audit {
            AuditErrorPolicy::Fail
        } else {
            AuditErrorPolicy::Pass
        },
        infra_failures: if args.abort_on_adapter_error {
            InfraFailurePolicy::Abort
        } else {
            InfraFailurePolicy::CountAgainstBudget
        },
        ..PipelineConfig::default()
    };
    let events = EventWriter::new(events_path, RunReport::new_run_id());
    let pipeline = Pipeline::from_engine_config(&engine, config, events)?;

    let report = pipeline.run(&args.prompt)?;
    println!("{}", serde_json::to_string_pretty(&report.result)?);
    Ok(exit_code(&report.result))
}

fn run_batch(args: BatchArgs) -> Result<i32> {
    let engine = EngineConfig::from_env()?;
    let prompts = read_prompts(&args.prompts)?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));

    let mut summary: Vec<Value> = Vec::with_capacity(prompts.len());
    let mut all_passed = true;
    for (idx, prompt) in prompts.iter().enumerate() {
        let prompt_dir = batch_prompt_dir(&args.out, idx);
        let config = PipelineConfig {
            output_dir: prompt_dir.clone(),
            history_dir: Some(prompt_dir.join("attempts")),
            escalation: EscalationPolicy::negative_space(),
            ..PipelineConfig::default()
        };
        let events = EventWriter::new(&events_path, RunReport::new_run_id());
        let pipeline = Pipeline::from_engine_config(&engine, config, events)?;
        let report = pipeline
            .run(prompt)
            .with_context(|| format!("batch prompt {} failed", idx + 1))?;

        all_passed &= report.result.is_success();
        let attempts: Vec<Value> = report
            .attempts
            .iter()
            .map(|attempt| {
                json!({
                    "attempt": attempt.index,
                    "success": attempt.passed(),
                    "reasons": attempt.failure_reasons,
                })
            })
            .collect();
        summary.push(json!({
            "prompt": prompt,
            "out_dir": prompt_dir.to_string_lossy(),
            "run_id": report.run_id,
            "attempts": attempts,
            "result": report.result,
        }));
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(if all_passed { 0 } else { EXIT_FAILED_RESULT })
}

fn read_prompts(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    Ok(parse_prompt_lines(&raw))
}

fn parse_prompt_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn batch_prompt_dir(out: &Path, idx: usize) -> PathBuf {
    out.join(format!("prompt_{:03}", idx + 1))
}

fn exit_code(result: &PipelineResult) -> i32 {
    if result.is_success() {
        0
    } else {
        EXIT_FAILED_RESULT
    }
}
