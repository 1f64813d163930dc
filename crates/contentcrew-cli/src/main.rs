use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use contentcrew_core::{
    ConfigLoader, ContentPipeline, FeedbackRequest, GenerationOutcome, GenerationRequest,
    TelemetryOptions, TraceSummary, init_telemetry, run_feedback_revision, run_generation,
    save_artifact,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "contentcrew",
    version,
    about = "Research, write, fact-check and revise articles with a crew of agents"
)]
struct Cli {
    /// Path to a TOML config file (defaults to CONTENTCREW_CONFIG or ./contentcrew.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full research, draft, title, fact-check and revise pipeline.
    Generate(GenerateArgs),
    /// Revise an existing draft using reader feedback.
    Revise(ReviseArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Article category; falls back to the configured default.
    #[arg(long)]
    category: Option<String>,

    /// Topic to write about.
    #[arg(long)]
    topic: String,

    /// Print the stage trace after the article.
    #[arg(long)]
    explain: bool,

    /// Write draft, fact-check, research and final files under this directory.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Emit the artifact as JSON instead of formatted text.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ReviseArgs {
    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    topic: String,

    /// File holding the draft to revise.
    #[arg(long)]
    draft: PathBuf,

    /// Feedback to apply.
    #[arg(long)]
    feedback: String,

    /// Current title, kept if a new one cannot be generated.
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.clone())?;
    init_telemetry(TelemetryOptions::from_level(&config.logging.level))?;

    let default_category = config.pipeline.default_category.clone();
    let pipeline = Arc::new(ContentPipeline::from_config(&config));

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Generate(args) => generate_command(pipeline, args, &default_category).await?,
            Command::Revise(args) => revise_command(pipeline, args, &default_category).await?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn generate_command(
    pipeline: Arc<ContentPipeline>,
    args: GenerateArgs,
    default_category: &str,
) -> Result<()> {
    let category = args.category.unwrap_or_else(|| default_category.to_string());
    info!(%category, topic = %args.topic, "starting article generation");

    let outcome = run_generation(
        pipeline,
        GenerationRequest {
            category,
            topic: args.topic,
        },
    )
    .await?;

    let summary = TraceSummary::from_events(&outcome.trace_events);
    if outcome.artifact.failed() {
        warn!(error = %outcome.artifact.draft_content, "pipeline did not produce an article");
    } else if summary.has_failures() {
        warn!("some pipeline stages failed; rerun with --explain for details");
    }

    if let Some(dir) = args.save.as_deref() {
        let saved = save_artifact(dir, &outcome.artifact)?;
        info!(final_article = %saved.final_article.display(), "saved article files");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.artifact)?);
    } else {
        print_generation(&outcome);
    }

    if args.explain {
        println!();
        println!("{}", summary.render_markdown());
    }

    Ok(())
}

async fn revise_command(
    pipeline: Arc<ContentPipeline>,
    args: ReviseArgs,
    default_category: &str,
) -> Result<()> {
    let previous_draft = fs::read_to_string(&args.draft)
        .with_context(|| format!("failed to read draft {}", args.draft.display()))?;
    let category = args.category.unwrap_or_else(|| default_category.to_string());
    info!(%category, topic = %args.topic, "revising draft with feedback");

    let outcome = run_feedback_revision(
        pipeline,
        FeedbackRequest {
            category,
            topic: args.topic,
            previous_draft,
            feedback: args.feedback,
            current_title: args.title,
        },
    )
    .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.artifact)?);
    } else {
        let artifact = &outcome.artifact;
        println!("# {}\n", artifact.title);
        println!("{}", artifact.final_content);
    }

    Ok(())
}

fn print_generation(outcome: &GenerationOutcome) {
    let artifact = &outcome.artifact;
    println!("# {}\n", artifact.title);
    println!("{}\n", artifact.publishable_content());
    println!("## Fact-check report\n");
    println!("{}\n", artifact.fact_check_report);
    println!("## Research\n");
    println!("{}", artifact.research_info);
}
