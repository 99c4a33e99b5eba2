//! @ai:module:intent CLI for evalkit batch classification
//! @ai:module:layer presentation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evalkit::{
    classify::{load_rows, Classification, ClassificationOptions, ClassificationRunner, PromptTemplate},
    config::EvalkitConfig,
    executor::{Progress, ProgressFn, StopSignal},
    llm::{AnthropicClient, LlmClient, MockLlmClient},
    rate_limiter::RateLimiter,
    report::{label_counts, summarize_classifications, MarkdownReporter, ReportGenerator, RunSummary},
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "evalkit")]
#[command(about = "Batch LLM classification with retries and adaptive rate limiting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify rows of a JSON Lines file
    Classify {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON Lines file with one object per row
        #[arg(short, long)]
        rows: PathBuf,

        /// Prompt template file with {column} placeholders
        #[arg(short, long)]
        template: PathBuf,

        /// Allowed labels (comma-separated)
        #[arg(long)]
        rails: String,

        /// Ask the model for an explanation before the label
        #[arg(long)]
        explain: bool,

        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,

        /// Override the number of concurrent workers
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override the retry budget
        #[arg(long)]
        max_retries: Option<u32>,

        /// Stop the batch after the first failed row
        #[arg(long)]
        exit_on_error: bool,

        /// Run without making API calls
        #[arg(long)]
        dry_run: bool,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a saved classifications.jsonl
    Summarize {
        /// Path to classifications.jsonl
        #[arg(short, long)]
        input: PathBuf,

        /// Print Markdown instead of plain text
        #[arg(long)]
        markdown: bool,
    },

    /// Initialize default configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "evalkit.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("evalkit=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify {
            config,
            rows,
            template,
            rails,
            explain,
            system,
            concurrency,
            max_retries,
            exit_on_error,
            dry_run,
            output,
        } => {
            run_classification(ClassifyArgs {
                config,
                rows,
                template,
                rails,
                explain,
                system,
                concurrency,
                max_retries,
                exit_on_error,
                dry_run,
                output,
            })
            .await
        }
        Commands::Summarize { input, markdown } => summarize(input, markdown),
        Commands::Init { output } => init_config(output),
    }
}

struct ClassifyArgs {
    config: Option<PathBuf>,
    rows: PathBuf,
    template: PathBuf,
    rails: String,
    explain: bool,
    system: Option<String>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    exit_on_error: bool,
    dry_run: bool,
    output: Option<PathBuf>,
}

/// @ai:intent Classify rows and write reports into a timestamped directory
/// @ai:effects network, fs:read, fs:write
async fn run_classification(args: ClassifyArgs) -> Result<()> {
    let mut config = load_or_default_config(args.config)?;

    if let Some(concurrency) = args.concurrency {
        config.executor.concurrency = concurrency;
    }
    if let Some(max_retries) = args.max_retries {
        config.executor.max_retries = max_retries;
    }
    if args.exit_on_error {
        config.executor.exit_on_error = true;
    }
    config.validate()?;

    let rows = load_rows(&args.rows)?;
    let template_text = std::fs::read_to_string(&args.template)
        .with_context(|| format!("Failed to read template {}", args.template.display()))?;
    let template = PromptTemplate::new(template_text);

    let rails: Vec<String> = args
        .rails
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if rails.is_empty() {
        anyhow::bail!("At least one rail is required");
    }

    tracing::info!(
        "Loaded {} rows; template variables: {:?}",
        rows.len(),
        template.variables()
    );

    let options = ClassificationOptions {
        rails: rails.clone(),
        provide_explanation: args.explain,
        system_prompt: args.system,
        ..Default::default()
    };

    let stop_signal = StopSignal::new();
    let ctrl_c_signal = stop_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight rows and writing partial results");
            ctrl_c_signal.stop();
        }
    });

    let session = Session {
        config: &config,
        options,
        stop_signal,
    };

    let classifications = if args.dry_run {
        tracing::info!("Running in dry-run mode");
        session
            .classify(MockLlmClient::new(rails[0].clone()), template, rows)
            .await?
    } else {
        let client = AnthropicClient::new(config.api.clone())?;
        session.classify(client, template, rows).await?
    };

    let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let output_dir = args
        .output
        .unwrap_or_else(|| config.paths.results_dir.clone())
        .join(timestamp.to_string());

    let summary = ReportGenerator::new().generate_all(
        "Classification Results",
        &classifications,
        &output_dir,
    )?;

    print_summary(&summary, &label_counts(&classifications));
    println!("Results written to {}", output_dir.display());

    Ok(())
}

struct Session<'a> {
    config: &'a EvalkitConfig,
    options: ClassificationOptions,
    stop_signal: StopSignal,
}

impl Session<'_> {
    /// @ai:intent Run a classification with the configured executor and rate limiter
    /// @ai:effects network
    async fn classify<C: LlmClient + 'static>(
        self,
        client: C,
        template: PromptTemplate,
        rows: Vec<evalkit::classify::Row>,
    ) -> Result<Vec<Classification>> {
        let progress: ProgressFn = Arc::new(|p: Progress| {
            if p.finished == p.total || p.finished % 10 == 0 {
                tracing::info!("[{}/{}] rows finished", p.finished, p.total);
            }
        });

        let runner = ClassificationRunner::new(client, template, self.options)
            .with_executor_options(self.config.executor.clone())
            .with_rate_limiter(RateLimiter::new(&self.config.rate_limit)?)
            .with_stop_signal(self.stop_signal)
            .with_progress(progress);

        Ok(runner.run(rows).await?)
    }
}

/// @ai:intent Print a summary of saved classifications
/// @ai:effects fs:read
fn summarize(input: PathBuf, markdown: bool) -> Result<()> {
    let classifications: Vec<Classification> = evalkit::jsonl::read_jsonl(&input)?;
    let summary = summarize_classifications(&classifications);
    let labels = label_counts(&classifications);

    if markdown {
        print!(
            "{}",
            MarkdownReporter::new().render("Classification Results", &summary, &labels)
        );
    } else {
        print_summary(&summary, &labels);
    }

    Ok(())
}

/// @ai:intent Initialize default configuration file
/// @ai:effects fs:write
fn init_config(output: PathBuf) -> Result<()> {
    let config = EvalkitConfig::default();
    config.save(&output)?;
    println!("Configuration saved to {}", output.display());
    Ok(())
}

/// @ai:intent Load configuration or use defaults
/// @ai:effects fs:read
fn load_or_default_config(path: Option<PathBuf>) -> Result<EvalkitConfig> {
    match path {
        Some(p) => EvalkitConfig::load(&p),
        None => {
            let default_path = PathBuf::from("evalkit.toml");

            if default_path.exists() {
                EvalkitConfig::load(&default_path)
            } else {
                Ok(EvalkitConfig::default())
            }
        }
    }
}

/// @ai:intent Print a summary to stdout
/// @ai:effects io
fn print_summary(summary: &RunSummary, labels: &[(String, usize)]) {
    println!();
    println!("Classification Results");
    println!("======================");
    println!();
    println!("{:<25} {:>8}", "Completed:", summary.completed);
    println!("{:<25} {:>8}", "  with retries:", summary.completed_with_retries);
    println!("{:<25} {:>8}", "Missing input:", summary.missing_input);
    println!("{:<25} {:>8}", "Failed:", summary.failed);
    println!("{:<25} {:>8}", "Did not run:", summary.did_not_run);
    println!("{}", "-".repeat(34));
    println!("{:<25} {:>8}", "Total:", summary.total);
    println!();
    println!("{:<25} {:>7.1}%", "Completion rate:", summary.completion_rate());
    println!("{:<25} {:>8}", "Exceptions:", summary.total_exceptions);
    println!(
        "{:<25} {:>7.2}s",
        "Avg execution time:", summary.avg_execution_seconds
    );

    if !labels.is_empty() {
        println!();
        println!("Labels:");
        for (label, count) in labels {
            println!("  {:<23} {:>8}", label, count);
        }
    }
    println!();
}
