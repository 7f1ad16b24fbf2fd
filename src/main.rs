mod aggregate;
mod api_types;
mod budget;
mod cluster;
mod config;
mod embed;
mod error;
mod fetch;
mod keywords;
mod lexicon;
mod llm;
mod models;
mod narrate;
mod normalize;
mod orchestrator;
mod prompts;
mod render;
mod sentiment;
mod server;
mod similarity;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use awful_aj::{config as aj_config, template};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::embed::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::fetch::{FeedbackSource, FileSource, SheetsSource, DEFAULT_RANGE};
use crate::llm::{AwfulJadeBackend, NarrativeBackend, SilentBackend};
use crate::orchestrator::{analyze_source, PipelineContext};
use crate::render::render_markdown;
use crate::server::AppState;

/// Feedback Vibes - themes, groups, sentiment and recommendations from raw feedback
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to awful_aj config file (overrides AJ_CONFIG environment variable)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Chat template name for every narrative call
    #[arg(long, global = true, env = "AJ_TEMPLATE", default_value = "feedback_analyst")]
    template: String,

    /// Skip the LLM entirely; every narrative stage uses its fallback
    #[arg(long, global = true)]
    no_llm: bool,

    /// JSON file overriding pipeline constants (seed, caps, ...)
    #[arg(long, global = true, env = "PIPELINE_CONFIG")]
    pipeline_config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, env = "EMBEDDER", default_value = "openai")]
    embedder: EmbedderKind,

    #[arg(long, global = true, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    #[arg(long, global = true, env = "EMBEDDING_BASE_URL", default_value = "https://api.openai.com/v1")]
    embedding_base_url: String,

    #[arg(long, global = true, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    #[arg(long, global = true, default_value_t = 30)]
    embedding_timeout_secs: u64,

    #[arg(long, global = true, default_value_t = 3)]
    embedding_max_retries: usize,

    #[arg(long, global = true, default_value_t = 256)]
    embedding_batch_size: usize,

    /// Google API key for reading public sheets
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    sheets_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one batch and print the report
    Analyze {
        /// JSON array of strings, or one feedback item per line
        #[arg(short, long, conflicts_with = "sheet", required_unless_present = "sheet")]
        input: Option<String>,

        /// Spreadsheet id to read instead of a file
        #[arg(long)]
        sheet: Option<String>,

        #[arg(long, default_value = DEFAULT_RANGE)]
        range: String,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:5000")]
        bind: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EmbedderKind {
    Openai,
    Hashing,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Json,
    Markdown,
}

fn resolve_paths() -> Result<(PathBuf, PathBuf, PathBuf)> {
    // 1) Base config dir: prefer env override, else awful_aj::config_dir()
    let base_dir = if let Ok(dir) = std::env::var("AJ_CONFIG_DIR") {
        PathBuf::from(dir)
    } else {
        awful_aj::config_dir().map_err(|e| anyhow!(e.to_string()))?
    };

    // 2) Config file: prefer AJ_CONFIG, else <base>/config.yaml
    let cfg_path = if let Ok(p) = std::env::var("AJ_CONFIG") {
        PathBuf::from(p)
    } else {
        base_dir.join("config.yaml")
    };

    // 3) Template dir: prefer AJ_TEMPLATE_DIR, else <base>/templates
    let tpl_dir = if let Ok(p) = std::env::var("AJ_TEMPLATE_DIR") {
        PathBuf::from(p)
    } else {
        let d = base_dir.join("templates");
        // make it visible to awful_aj::template loader
        std::env::set_var("AJ_TEMPLATE_DIR", &d);
        d
    };

    Ok((base_dir, cfg_path, tpl_dir))
}

async fn build_backend(args: &Args) -> Result<Arc<dyn NarrativeBackend>> {
    if args.no_llm {
        info!("LLM disabled, narrative stages will use fallbacks");
        return Ok(Arc::new(SilentBackend));
    }

    // Determine config path: CLI arg > resolve_paths logic
    let (_base_dir, default_cfg, tpl_dir) = resolve_paths()?;
    let cfg_path = match &args.config {
        Some(p) => {
            debug!("Using config file from --config argument: {}", p);
            PathBuf::from(p)
        }
        None => {
            debug!("Using config file from environment/default: {}", default_cfg.display());
            default_cfg
        }
    };

    // Friendlier error if missing
    if !cfg_path.exists() {
        bail!(
            "awful_aj config not found at {}\n\
             Use --config to specify a config file, set AJ_CONFIG, or pass --no-llm.\n\
             Example config.yaml:\n\
             api_key: \"YOUR_KEY\"\napi_base: \"http://localhost:5001/v1\"\nmodel: \"qwen3_30b_a3\"\n",
            cfg_path.display()
        );
    }

    let cfg = aj_config::load_config(
        cfg_path
            .to_str()
            .ok_or_else(|| anyhow!("invalid config path"))?,
    )
    .map_err(|e| anyhow!(e.to_string()))?;

    debug!("Loading template {} from {}", args.template, tpl_dir.display());
    let tpl = template::load_template(&args.template)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;

    Ok(Arc::new(AwfulJadeBackend::new(cfg, tpl)))
}

fn build_embedder(args: &Args) -> Result<Arc<dyn Embedder>> {
    match args.embedder {
        EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::default())),
        EmbedderKind::Openai => {
            let key = args
                .embedding_api_key
                .as_deref()
                .context("EMBEDDING_API_KEY is required for --embedder openai (or use --embedder hashing)")?;
            Ok(Arc::new(OpenAiEmbedder::new(
                key,
                &args.embedding_base_url,
                &args.embedding_model,
                Duration::from_secs(args.embedding_timeout_secs.max(1)),
                args.embedding_max_retries.max(1),
                args.embedding_batch_size.max(1),
            )?))
        }
    }
}

fn load_pipeline_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config {}", path.display()))?;
    PipelineConfig::from_json_str(&text).with_context(|| format!("parsing pipeline config {}", path.display()))
}

fn sheets_source(args: &Args) -> Option<SheetsSource> {
    args.sheets_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .map(|k| SheetsSource::new(reqwest::Client::new(), k))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting feedback_vibes");

    let args = Args::parse();
    let ctx = PipelineContext::new(
        build_embedder(&args)?,
        build_backend(&args).await?,
        load_pipeline_config(args.pipeline_config.as_ref())?,
    );
    let sheets = sheets_source(&args);

    match &args.command {
        Command::Serve { bind } => server::serve(AppState { ctx, sheets }, bind).await,
        Command::Analyze { input, sheet, range, format, output } => {
            let (source, source_ref): (Box<dyn FeedbackSource>, &str) = match (sheet, input) {
                (Some(id), _) => {
                    let src = sheets
                        .context("GOOGLE_API_KEY is required to read a sheet")?
                        .with_range(range);
                    (Box::new(src), id.as_str())
                }
                (None, Some(path)) => (Box::new(FileSource), path.as_str()),
                (None, None) => bail!("either --input or --sheet is required"),
            };

            let (_records, analysis) = analyze_source(&ctx, source.as_ref(), source_ref).await?;
            if !analysis.trace.fallbacks.is_empty() {
                info!("Degraded stages: {}", analysis.trace.fallbacks.join(", "));
            }

            let rendered = match format {
                OutputFormat::Json => analysis.report.to_json_pretty()?,
                OutputFormat::Markdown => render_markdown(&analysis.report),
            };
            match output {
                Some(path) => {
                    std::fs::write(path, rendered.as_bytes())
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!("Report written - path={}", path.display());
                }
                None => println!("{}", rendered),
            }
            Ok(())
        }
    }
}
