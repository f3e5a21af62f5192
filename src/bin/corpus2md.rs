//! CLI binary for edgequake-corpus2md.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! builds the selected engine once, and prints a run summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_corpus2md::{
    run_batch, BatchConfig, BatchProgressCallback, CommandEngine, ConversionEngine,
    ProgressCallback, VisionEngine, VisionEngineConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over the whole corpus, advanced as documents finish in any order,
/// with a log line per document printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Scanning");
        bar.set_message("Looking for documents…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, path: &Path) {
        self.bar.set_message(file_label(path));
    }

    fn on_document_complete(&self, path: &Path, record_count: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            path.display(),
            dim(&format!("{record_count} records")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, path: &Path, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), path.display(), red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, _success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        if failed > 0 {
            eprintln!(
                "{} {} document(s) failed, see the log above",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every ./corpus/*/*.pdf with the vision engine
  corpus2md --input corpus --output output

  # Four documents at a time, first 5 pages of each
  corpus2md -i corpus -o output --workers 4 --max-pages 5

  # Use an external converter that prints {text, images, metadata} JSON
  corpus2md -i corpus -o output --engine command --engine-command ./marker-json

  # Specific model
  corpus2md -i corpus -o output --provider openai --model gpt-4.1-mini

LAYOUT:
  <output>/<name>/<name>.md          extracted Markdown
  <output>/<name>/image_<i>.png      one file per engine image
  <output>/<name>/<name>_meta.json   engine metadata
  <manifest>                         one record per converted document

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (vision engine)
  ANTHROPIC_API_KEY       Anthropic API key (vision engine)
  GEMINI_API_KEY          Google Gemini API key (vision engine)
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  RUST_LOG                Overrides --verbose / --quiet log filtering
  CORPUS2MD_*             Fallback for every flag, e.g. CORPUS2MD_WORKERS=4
"#;

/// Batch-convert a corpus of documents to Markdown plus a JSON manifest.
#[derive(Parser, Debug)]
#[command(
    name = "corpus2md",
    version,
    about = "Batch-convert a corpus of documents to Markdown plus a JSON manifest",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Corpus root; documents are read from <INPUT>/*/*.<EXTENSION>.
    #[arg(short, long, env = "CORPUS2MD_INPUT", default_value = ".")]
    input: PathBuf,

    /// Output root; one directory per document is created here.
    #[arg(short, long, env = "CORPUS2MD_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Manifest file listing every converted document.
    #[arg(short, long, env = "CORPUS2MD_MANIFEST", default_value = "result.json")]
    manifest: PathBuf,

    /// File extension of input documents.
    #[arg(long, env = "CORPUS2MD_EXTENSION", default_value = "pdf")]
    extension: String,

    /// Documents converted at the same time.
    #[arg(short, long, env = "CORPUS2MD_WORKERS", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..))]
    workers: u32,

    /// Maximum pages converted per document.
    #[arg(long, env = "CORPUS2MD_MAX_PAGES", default_value_t = 10)]
    max_pages: usize,

    /// Languages the documents contain, comma-separated.
    #[arg(long, env = "CORPUS2MD_LANGS", default_value = "zh,en", value_delimiter = ',')]
    langs: Vec<String>,

    /// Engine batching factor (pages in flight per document for the vision engine).
    #[arg(long, env = "CORPUS2MD_BATCH_MULTIPLIER", default_value_t = 1)]
    batch_multiplier: usize,

    /// First page to convert, 0-indexed.
    #[arg(long, env = "CORPUS2MD_START_PAGE", default_value_t = 0)]
    start_page: usize,

    /// Conversion engine.
    #[arg(long, env = "CORPUS2MD_ENGINE", value_enum, default_value = "vision")]
    engine: EngineArg,

    /// Converter executable for `--engine command`.
    #[arg(long, env = "CORPUS2MD_ENGINE_COMMAND", required_if_eq("engine", "command"))]
    engine_command: Option<PathBuf>,

    /// Extra argument passed to the converter executable (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// LLM model ID for the vision engine.
    #[arg(long, env = "CORPUS2MD_MODEL")]
    model: Option<String>,

    /// LLM provider for the vision engine: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "CORPUS2MD_PROVIDER")]
    provider: Option<String>,

    /// Do not save rendered pages as images (vision engine).
    #[arg(long, env = "CORPUS2MD_NO_PAGE_IMAGES")]
    no_page_images: bool,

    /// Disable progress bar.
    #[arg(long, env = "CORPUS2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CORPUS2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CORPUS2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EngineArg {
    /// pdfium rendering + vision LLM.
    Vision,
    /// External converter executable printing JSON.
    Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Per-document failures are logged at ERROR, so they stay visible above
    // the progress bar.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Engine initialisation (once per process) ─────────────────────────
    let engine: Arc<dyn ConversionEngine> = match cli.engine {
        EngineArg::Command => {
            let program = cli
                .engine_command
                .clone()
                .context("--engine-command is required with --engine command")?;
            Arc::new(CommandEngine::new(program)?.with_args(cli.engine_args.iter()))
        }
        EngineArg::Vision => {
            ensure_pdfium(cli.quiet)?;
            let config = VisionEngineConfig {
                provider_name: cli.provider.clone(),
                model: cli.model.clone(),
                include_page_images: !cli.no_page_images,
                ..VisionEngineConfig::default()
            };
            Arc::new(
                VisionEngine::initialize(config)
                    .await
                    .context("Failed to initialise the vision engine")?,
            )
        }
    };

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = BatchConfig::builder()
        .input_root(&cli.input)
        .output_root(&cli.output)
        .manifest_path(&cli.manifest)
        .extension(&cli.extension)
        .workers(cli.workers as usize)
        .max_pages(cli.max_pages)
        .langs(cli.langs.iter().map(|l| l.trim().to_string()))
        .batch_multiplier(cli.batch_multiplier)
        .start_page(cli.start_page);
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new() as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = run_batch(engine, &config)
        .await
        .context("Batch conversion failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  converted {}/{} documents  →  {}",
            if summary.failed() == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            summary.succeeded(),
            summary.total,
            bold(&summary.manifest_path.display().to_string()),
        );
    }

    Ok(())
}

/// Make sure the pdfium library is on disk before the run starts, showing a
/// download bar on first use.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}
