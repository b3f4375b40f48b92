//! CLI binary for vanish.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `VanishConfig`, runs one session and reports the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vanish::{
    DirectoryExporter, PipelineState, RemoveBgClient, Session, SessionObserver,
    VanishConfig, PROCESSING_FAILED,
};

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

// ── Spinner observer ─────────────────────────────────────────────────────────

/// Shows a spinner while the remote call is outstanding. The bar stays
/// hidden until the first `Processing` transition.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        Arc::new(Self { bar })
    }
}

impl SessionObserver for CliObserver {
    fn on_state_change(&self, from: &PipelineState, to: &PipelineState) {
        match (from, to) {
            (_, PipelineState::Processing) => {
                self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                self.bar.set_prefix("Processing");
                self.bar.set_message("removing background…");
                self.bar.reset_elapsed();
                self.bar.enable_steady_tick(Duration::from_millis(80));
            }
            (PipelineState::Processing, _) => self.bar.finish_and_clear(),
            (_, PipelineState::Ready) => {
                eprintln!("  {} image loaded", green("✓"));
            }
            _ => {}
        }
    }

    fn on_rejected(&self, reason: &str) {
        eprintln!("  {} {}", red("✗"), red(reason));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Remove the background, write ./processed-image.png
  vanish photo.jpg

  # Write into another directory under another name
  vanish photo.png -o out/ --name cutout.png

  # Route through an intermediary that holds the API key
  vanish photo.jpg --endpoint https://bg-proxy.internal/removebg

  # Print the session summary as JSON
  vanish --json photo.jpg

SUPPORTED INPUT:
  PNG, JPG or JPEG, max. 10 MB, one file per run.

ENVIRONMENT VARIABLES:
  REMOVE_BG_API_KEY   API key sent as X-Api-Key
  RUST_LOG            Log filter override (e.g. vanish=debug)
"#;

/// Remove image backgrounds using the remove.bg API.
#[derive(Parser, Debug)]
#[command(
    name = "vanish",
    version,
    about = "Remove image backgrounds using the remove.bg API",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PNG or JPEG image to process.
    input: PathBuf,

    /// Directory the processed image is written to.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// File name of the processed image.
    #[arg(long, default_value = vanish::config::DEFAULT_EXPORT_FILE_NAME)]
    name: String,

    /// Transform endpoint (remove.bg or a compatible intermediary).
    #[arg(long, default_value = vanish::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// API key. Omit when the endpoint adds credentials itself.
    #[arg(long, env = "REMOVE_BG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Request timeout in seconds (default: none).
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the session summary as JSON.
    #[arg(long)]
    json: bool,

    /// Print the preview data URL before processing.
    #[arg(long)]
    print_preview: bool,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out
    // of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = VanishConfig::builder()
        .endpoint(&cli.endpoint)
        .export_file_name(&cli.name);
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if show_progress {
        builder = builder.observer(CliObserver::new() as Arc<dyn SessionObserver>);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Ingest ───────────────────────────────────────────────────────────
    let mut session = Session::new(config.clone());
    let candidate = session
        .load(&cli.input)
        .await
        .with_context(|| format!("Cannot use {}", cli.input.display()))?;
    session
        .ingest(candidate)
        .await
        .with_context(|| format!("Cannot use {}", cli.input.display()))?;

    if cli.print_preview {
        if let Some(preview) = session.preview() {
            println!("{}", preview.data_url());
        }
    }

    // ── Transform ────────────────────────────────────────────────────────
    let client = RemoveBgClient::new(&config).context("Failed to set up HTTP client")?;
    if let Err(e) = session.transform(&client).await {
        if !cli.quiet {
            eprintln!(
                "{} {}",
                red("✘"),
                bold("Failed to process image. Please try again.")
            );
        }
        if cli.json {
            print_json(&session, None)?;
        }
        return Err(anyhow::Error::new(e).context(PROCESSING_FAILED));
    }

    // ── Download ─────────────────────────────────────────────────────────
    let exporter = DirectoryExporter::new(&cli.output_dir);
    let exported = session
        .download(&exporter)
        .await
        .context("Failed to save processed image")?;

    if cli.json {
        print_json(&session, exported.path.as_ref())?;
    } else if !cli.quiet {
        let shown = exported
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| exported.file_name.clone());
        eprintln!(
            "{}  {}  →  {}",
            green("✔"),
            dim(&format!("{} bytes", exported.bytes)),
            bold(&shown),
        );
    }

    Ok(())
}

fn print_json(session: &Session, output: Option<&PathBuf>) -> Result<()> {
    let mut value =
        serde_json::to_value(session.snapshot()).context("Failed to serialise session")?;
    if let (Some(path), Some(obj)) = (output, value.as_object_mut()) {
        obj.insert(
            "output".to_string(),
            serde_json::Value::String(path.display().to_string()),
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to serialise session")?
    );
    Ok(())
}
