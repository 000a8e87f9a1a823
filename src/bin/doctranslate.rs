//! CLI binary for edgequake-translate.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TranslationConfig`, keeps run state in a directory, and asks before
//! retrying a failed chunk.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use edgequake_translate::{
    load_source, ExportKind, FileStore, LanguageModel, OpenAiClient, ProgressCallback, RunOutcome,
    StateStore, StatusEvent, StatusLevel, TranslateError, TranslationConfig,
    TranslationProgressCallback, TranslationSession,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percentage bar plus one log line per status
/// message.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Translating");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// Run `f` with the bar hidden, for interactive prompts.
    fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.bar.suspend(f)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_status(&self, event: &StatusEvent) {
        let marker = match event.level {
            StatusLevel::Info => dim("·"),
            StatusLevel::Success => green("✓"),
            StatusLevel::Error => red("✗"),
        };
        self.bar.println(format!(
            "  {} {}  {}",
            marker,
            dim(&event.timestamp.format("%H:%M:%S").to_string()),
            event.message
        ));
    }

    fn on_chunk_start(&self, chunk_num: usize, total_chunks: usize, first: usize, last: usize) {
        self.bar
            .set_message(format!("chunk {chunk_num}/{total_chunks}  §{first}–§{last}"));
    }

    fn on_progress(&self, percent: f32) {
        self.bar.set_position(percent.clamp(0.0, 100.0).round() as u64);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store your API key once (validated before saving)
  doctranslate key sk-...

  # Translate a Word document to English, printing the result
  doctranslate translate novela.docx

  # Translate to German with extra instructions, writing to a file
  doctranslate --target-language German --custom-prompt "Keep character names" \
      translate roman.docx -o roman.de.txt

  # Continue an interrupted run (state is saved after every chunk)
  doctranslate resume

  # Continue from an exported state file
  doctranslate resume --state-file translation_state.json

  # Export results
  doctranslate export translated -o translated_document.zip
  doctranslate export state -o translation_state.json

DEFAULTS:
  Summary model       gpt-4o-mini (max 1000 tokens)
  Translation model   gpt-4o, temperature 0.3
  Chunking            8 paragraphs, 2 context paragraphs each side
  Pacing              3 s between chunks, 2 s between single paragraphs

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY            API key (overrides the stored key)
  DOCTRANSLATE_API_BASE     OpenAI-compatible API root
  DOCTRANSLATE_STATE_DIR    Where the key, prompt, and run state are kept
  RUST_LOG                  Override log filtering (e.g. edgequake_translate=debug)
"#;

/// Translate long documents paragraph by paragraph with resumable progress.
#[derive(Parser, Debug)]
#[command(
    name = "doctranslate",
    version,
    about = "Translate .docx and text documents chunk by chunk using an LLM API",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API key; falls back to the key stored with `doctranslate key`.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible API root.
    #[arg(long, global = true, env = "DOCTRANSLATE_API_BASE",
          default_value = edgequake_translate::config::DEFAULT_API_BASE_URL)]
    api_base: String,

    /// Directory holding the stored key, custom prompt, and run state.
    #[arg(long, global = true, env = "DOCTRANSLATE_STATE_DIR", default_value = ".doctranslate")]
    state_dir: PathBuf,

    /// Language to translate into.
    #[arg(long, global = true, env = "DOCTRANSLATE_TARGET_LANGUAGE", default_value = "English")]
    target_language: String,

    /// Extra instructions included in every translation request.
    #[arg(long, global = true, env = "DOCTRANSLATE_CUSTOM_PROMPT")]
    custom_prompt: Option<String>,

    /// Model used for the document summary.
    #[arg(long, global = true, env = "DOCTRANSLATE_SUMMARY_MODEL", default_value = "gpt-4o-mini")]
    summary_model: String,

    /// Model used for translation requests.
    #[arg(long, global = true, env = "DOCTRANSLATE_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, global = true, env = "DOCTRANSLATE_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Paragraphs per request.
    #[arg(long, global = true, env = "DOCTRANSLATE_CHUNK_SIZE", default_value_t = 8,
          value_parser = clap::value_parser!(u32).range(1..=200))]
    chunk_size: u32,

    /// Context paragraphs sent on each side of a chunk.
    #[arg(long, global = true, env = "DOCTRANSLATE_CONTEXT_SIZE", default_value_t = 2)]
    context_size: usize,

    /// Estimated prompt tokens above which paragraphs are sent one at a time.
    #[arg(long, global = true, env = "DOCTRANSLATE_MAX_PROMPT_TOKENS", default_value_t = 12_000)]
    max_prompt_tokens: usize,

    /// Pause between chunks, in milliseconds.
    #[arg(long, global = true, env = "DOCTRANSLATE_CHUNK_DELAY_MS", default_value_t = 3000)]
    chunk_delay_ms: u64,

    /// Pause between single-paragraph requests, in milliseconds.
    #[arg(long, global = true, env = "DOCTRANSLATE_PARAGRAPH_DELAY_MS", default_value_t = 2000)]
    paragraph_delay_ms: u64,

    /// Per-request timeout in seconds (default: none).
    #[arg(long, global = true, env = "DOCTRANSLATE_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Never ask; stop at the first failed chunk.
    #[arg(long, global = true, env = "DOCTRANSLATE_NO_RETRY_PROMPT")]
    no_retry_prompt: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DOCTRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCTRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCTRANSLATE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a .docx or text file from the beginning.
    Translate {
        /// Local file path (.docx or UTF-8 text).
        input: String,
        /// Write the translated text here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Continue the saved run, or one loaded from a state file.
    Resume {
        /// JSON state file exported earlier.
        #[arg(long)]
        state_file: Option<PathBuf>,
        /// Write the translated text here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export the saved run.
    Export {
        #[arg(value_enum)]
        kind: ExportArg,
        /// Destination file (default: the conventional archive name).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show progress of the saved run.
    Status,
    /// Store, show, or clear the API key.
    Key {
        /// Key to validate and store.
        key: Option<String>,
        /// Remove the stored key.
        #[arg(long, conflicts_with = "key")]
        clear: bool,
        /// Store without checking the key against the API.
        #[arg(long)]
        no_validate: bool,
    },
    /// Store, show, or clear the default custom prompt.
    Prompt {
        text: Option<String>,
        #[arg(long, conflicts_with = "text")]
        clear: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportArg {
    Original,
    Translated,
    State,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already prints every status line, so library INFO
    // logs would duplicate it.
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

    let store = StateStore::new(
        FileStore::open(&cli.state_dir)
            .with_context(|| format!("Cannot use state directory {}", cli.state_dir.display()))?,
    );

    match &cli.command {
        Command::Translate { input, output } => {
            let progress = show_progress.then(CliProgressCallback::new);
            let mut session = build_session(&cli, store, progress.clone())?;
            let source = load_source(input).context("Cannot read input document")?;
            let first = session.start(source).await;
            let outcome = drive(&cli, &mut session, progress.as_deref(), first).await;
            finish_run(&cli, progress.as_deref(), outcome, output.as_ref())
        }
        Command::Resume { state_file, output } => {
            let progress = show_progress.then(CliProgressCallback::new);
            let mut session = build_session(&cli, store, progress.clone())?;
            match state_file {
                Some(path) => {
                    let bytes = std::fs::read(path)
                        .with_context(|| format!("Cannot read {}", path.display()))?;
                    session
                        .load_state_file(&bytes)
                        .context("Cannot load state file")?;
                }
                None => {
                    if !session.load_saved() {
                        bail!(TranslateError::NothingToResume);
                    }
                }
            }
            let first = session.resume().await;
            let outcome = drive(&cli, &mut session, progress.as_deref(), first).await;
            finish_run(&cli, progress.as_deref(), outcome, output.as_ref())
        }
        Command::Export { kind, output } => export(&cli, store, *kind, output.clone()),
        Command::Status => status(&store),
        Command::Key {
            key,
            clear,
            no_validate,
        } => manage_key(&cli, &store, key.as_deref(), *clear, *no_validate).await,
        Command::Prompt { text, clear } => {
            if *clear {
                store.set_custom_prompt("")?;
                eprintln!("{} Custom prompt cleared", green("✔"));
            } else if let Some(text) = text {
                store.set_custom_prompt(text)?;
                eprintln!("{} Custom prompt saved", green("✔"));
            } else {
                match store.custom_prompt() {
                    Some(p) => println!("{p}"),
                    None => eprintln!("{}", dim("No custom prompt stored")),
                }
            }
            Ok(())
        }
    }
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranslationConfig> {
    let mut builder = TranslationConfig::builder()
        .api_base_url(&cli.api_base)
        .summary_model(&cli.summary_model)
        .translation_model(&cli.model)
        .temperature(cli.temperature)
        .target_language(&cli.target_language)
        .chunk_size(cli.chunk_size as usize)
        .context_size(cli.context_size)
        .max_prompt_tokens(cli.max_prompt_tokens)
        .inter_chunk_delay_ms(cli.chunk_delay_ms)
        .per_paragraph_delay_ms(cli.paragraph_delay_ms);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref prompt) = cli.custom_prompt {
        builder = builder.custom_prompt(prompt);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn build_session(
    cli: &Cli,
    store: StateStore,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<TranslationSession> {
    let callback = progress.map(|p| p as Arc<dyn TranslationProgressCallback>);
    let config = build_config(cli, callback)?;
    let session = TranslationSession::new(config, store);

    // Ctrl-C stops cleanly between chunks; progress is already saved.
    let stop = session.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Stopping after the current chunk…", cyan("◆"));
            stop.stop();
        }
    });
    Ok(session)
}

/// Keep retrying failed chunks for as long as the user agrees.
async fn drive(
    cli: &Cli,
    session: &mut TranslationSession,
    progress: Option<&CliProgressCallback>,
    mut result: Result<RunOutcome, TranslateError>,
) -> Result<RunOutcome> {
    loop {
        let err = match result {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };
        if err.chunk().is_none() {
            return Err(err).context("Translation failed");
        }
        if cli.no_retry_prompt || !ask_retry(&err, progress)? {
            if let Some(p) = progress {
                p.finish();
            }
            return Err(err).context(
                "Stopped at a failed chunk; progress is saved, run `doctranslate resume` to continue",
            );
        }
        result = session.retry_chunk().await;
    }
}

fn ask_retry(err: &TranslateError, progress: Option<&CliProgressCallback>) -> Result<bool> {
    let prompt = || -> io::Result<bool> {
        let mut stderr = io::stderr();
        writeln!(stderr, "{} {}", red("✘"), err)?;
        if err.needs_user_action() {
            writeln!(
                stderr,
                "{}",
                dim("This usually needs a fix on the account before a retry can succeed.")
            )?;
        }
        write!(stderr, "{} ", bold("Retry this chunk? [Y/n]"))?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let answer = line.trim().to_ascii_lowercase();
        Ok(answer.is_empty() || answer == "y" || answer == "yes")
    };
    let answer = tokio::task::block_in_place(|| match progress {
        Some(p) => p.suspend(prompt),
        None => prompt(),
    });
    answer.context("Failed to read answer from stdin")
}

fn finish_run(
    cli: &Cli,
    progress: Option<&CliProgressCallback>,
    outcome: Result<RunOutcome>,
    output: Option<&PathBuf>,
) -> Result<()> {
    if let Some(p) = progress {
        p.finish();
    }
    match outcome? {
        RunOutcome::Stopped {
            next_paragraph,
            stats,
        } => {
            if !cli.quiet {
                eprintln!(
                    "{} Stopped before §{}  ({} paragraphs translated this run)",
                    cyan("⚠"),
                    next_paragraph,
                    stats.translated_this_run
                );
                eprintln!("   Run {} to continue.", bold("doctranslate resume"));
            }
            Ok(())
        }
        RunOutcome::Completed(out) => {
            let text = out.translated_text();
            match output {
                Some(path) => {
                    std::fs::write(path, &text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    handle
                        .write_all(text.as_bytes())
                        .context("Failed to write to stdout")?;
                    if !text.ends_with('\n') {
                        handle.write_all(b"\n").context("Failed to write to stdout")?;
                    }
                }
            }
            if !cli.quiet {
                eprintln!(
                    "{}  {} paragraphs  {} requests  {}ms{}",
                    green("✔"),
                    out.stats.total_paragraphs,
                    out.stats.api_calls,
                    out.stats.duration_ms,
                    output
                        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                        .unwrap_or_default(),
                );
            }
            Ok(())
        }
    }
}

fn export(cli: &Cli, store: StateStore, kind: ExportArg, output: Option<PathBuf>) -> Result<()> {
    let config = build_config(cli, None)?;
    let mut session = TranslationSession::new(config, store);
    if !session.load_saved() {
        bail!(TranslateError::NothingToResume);
    }

    let (bytes, default_name) = match kind {
        ExportArg::State => (
            session.export_state()?.into_bytes(),
            "translation_state.json".to_string(),
        ),
        ExportArg::Original => (
            session.export(ExportKind::Original)?,
            ExportKind::Original.archive_name(),
        ),
        ExportArg::Translated => (
            session.export(ExportKind::Translated)?,
            ExportKind::Translated.archive_name(),
        ),
    };
    let path = output.unwrap_or_else(|| PathBuf::from(default_name));
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    if !cli.quiet {
        eprintln!("{} Exported {}", green("✔"), bold(&path.display().to_string()));
    }
    Ok(())
}

fn status(store: &StateStore) -> Result<()> {
    let Some(state) = store.load() else {
        println!("No saved translation.");
        return Ok(());
    };
    let total = state.paragraphs.len();
    let done = state.translated_count();
    println!("Paragraphs:   {total}");
    println!("Translated:   {done} ({:.0}%)", done as f64 / total as f64 * 100.0);
    match state.first_absent() {
        Some(i) => println!("Next:         §{}", i + 1),
        None => println!("Next:         {}", green("complete")),
    }
    if let Some(saved) = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(state.timestamp) {
        println!("Saved:        {}", saved.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if !state.custom_prompt.is_empty() {
        println!("Prompt:       {}", state.custom_prompt);
    }
    if !state.document_summary.is_empty() {
        let excerpt: String = state.document_summary.chars().take(200).collect();
        println!("Summary:      {excerpt}…");
    }
    Ok(())
}

async fn manage_key(
    cli: &Cli,
    store: &StateStore,
    key: Option<&str>,
    clear: bool,
    no_validate: bool,
) -> Result<()> {
    if clear {
        store.clear_credential()?;
        eprintln!("{} Stored API key removed", green("✔"));
        return Ok(());
    }
    let Some(key) = key else {
        match store.credential() {
            Some(k) => {
                let tail = k.char_indices().rev().nth(3).map_or(k.as_str(), |(i, _)| &k[i..]);
                println!("Stored key: …{tail}");
            }
            None => println!("No API key stored."),
        }
        return Ok(());
    };

    if !no_validate {
        let config = build_config(cli, None)?;
        let client = OpenAiClient::new(key, &config)?;
        client.validate().await.context("API key was not accepted")?;
    }
    store.set_credential(key)?;
    eprintln!(
        "{} API key saved to {}",
        green("✔"),
        dim(&cli.state_dir.display().to_string())
    );
    Ok(())
}
