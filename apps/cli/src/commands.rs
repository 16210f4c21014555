//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};

use adapt_client::{HttpCourseBackend, HttpObjectStorage};
use adapt_core::{
    AttemptOutcome, CoursePipeline, FileStatus, FinalizedCourse, SelectedFile, format_file_size,
    validate_file,
};
use adapt_shared::{
    AppConfig, CourseSize, FileParseStatus, MAX_UPLOAD_CONCURRENCY, PipelineConfig, init_config,
    load_config, read_secret, render_config, resolve_owner_id,
};

use crate::editor::{self, EditorExit};
use crate::interrupt::Interrupt;
use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Adapt: build a training course from your internal documents.
#[derive(Parser)]
#[command(
    name = "adapt",
    version,
    about = "Turn internal documents into a training course with generated questions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Upload documents, generate questions, edit them, and save the course.
    Create {
        /// Course title.
        #[arg(short, long)]
        title: String,

        /// Course size: small, medium, or large (defaults to config).
        #[arg(short, long)]
        size: Option<CourseSize>,

        /// Owner (curator) id for the storage namespace.
        #[arg(long, env = "ADAPT_OWNER_ID")]
        owner: Option<String>,

        /// Simultaneous uploads (1-4, defaults to config).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Save the generated questions without opening the editor.
        #[arg(long)]
        no_edit: bool,

        /// Documents to build the course from (.pdf, .txt, .doc, .docx).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check documents against the upload rules without sending anything.
    Check {
        /// Documents to check.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "adapt=info",
        1 => "adapt=debug",
        _ => "adapt=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so they never interleave with the editor on stdout.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Create {
            title,
            size,
            owner,
            concurrency,
            no_edit,
            files,
        } => {
            let options = CreateOptions {
                title,
                size,
                owner,
                concurrency,
                no_edit,
                files,
            };
            cmd_create(options).await
        }
        Command::Check { files } => cmd_check(&files).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

struct CreateOptions {
    title: String,
    size: Option<CourseSize>,
    owner: Option<String>,
    concurrency: Option<usize>,
    no_edit: bool,
    files: Vec<PathBuf>,
}

async fn cmd_create(options: CreateOptions) -> Result<()> {
    let config = load_config()?;
    let owner_id = resolve_owner_id(options.owner.as_deref(), &config)?;

    let mut pipeline_config = PipelineConfig::from(&config);
    if let Some(n) = options.concurrency {
        pipeline_config.upload_concurrency = n.clamp(1, MAX_UPLOAD_CONCURRENCY);
    }

    let access_token = read_secret(&config.api.access_token_env);
    if access_token.is_none() {
        warn!(
            var = %config.api.access_token_env,
            "no API access token set, requests will be anonymous"
        );
    }
    let storage = HttpObjectStorage::new(
        &config.storage.url,
        config.storage.bucket.clone(),
        read_secret(&config.storage.api_key_env),
    )?;
    let backend =
        HttpCourseBackend::new(&config.api.base_url, access_token, config.api.timeout_secs)?;

    let mut wizard = CoursePipeline::new(
        Arc::new(storage),
        Arc::new(backend),
        pipeline_config,
        owner_id,
    );
    wizard.set_title(options.title)?;
    wizard.set_size(options.size.unwrap_or(config.defaults.course_size))?;

    let selected = read_files(&options.files).await?;
    let rejected = wizard.add_files(selected)?;
    for (name, reason) in &rejected {
        eprintln!("  ✗ {name}: {reason}");
    }
    if wizard.files().is_empty() {
        return Err(eyre!("none of the given files can be used"));
    }

    info!(
        title = %wizard.title(),
        size = %wizard.size(),
        files = wizard.files().len(),
        "creating course"
    );

    let interrupt = Interrupt::install();
    let progress = CliProgress::new();
    let outcome = {
        let _armed = interrupt.arm(wizard.cancel_token());
        wizard.submit(&progress).await
    };
    progress.finish();

    match outcome {
        Ok(AttemptOutcome::Ready) => {}
        Ok(AttemptOutcome::Cancelled) => {
            println!("  Cancelled. Nothing was saved.");
            return Ok(());
        }
        Err(e) => {
            print_failed_files(&wizard);
            return Err(e.into());
        }
    }

    print_draft_summary(&wizard);

    if options.no_edit {
        let progress = CliProgress::new();
        let saved = wizard.save(&progress).await;
        progress.finish();
        saved?;
        report_saved(&mut wizard).await;
        return Ok(());
    }

    match editor::run(&mut wizard, &interrupt).await? {
        EditorExit::Saved => report_saved(&mut wizard).await,
        EditorExit::Quit => println!("  Left without saving."),
        EditorExit::Cancelled => println!("  Cancelled. The draft was discarded."),
    }
    Ok(())
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<SelectedFile>> {
    let mut selected = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
        selected.push(SelectedFile::new(display_name(path), bytes));
    }
    Ok(selected)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_failed_files(wizard: &CoursePipeline) {
    for entry in wizard.files() {
        if let FileStatus::Error { message } = entry.status() {
            eprintln!("  ✗ {}: {message}", entry.name());
        }
    }
}

fn print_draft_summary(wizard: &CoursePipeline) {
    let Some(draft) = wizard.draft() else {
        return;
    };
    let stats = draft.extracted_stats;

    println!();
    println!(
        "  {} course ({})",
        wizard.size(),
        wizard.size().description()
    );
    println!(
        "  Uploaded {} of {} files, extracted {} characters{}",
        draft.uploaded_files.len(),
        wizard.files().len(),
        stats.chars,
        if stats.truncated { " (truncated)" } else { "" }
    );
    for file in &draft.parsed_files {
        match file.parse_status {
            FileParseStatus::Parsed => {}
            FileParseStatus::Skipped => println!("  - {} was skipped", file.name),
            FileParseStatus::Error => println!(
                "  - {} could not be read: {}",
                file.name,
                file.parse_error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!();
}

/// Print the saved course, retrying the manifest fetch once if it failed.
async fn report_saved(wizard: &mut CoursePipeline) {
    let missing = wizard
        .finalized()
        .is_some_and(|course| course.manifest.is_none());
    if missing {
        if let Some(error) = wizard.last_error() {
            warn!(%error, "retrying manifest fetch");
        }
        if let Err(e) = wizard.reload_course().await {
            eprintln!("  The course was saved, but its details could not be loaded: {e}");
        }
    }
    if let Some(course) = wizard.finalized() {
        print_course(course);
    }
}

fn print_course(course: &FinalizedCourse) {
    println!();
    println!("  Course created!");
    println!("  ID:          {}", course.course_id);
    println!("  Invite code: {}", course.course_code);
    if let Some(manifest) = &course.manifest {
        let questions = manifest.questions.as_ref().map_or(0, Vec::len);
        println!("  Title:       {}", manifest.title);
        println!("  Files:       {}", manifest.files.len());
        match (manifest.quiz_count, manifest.open_count) {
            (Some(quiz), Some(open)) => println!("  Questions:   {quiz} quiz, {open} open"),
            _ => println!("  Questions:   {questions}"),
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

async fn cmd_check(paths: &[PathBuf]) -> Result<()> {
    let config = load_config()?;
    let limits = PipelineConfig::from(&config);

    let mut accepted_bytes = 0u64;
    let mut problems = 0usize;
    for path in paths {
        let name = display_name(path);
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?
            .len();
        match validate_file(&name, size, limits.max_file_bytes) {
            Ok(()) => {
                accepted_bytes += size;
                println!("  ✓ {name} ({})", format_file_size(size));
            }
            Err(reason) => {
                problems += 1;
                println!("  ✗ {name}: {reason}");
            }
        }
    }

    println!(
        "  Total: {} of {} allowed",
        format_file_size(accepted_bytes),
        format_file_size(limits.max_batch_bytes)
    );
    if accepted_bytes > limits.max_batch_bytes {
        return Err(eyre!("files are larger than the batch limit together"));
    }
    if problems > 0 {
        return Err(eyre!("{problems} file(s) would be rejected"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    println!("{}", render_config(&config)?);
    Ok(())
}
