//! veritext - CLI client for an academic AI-content-detection service.
//!
//! Streams documents to the detection backend over WebSocket, mirrors
//! progress, and renders per-category classification statistics.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veritext_app::{
    ANALYZE_PATH, LOGIN_PATH, PROJECT_NEW_PATH, SCAN_SOCKET_PATH, UPLOAD_SOCKET_PATH, ScanOutcome,
    ScanRuntime, SessionSlot, app_version, project_runtime_status, rest_endpoint, run_project_stream,
    run_scan, socket_endpoint,
};
use veritext_auth::{AuthClient, Credentials, HttpAuthTransport};
use veritext_core::{DEFAULT_CHUNK_SIZE, Label};
use veritext_upload::{
    HttpRestTransport, RestApiClient, RestError, RetryPolicy, UploadError, UploadOutcome,
    ValidationError, WsTransport, validate_scan_source,
};

#[derive(Parser)]
#[command(name = "veritext", version = app_version(), about = "AI-content detection client")]
struct Cli {
    /// Service API base URL.
    #[arg(
        long,
        global = true,
        env = "VERITEXT_API_BASE",
        default_value = "http://localhost:5000"
    )]
    api_base: String,

    /// Bearer token for authenticated endpoints.
    #[arg(long, global = true, env = "VERITEXT_TOKEN")]
    token: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with an account email and print a bearer token.
    Login {
        /// Registered account email.
        #[arg(long, env = "VERITEXT_EMAIL")]
        email: String,
    },
    /// Stream a PDF through the scan socket and print classification results.
    Scan {
        /// PDF document to scan.
        file: PathBuf,
        /// Print only this result page after the scan completes.
        #[arg(long)]
        page: Option<u32>,
    },
    /// Stream a project archive through the chunked upload socket.
    Upload {
        /// ZIP archive to upload.
        file: PathBuf,
        /// Target project name.
        #[arg(long)]
        project: String,
        /// Chunk size in bytes.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
    },
    /// Create a project through the REST endpoint.
    ProjectNew {
        /// ZIP archive to upload.
        file: PathBuf,
        /// Project name.
        #[arg(long)]
        name: String,
    },
    /// Run one-shot document analysis through the REST endpoint.
    Analyze {
        /// PDF document to analyze.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "veritext=debug"
    } else {
        "veritext=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(error) = run(cli).await {
        eprintln!("error: {error:#}");
        std::process::exit(exit_code_for(&error));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Login { email } => login(&cli.api_base, &email).await,
        Command::Scan { file, page } => scan(&cli.api_base, &file, page).await,
        Command::Upload {
            file,
            project,
            chunk_size,
        } => upload(&cli.api_base, &file, &project, chunk_size).await,
        Command::ProjectNew { file, name } => {
            project_new(&cli.api_base, &file, &name, required_token(cli.token)?).await
        }
        Command::Analyze { file } => {
            analyze(&cli.api_base, &file, required_token(cli.token)?).await
        }
    }
}

fn required_token(token: Option<String>) -> anyhow::Result<String> {
    token.ok_or_else(|| {
        anyhow::anyhow!("a bearer token is required; run `veritext login` or set VERITEXT_TOKEN")
    })
}

async fn login(api_base: &str, email: &str) -> anyhow::Result<()> {
    let endpoint = rest_endpoint(api_base, LOGIN_PATH)?;
    let client = AuthClient::new(endpoint, Arc::new(HttpAuthTransport::new()))?;

    let token = client
        .login(
            &Credentials {
                email: email.to_string(),
            },
            unix_timestamp_ms(),
        )
        .await?;

    println!("Logged in as user {}", token.user_id);
    println!("{}", token.access_token);
    Ok(())
}

async fn scan(api_base: &str, file: &Path, page: Option<u32>) -> anyhow::Result<()> {
    let file_name = file_name_of(file)?;
    let document = tokio::fs::read(file).await?;
    validate_scan_source(&file_name, document.len() as u64).map_err(UploadError::Validation)?;

    let endpoint = socket_endpoint(api_base, SCAN_SOCKET_PATH)?;
    let mut transport = WsTransport::new(endpoint);
    let mut runtime = ScanRuntime::new(app_version());

    let slot = Arc::new(Mutex::new(SessionSlot::new()));
    let mut cancel = begin_session(&slot);
    cancel_on_ctrl_c(&slot);

    let spinner = spinner(format!("Scanning {file_name}"));
    let outcome = run_scan(&mut transport, &mut runtime, document, &mut cancel).await;
    spinner.finish_and_clear();

    let status = project_runtime_status(&runtime);
    match outcome? {
        ScanOutcome::Completed => println!("Scan complete: {}", status.status),
        ScanOutcome::Cancelled => println!("Scan cancelled: {}", status.status),
    }
    println!(
        "Pages: {} | chunk errors: {} | malformed frames: {} | dropped unknown: {}",
        status.pages, status.chunk_failures, status.malformed_frames, status.dropped_unknown
    );

    print_legend(&runtime);
    print_pages(&mut runtime, page)?;
    Ok(())
}

async fn upload(
    api_base: &str,
    file: &Path,
    project: &str,
    chunk_size: u64,
) -> anyhow::Result<()> {
    let file_name = file_name_of(file)?;
    let metadata = tokio::fs::metadata(file).await?;
    let mut source = tokio::fs::File::open(file).await?;

    let endpoint = socket_endpoint(api_base, UPLOAD_SOCKET_PATH)?;
    let mut transport = WsTransport::new(endpoint);
    let mut runtime = ScanRuntime::new(app_version());

    let slot = Arc::new(Mutex::new(SessionSlot::new()));
    let mut cancel = begin_session(&slot);
    cancel_on_ctrl_c(&slot);

    let spinner = spinner(format!("Uploading {file_name}"));
    let (outcome, session) = run_project_stream(
        &mut transport,
        &mut runtime,
        &mut source,
        &file_name,
        metadata.len(),
        project,
        chunk_size,
        &mut cancel,
    )
    .await?;
    spinner.finish_and_clear();

    match outcome {
        UploadOutcome::Completed => println!(
            "Upload complete: {} bytes in {} chunks",
            session.bytes_sent(),
            session.chunks_sent()
        ),
        UploadOutcome::Cancelled => println!(
            "Upload cancelled after {} of {} bytes",
            session.bytes_sent(),
            session.plan().total_bytes()
        ),
    }
    Ok(())
}

async fn project_new(
    api_base: &str,
    file: &Path,
    name: &str,
    token: String,
) -> anyhow::Result<()> {
    let file_name = file_name_of(file)?;
    let bytes = tokio::fs::read(file).await?;

    let client = rest_client(api_base)?;
    let spinner = spinner(format!("Uploading project {name}"));
    let report = client
        .upload_project(name, &file_name, bytes, &token)
        .await?;
    spinner.finish_and_clear();

    println!(
        "Project '{}' created ({}), {} attempt(s)",
        report.project.project_name, report.project.extracted_size_mb, report.attempts
    );
    if !report.project.message.is_empty() {
        println!("{}", report.project.message);
    }
    Ok(())
}

async fn analyze(api_base: &str, file: &Path, token: String) -> anyhow::Result<()> {
    let file_name = file_name_of(file)?;
    let bytes = tokio::fs::read(file).await?;

    let client = rest_client(api_base)?;
    let spinner = spinner(format!("Analyzing {file_name}"));
    let report = client.analyze_document(&file_name, bytes, &token).await?;
    spinner.finish_and_clear();

    let mut runtime = ScanRuntime::new(app_version());
    let dropped = runtime.aggregator_mut().fold_pairs(
        report
            .response
            .data
            .iter()
            .map(|(text, category)| (text.as_str(), *category)),
    );

    println!(
        "Analysis complete: {} classified spans, {} dropped unknown, {} attempt(s)",
        report.response.data.len() as u64 - dropped,
        dropped,
        report.attempts
    );
    print_legend(&runtime);
    Ok(())
}

fn rest_client(api_base: &str) -> anyhow::Result<RestApiClient> {
    Ok(RestApiClient::new(
        rest_endpoint(api_base, PROJECT_NEW_PATH)?,
        rest_endpoint(api_base, ANALYZE_PATH)?,
        RetryPolicy::default(),
        Arc::new(HttpRestTransport::new()),
    )?)
}

fn begin_session(slot: &Arc<Mutex<SessionSlot>>) -> tokio::sync::watch::Receiver<bool> {
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.begin()
}

fn cancel_on_ctrl_c(slot: &Arc<Mutex<SessionSlot>>) {
    let slot = Arc::clone(slot);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok()
            && let Ok(mut guard) = slot.lock()
        {
            guard.cancel_active();
        }
    });
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed_precise}]")
            .expect("spinner template is static"),
    );
    bar.set_message(message);
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

fn print_legend(runtime: &ScanRuntime) {
    let total = runtime.aggregator().histogram().total();
    println!("Legend (total weighted chars: {total}):");
    for entry in runtime.legend() {
        println!(
            "  {:<13} {:>10}  {:>5.1}%",
            entry.label.name(),
            entry.weight,
            entry.percentage
        );
    }
}

fn print_pages(runtime: &mut ScanRuntime, page: Option<u32>) -> anyhow::Result<()> {
    if runtime.aggregator().pages().is_empty() {
        return Ok(());
    }

    if let Some(page) = page {
        runtime.view_mut().cursor.jump_to(page)?;
        print_current_page(runtime);
        return Ok(());
    }

    let total = runtime.view().cursor.total_pages();
    runtime.view_mut().cursor.jump_to(1)?;
    for _ in 0..total {
        print_current_page(runtime);
        runtime.view_mut().cursor.next();
    }
    Ok(())
}

fn print_current_page(runtime: &ScanRuntime) {
    let cursor = &runtime.view().cursor;
    println!("[ PAGE {} / {} ]", cursor.current_page(), cursor.total_pages());
    for entry in runtime.current_page_entries() {
        println!("  [{}] {}", label_tag(entry.label), entry.text);
    }
}

fn label_tag(label: Label) -> &'static str {
    match label {
        Label::Ai => "AI",
        Label::Humanised => "HUM+",
        Label::Human => "HUM",
        Label::Polished => "POL",
        Label::Undetermined => "UND",
        Label::NewCategory => "NEW",
    }
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    let validation = error.downcast_ref::<ValidationError>().is_some()
        || matches!(
            error.downcast_ref::<UploadError>(),
            Some(UploadError::Validation(_))
        )
        || matches!(
            error.downcast_ref::<RestError>(),
            Some(RestError::Validation(_))
        )
        || matches!(
            error.downcast_ref::<veritext_app::AppError>(),
            Some(
                veritext_app::AppError::Upload(UploadError::Validation(_))
                    | veritext_app::AppError::Rest(RestError::Validation(_))
            )
        );

    if validation { 2 } else { 1 }
}

fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

fn file_name_of(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("path '{}' has no file name", path.display()))
}
