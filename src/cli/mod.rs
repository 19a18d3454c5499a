//! Command-line interface for wavlink.
//!
//! Provides commands for converting audio batches, publishing artifacts to
//! Drive with spreadsheet reconciliation, and browsing remote folders and
//! spreadsheets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tracing::warn;

use crate::adapters::{DriveClient, FfmpegTranscoder, SheetsClient};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    collect_sources, validate_publish, ChannelDecider, DecisionRequest, FixedDecision,
    PhaseHandle, Pipeline, PipelineError, PublishSummary, UnmatchedDecider,
};
use crate::domain::{ConversionResult, EventKind, Phase, PhaseStatus, SheetTarget, SourceItem};

pub mod progress;

/// wavlink - Convert, upload and link audio batches
#[derive(Parser, Debug)]
#[command(name = "wavlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// OAuth access token for Drive and Sheets
    #[arg(long, env = "WAVLINK_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert source files (or folders of them) into the output directory
    Convert {
        /// Files or folders to convert
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Print events as JSON lines instead of progress bars
        #[arg(long)]
        json: bool,
    },

    /// Upload converted artifacts and link them in the spreadsheet
    Publish {
        /// Artifact files (or folders of them)
        #[arg(required = true)]
        artifacts: Vec<PathBuf>,

        #[command(flatten)]
        target: PublishArgs,

        /// Print events as JSON lines instead of progress bars
        #[arg(long)]
        json: bool,
    },

    /// Convert, then publish everything that converted successfully
    Run {
        /// Files or folders to convert
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        target: PublishArgs,

        /// Print events as JSON lines instead of progress bars
        #[arg(long)]
        json: bool,
    },

    /// List Drive folders
    Folders,

    /// List spreadsheets
    Spreadsheets,

    /// List the tabs of a spreadsheet
    Tabs {
        /// Spreadsheet ID
        spreadsheet_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Where the publish phase uploads and reconciles
#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Destination Drive folder ID
    #[arg(long, env = "WAVLINK_DRIVE_FOLDER")]
    pub folder: Option<String>,

    /// Spreadsheet ID
    #[arg(long, env = "WAVLINK_SPREADSHEET")]
    pub spreadsheet: Option<String>,

    /// Tab name inside the spreadsheet
    #[arg(long, env = "WAVLINK_SHEET")]
    pub sheet: Option<String>,

    /// First data row
    #[arg(long)]
    pub start_row: Option<u32>,

    /// Append unmatched files as new rows without asking
    #[arg(long, conflicts_with = "no_append")]
    pub append: bool,

    /// Never append unmatched files
    #[arg(long)]
    pub no_append: bool,
}

impl PublishArgs {
    /// The decision fixed by flags, if any
    fn fixed_decision(&self) -> Option<bool> {
        if self.append {
            Some(true)
        } else if self.no_append {
            Some(false)
        } else {
            None
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let token = self.access_token;
        match self.command {
            Commands::Convert {
                inputs,
                output,
                json,
            } => {
                let cfg = config::config()?;
                let results = convert(cfg, &inputs, &output, json).await?;
                report_conversion(&results, json)
            }
            Commands::Publish {
                artifacts,
                target,
                json,
            } => {
                let cfg = config::config()?;
                let sources = collect_sources(&artifacts, &cfg.transcoder.profile.extension)?;
                let converted: Vec<ConversionResult> = sources
                    .iter()
                    .map(|s| ConversionResult::from_artifact(s.path(), &cfg.source_extension))
                    .collect();
                let destination = Destination::resolve(cfg, &target)?;
                let summary =
                    publish(cfg, token.as_deref(), converted, &destination, &target, json).await?;
                report_publish(&summary, json)
            }
            Commands::Run {
                inputs,
                output,
                target,
                json,
            } => {
                let cfg = config::config()?;
                // Destination problems surface before the conversion phase
                require_token(token.as_deref())?;
                let destination = Destination::resolve(cfg, &target)?;

                let results = convert(cfg, &inputs, &output, json).await?;
                let conversion = report_conversion(&results, json);

                if !results.iter().any(|r| r.is_success()) {
                    return conversion;
                }
                let summary =
                    publish(cfg, token.as_deref(), results, &destination, &target, json).await?;
                report_publish(&summary, json)?;
                conversion
            }
            Commands::Folders => list_folders(token.as_deref()).await,
            Commands::Spreadsheets => list_spreadsheets(token.as_deref()).await,
            Commands::Tabs { spreadsheet_id } => list_tabs(token.as_deref(), &spreadsheet_id).await,
            Commands::Config => show_config(),
        }
    }
}

fn require_token(token: Option<&str>) -> Result<&str> {
    match token {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => anyhow::bail!("No access token. Pass --access-token or set WAVLINK_ACCESS_TOKEN"),
    }
}

fn transcoder(cfg: &ResolvedConfig) -> FfmpegTranscoder {
    FfmpegTranscoder::with_binary_path(cfg.transcoder.binary.to_string_lossy())
        .with_timeout(cfg.transcoder.timeout())
}

/// Run the conversion phase
async fn convert(
    cfg: &ResolvedConfig,
    inputs: &[PathBuf],
    output: &Path,
    json: bool,
) -> Result<Vec<ConversionResult>> {
    let sources: Vec<SourceItem> = collect_sources(inputs, &cfg.source_extension)?;
    if sources.is_empty() {
        anyhow::bail!("No .{} files found in the given inputs", cfg.source_extension);
    }

    let pipeline = Pipeline::new(Arc::new(transcoder(cfg)))
        .with_profile(cfg.transcoder.profile.clone());
    let handle = pipeline.start_conversion(sources, output).await?;

    Ok(follow_phase(handle, Phase::Conversion, json, None).await?)
}

/// Folder and spreadsheet the publish phase writes to, flags over config
#[derive(Debug, Clone, PartialEq, Eq)]
struct Destination {
    folder_id: String,
    target: SheetTarget,
}

impl Destination {
    fn resolve(cfg: &ResolvedConfig, args: &PublishArgs) -> Result<Self> {
        let folder_id = args
            .folder
            .as_deref()
            .or(cfg.folder_id.as_deref())
            .unwrap_or_default()
            .to_string();
        let target = cfg.sheet_target(
            args.spreadsheet.as_deref(),
            args.sheet.as_deref(),
            args.start_row,
        );

        validate_publish(&folder_id, &target)?;
        Ok(Self { folder_id, target })
    }
}

/// Run the publish phase
async fn publish(
    cfg: &ResolvedConfig,
    token: Option<&str>,
    converted: Vec<ConversionResult>,
    destination: &Destination,
    args: &PublishArgs,
    json: bool,
) -> Result<PublishSummary> {
    let token = require_token(token)?;

    let pipeline = Pipeline::new(Arc::new(transcoder(cfg)))
        .with_remote(
            Arc::new(DriveClient::new(token)),
            Arc::new(SheetsClient::new(token)),
        )
        .with_profile(cfg.transcoder.profile.clone())
        .with_chunk_size(cfg.chunk_size);

    let mut requests = None;
    let decider: Arc<dyn UnmatchedDecider> = match args.fixed_decision() {
        Some(answer) => Arc::new(FixedDecision(answer)),
        None => {
            let (decider, rx) = ChannelDecider::channel();
            requests = Some(rx);
            Arc::new(decider)
        }
    };

    let handle = pipeline.start_publish(
        converted,
        &destination.folder_id,
        destination.target.clone(),
        decider,
    )?;
    Ok(follow_phase(handle, Phase::Publish, json, requests).await?)
}

enum Step {
    Event(Option<crate::domain::Event>),
    Decision(Option<DecisionRequest>),
}

/// Render a phase's events until it finishes, answering decision requests
async fn follow_phase<T>(
    mut handle: PhaseHandle<T>,
    phase: Phase,
    json: bool,
    mut requests: Option<mpsc::Receiver<DecisionRequest>>,
) -> Result<T, PipelineError> {
    let mut status = PhaseStatus::new(handle.phase_id, phase);
    let bar = (!json).then(|| progress::create_phase_bar(&phase.to_string()));

    loop {
        let step = tokio::select! {
            event = handle.next_event() => Step::Event(event),
            request = next_request(&mut requests) => Step::Decision(request),
        };

        match step {
            Step::Event(None) => break,
            Step::Event(Some(event)) => {
                status.apply_event(&event);
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "Failed to serialize event"),
                    }
                } else if let Some(bar) = &bar {
                    render_event(bar, &status, &event.kind);
                }
            }
            Step::Decision(None) => requests = None,
            Step::Decision(Some(request)) => {
                let answer = match &bar {
                    Some(bar) => tokio::task::block_in_place(|| bar.suspend(|| ask(request.names()))),
                    None => tokio::task::block_in_place(|| ask(request.names())),
                };
                request.resolve(answer);
            }
        }
    }

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    handle.join().await
}

async fn next_request(
    requests: &mut Option<mpsc::Receiver<DecisionRequest>>,
) -> Option<DecisionRequest> {
    match requests {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn render_event(bar: &ProgressBar, status: &PhaseStatus, kind: &EventKind) {
    match kind {
        EventKind::Progress { current, .. } => {
            bar.set_position(progress::bar_position(status.fraction));
            bar.set_message(current.clone());
        }
        EventKind::ItemFailed { name, reason } => {
            bar.println(format!("✗ {}: {}", name, reason));
        }
        EventKind::RowUpdated { row, name } => {
            bar.println(format!("✓ row {} linked: {}", row, name));
        }
        EventKind::RowsAppended { start_row, count } => {
            bar.println(format!("+ {} row(s) appended from row {}", count, start_row));
        }
        EventKind::PhaseAborted { error } => {
            bar.println(format!("✗ {}", error));
        }
        EventKind::PhaseStarted { .. }
        | EventKind::DecisionRequested { .. }
        | EventKind::PhaseCompleted { .. } => {}
    }
}

/// Ask whether unmatched files become new rows. Anything but a yes declines.
fn ask(names: &[String]) -> bool {
    eprintln!("No matching row for {} file(s):", names.len());
    for name in names {
        eprintln!("  {}", name);
    }

    match inquire::Confirm::new("Append them as new rows?")
        .with_default(false)
        .prompt()
    {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "No answer to append prompt, not appending");
            false
        }
    }
}

fn report_conversion(results: &[ConversionResult], json: bool) -> Result<()> {
    let failed: Vec<&ConversionResult> = results.iter().filter(|r| !r.is_success()).collect();

    if !json {
        for result in results.iter().filter(|r| r.is_success()) {
            println!("{}", result.output_path.display());
        }
        eprintln!(
            "\n[Converted {}/{} file(s)]",
            results.len() - failed.len(),
            results.len()
        );
    }

    if !failed.is_empty() {
        anyhow::bail!("{} file(s) failed to convert", failed.len());
    }
    Ok(())
}

fn report_publish(summary: &PublishSummary, json: bool) -> Result<()> {
    if !json {
        for upload in &summary.uploads {
            match upload.link() {
                Some(link) => println!("{}\t{}", upload.label(), link),
                None => println!("{}\t(failed)", upload.label()),
            }
        }

        match &summary.reconcile {
            Some(Ok(report)) => {
                eprintln!(
                    "\n[Linked {} row(s), {} already linked, {} unmatched{}]",
                    report.updated_rows.len(),
                    report.already_linked.len(),
                    report.unmatched.len(),
                    match report.appended_at {
                        Some(row) => format!(", appended from row {}", row),
                        None => String::new(),
                    }
                );
            }
            Some(Err(_)) => {}
            None => eprintln!("\n[Nothing uploaded, spreadsheet unchanged]"),
        }
    }

    if let Some(Err(e)) = &summary.reconcile {
        return Err(e.clone()).context("Spreadsheet reconciliation aborted");
    }
    if !summary.is_clean() {
        anyhow::bail!("{} file(s) failed to upload", summary.failed_uploads());
    }
    Ok(())
}

/// List Drive folders
async fn list_folders(token: Option<&str>) -> Result<()> {
    let drive = DriveClient::new(require_token(token)?);
    let folders = drive.list_folders().await?;

    if folders.is_empty() {
        println!("No folders found");
        return Ok(());
    }

    println!("{:<45} {}", "ID", "NAME");
    println!("{}", "-".repeat(75));
    for folder in folders {
        println!("{:<45} {}", folder.id, folder.name);
    }
    Ok(())
}

/// List spreadsheets
async fn list_spreadsheets(token: Option<&str>) -> Result<()> {
    let drive = DriveClient::new(require_token(token)?);
    let sheets = drive.list_spreadsheets().await?;

    if sheets.is_empty() {
        println!("No spreadsheets found");
        return Ok(());
    }

    println!("{:<45} {}", "ID", "NAME");
    println!("{}", "-".repeat(75));
    for sheet in sheets {
        println!("{:<45} {}", sheet.id, sheet.name);
    }
    Ok(())
}

/// List tab titles of a spreadsheet
async fn list_tabs(token: Option<&str>, spreadsheet_id: &str) -> Result<()> {
    let client = SheetsClient::new(require_token(token)?);
    for tab in client.list_tabs(spreadsheet_id).await? {
        println!("{}", tab);
    }
    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("wavlink configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Transcoder:");
    println!("  Binary:      {}", cfg.transcoder.binary.display());
    println!("  Codec:       {}", cfg.transcoder.profile.codec);
    println!("  VBR quality: {}", cfg.transcoder.profile.vbr_quality);
    println!("  Output ext:  {}", cfg.transcoder.profile.extension);
    println!("  Timeout:     {}s", cfg.transcoder.timeout_seconds);
    println!();
    println!("Sources:");
    println!("  Extension:   {}", cfg.source_extension);
    println!();
    println!("Upload:");
    println!("  Chunk size:  {} bytes", cfg.chunk_size);
    println!(
        "  Folder:      {}",
        cfg.folder_id.as_deref().unwrap_or("(not set)")
    );
    println!();
    println!("Sheet:");
    println!(
        "  Spreadsheet: {}",
        cfg.sheet.spreadsheet_id.as_deref().unwrap_or("(not set)")
    );
    println!("  Tab:         {}", cfg.sheet.sheet_name);
    println!("  Start row:   {}", cfg.sheet.start_row);

    Ok(())
}
