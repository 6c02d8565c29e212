//! CLI binary for planlift.
//!
//! A thin shim over the library crate: one subcommand per registry
//! operation, plus `process` which runs a job to completion with a live
//! progress bar.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use planlift::{
    JobController, JobProgressCallback, JobStatus, PipelineConfig, RegistryService, RoomSpec,
};
use std::io;
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

/// Terminal progress callback: one bar over the job's 0–100 progress range,
/// with stage labels printed above it as they change.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, _job_id: &str, total_pages: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} page(s)…"))
        ));
    }

    fn on_stage_start(&self, _job_id: &str, step: &str) {
        self.bar.println(format!("  {} {}", cyan("→"), step));
    }

    fn on_progress(&self, _job_id: &str, progress: u8) {
        self.bar.set_position(progress as u64);
    }

    fn on_job_complete(&self, _job_id: &str, total_assets: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} diagram(s) extracted",
            green("✔"),
            bold(&total_assets.to_string())
        );
    }

    fn on_job_error(&self, _job_id: &str, error: String) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(&error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a floor-plan PDF and print the manifest
  planlift process site-plans.pdf

  # Process from a URL at 150 DPI
  planlift process https://example.com/plans.pdf --dpi 150

  # Inspect a job
  planlift status 7c9e6679-7425-40de-944b-e07fc1f90ae7
  planlift manifest 7c9e6679-7425-40de-944b-e07fc1f90ae7

  # Curate and promote into a project
  planlift select 7c9e6679-… crop1.png crop2.a.png
  planlift promote house-42 7c9e6679-…

  # Adjust a promoted project
  planlift update house-42 --add crop2.b.png --remove house-42_1_a.png
  planlift saved house-42
  planlift available house-42

  # Cut rooms out of a promoted plan (specs: JSON array of {name, points})
  planlift rooms house-42 house-42_1_a.png --specs rooms.json

ENVIRONMENT VARIABLES:
  PLANLIFT_STORAGE_ROOT   Root directory for jobs and projects
  PDFIUM_LIB_PATH         Path to an existing libpdfium
"#;

/// Extract and curate diagram images from floor-plan PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "planlift",
    version,
    about = "Extract and curate diagram images from floor-plan PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Root directory for all job and project storage.
    #[arg(
        long,
        global = true,
        env = "PLANLIFT_STORAGE_ROOT",
        default_value = "./planlift-data"
    )]
    storage_root: PathBuf,

    /// Print results as JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a PDF (path or URL) to completion and print the manifest.
    Process {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Rendering DPI (72–600).
        #[arg(long, default_value_t = 300,
              value_parser = clap::value_parser!(u32).range(72..=600))]
        dpi: u32,

        /// Minimum sub-diagram area as a percentage of the page crop.
        #[arg(long, default_value_t = 5.0)]
        min_area_pct: f32,

        /// Disable the progress bar.
        #[arg(long)]
        no_progress: bool,
    },

    /// Show one job's status, step and progress.
    Status { job_id: String },

    /// List all jobs, newest first.
    Jobs,

    /// Print a completed job's manifest.
    Manifest { job_id: String },

    /// Stage a subset of a job's manifest for promotion.
    Select {
        job_id: String,
        /// Crop filenames from the manifest, e.g. crop1.png crop2.a.png.
        #[arg(required = true)]
        filenames: Vec<String>,
    },

    /// Promote a selected job into a project.
    Promote {
        project_id: String,
        job_id: String,
    },

    /// Print a project's promoted assets (and their rooms).
    Saved { project_id: String },

    /// Print candidate crops not currently promoted.
    Available { project_id: String },

    /// Add candidates to and/or remove assets from a project.
    Update {
        project_id: String,
        /// Candidate crop filename to promote (repeatable).
        #[arg(long)]
        add: Vec<String>,
        /// Canonical asset filename to evict (repeatable).
        #[arg(long)]
        remove: Vec<String>,
    },

    /// Register an externally produced image as a project asset.
    Upload {
        project_id: String,
        /// Path to the image file.
        image: PathBuf,
        /// Page number to file the asset under.
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Position label for the asset.
        #[arg(long, default_value = "uploaded")]
        label: String,
    },

    /// Extract named room crops from a promoted asset.
    Rooms {
        project_id: String,
        /// Canonical asset filename to cut rooms from.
        asset: String,
        /// JSON file: [{"name": "...", "points": [[x,y], ...]}] with
        /// coordinates in unit fractions.
        #[arg(long)]
        specs: PathBuf,
    },

    /// Delete one extracted room.
    DeleteRoom {
        project_id: String,
        room_id: String,
    },

    /// Delete a project: record, mirror and folder.
    DeleteProject { project_id: String },
}

fn registry(controller: &JobController) -> RegistryService {
    RegistryService::new(controller.storage().clone(), Arc::clone(controller.jobs()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress bar output and INFO logs fight over the terminal; keep the
    // library quiet unless asked.
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Process {
            input,
            dpi,
            min_area_pct,
            no_progress,
        } => {
            let show_bar = !cli.quiet && !no_progress && !cli.json;
            let mut builder = PipelineConfig::builder(&cli.storage_root)
                .dpi(*dpi)
                .min_area_pct(*min_area_pct);
            if show_bar {
                builder = builder.progress_callback(CliProgressCallback::new());
            }
            let controller = JobController::new(builder.build()?)?;

            let job = controller
                .submit(input)
                .await
                .with_context(|| format!("failed to submit '{input}'"))?;
            if !cli.quiet {
                eprintln!("{} job {}", dim("submitted"), bold(&job.id));
            }

            // The worker runs in-process; poll the record until terminal.
            let job = loop {
                let job = controller.get(&job.id)?;
                if job.status.is_terminal() {
                    break job;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            };

            match job.status {
                JobStatus::Done => {
                    let images = registry(&controller).list_manifest(&job.id)?;
                    if cli.json {
                        print_json(&images)?;
                    } else {
                        println!("{}", bold(&format!("{} diagram(s):", images.len())));
                        for img in &images {
                            println!(
                                "  {}  page {:>2}  {:<14} {}",
                                green("•"),
                                img.asset.page_num,
                                img.asset.label,
                                img.asset.filename
                            );
                        }
                        println!("{}", dim(&format!("job id: {}", job.id)));
                    }
                    Ok(())
                }
                _ => {
                    let msg = job.error_msg.unwrap_or_else(|| "unknown error".into());
                    anyhow::bail!("processing failed: {msg}");
                }
            }
        }

        Command::Status { job_id } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let job = controller.get(job_id)?;
            if cli.json {
                print_json(&job)
            } else {
                println!("{:<10} {}", bold("id"), job.id);
                println!("{:<10} {}", bold("status"), job.status.as_str());
                println!("{:<10} {}%", bold("progress"), job.progress);
                println!("{:<10} {}", bold("step"), job.step);
                if let Some(err) = &job.error_msg {
                    println!("{:<10} {}", bold("error"), red(err));
                }
                if let Some(pid) = &job.project_id {
                    println!("{:<10} {}", bold("project"), pid);
                }
                Ok(())
            }
        }

        Command::Jobs => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let jobs = controller.list();
            if cli.json {
                print_json(&jobs)
            } else {
                for job in &jobs {
                    println!(
                        "{}  {:<10} {:>3}%  {}",
                        job.id,
                        job.status.as_str(),
                        job.progress,
                        dim(&job.source)
                    );
                }
                Ok(())
            }
        }

        Command::Manifest { job_id } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let images = registry(&controller).list_manifest(job_id)?;
            if cli.json {
                print_json(&images)
            } else {
                for img in &images {
                    println!(
                        "page {:>2}  {:<14} {:<18} {}",
                        img.asset.page_num,
                        img.asset.label,
                        img.asset.filename,
                        dim(&img.url)
                    );
                }
                Ok(())
            }
        }

        Command::Select { job_id, filenames } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let record = registry(&controller).select(job_id, filenames)?;
            if cli.json {
                print_json(&record)
            } else {
                println!(
                    "{} staged {} of {} requested",
                    green("✔"),
                    record.total_selected,
                    filenames.len()
                );
                Ok(())
            }
        }

        Command::Promote { project_id, job_id } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let doc = registry(&controller).promote(project_id, job_id)?;
            if cli.json {
                print_json(&doc)
            } else {
                println!(
                    "{} project {} now holds {} asset(s)",
                    green("✔"),
                    bold(project_id),
                    doc.saved.len()
                );
                Ok(())
            }
        }

        Command::Saved { project_id } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let doc = registry(&controller).saved(project_id)?;
            if cli.json {
                print_json(&doc)
            } else {
                for asset in &doc.saved {
                    println!(
                        "page {:>2}  {:<14} {}",
                        asset.page_number, asset.label, asset.filename
                    );
                    for room in &asset.rooms {
                        println!("    {} {}  {}", cyan("room"), room.name, dim(&room.id));
                    }
                }
                Ok(())
            }
        }

        Command::Available { project_id } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let pool = registry(&controller).available(project_id)?;
            if cli.json {
                print_json(&pool)
            } else {
                for img in &pool {
                    println!(
                        "page {:>2}  {:<14} {}",
                        img.asset.page_num, img.asset.label, img.asset.filename
                    );
                }
                Ok(())
            }
        }

        Command::Update {
            project_id,
            add,
            remove,
        } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let doc = registry(&controller).update_saved(project_id, add, remove)?;
            if cli.json {
                print_json(&doc)
            } else {
                println!(
                    "{} project {} now holds {} asset(s)",
                    green("✔"),
                    bold(project_id),
                    doc.saved.len()
                );
                Ok(())
            }
        }

        Command::Upload {
            project_id,
            image,
            page,
            label,
        } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let doc =
                registry(&controller).register_uploaded(project_id, image, *page, label)?;
            if cli.json {
                print_json(&doc)
            } else {
                println!("{} registered under project {}", green("✔"), bold(project_id));
                Ok(())
            }
        }

        Command::Rooms {
            project_id,
            asset,
            specs,
        } => {
            let raw = std::fs::read_to_string(specs)
                .with_context(|| format!("failed to read '{}'", specs.display()))?;
            let specs: Vec<RoomSpec> =
                serde_json::from_str(&raw).context("specs file must be a JSON array of rooms")?;

            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            let rooms = registry(&controller).extract_rooms(project_id, asset, &specs)?;
            if cli.json {
                print_json(&rooms)
            } else {
                for room in &rooms {
                    println!("{} {}  {}", green("✔"), room.name, dim(&room.id));
                }
                Ok(())
            }
        }

        Command::DeleteRoom {
            project_id,
            room_id,
        } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            registry(&controller).delete_room(project_id, room_id)?;
            println!("{} room {} deleted", green("✔"), room_id);
            Ok(())
        }

        Command::DeleteProject { project_id } => {
            let controller = JobController::new(PipelineConfig::builder(&cli.storage_root).build()?)?;
            registry(&controller).delete_project(project_id)?;
            println!("{} project {} deleted", green("✔"), bold(project_id));
            Ok(())
        }
    }
}
