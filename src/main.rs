use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uniconvert::config::{CompressionMode, ConvertOptions, ImageFit, Limits, Orientation, PageSize};
use uniconvert::item::Item;
use uniconvert::staging::{AddReport, MemoryStore, StagingStore, StoreKind, open_store};
use uniconvert::worker::{ConversionOutput, WorkerEvent, format_file_size, spawn_conversion};

#[derive(Parser)]
#[command(name = "uniconvert")]
#[command(version, about = "Combine images and text files into a single PDF")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert files straight to a PDF")]
    Convert {
        #[arg(help = "Image and text files, in page order", required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, help = "Output PDF file")]
        output: PathBuf,
        #[command(flatten)]
        options: OptionArgs,
    },
    #[command(about = "Stage files between runs, then convert them")]
    Stage {
        #[arg(long, help = "Session file or database directory", default_value = ".uniconvert")]
        store: PathBuf,
        #[arg(long, value_enum, help = "Storage backend", default_value = "dir")]
        backend: StoreKind,
        #[command(subcommand)]
        action: StageAction,
    },
    #[command(about = "Show or create a settings file")]
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum StageAction {
    #[command(about = "Add files to the end of the list")]
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    #[command(about = "List staged files")]
    List,
    #[command(about = "Remove a staged file (1-indexed)")]
    Remove { index: usize },
    #[command(about = "Move a staged file to a new position (1-indexed)")]
    Move { from: usize, to: usize },
    #[command(about = "Remove every staged file")]
    Clear,
    #[command(about = "Convert the staged files")]
    Convert {
        #[arg(short, long, help = "Output PDF file")]
        output: PathBuf,
        #[arg(long, help = "Clear the store after a successful conversion")]
        clear: bool,
        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    #[command(about = "Print effective settings as JSON")]
    Show {
        #[arg(long, help = "Settings file to read")]
        settings: Option<PathBuf>,
    },
    #[command(about = "Write the default settings to a file")]
    Init {
        path: PathBuf,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

/// Conversion flags; anything left unset falls back to the settings file.
#[derive(Args)]
struct OptionArgs {
    #[arg(long, help = "Settings file (JSON)")]
    settings: Option<PathBuf>,
    #[arg(long, help = "JPEG quality, 0 to 1")]
    quality: Option<f32>,
    #[arg(long, help = "Longest image side in pixels")]
    max_dim: Option<u32>,
    #[arg(long, value_enum)]
    compression: Option<CompressionMode>,
    #[arg(long, help = "Embed images as they are")]
    no_optimize: bool,
    #[arg(long, value_enum)]
    page_size: Option<PageSize>,
    #[arg(long, value_enum)]
    orientation: Option<Orientation>,
    #[arg(long, value_enum)]
    fit: Option<ImageFit>,
    #[arg(long, help = "Page margin in points")]
    margin: Option<f32>,
    #[arg(long, help = "Text font size in points")]
    font_size: Option<f32>,
    #[arg(long)]
    no_page_numbers: bool,
    #[arg(long, help = "Do not print file names above text")]
    no_headers: bool,
    #[arg(long, help = "Prepare images one at a time")]
    sequential: bool,
}

impl OptionArgs {
    fn resolve(&self) -> anyhow::Result<ConvertOptions> {
        let mut options = match &self.settings {
            Some(path) => ConvertOptions::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => ConvertOptions::default(),
        };
        if let Some(q) = self.quality {
            options.quality = q;
        }
        if let Some(d) = self.max_dim {
            options.max_dim = d;
        }
        if let Some(c) = self.compression {
            options.compression = c;
        }
        if let Some(s) = self.page_size {
            options.page_size = s;
        }
        if let Some(o) = self.orientation {
            options.orientation = o;
        }
        if let Some(f) = self.fit {
            options.image_fit = f;
        }
        if let Some(m) = self.margin {
            options.margin = m;
        }
        if let Some(s) = self.font_size {
            options.font_size = s;
        }
        if self.no_optimize {
            options.optimize_images = false;
        }
        if self.no_page_numbers {
            options.page_numbers = false;
        }
        if self.no_headers {
            options.file_headers = false;
        }
        if self.sequential {
            options.parallel = false;
        }
        options.validate().context("Invalid conversion settings")?;
        Ok(options)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Convert {
            files,
            output,
            options,
        } => {
            let options = options.resolve()?;
            let mut store = MemoryStore::new(Limits::default());
            let report = store.add_paths(&files)?;
            print_report(&report);
            if report.added == 0 {
                bail!("No supported files to convert");
            }
            run_conversion(store.take(), options, &output)
        }
        Commands::Stage {
            store,
            backend,
            action,
        } => stage(&store, backend, action),
        Commands::Settings { action } => settings(action),
    }
}

fn stage(path: &Path, backend: StoreKind, action: StageAction) -> anyhow::Result<()> {
    let mut store = open_store(backend, path, Limits::default())
        .with_context(|| format!("Failed to open staging store at {}", path.display()))?;

    match action {
        StageAction::Add { files } => {
            let report = store.add_paths(&files)?;
            print_report(&report);
            println!("Staged {} file(s), {} in total", report.added, store.len()?);
        }
        StageAction::List => {
            let items = store.get_files()?;
            if items.is_empty() {
                println!("No files staged");
            }
            for (i, item) in items.iter().enumerate() {
                println!("{}", list_line(i, item));
            }
        }
        StageAction::Remove { index } => {
            let index = to_position(index, store.len()?)?;
            store.remove_at(index)?;
            println!("Removed file {}", index + 1);
        }
        StageAction::Move { from, to } => {
            let len = store.len()?;
            store.move_item(to_position(from, len)?, to_position(to, len)?)?;
            println!("Moved file {} to position {}", from, to);
        }
        StageAction::Clear => {
            store.clear()?;
            println!("Cleared staging store");
        }
        StageAction::Convert {
            output,
            clear,
            options,
        } => {
            let options = options.resolve()?;
            let items = store.get_files()?;
            if items.is_empty() {
                bail!("No files staged");
            }
            run_conversion(items, options, &output)?;
            if clear {
                store.clear()?;
            }
        }
    }
    Ok(())
}

fn settings(action: SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show { settings } => {
            let options = match settings {
                Some(path) => ConvertOptions::load(&path)
                    .with_context(|| format!("Failed to load settings from {}", path.display()))?,
                None => ConvertOptions::default(),
            };
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        SettingsAction::Init { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            ConvertOptions::default()
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default settings to {}", path.display());
        }
    }
    Ok(())
}

fn run_conversion(items: Vec<Item>, options: ConvertOptions, output: &Path) -> anyhow::Result<()> {
    let total = items.len();
    let handle = spawn_conversion(items, options).context("Failed to start conversion")?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut result = None;
    while let Some(event) = handle.next_event() {
        match event {
            WorkerEvent::Progress { current, total } => {
                pb.set_length(total as u64);
                pb.set_position(current as u64);
            }
            WorkerEvent::Finished(outcome) => {
                result = Some(outcome);
                break;
            }
        }
    }
    pb.finish_and_clear();

    let Some(result) = result else {
        bail!("Conversion worker stopped unexpectedly");
    };
    let converted = result.context("Conversion failed")?;
    std::fs::write(output, &converted.pdf)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    print_summary(&converted, output);
    Ok(())
}

fn print_summary(output: &ConversionOutput, path: &Path) {
    for warning in &output.warnings {
        eprintln!("Warning: {}: {}", warning.name, warning.reason);
    }
    println!(
        "PDF created successfully: {} ({} pages from {} files)",
        path.display(),
        output.pages,
        output.items
    );
    println!(
        "Final PDF size: {} ({:.1}% reduction)",
        format_file_size(output.output_bytes()),
        output.reduction_percent()
    );
}

fn print_report(report: &AddReport) {
    for skipped in &report.skipped {
        eprintln!("Skipped {}: {}", skipped.name, skipped.reason);
    }
}

fn list_line(index: usize, item: &Item) -> String {
    let mime = if item.mime.is_empty() { "unknown" } else { &item.mime };
    format!("{}. {} ({}, {})", index + 1, item.name, mime, format_file_size(item.size()))
}

/// Convert a 1-indexed position from the command line.
fn to_position(index: usize, len: usize) -> anyhow::Result<usize> {
    if index == 0 || index > len {
        bail!("No staged file at position {} ({} staged)", index, len);
    }
    Ok(index - 1)
}
