use chat_export_convert::archive::{self, DEFAULT_ARCHIVE_NAME};
use chat_export_convert::config::{
    AdapterOptions, ConvertConfig, FileConfig, OutputFormat, RenderOptions, SourceFormat,
    default_workers,
};
use chat_export_convert::parallel::{self, CancelToken, ConversionResult, Status, Summary};
use chat_export_convert::scan::{self, ScanOptions};
use clap::Parser;
use eyre::{Context, Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Convert AI Studio, ChatGPT and Claude chat exports to Markdown and HTML.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Export files or directories to convert.
    /// Defaults to `source_dir` from the config file.
    #[arg(value_name = "SOURCE")]
    sources: Vec<PathBuf>,

    /// Directory to write documents to.
    /// Defaults to ./chat-export if not set in config.
    #[arg(short, long, value_name = "DIR")]
    dest: Option<PathBuf>,

    /// Output format: md, html or both.
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Input format: auto, aistudio, chatgpt or claude.
    /// Anything but auto reads every file as that format without detection.
    #[arg(long = "format-src", value_name = "FORMAT")]
    format_src: Option<SourceFormat>,

    /// Only convert files matching these globs, relative to the source
    /// directory. Separate patterns with `;`.
    #[arg(long, value_name = "GLOBS", value_delimiter = ';')]
    include: Vec<String>,

    /// Skip files matching these globs, relative to the source directory.
    /// Separate patterns with `;`.
    #[arg(long, value_name = "GLOBS", value_delimiter = ';')]
    exclude: Vec<String>,

    /// Prepend YAML front matter to Markdown output.
    #[arg(long)]
    yaml: bool,

    /// Show each turn's timestamp.
    #[arg(long)]
    timestamps: bool,

    /// Include a run settings section with model and sampling parameters (default).
    #[arg(long, overrides_with = "no_run_settings")]
    run_settings: bool,

    /// Omit the run settings section.
    #[arg(long)]
    no_run_settings: bool,

    /// Keep the AI Studio system instruction (default).
    #[arg(long, overrides_with = "no_system_prompt")]
    system_prompt: bool,

    /// Drop the AI Studio system instruction.
    #[arg(long)]
    no_system_prompt: bool,

    /// Keep reasoning ("thinking") content instead of dropping it.
    #[arg(long)]
    keep_thoughts: bool,

    /// Markdown template file.
    #[arg(long, value_name = "PATH")]
    template: Option<PathBuf>,

    /// HTML template file.
    #[arg(long, value_name = "PATH")]
    html_template: Option<PathBuf>,

    /// Number of worker threads. Defaults to the number of CPUs.
    #[arg(short = 'j', long, value_name = "N")]
    workers: Option<usize>,

    /// Replace documents that already exist.
    #[arg(long)]
    overwrite: bool,

    /// Write every document directly into the destination directory.
    #[arg(long)]
    no_subfolders: bool,

    /// Only look at the top level of source directories.
    #[arg(long)]
    no_recursive: bool,

    /// Run the whole pipeline but write nothing.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Fail, rather than skip, files in an unrecognized format.
    #[arg(long)]
    strict: bool,

    /// Rename extensionless files in source directories to `.json` first.
    #[arg(long)]
    rename_extensionless: bool,

    /// Zip the documents written by this run.
    #[arg(long)]
    zip: bool,

    /// Archive name, without extension.
    #[arg(long, value_name = "NAME", requires = "zip")]
    zip_name: Option<String>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/chat-export-convert/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log every step.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors; hide the progress bar.
    #[arg(short, long)]
    quiet: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

/// Flag pair resolution: an explicit CLI flag wins, then the config file.
fn toggle(on: bool, off: bool, configured: Option<bool>, default: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => configured.unwrap_or(default),
    }
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("chat-export-convert/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("Failed to create log file: {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn progress_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

fn report(bar: &ProgressBar, result: &ConversionResult) {
    bar.inc(1);
    match result.status {
        Status::Success => {}
        Status::Skipped => bar.println(format!(
            "Skipped: {} ({})",
            result.input.display(),
            result.note.as_deref().unwrap_or("skipped")
        )),
        Status::Failed => {
            if let Some(err) = &result.error {
                bar.println(format!("Failed: {} {err}", result.input.display()));
            }
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve sources and destination (CLI > Config > Default)
    let sources = if cli.sources.is_empty() {
        file_cfg.source_dir.clone().into_iter().collect()
    } else {
        cli.sources.clone()
    };
    if sources.is_empty() {
        return Err(eyre!(
            "No SOURCE given.\nPass a file or directory, or set source_dir in config.toml."
        ));
    }
    let dest_dir = cli
        .dest
        .clone()
        .or(file_cfg.dest_dir.clone())
        .unwrap_or_else(|| PathBuf::from("chat-export"));

    // 3. Build the options
    let render = RenderOptions {
        include_yaml_front_matter: toggle(cli.yaml, false, file_cfg.yaml_front_matter, false),
        include_timestamps: toggle(cli.timestamps, false, file_cfg.include_timestamps, false),
        include_run_settings: toggle(
            cli.run_settings,
            cli.no_run_settings,
            file_cfg.include_run_settings,
            true,
        ),
        template_path: cli.template.clone().or(file_cfg.template.clone()),
        html_template_path: cli.html_template.clone().or(file_cfg.html_template.clone()),
        output_format: cli.format.or(file_cfg.format).unwrap_or_default(),
    };
    let adapter = AdapterOptions {
        exclude_thoughts: !cli.keep_thoughts && file_cfg.exclude_thoughts.unwrap_or(true),
        include_system_prompt: toggle(
            cli.system_prompt,
            cli.no_system_prompt,
            file_cfg.include_system_prompt,
            true,
        ),
    };
    let globs = |cli_globs: &[String], configured: &Option<Vec<String>>| {
        if cli_globs.is_empty() {
            configured.clone().unwrap_or_default()
        } else {
            cli_globs.to_vec()
        }
    };
    let scan_opts = ScanOptions {
        recursive: !cli.no_recursive && file_cfg.recursive.unwrap_or(true),
        rename_extensionless: cli.rename_extensionless,
        include: globs(&cli.include, &file_cfg.include),
        exclude: globs(&cli.exclude, &file_cfg.exclude),
    };

    // 4. Collect inputs from every source; each source's root is kept for mirroring
    let mut inputs: Vec<PathBuf> = Vec::new();
    let mut source_roots: Vec<PathBuf> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    for source in &sources {
        let found = scan::collect_inputs(source, &scan_opts)?;
        info!("Found {} export file(s) in {}", found.len(), source.display());
        inputs.extend(found.into_iter().filter(|p| seen.insert(p.clone())));
        source_roots.push(if source.is_file() {
            source.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            source.clone()
        });
    }

    let config = ConvertConfig {
        source_roots,
        source_format: cli.format_src.or(file_cfg.source_format).unwrap_or_default(),
        dest_dir: dest_dir.clone(),
        render,
        adapter,
        workers: cli.workers.or(file_cfg.workers).unwrap_or_else(default_workers),
        overwrite: cli.overwrite || file_cfg.overwrite.unwrap_or(false),
        mirror_subfolders: !cli.no_subfolders && file_cfg.create_subfolders.unwrap_or(true),
        dry_run: cli.dry_run,
        strict: cli.strict,
    };

    // 5. Convert everything in one batch; Ctrl-C stops files not yet started
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, finishing files already in progress");
        on_interrupt.cancel();
    })
    .wrap_err("Failed to install Ctrl-C handler")?;

    let bar = progress_bar(inputs.len(), cli.quiet);
    let results = parallel::run(&inputs, &config, &cancel, |r| report(&bar, r))
        .wrap_err("Batch conversion failed")?;
    bar.finish_and_clear();
    let summary = Summary::from_results(&results);

    // 6. Optional archive of this run's documents
    if cli.zip && !cli.dry_run {
        let name = cli
            .zip_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| format!("{n}.zip"))
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());
        let archive_path = dest_dir.join(name);
        let written: Vec<PathBuf> = results
            .iter()
            .filter(|r| r.status == Status::Success)
            .flat_map(|r| r.output_paths.iter().cloned())
            .collect();
        let count = archive::zip_outputs(&dest_dir, &written, &archive_path)?;
        info!("Archived {count} file(s) to {}", archive_path.display());
    }

    if !cli.quiet {
        eprintln!("Done. {summary}");
    }

    Ok(if summary.failed > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}
