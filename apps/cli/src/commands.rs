//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use tenderfold_assembly::{
    DocumentConverter, ProgressReporter, ProjectOutput, SofficeConverter, run_batch,
};
use tenderfold_discovery::find_project_roots;
use tenderfold_ingest::{bundle_outputs, extract_archive};
use tenderfold_remote::WebDavClient;
use tenderfold_shared::{
    Capabilities, LayoutConfig, config_file_path, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Tenderfold — reshape bid-evaluation project trees into flat output sets.
#[derive(Parser)]
#[command(
    name = "tenderfold",
    version,
    about = "Organize bid-evaluation packets into their canonical flat output sets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Organize projects under a local directory or inside a zip bundle.
    Organize {
        /// Directory to scan for project roots.
        #[arg(long, conflicts_with = "archive")]
        root: Option<PathBuf>,

        /// Zip bundle to extract and organize instead of a directory.
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Only treat the given directory itself (or its ancestors) as a
        /// project root; do not descend looking for more.
        #[arg(long)]
        no_recursive: bool,

        /// Bundle every produced output set into this zip when done.
        #[arg(long)]
        output_zip: Option<PathBuf>,
    },

    /// Fetch pending zip bundles from a WebDAV share, organize each one,
    /// and upload the processed bundle next to it.
    Remote {
        /// WebDAV collection URL holding the bundles.
        #[arg(long)]
        url: String,

        /// Basic-auth username.
        #[arg(long)]
        username: Option<String>,

        /// Basic-auth password.
        #[arg(long)]
        password: Option<String>,

        /// Delete the source bundle after a successful upload.
        #[arg(long)]
        delete_source: bool,
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
        0 => "tenderfold=info",
        1 => "tenderfold=debug",
        _ => "tenderfold=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Organize {
            root,
            archive,
            no_recursive,
            output_zip,
        } => {
            cmd_organize(
                root.as_deref(),
                archive.as_deref(),
                !no_recursive,
                output_zip.as_deref(),
            )
            .await
        }
        Command::Remote {
            url,
            username,
            password,
            delete_source,
        } => {
            cmd_remote(
                &url,
                username.as_deref(),
                password.as_deref(),
                delete_source,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// organize
// ---------------------------------------------------------------------------

async fn cmd_organize(
    root: Option<&Path>,
    archive: Option<&Path>,
    recursive: bool,
    output_zip: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let layout = LayoutConfig::from(&config);

    // An extracted archive needs its temp dir alive until the run finishes.
    let _extract_guard;
    let scan_root: PathBuf = match (archive, root) {
        (Some(zip), _) => {
            if !zip.is_file() {
                return Err(eyre!("archive not found: {}", zip.display()));
            }
            let tmp = tempfile::tempdir()?;
            info!(archive = %zip.display(), "extracting bundle");
            let extracted = extract_archive(zip, tmp.path())?;
            _extract_guard = Some(tmp);
            extracted
        }
        (None, Some(dir)) => {
            if !dir.is_dir() {
                return Err(eyre!("root is not a directory: {}", dir.display()));
            }
            _extract_guard = None;
            dir.to_path_buf()
        }
        (None, None) => {
            return Err(eyre!("either --root or --archive is required"));
        }
    };

    let projects = find_project_roots(&scan_root, recursive, &layout)?;
    if projects.is_empty() {
        return Err(eyre!(
            "no project roots found under {}",
            scan_root.display()
        ));
    }
    info!(count = projects.len(), "project roots discovered");

    let converter = SofficeConverter::detect();
    if converter.is_none() {
        warn!("soffice not found, docx conversion disabled");
    }
    let caps = Capabilities {
        can_compose: true,
        can_convert: converter.is_some(),
    };
    let converter_ref: Option<&dyn DocumentConverter> =
        converter.as_ref().map(|c| c as &dyn DocumentConverter);

    let reporter = CliProgress::new();
    let outputs = run_batch(&projects, &layout, caps, converter_ref, &reporter);
    reporter.finish();

    if let Some(zip_path) = output_zip {
        let labeled = labeled_outputs(&outputs);
        bundle_outputs(&labeled, zip_path)?;
        info!(zip = %zip_path.display(), "output bundle written");
    }

    println!();
    println!("  Organized {} of {} projects", outputs.len(), projects.len());
    for output in &outputs {
        println!("  {} -> {}", output.project, output.output_dir.display());
    }
    println!();

    Ok(())
}

/// Pair each output directory with its project folder name for bundling.
fn labeled_outputs(outputs: &[ProjectOutput]) -> Vec<(String, PathBuf)> {
    outputs
        .iter()
        .map(|o| {
            let label = o
                .project
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string());
            (label, o.output_dir.clone())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// remote
// ---------------------------------------------------------------------------

async fn cmd_remote(
    url: &str,
    username: Option<&str>,
    password: Option<&str>,
    delete_source: bool,
) -> Result<()> {
    let config = load_config()?;
    let layout = LayoutConfig::from(&config);
    let suffix = &config.remote.processed_suffix;

    let client = WebDavClient::new(url, username, password)?;
    let archives = client.list_archives(suffix).await?;

    if archives.is_empty() {
        println!("No pending bundles on the share.");
        return Ok(());
    }
    info!(count = archives.len(), "pending bundles found");

    let converter = SofficeConverter::detect();
    if converter.is_none() {
        warn!("soffice not found, docx conversion disabled");
    }
    let caps = Capabilities {
        can_compose: true,
        can_convert: converter.is_some(),
    };
    let converter_ref: Option<&dyn DocumentConverter> =
        converter.as_ref().map(|c| c as &dyn DocumentConverter);

    let mut processed = 0usize;
    for remote_name in &archives {
        match process_remote_archive(
            &client,
            remote_name,
            suffix,
            &layout,
            caps,
            converter_ref,
            delete_source,
        )
        .await
        {
            Ok(()) => processed += 1,
            Err(e) => {
                warn!(bundle = %remote_name, error = %e, "bundle failed, continuing");
            }
        }
    }

    println!();
    println!("  Processed {processed} of {} bundles", archives.len());
    println!();

    Ok(())
}

/// Download one bundle, organize every project inside it, and upload the
/// processed result as `<stem><suffix>.zip` next to the original.
async fn process_remote_archive(
    client: &WebDavClient,
    remote_name: &str,
    suffix: &str,
    layout: &LayoutConfig,
    caps: Capabilities,
    converter: Option<&dyn DocumentConverter>,
    delete_source: bool,
) -> Result<()> {
    let stem = Path::new(remote_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| eyre!("bundle name has no stem: {remote_name}"))?;

    let tmp = tempfile::tempdir()?;
    let local_zip = tmp.path().join(remote_name);

    info!(bundle = %remote_name, "downloading");
    client.download(remote_name, &local_zip).await?;

    let extract_dir = tmp.path().join("extracted");
    std::fs::create_dir_all(&extract_dir)?;
    let scan_root = extract_archive(&local_zip, &extract_dir)?;

    let projects = find_project_roots(&scan_root, true, layout)?;
    if projects.is_empty() {
        return Err(eyre!("bundle contains no project roots"));
    }

    let reporter = CliProgress::new();
    let outputs = run_batch(&projects, layout, caps, converter, &reporter);
    reporter.finish();

    if outputs.is_empty() {
        return Err(eyre!("every project in the bundle failed"));
    }

    let processed_name = format!("{stem}{suffix}.zip");
    let processed_zip = tmp.path().join(&processed_name);
    let labeled = labeled_outputs(&outputs);
    bundle_outputs(&labeled, &processed_zip)?;

    info!(bundle = %processed_name, "uploading");
    client.upload(&processed_zip, &processed_name).await?;

    if delete_source {
        client.delete(remote_name).await?;
        info!(bundle = %remote_name, "source bundle deleted");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config written to {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let path = config_file_path()?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("# {}", path.display());
    println!("{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn project_started(&self, project: &tenderfold_shared::ProjectRoot) {
        self.spinner.set_message(format!("Organizing {project}"));
    }

    fn artifact_produced(&self, output_name: &str) {
        self.spinner
            .set_message(format!("Produced {output_name}"));
    }

    fn project_finished(&self, output: &ProjectOutput) {
        self.spinner
            .println(format!("  done: {}", output.project));
    }
}
