use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use tracking_core::builtin::{self, PLUGIN_NAME, WIDGET_NAME};
use tracking_core::tracking::{ExportTarget, PanelInput, Point};
use tracking_core::{HostConfig, LayerType, ManifestLoader, PluginManager};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(name = "particle-tracking", version, about = "Particle Tracking plugin host")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check a manifest and print every issue found
    Validate {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
    /// List the commands of a manifest, or of the bundled plugin
    Commands {
        #[arg(short, long, value_name = "MANIFEST")]
        manifest: Option<PathBuf>,
    },
    /// Print the reader command that would open a path
    MatchReader {
        #[arg(short, long, value_name = "MANIFEST")]
        manifest: Option<PathBuf>,

        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Print the writer commands that could save layers to a path
    MatchWriter {
        #[arg(short, long, value_name = "MANIFEST")]
        manifest: Option<PathBuf>,

        /// Type of each layer being saved; repeat for several layers
        #[arg(short = 't', long = "layer-type", value_name = "TYPE", required = true)]
        layer_types: Vec<LayerType>,

        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Run the tracking widget on detected points and print its report
    Track {
        /// Widget input, or a bare array of points
        #[arg(value_name = "POINTS_JSON")]
        points: PathBuf,

        /// Also write the track, MSD and fit tables as CSV into this directory
        #[arg(short, long, value_name = "DIR")]
        export: Option<PathBuf>,

        /// File name prefix of the exported tables; defaults to the points file stem
        #[arg(short, long, value_name = "NAME", requires = "export")]
        name: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The bundled plugin, or only the given manifest when one is named
async fn host(config: &HostConfig, manifest: Option<&Path>) -> CliResult<PluginManager> {
    let mut config = config.clone();
    if let Some(path) = manifest {
        debug!("Inspecting manifest {:?} without the bundled plugin", path);
        config.plugins.builtin = false;
        config.plugins.strict_entry_points = false;
        config.plugins.manifests = vec![path.to_path_buf()];
    }
    Ok(builtin::manager(&config).await?)
}

/// Returns whether the manifest is valid
async fn validate(path: &Path) -> CliResult<bool> {
    let manifest = ManifestLoader::new().read_from_file(path).await?;
    let issues = manifest.validate();
    if issues.is_empty() {
        println!("{}: valid ({} commands)", path.display(), manifest.commands().len());
        return Ok(true);
    }

    println!("{}: {} issue(s)", path.display(), issues.len());
    for issue in issues {
        println!("  - {}", issue);
    }
    Ok(false)
}

fn read_panel_input(content: &str) -> CliResult<PanelInput> {
    let value: Value = serde_json::from_str(content)?;
    if value.is_array() {
        let points: Vec<Point> = serde_json::from_value(value)?;
        return Ok(PanelInput {
            points,
            ..PanelInput::default()
        });
    }
    Ok(serde_json::from_value(value)?)
}

fn export_name(points: &Path) -> String {
    points
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tracks".to_string())
}

async fn run(cli: Cli) -> CliResult<bool> {
    let config = HostConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { manifest } => validate(&manifest).await,
        Commands::Commands { manifest } => {
            let manager = host(&config, manifest.as_deref()).await?;
            for found in manager.commands() {
                println!("{}\t{}\t{}", found.command.id, found.command.python_name, found.command.title);
            }
            Ok(true)
        }
        Commands::MatchReader { manifest, path } => {
            let manager = host(&config, manifest.as_deref()).await?;
            let is_dir = path.is_dir();
            match manager.reader_for(&path, is_dir) {
                Some(found) => {
                    println!("{}", found.command.id);
                    Ok(true)
                }
                None => {
                    println!("No reader for {}", path.display());
                    Ok(false)
                }
            }
        }
        Commands::MatchWriter {
            manifest,
            layer_types,
            path,
        } => {
            let manager = host(&config, manifest.as_deref()).await?;
            let writers = manager.writers_for(&layer_types, &path);
            if writers.is_empty() {
                println!("No writer for {}", path.display());
                return Ok(false);
            }
            for found in writers {
                println!("{}", found.command.id);
            }
            Ok(true)
        }
        Commands::Track {
            points,
            export,
            name,
        } => {
            let content = tokio::fs::read_to_string(&points).await?;
            let mut input = read_panel_input(&content)?;
            if let Some(dir) = export {
                input.export = Some(ExportTarget {
                    dir,
                    name: name.unwrap_or_else(|| export_name(&points)),
                });
            }
            let manager = host(&config, None).await?;
            let report = manager
                .instantiate_widget(PLUGIN_NAME, WIDGET_NAME, serde_json::to_value(input)?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
