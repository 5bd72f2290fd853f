use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::metadata::LevelFilter;

use mlc_downloader::{
    core::AppConfig,
    models::{DownloadOrchestrator, DownloadPhase, StoreLayout},
};

#[derive(Parser)]
#[command(
    name = "mlc-downloader",
    about = "Download MLC model artifacts into the local store"
)]
struct Cli {
    /// Path to the app config listing the available models
    #[arg(long, default_value = "mlc-app-config.json")]
    config: PathBuf,

    /// Models root directory (defaults to the platform cache directory)
    #[arg(long)]
    models_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the configured models and whether they are downloaded
    List,
    /// Download a model's artifacts, resuming from whatever is present
    Download { model_id: String },
    /// Remove a model's local store and scratch files
    Delete { model_id: String },
}

fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let mut layout = StoreLayout::resolve()?;
    if let Some(models_dir) = cli.models_dir {
        layout.models_root = models_dir;
    }

    match cli.command {
        Command::List => {
            for model in &config.model_list {
                let orchestrator = DownloadOrchestrator::new(model.clone(), &layout)?;
                println!(
                    "{}  {}  [{}]",
                    model.model_id,
                    model.name,
                    orchestrator.phase()
                );
            }
            Ok(())
        }
        Command::Download { model_id } => {
            let model = config
                .model(&model_id)
                .ok_or_else(|| anyhow!("unknown model {model_id}"))?;
            let orchestrator = DownloadOrchestrator::new(model.clone(), &layout)?;
            let receiver = orchestrator.subscribe();
            orchestrator.start();
            for phase in receiver {
                println!("{phase}");
                match phase {
                    DownloadPhase::Finished => {
                        println!("model ready at {}", orchestrator.local_dir().display());
                        return Ok(());
                    }
                    DownloadPhase::Error => return Err(anyhow!("download failed")),
                    DownloadPhase::NotStarted => return Err(anyhow!("download cancelled")),
                    _ => {}
                }
            }
            Ok(())
        }
        Command::Delete { model_id } => {
            let model = config
                .model(&model_id)
                .ok_or_else(|| anyhow!("unknown model {model_id}"))?;
            let orchestrator = DownloadOrchestrator::new(model.clone(), &layout)?;
            orchestrator.delete();
            Ok(())
        }
    }
}

fn setup_logging() {
    let filter = std::env::var("MLC_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
