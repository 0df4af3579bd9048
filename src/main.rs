//! classifia-rs: ask Gemini which bin a discarded object goes in.

mod about;
mod classifier;
mod config;
mod console;
mod error;
mod gemini;
mod history;
mod rate_limit;
mod service;
mod state;
mod store;
mod voice;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::store::KeyValueStore;

#[derive(Parser, Debug)]
#[command(name = "classifia-rs", about = "Waste sorting assistant backed by Gemini")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable spoken answers
    #[arg(long)]
    no_voice: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session (default)
    Interactive,
    /// Classify one object and exit
    Classify {
        /// Object name, e.g. "Carton de pizza"
        #[arg(required = true)]
        object: Vec<String>,
        /// Read the answer aloud
        #[arg(long)]
        speak: bool,
    },
    /// Show recent classifications
    History,
    /// Forget recent classifications
    ClearHistory,
    /// About the project
    About,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so they don't interleave with answers
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=warn,reqwest=warn")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load(args.config.as_deref());
    let storage_dir = config.storage.resolved_dir();
    info!("Storage: {}", storage_dir.display());
    let store: Arc<dyn KeyValueStore> = Arc::new(store::FileStore::new(storage_dir));

    let command = args.command.unwrap_or(Command::Interactive);
    match &command {
        Command::About => {
            println!("{}", about::ABOUT);
            return Ok(());
        }
        Command::History => {
            let theme = state::Theme::load(store.as_ref());
            let history = history::HistoryStore::load(store);
            println!("{}", console::render_history(history.all(), theme));
            return Ok(());
        }
        Command::ClearHistory => {
            history::HistoryStore::load(store).clear();
            println!("Historique effacé.");
            return Ok(());
        }
        Command::Interactive | Command::Classify { .. } => {}
    }

    let voice = (config.voice.enabled && !args.no_voice).then(|| {
        let backend = Arc::new(voice::CommandSpeech::new(&config.voice.command));
        Arc::new(voice::VoiceOutput::new(backend, &config.voice))
    });
    let client = gemini::GeminiClient::new(config.gemini.clone())?;
    let app = state::AppState::new(&config.limits, store);
    let service = service::ClassificationService::new(client, app, voice);

    match command {
        Command::Classify { object, speak } => {
            let object = object.join(" ");
            if speak {
                if let Some(voice) = service.voice() {
                    if let Err(e) = voice.unlock().await {
                        eprintln!("{e}");
                    }
                }
            }
            match service.submit(&object).await {
                Ok(outcome) => {
                    let app = service.app();
                    println!(
                        "{}",
                        console::render_outcome(
                            &outcome,
                            app.governor().count(),
                            app.governor().quota(),
                            app.theme()
                        )
                    );
                }
                Err(rejected) => eprintln!("{rejected}"),
            }
            if let Some(voice) = service.voice() {
                voice.flush().await;
            }
        }
        _ => console::Console::new(service).run().await?,
    }

    Ok(())
}
