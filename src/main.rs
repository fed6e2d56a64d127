use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use closet_quest::config::AppConfig;
use closet_quest::{api, db, render};

#[derive(Parser)]
#[command(name = "cq")]
#[command(about = "Gamified closet organizing quest")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the stage map with saved progress
    Status,
    /// Show obtained items and experience
    Ledger,
    /// Forget all saved progress and start the quest over
    Reset,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "closet_quest=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(config: &AppConfig) -> anyhow::Result<db::Database> {
    let db = match &config.database_path {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;
    tracing::debug!("Save file at schema {:?}", db.schema_version()?);
    Ok(db)
}

async fn serve(config: AppConfig, port: u16) -> anyhow::Result<()> {
    let db = open_database(&config)?;
    let state = api::AppState::from_database(db, config.persistence_policy())?
        .with_audio(config.audio_settings());
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Closet quest listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::load();

    match cli.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(config.port);
            serve(config, port).await?;
        }
        Some(Commands::Status) => {
            let db = open_database(&config)?;
            let state = api::AppState::from_database(db, config.persistence_policy())?;
            let engine = state.engine.lock().expect("engine lock poisoned");
            print!("{}", render::render_stage_map(&engine.summaries()));
        }
        Some(Commands::Ledger) => {
            let db = open_database(&config)?;
            let state = api::AppState::from_database(db, config.persistence_policy())?;
            let engine = state.engine.lock().expect("engine lock poisoned");
            print!("{}", render::render_ledger(&engine.ledger_summary()));
        }
        Some(Commands::Reset) => {
            let db = open_database(&config)?;
            let removed = db.clear_completions()?;
            println!("Cleared {} saved stage completion(s)", removed);
        }
        None => {
            let port = config.port;
            serve(config, port).await?;
        }
    }

    Ok(())
}
