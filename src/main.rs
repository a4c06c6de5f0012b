// Folio headless runner
//
// Opens the database, restores the persisted tab set, opens any files
// passed on the command line, then drives the session's event loop:
// file-change notifications are filtered through the self-save tracker
// and undo restores are applied as they arrive, until ctrl-c.

use anyhow::Context;
use clap::Parser;
use folio_session::gateways::{FileSystemGateway, GatewayConfig, RealFileSystem};
use folio_session::persistence::PersistenceManager;
use folio_session::session::{SessionConfig, SessionEngine, DEFAULT_SUPPRESSION_WINDOW_MS};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    name = "folio",
    version,
    about = "A multi-document reading and annotation tool"
)]
struct Cli {
    /// Database file (defaults to ~/.folio/folio.db)
    #[clap(long, value_parser)]
    database: Option<PathBuf>,

    /// Run without any persistence
    #[clap(long)]
    no_database: bool,

    /// Self-save suppression window in milliseconds
    #[clap(long, default_value_t = DEFAULT_SUPPRESSION_WINDOW_MS)]
    suppression_window_ms: i64,

    /// Files to open as tabs
    #[clap(value_parser)]
    files: Vec<PathBuf>,
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".folio").join("folio.db"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db_path = if cli.no_database {
        None
    } else {
        let path = match cli.database {
            Some(path) => path,
            None => default_db_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        Some(path)
    };

    let (fs, mut changes) = RealFileSystem::new(GatewayConfig::default());
    let fs = Arc::new(fs);
    let persistence = Arc::new(PersistenceManager::new(db_path.as_deref()).await);

    let config = SessionConfig {
        suppression_window_ms: cli.suppression_window_ms,
    };
    let (mut engine, mut restores) = SessionEngine::new(
        fs.clone() as Arc<dyn FileSystemGateway>,
        persistence.clone(),
        config,
    );

    engine
        .restore_layout()
        .await
        .context("restoring persisted tabs")?;

    for file in &cli.files {
        let path = file.canonicalize().unwrap_or_else(|_| file.clone());
        if let Err(e) = engine.open_file(&path).await {
            warn!("Folio: could not open {}: {}", path.display(), e);
        }
    }

    info!("Folio: session ready with {} tab(s)", engine.tabs().len());
    for tab in engine.tabs() {
        info!(
            "Folio: tab {} [{}]{}",
            tab.order,
            tab.display_title(),
            if Some(tab.id.as_str()) == engine.active_tab_id() {
                " (active)"
            } else {
                ""
            }
        );
    }

    loop {
        tokio::select! {
            Some(event) = changes.recv() => {
                if let Err(e) = engine.handle_file_change(event).await {
                    warn!("Folio: change handling failed: {}", e);
                }
            }
            Some(request) = restores.recv() => {
                engine.apply_restore(request);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Folio: shutting down");
                break;
            }
        }
    }

    persistence
        .flush()
        .await
        .context("flushing pending writes")?;

    Ok(())
}
