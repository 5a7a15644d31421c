use wallabag_mirror::config::Config;
use wallabag_mirror::db::Repository;
use wallabag_mirror::error::Result;
use wallabag_mirror::remote::WallabagClient;
use wallabag_mirror::state::{StateFile, WatermarkStore};
use wallabag_mirror::sync::{SyncMode, Updater};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let requested = if args.iter().skip(1).any(|a| a == "--full") {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };

    // Load configuration
    let config = Config::load()?;

    let repository = Repository::new(&config.db_path).await?;
    let client = WallabagClient::from_config(&config)?;
    let state = StateFile::load(&config.state_path)?;

    let mode = requested.effective(state.first_sync_completed());
    if mode != requested {
        println!("No completed sync yet, running a full sync");
    }

    let mut updater = Updater::new(repository, client, state, config.page_size);
    let changes = updater.run(mode).await?;

    if changes.invalidate_all {
        println!("Rebuilt mirror: {} articles", changes.len());
    } else {
        println!("Synced {} changed articles", changes.len());
    }

    Ok(())
}
