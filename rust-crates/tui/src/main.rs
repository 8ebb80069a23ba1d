use clap::Parser;
use color_eyre::eyre::{
    Result,
    eyre,
};
use flowers::store::DEFAULT_HISTORY_LIMIT;
use flowers_tui::settings::{
    SettingsStore,
    StorageMode,
    resolve_data_dir,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod client;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "little-flowers",
    about = "Track a child's flower score and rewards in the terminal"
)]
struct Args {
    /// Keep the score on this device (default unless settings say otherwise)
    #[arg(long, conflicts_with = "remote")]
    local: bool,

    /// Keep the score on a sync server at this base URL
    #[arg(long, value_name = "URL", env = "LITTLE_FLOWERS_REMOTE")]
    remote: Option<String>,

    /// Sync server profile key (defaults to "family")
    #[arg(long)]
    profile: Option<String>,

    /// Name shown on screen and stored with a new remote profile
    #[arg(long)]
    child_name: Option<String>,

    /// Data directory (defaults to ~/.little-flowers)
    #[arg(long)]
    data_dir: Option<String>,

    /// JSON catalog of items and tiers used in local mode
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Directory of `<clip>.json` frame files overriding the built-in art
    #[arg(long)]
    clips: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,
}

fn init_file_tracing(data_dir: &Path) -> Result<WorkerGuard> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, "little-flowers.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    Ok(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let data_dir = resolve_data_dir(args.data_dir.as_deref());
    let _guard = init_file_tracing(&data_dir)?;
    tracing::info!("starting little-flowers in {}", data_dir.display());

    let saved = SettingsStore::new(&data_dir)
        .load()
        .map_err(|e| eyre!("{e:#}"))?;
    let storage_mode = if args.local {
        StorageMode::Local
    } else if args.remote.is_some() {
        StorageMode::Remote
    } else {
        saved.storage_mode
    };

    let config = client::AppConfig {
        data_dir,
        storage_mode,
        remote_url: args.remote,
        profile: args.profile,
        child_name: args.child_name,
        catalog_path: args.catalog,
        clips_dir: args.clips,
        history_limit: args.history_limit,
    };
    client::run_app(config).await
}
