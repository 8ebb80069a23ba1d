use anyhow::Context;
use clap::Parser;
use flowers::{
    Catalog,
    store::DEFAULT_HISTORY_LIMIT,
};
use std::{
    env::current_dir,
    fs,
    path::PathBuf,
};
use sync_server::{
    app::{
        App,
        RunState,
        actix_query_api::{
            ActixQueryApi,
            DEFAULT_HOST,
        },
        sled_profile_storage::SledProfileStorage,
    },
    init_tracing,
};

#[derive(Parser, Debug)]
#[command(version, about = "Little Flowers sync server", long_about = None)]
struct Args {
    /// Address to listen on; use 0.0.0.0 to serve other devices
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the sled database (default: ./little_flowers_server_data)
    #[arg(long)]
    data_dir: Option<String>,

    /// JSON catalog to serve instead of the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,

    #[arg(short, long, default_value = "false")]
    tracing: bool,
}

async fn handle_interupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }

    let data_dir = match &args.data_dir {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => current_dir()
            .context("determine process working directory")?
            .join("little_flowers_server_data"),
    };
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    tracing::info!("Using sled storage directory {}", data_dir.display());

    let catalog = match &args.catalog {
        Some(path) => {
            let catalog = Catalog::from_json_file(path)
                .with_context(|| format!("loading catalog {}", path.display()))?;
            tracing::info!("Serving catalog from {}", path.display());
            catalog
        }
        None => Catalog::builtin(),
    };

    let profiles = SledProfileStorage::open(data_dir.join("store"), args.history_limit)?;
    let api = ActixQueryApi::bind(&args.host, args.port).await?;
    let mut app = App::new(api, profiles, catalog);

    tracing::info!("Starting sync server");
    loop {
        let interrupt = handle_interupt();
        match app.run(interrupt).await? {
            RunState::Continue => continue,
            RunState::Exit => {
                tracing::info!("Exiting sync server");
                return Ok(());
            }
        }
    }
}
