mod commands;
mod config;
mod domain;
mod infrastructure;
mod services;

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use commands::Action;
use commands::now_playing::render_card;
use config::{Config, parse_url};
use infrastructure::frame::{BrowserNavigator, JsonFrameHost, RedirectAddress};
use infrastructure::spotify::SpotifyClient;
use infrastructure::token_file::FileCredentialStore;
use services::credential_store::{CredentialStore, MemoryCredentialStore};
use services::fetcher::NowPlayingFetcher;
use services::session::SessionController;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Shows the track you are listening to, or the one you played last.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Address the view was loaded at, including any OAuth redirect fragment
    #[arg(long, default_value = "about:blank")]
    redirect: String,
    /// Where the access token is persisted
    #[arg(long)]
    token_path: Option<PathBuf>,
    /// Backend route that starts the authorization redirect
    #[arg(long)]
    login_url: Option<String>,
    /// Keep the access token in memory for this run only
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = cli.token_path {
        config.token_path = path;
    }
    if let Some(login_url) = cli.login_url.as_deref() {
        config.login_url = parse_url("--login-url", login_url)?;
    }
    let mut address = RedirectAddress::new(parse_url("--redirect", &cli.redirect)?);

    let http_client = reqwest::Client::new();
    let spotify = SpotifyClient::new(http_client, config.api_base.clone());
    let store: Box<dyn CredentialStore> = if cli.ephemeral {
        tracing::info!("Token slot: in memory");
        Box::new(MemoryCredentialStore::new())
    } else {
        let store = FileCredentialStore::new(&config.token_path);
        tracing::info!("Token slot: {}", store.path().display());
        Box::new(store)
    };

    let session = SessionController::new(
        store,
        NowPlayingFetcher::new(spotify),
        config.login_url.clone(),
    );

    let mut rx = session.subscribe();
    let render = tokio::spawn(async move {
        loop {
            let card = render_card(&rx.borrow_and_update());
            println!("{card}\n");
            if rx.changed().await.is_err() {
                break;
            }
        }
    });

    let host = JsonFrameHost::new(std::io::stdout());
    session.mount(&mut address, &host).await;
    tracing::info!(phase = ?session.phase(), "Mounted at {}", address.url());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Action::parse(&line) {
            Some(Action::Refresh) => session.refresh().await,
            Some(Action::Connect) => {
                if let Err(e) = session.connect(&BrowserNavigator) {
                    tracing::warn!("{e}");
                }
            }
            Some(Action::Quit) => break,
            None => tracing::warn!("Unknown action {:?}; use r, c or q", line.trim()),
        }
    }

    drop(session);
    if let Err(e) = render.await {
        tracing::warn!("Render task failed: {e}");
    }
    Ok(())
}
