use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dshare_backend::{Backend, Client};
use dshare_core::{FileRegistry, LoginMethod, Session, Signals, TransferCoordinator};
use dshare_ledger_redb::RedbLedger;
use dshare_store_local::LocalStore;
use tracing::debug;

use crate::config::DshareConfig;
use crate::console::ConsoleSignals;

mod account;
mod files;

/// Everything a logged-in command needs.
pub struct App {
    pub client: Arc<Client>,
    pub session: Arc<Session>,
    pub coordinator: TransferCoordinator,
}

impl App {
    /// Opens the profile's backend, logs in with its seed phrase and loads the
    /// file listings.
    pub async fn open(config_file: &Path, config: &DshareConfig) -> Result<Self> {
        let blobs = Arc::new(LocalStore::new(&config.backend.blob_path));
        let ledger = Arc::new(
            RedbLedger::open(&config.backend.ledger_path).with_context(|| {
                format!(
                    "failed to open ledger at {}",
                    config.backend.ledger_path.display()
                )
            })?,
        );
        let backend = Arc::new(Backend::new(blobs, ledger).with_limits(config.limits.quota()));
        let client = Arc::new(Client::new(backend));

        let registry = Arc::new(FileRegistry::new());
        let signals = Signals::from_shared(Arc::new(ConsoleSignals::default()));

        let session = Session::new(client.clone(), registry.clone(), signals.clone());
        session.init();

        let phrase = config.read_seed_phrase(config_file)?;
        session
            .login(LoginMethod::SeedPhrase {
                email: config.identity.email.clone(),
                phrase,
            })
            .await?;
        debug!(email = %config.identity.email, "logged in");

        let coordinator =
            TransferCoordinator::new(client.clone(), client.clone(), registry, signals)
                .with_limits(config.limits.transfer());
        coordinator.refresh_mine().await?;
        coordinator.refresh_shared().await?;

        Ok(Self {
            client,
            session,
            coordinator,
        })
    }
}

/// Loads the profile and opens it, unless it was logged out.
async fn open_profile(config_file: &Path, data_dir: &Path) -> Result<App> {
    let config = DshareConfig::load(config_file)?;
    account::ensure_logged_in(data_dir)?;
    App::open(config_file, &config).await
}

pub async fn run_command(
    config_file: PathBuf,
    data_dir: &Path,
    cmd: crate::Commands,
) -> Result<()> {
    use crate::Commands;

    let open = || open_profile(&config_file, data_dir);
    match cmd {
        Commands::Config { cmd } => cmd.run(config_file.clone(), data_dir),
        Commands::Login => {
            account::clear_logged_out(data_dir)?;
            account::whoami(&open().await?).await
        }
        Commands::Whoami => account::whoami(&open().await?).await,
        Commands::Lookup { email } => account::lookup(&open().await?, &email).await,
        Commands::Logout => account::logout(&open().await?, data_dir).await,
        Commands::Ls => {
            files::list_mine(&open().await?);
            Ok(())
        }
        Commands::Shared => {
            files::list_shared(&open().await?);
            Ok(())
        }
        Commands::Quota => files::quota(&open().await?).await,
        Commands::Upload { path } => files::upload(&open().await?, &path).await,
        Commands::Download { did, out } => files::download(&open().await?, &did, &out).await,
        Commands::Share { did, email } => files::share(&open().await?, &did, &email).await,
        Commands::Revoke { did, address } => {
            files::revoke(&open().await?, &did, &address).await
        }
        Commands::Grantees { did } => files::grantees(&open().await?, &did).await,
        Commands::Transfer { did, email } => {
            files::transfer(&open().await?, &did, &email).await
        }
        Commands::Rm { did } => files::remove(&open().await?, &did).await,
    }
}
