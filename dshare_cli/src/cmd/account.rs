use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use dshare_core::{IdentityProvider, IdentityResolver, SessionEvent};
use tracing::info;

use super::App;

const LOGGED_OUT_MARKER: &str = "logged_out";

fn marker_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOGGED_OUT_MARKER)
}

/// True after `dshare logout` until the next `dshare login`.
pub fn is_logged_out(data_dir: &Path) -> bool {
    marker_path(data_dir).exists()
}

fn mark_logged_out(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = marker_path(data_dir);
    std::fs::write(&path, b"")
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Lets `dshare login` open the profile again.
pub fn clear_logged_out(data_dir: &Path) -> Result<()> {
    let path = marker_path(data_dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove {}", path.display()))
        }
    }
}

pub fn ensure_logged_in(data_dir: &Path) -> Result<()> {
    if is_logged_out(data_dir) {
        bail!("logged out; run `dshare login` to sign in again");
    }
    Ok(())
}

pub async fn whoami(app: &App) -> Result<()> {
    let profile = app.session.fetch_user_details().await?;
    println!("email:      {}", profile.email);
    if let Some(name) = &profile.name {
        println!("name:       {name}");
    }
    println!("address:    {}", profile.address());
    println!("public key: {}", profile.public_key.to_hex());
    Ok(())
}

pub async fn lookup(app: &App, email: &str) -> Result<()> {
    let resolver = IdentityResolver::new(app.client.clone());
    let recipient = resolver.resolve_address(email).await?;
    println!("{}", recipient.address);
    Ok(())
}

/// Ends the session and keeps the profile logged out across invocations.
pub async fn logout(app: &App, data_dir: &Path) -> Result<()> {
    let mut events = app.client.subscribe();
    app.session.logout().await?;
    // let the session watcher report the disconnect before exiting
    if let Ok(SessionEvent::Disconnect) = events.recv().await {
        tokio::task::yield_now().await;
    }
    mark_logged_out(data_dir)?;
    info!("logged out");
    Ok(())
}
