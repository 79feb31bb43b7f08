use std::path::Path;

use anyhow::{Context, Result};
use dshare_core::{UploadBody, UploadSource};
use tokio_util::io::ReaderStream;

use super::App;
use crate::helpers::{file_line, parse_address, parse_did, quota_lines};

async fn upload_source(path: &Path) -> Result<UploadSource> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let size = file.metadata().await?.len();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let body: UploadBody = Box::new(ReaderStream::new(file));
    Ok(UploadSource::new(name, size, body))
}

pub fn list_mine(app: &App) {
    for file in app.coordinator.registry().mine() {
        println!("{}", file_line(&file));
    }
}

pub fn list_shared(app: &App) {
    for shared in app.coordinator.registry().shared() {
        println!("{}  from {}", file_line(&shared.file), shared.owner);
    }
}

pub async fn quota(app: &App) -> Result<()> {
    let quota = app.coordinator.refresh_quota().await?;
    for line in quota_lines(&quota) {
        println!("{line}");
    }
    Ok(())
}

pub async fn upload(app: &App, path: &Path) -> Result<()> {
    let source = upload_source(path).await?;
    let file = app.coordinator.upload(source).await?;
    println!("{}", file.id);
    Ok(())
}

pub async fn download(app: &App, did: &str, out: &Path) -> Result<()> {
    let did = parse_did(did)?;
    let bytes = app.coordinator.download(&did).await?;
    tokio::fs::write(out, &bytes)
        .await
        .with_context(|| format!("failed to write to {}", out.display()))?;
    println!("downloaded {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

pub async fn share(app: &App, did: &str, email: &str) -> Result<()> {
    let did = parse_did(did)?;
    let recipient = app.coordinator.share(&did, email).await?;
    println!("granted {}", recipient.address);
    Ok(())
}

pub async fn revoke(app: &App, did: &str, address: &str) -> Result<()> {
    let did = parse_did(did)?;
    let address = parse_address(address)?;
    app.coordinator.revoke(&did, &address).await?;
    Ok(())
}

pub async fn grantees(app: &App, did: &str) -> Result<()> {
    let did = parse_did(did)?;
    for address in app.coordinator.list_grantees(&did).await? {
        println!("{address}");
    }
    Ok(())
}

pub async fn transfer(app: &App, did: &str, email: &str) -> Result<()> {
    let did = parse_did(did)?;
    let recipient = app.coordinator.transfer_ownership(&did, email).await?;
    println!("new owner {}", recipient.address);
    Ok(())
}

pub async fn remove(app: &App, did: &str) -> Result<()> {
    let did = parse_did(did)?;
    app.coordinator.delete_file(&did).await?;
    Ok(())
}
