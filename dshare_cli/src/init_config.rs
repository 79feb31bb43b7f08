use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use clap::Subcommand;
use dshare_core::keys::generate_seed_phrase;
use toml_edit::{DocumentMut, Item, Table};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the profile config if it doesn't exist and generates a seed phrase
    Init {
        /// Email the account is registered under
        #[arg(long)]
        email: String,
    },
}

fn table<'a>(doc: &'a mut DocumentMut, key: &str) -> anyhow::Result<&'a mut Table> {
    doc.entry(key)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .ok_or_else(|| anyhow!("`{key}` in config file is not a table"))
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path {} is not valid UTF-8", path.display()))
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf, local_data_dir: &Path) -> anyhow::Result<()> {
        let config_dir = config_file
            .parent()
            .context("config file has no parent directory")?;
        let mut doc = if config_file.exists() {
            fs::read_to_string(&config_file)?
        } else {
            fs::create_dir_all(config_dir)?;
            "".to_owned()
        }
        .parse::<DocumentMut>()
        .context("could not parse config file")?;

        match self {
            Self::Init { email } => {
                let seed_file = config_file.with_extension("seed");
                let seed_file_name = seed_file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .context("invalid seed phrase file name")?
                    .to_owned();

                let identity = table(&mut doc, "identity")?;
                identity.insert("email", email.trim().into());
                identity.insert("seed_phrase_file", seed_file_name.into());

                let backend = table(&mut doc, "backend")?;
                if !backend.contains_key("ledger_path") {
                    let ledger_path = local_data_dir.join("ledger");
                    backend.insert("ledger_path", path_str(&ledger_path)?.into());
                }
                if !backend.contains_key("blob_path") {
                    let blob_path = local_data_dir.join("blobs");
                    backend.insert("blob_path", path_str(&blob_path)?.into());
                }

                if !seed_file.exists() {
                    info!("generating seed phrase for {}", email.trim());
                    let phrase = generate_seed_phrase()?;
                    fs::write(&seed_file, format!("{phrase}\n"))?;
                }
            }
        }

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DshareConfig;
    use dshare_core::keys::validate_seed_phrase;

    #[test]
    fn init_writes_loadable_config_and_seed() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config").join("local.toml");
        let data_dir = dir.path().join("data");

        CmdConfig::Init {
            email: " bob@example.com ".into(),
        }
        .run(config_file.clone(), &data_dir)
        .unwrap();

        let config = DshareConfig::load(&config_file).unwrap();
        assert_eq!(config.identity.email, "bob@example.com");
        assert_eq!(config.backend.ledger_path, data_dir.join("ledger"));
        let phrase = config.read_seed_phrase(&config_file).unwrap();
        assert!(validate_seed_phrase(&phrase));
    }

    #[test]
    fn init_keeps_user_edits_and_seed() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("local.toml");
        let data_dir = dir.path().join("data");

        CmdConfig::Init {
            email: "bob@example.com".into(),
        }
        .run(config_file.clone(), &data_dir)
        .unwrap();
        let seed_before = fs::read_to_string(config_file.with_extension("seed")).unwrap();

        let edited = fs::read_to_string(&config_file).unwrap()
            + "\n# my limits\n[limits]\ntotal_storage = 1024\n";
        fs::write(&config_file, edited).unwrap();

        CmdConfig::Init {
            email: "robert@example.com".into(),
        }
        .run(config_file.clone(), &data_dir)
        .unwrap();

        let raw = fs::read_to_string(&config_file).unwrap();
        assert!(raw.contains("# my limits"));
        let config = DshareConfig::load(&config_file).unwrap();
        assert_eq!(config.identity.email, "robert@example.com");
        assert_eq!(config.limits.total_storage, 1024);
        assert_eq!(
            fs::read_to_string(config_file.with_extension("seed")).unwrap(),
            seed_before
        );
    }
}
