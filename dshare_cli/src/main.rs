use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use dshare_core::WorkflowError;
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;
mod config;
mod console;
mod helpers;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which local profile (account + storage) this command runs as
    #[arg(short, long, value_name = "NAME", default_value = "local")]
    profile: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the profile's config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Sign in again after `logout` and show the account
    Login,
    /// Show the logged-in account and its address
    Whoami,
    /// Resolve an email to its recipient address
    Lookup { email: String },
    /// List files you own
    Ls,
    /// List files shared with you
    Shared,
    /// Show storage and bandwidth usage
    Quota,
    /// Upload a local file
    Upload { path: PathBuf },
    /// Download a file you own or were granted
    Download {
        /// File id (hex BLAKE3 hash)
        did: String,
        /// Output file path
        #[arg(long)]
        out: PathBuf,
    },
    /// Grant another account read access to a file
    Share { did: String, email: String },
    /// Revoke a previously granted address
    Revoke {
        did: String,
        /// Recipient address (0x followed by 40 hex digits)
        address: String,
    },
    /// List addresses a file is shared with
    Grantees { did: String },
    /// Hand a file over to another account
    Transfer { did: String, email: String },
    /// Delete a file
    Rm { did: String },
    /// End the session; other commands refuse to run until `login`
    Logout,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Use a simple layout for configs and data:
    // - Configs under:  ~/.config/dshare/<profile>.toml
    // - Data under:     ~/.local/share/dshare/<profile>/
    let dirs = ProjectDirs::from("", "", "dshare")
        .context("failed to determine config directory path")?;

    let config_file = dirs
        .config_dir()
        .join(&cli.profile)
        .with_extension("toml");
    let data_dir = dirs.data_dir().join(&cli.profile);

    cmd::run_command(config_file, &data_dir, cli.cmd).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        // workflow failures were already reported by the console surface
        Err(err) if err.is::<WorkflowError>() => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn every_command_parses_to_its_own_variant() {
        let cli = Cli::try_parse_from(["dshare", "-p", "work", "rm", "abc"]).unwrap();
        assert_eq!(cli.profile, "work");
        assert!(matches!(cli.cmd, Commands::Rm { did } if did == "abc"));

        let cli = Cli::try_parse_from(["dshare", "download", "abc", "--out", "x.bin"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Commands::Download { did, out } if did == "abc" && out == PathBuf::from("x.bin")
        ));

        let cli = Cli::try_parse_from(["dshare", "login"]).unwrap();
        assert!(matches!(cli.cmd, Commands::Login));
        assert_eq!(cli.profile, "local");

        assert!(Cli::try_parse_from(["dshare", "share", "abc"]).is_err());
    }
}
