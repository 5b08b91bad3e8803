//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── storage: StorageConfig   # backend, endpoints, keys, STS
//! └── command: Command         # the operation to run
//! ```
//!
//! Storage options can be given as arguments or environment variables.
//!
//! ```bash
//! S3_ENDPOINT=http://localhost:9000 S3_ACCESS_KEY=minioadmin \
//!     S3_SECRET_KEY=minioadmin stow ls reports 2024/
//! ```

use std::process;

use clap::Parser;
use stow_storage::StorageConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::TRACING_TARGET_STARTUP;
use crate::command::Command;

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "stow")]
#[command(about = "Move objects in and out of Minio or AWS S3")]
#[command(version)]
pub struct Cli {
    /// Storage backend configuration.
    #[clap(flatten)]
    pub storage: StorageConfig,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Loads the .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so clap picks its values up as
    /// environment defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing on stderr with environment-based filtering.
    ///
    /// Stdout is reserved for command output.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    /// Logs build information and the selected command at debug level.
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            features = ?Self::enabled_features(),
            command = self.command.name(),
            "Build information"
        );

        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            config = ?self.storage,
            "Storage configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_presign_options() {
        let cli = Cli::try_parse_from([
            "stow",
            "--s3-endpoint",
            "http://localhost:9000",
            "presign",
            "docs",
            "a.txt",
            "--ttl-secs",
            "120",
            "--put",
        ])
        .expect("valid arguments");

        assert_eq!(
            cli.storage.s3_endpoint.as_deref(),
            Some("http://localhost:9000")
        );
        match cli.command {
            Command::Presign {
                bucket,
                key,
                ttl_secs,
                put,
            } => {
                assert_eq!((bucket.as_str(), key.as_str()), ("docs", "a.txt"));
                assert_eq!(ttl_secs, 120);
                assert!(put);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn archive_deletes_sources_unless_kept() {
        let cli = Cli::try_parse_from(["stow", "archive", "project", "--prefix", "old/"])
            .expect("valid arguments");
        assert!(matches!(
            cli.command,
            Command::Archive { keep: false, ref prefix, .. } if prefix.as_deref() == Some("old/")
        ));

        let cli = Cli::try_parse_from(["stow", "archive", "project", "--keep"])
            .expect("valid arguments");
        assert!(matches!(cli.command, Command::Archive { keep: true, .. }));
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["stow"]).is_err());
    }
}
