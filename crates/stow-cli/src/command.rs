//! Subcommands and their execution.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use futures::TryStreamExt;
use jiff::SignedDuration;
use stow_storage::Storage;
use stow_storage::delegation::DelegatedAccess;
use tokio::io::AsyncWriteExt;

use crate::TRACING_TARGET_COMMAND;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List buckets.
    Buckets,

    /// Create a bucket if it does not exist.
    Mb { bucket: String },

    /// Remove a bucket.
    Rb {
        bucket: String,
        /// Delete every object in the bucket first.
        #[arg(long)]
        recursive: bool,
    },

    /// List objects, optionally under a key prefix.
    Ls {
        bucket: String,
        prefix: Option<String>,
    },

    /// Upload a local file.
    Put {
        bucket: String,
        key: String,
        file: PathBuf,
        /// Replace the object if it already exists.
        #[arg(long)]
        overwrite: bool,
    },

    /// Download an object into a local file.
    Get {
        bucket: String,
        key: String,
        file: PathBuf,
    },

    /// Write an object to stdout.
    Cat { bucket: String, key: String },

    /// Delete an object.
    Rm { bucket: String, key: String },

    /// Copy an object server-side.
    Cp {
        src_bucket: String,
        src_key: String,
        dst_bucket: String,
        dst_key: String,
    },

    /// Print a presigned URL for the external endpoint.
    Presign {
        bucket: String,
        key: String,
        /// URL lifetime in seconds.
        #[arg(long, default_value_t = 3600, allow_negative_numbers = true)]
        ttl_secs: i64,
        /// Sign an upload instead of a download.
        #[arg(long)]
        put: bool,
    },

    /// Copy a bucket into the archive bucket.
    Archive {
        bucket: String,
        /// Only archive keys under this prefix.
        #[arg(long)]
        prefix: Option<String>,
        /// Keep the source objects.
        #[arg(long)]
        keep: bool,
    },

    /// Print delegated credentials as JSON.
    Delegate {
        bucket: String,
        /// Scope the credentials to downloading this key instead of uploading.
        #[arg(long, value_name = "KEY")]
        download: Option<String>,
    },
}

impl Command {
    /// Returns the subcommand name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buckets => "buckets",
            Self::Mb { .. } => "mb",
            Self::Rb { .. } => "rb",
            Self::Ls { .. } => "ls",
            Self::Put { .. } => "put",
            Self::Get { .. } => "get",
            Self::Cat { .. } => "cat",
            Self::Rm { .. } => "rm",
            Self::Cp { .. } => "cp",
            Self::Presign { .. } => "presign",
            Self::Archive { .. } => "archive",
            Self::Delegate { .. } => "delegate",
        }
    }

    /// Runs the subcommand, writing results to stdout.
    pub async fn execute(self, storage: &Storage) -> anyhow::Result<()> {
        tracing::debug!(
            target: TRACING_TARGET_COMMAND,
            command = self.name(),
            "Running command"
        );

        match self {
            Self::Buckets => {
                for bucket in storage.list_buckets().await? {
                    match bucket.created {
                        Some(created) => println!("{created}\t{}", bucket.name),
                        None => println!("-\t{}", bucket.name),
                    }
                }
            }
            Self::Mb { bucket } => {
                storage.ensure_bucket(&bucket).await?;
            }
            Self::Rb { bucket, recursive } => {
                storage
                    .remove_bucket(&bucket, recursive)
                    .await
                    .with_context(|| format!("cannot remove bucket `{bucket}`"))?;
            }
            Self::Ls { bucket, prefix } => {
                let mut objects = storage
                    .list_objects(&bucket, prefix.as_deref().unwrap_or_default())
                    .await?;
                while let Some(object) = objects.try_next().await? {
                    println!("{:>12}\t{}", object.size, object.key);
                }
            }
            Self::Put {
                bucket,
                key,
                file,
                overwrite,
            } => {
                storage.ensure_bucket(&bucket).await?;
                let object = storage
                    .upload_file(&bucket, &key, &file, overwrite)
                    .await
                    .with_context(|| format!("cannot upload `{}`", file.display()))?;
                println!("{}\t{}", object.size, object.etag.unwrap_or_default());
            }
            Self::Get { bucket, key, file } => {
                let written = storage
                    .download_file(&bucket, &key, &file)
                    .await
                    .with_context(|| format!("cannot download `{key}`"))?;
                println!("{written}");
            }
            Self::Cat { bucket, key } => {
                let data = storage.get_object(&bucket, &key).await?;
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&data).await?;
                stdout.flush().await?;
            }
            Self::Rm { bucket, key } => {
                storage.delete_object(&bucket, &key).await?;
            }
            Self::Cp {
                src_bucket,
                src_key,
                dst_bucket,
                dst_key,
            } => {
                storage
                    .copy_object(&src_bucket, &src_key, &dst_bucket, &dst_key)
                    .await?;
            }
            Self::Presign {
                bucket,
                key,
                ttl_secs,
                put,
            } => {
                let ttl = SignedDuration::from_secs(ttl_secs);
                let url = if put {
                    storage.presigned_put_url(&bucket, &key, ttl).await?
                } else {
                    storage.presigned_get_url(&bucket, &key, ttl).await?
                };
                println!("{url}");
            }
            Self::Archive {
                bucket,
                prefix,
                keep,
            } => {
                let archived = storage
                    .archive_bucket(&bucket, prefix.as_deref(), !keep)
                    .await?;
                println!("{archived}");
            }
            Self::Delegate { bucket, download } => {
                let access = match download {
                    Some(key) => DelegatedAccess::Download { key },
                    None => DelegatedAccess::Upload,
                };
                let credentials = storage.delegated_credentials(&bucket, access).await?;
                println!("{}", serde_json::to_string_pretty(&credentials)?);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::config::Cli;

    #[test]
    fn command_names_match_subcommands() {
        let cases: [&[&str]; 12] = [
            &["stow", "buckets"],
            &["stow", "mb", "docs"],
            &["stow", "rb", "docs", "--recursive"],
            &["stow", "ls", "docs", "2024/"],
            &["stow", "put", "docs", "a.txt", "./a.txt", "--overwrite"],
            &["stow", "get", "docs", "a.txt", "./a.txt"],
            &["stow", "cat", "docs", "a.txt"],
            &["stow", "rm", "docs", "a.txt"],
            &["stow", "cp", "docs", "a.txt", "backup", "a.txt"],
            &["stow", "presign", "docs", "a.txt"],
            &["stow", "archive", "docs"],
            &["stow", "delegate", "docs", "--download", "a.txt"],
        ];

        for args in cases {
            let cli = Cli::try_parse_from(args).expect("valid arguments");
            assert_eq!(cli.command.name(), args[1]);
        }
    }

    #[test]
    fn presign_accepts_negative_ttl_for_the_library_to_reject() {
        let cli = Cli::try_parse_from(["stow", "presign", "docs", "a.txt", "--ttl-secs", "-5"])
            .expect("valid arguments");
        assert!(matches!(
            cli.command,
            super::Command::Presign { ttl_secs: -5, .. }
        ));
    }
}
