// lecture-dl - Course Media Downloader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use lecture_dl::crypto::widevine::extract_key_id;
use lecture_dl::download::{
    interrupt_signal, DownloadConfig, DownloadContext, DownloadSummary, DownloadTarget,
    Downloadable, EncryptedStream, MediaKind, ProgressCallback, TransferProgress,
};
use lecture_dl::error::DownloadError;
use lecture_dl::pipeline::decrypt_all_sources;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl-C (128 + SIGINT)
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Parser)]
#[command(name = "lecture-dl")]
#[command(about = "Resumable course-media downloader", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keyfile mapping key-IDs to keys (overrides the config)
    #[arg(short, long, global = true)]
    keyfile: Option<PathBuf>,

    /// Keep encrypted tracks after remuxing
    #[arg(long, global = true)]
    keep_encrypted: bool,

    /// Download DRM-protected lectures without decrypting them
    #[arg(long, global = true)]
    no_decrypt: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a single file
    Fetch {
        url: String,
        /// plain-stream, hls-stream, asset, subtitle or external-link
        #[arg(short = 't', long, default_value = "plain-stream")]
        kind: MediaKind,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Title used for the filename
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "mp4")]
        ext: String,
        /// Subtitle language (subtitle targets only)
        #[arg(long, default_value = "en")]
        language: String,
        /// Bearer token sent with the request
        #[arg(long)]
        token: Option<String>,
    },
    /// Download, decrypt and remux one DRM-protected lecture
    Lecture {
        /// Stream manifest URL
        url: String,
        #[arg(short, long, default_value = "bv+ba")]
        format_id: String,
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Finish every encrypted lecture left under a directory
    DecryptAll { root: PathBuf },
    /// Print the Widevine key-ID of a container
    Kid { path: PathBuf },
    /// Check that the external tools are installed
    CheckTools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<DownloadError>() {
            Some(DownloadError::Interrupted) => {
                eprintln!("\nUser Interrupted..");
                ExitCode::from(INTERRUPTED_EXIT_CODE)
            }
            Some(download_error) => {
                eprintln!("Error: {}", download_error.user_message());
                ExitCode::FAILURE
            }
            None => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn load_config(cli: &Cli) -> anyhow::Result<DownloadConfig> {
    let mut config = match &cli.config {
        Some(path) => DownloadConfig::from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => DownloadConfig::default(),
    };
    if cli.keyfile.is_some() {
        config.keyfile = cli.keyfile.clone();
    }
    config.keep_encrypted |= cli.keep_encrypted;
    if cli.no_decrypt {
        config.decrypt = false;
    }
    Ok(config)
}

fn progress_printer() -> ProgressCallback {
    Arc::new(|p: TransferProgress| {
        let mut err = std::io::stderr();
        let _ = write!(err, "\r{}    \r", p.display_string());
        let _ = err.flush();
    })
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli).await?;

    match cli.command {
        Commands::Fetch {
            url,
            kind,
            output,
            name,
            ext,
            language,
            token,
        } => {
            let mut target = match kind {
                MediaKind::Subtitle => DownloadTarget::subtitle(&url, &output, &name, &language, &ext)?,
                other => DownloadTarget::new(other, &url, &output, &name, &ext)?,
            };
            if let Some(token) = token {
                target = target.with_token(token);
            }

            let context = DownloadContext::from_config(config).await?;
            let queue = context.queue().with_progress(progress_printer());
            let summary = queue.run(&[Downloadable::from(target)]).await?;
            report(&summary);
            Ok(exit_code(summary.failed.is_empty() && summary.incomplete == 0))
        }
        Commands::Lecture {
            url,
            format_id,
            title,
            output,
        } => {
            let stream = EncryptedStream::new(&url, &format_id, &title, &output)?;
            let context = DownloadContext::from_config(config).await?;
            let summary = context.queue().run(&[Downloadable::from(stream)]).await?;
            report(&summary);
            Ok(exit_code(summary.failed.is_empty()))
        }
        Commands::DecryptAll { root } => {
            let context = DownloadContext::from_config(config).await?;
            if context.keys.is_empty() {
                bail!("no keys loaded; pass --keyfile with at least one key");
            }
            let pipeline = context.pipeline();
            let summary = tokio::select! {
                summary = decrypt_all_sources(&pipeline, &root) => summary?,
                _ = interrupt_signal() => return Err(DownloadError::Interrupted.into()),
            };
            println!(
                "{} completed, {} failed, {} intermediates removed",
                summary.completed, summary.failed, summary.removed_intermediates
            );
            Ok(exit_code(summary.failed == 0))
        }
        Commands::Kid { path } => {
            match extract_key_id(&path).await? {
                Some(kid) => println!("{}", kid),
                None => println!("not encrypted"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckTools => {
            let mut all_present = true;
            for (tool, available) in config.tools.check_available().await {
                if available {
                    println!("> {} found", tool);
                } else {
                    println!("> {} is missing from your system or path!", tool);
                    all_present = false;
                }
            }
            Ok(exit_code(all_present))
        }
    }
}

fn report(summary: &DownloadSummary) {
    for (label, reason) in &summary.failed {
        eprintln!("> {}: {}", label, reason);
    }
    if summary.retryable > 0 {
        eprintln!("> {} failed download(s) may succeed if you run again", summary.retryable);
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
