//! revdeploy - publish build artifacts as revisions and activate them

mod config;
mod deploy;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config::DeployConfig;
use deploy::{Deployer, RevisionSource};
use revdeploy_core::KvBackend;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "revdeploy")]
#[command(author = "revdeploy Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Upload build artifacts as revisions and activate them", long_about = None)]
struct Cli {
    /// Deploy config file (default: config/deploy/<target>.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Deploy target, e.g. production
    target: String,

    /// Revision tag to upload under
    #[arg(short, long)]
    revision: Option<String>,

    /// Tag the upload with the SHA-256 of its contents when no revision is given
    #[arg(long)]
    content_hash: bool,

    /// Replace an existing artifact with the same tag
    #[arg(long)]
    allow_overwrite: bool,
}

impl UploadArgs {
    fn source(&self) -> RevisionSource<'_> {
        if self.content_hash {
            RevisionSource::ContentHash(self.revision.as_deref())
        } else {
            RevisionSource::Given(self.revision.as_deref())
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload the build artifact as a new revision
    Upload(UploadArgs),

    /// Make an uploaded revision the current one
    Activate {
        target: String,
        #[arg(short, long)]
        revision: String,
    },

    /// Upload, and optionally activate, in one step
    Deploy {
        #[command(flatten)]
        upload: UploadArgs,

        /// Activate the revision once uploaded
        #[arg(long)]
        activate: bool,
    },

    /// List recent revisions, marking the current one
    Revisions { target: String },

    /// Show the current revision
    Current { target: String },
}

impl Commands {
    fn target(&self) -> &str {
        match self {
            Commands::Upload(args) | Commands::Deploy { upload: args, .. } => &args.target,
            Commands::Activate { target, .. }
            | Commands::Revisions { target }
            | Commands::Current { target } => target,
        }
    }

    fn allow_overwrite(&self) -> bool {
        match self {
            Commands::Upload(args) | Commands::Deploy { upload: args, .. } => args.allow_overwrite,
            _ => false,
        }
    }
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let target = cli.command.target().to_string();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| DeployConfig::path_for_target(&target));

    let mut config = DeployConfig::load(&config_path)?;
    if cli.command.allow_overwrite() {
        config.store.allow_overwrite = true;
    }

    let backend: Box<dyn KvBackend> = config.backend.open()?;
    let deployer = Deployer::new(target, config, backend)?;

    match &cli.command {
        Commands::Upload(args) => {
            let uploaded = deployer.upload(args.source()).await?;
            println!("{}", uploaded.key);
        }

        Commands::Activate { revision, .. } => {
            deployer.activate(revision).await?;
        }

        Commands::Deploy { upload, activate } => {
            if let Some(message) = deployer.deploy(upload.source(), *activate).await? {
                println!("{}", message);
            }
        }

        Commands::Revisions { .. } => {
            let revisions = deployer.revisions().await?;
            if revisions.is_empty() {
                println!("No revisions uploaded");
            }
            for summary in revisions {
                let marker = if summary.active { "*" } else { " " };
                println!("{} {}", marker, summary.revision);
            }
        }

        Commands::Current { .. } => match deployer.current().await? {
            Some(revision) => println!("{}", revision),
            None => println!("No revision activated"),
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
