use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hub_exports::{
    BucketName, DatasetName, ProvisionConfig, PullDescriptor, PushDescriptor, UserName, provision,
};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use utoipa::{PartialSchema, ToSchema};

/// CLI for hub-exports: render the infrastructure for push and pull datasets.
#[derive(Parser)]
#[clap(
    name = "hub-exports",
    version,
    about = "Compile push/pull dataset descriptors into a Pulumi YAML program"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the program for one stack
    Plan {
        /// Path to the provisioning config (Provision.yaml)
        #[clap(long)]
        config: PathBuf,
        /// Directory of push dataset descriptors, overriding the config
        #[clap(long)]
        push_dir: Option<PathBuf>,
        /// Directory of pull dataset descriptors, overriding the config
        #[clap(long)]
        pull_dir: Option<PathBuf>,
        /// Stack (environment) name, overriding the config
        #[clap(long)]
        stack: Option<String>,
        #[clap(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
        /// Write here instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Print the JSON schema of the dataset descriptor files
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

fn schema_entry<T: ToSchema>(schemas: &mut Map<String, Value>) -> Result<()> {
    schemas.insert(T::name().into_owned(), serde_json::to_value(T::schema())?);
    Ok(())
}

fn schemas() -> Result<String> {
    let mut schemas = Map::new();
    schema_entry::<PushDescriptor>(&mut schemas)?;
    schema_entry::<PullDescriptor>(&mut schemas)?;
    schema_entry::<DatasetName>(&mut schemas)?;
    schema_entry::<UserName>(&mut schemas)?;
    schema_entry::<BucketName>(&mut schemas)?;
    Ok(serde_json::to_string_pretty(&Value::Object(schemas))?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let rendered = match cli.command {
        Commands::Plan {
            config,
            push_dir,
            pull_dir,
            stack,
            format,
            output,
        } => {
            let mut config = ProvisionConfig::from_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            if let Some(push_dir) = push_dir {
                config.push_dir = push_dir;
            }
            if let Some(pull_dir) = pull_dir {
                config.pull_dir = pull_dir;
            }
            if let Some(stack) = stack {
                config.stack = stack;
            }

            let program = provision(&config)
                .with_context(|| format!("provisioning stack {}", config.stack))?;
            let rendered = match format {
                Format::Yaml => program.to_yaml()?,
                Format::Json => program.to_json()?,
            };
            match output {
                Some(path) => {
                    fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(event = "Plan", phase = "Written", path = ?path);
                    return Ok(());
                }
                None => rendered,
            }
        }
        Commands::Schema => schemas()?,
    };

    println!("{rendered}");
    Ok(())
}
