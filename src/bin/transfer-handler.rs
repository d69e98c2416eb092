use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use hub_exports::{HandlerConfig, function_handler};
use lambda_runtime::{Error, run, service_fn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .without_time()
        .init();

    let config = HandlerConfig::from_env()?;
    tracing::info!(
        event = "Startup",
        phase = "Config",
        targets = ?config.targets,
        semantics = %config.semantics
    );

    let shared_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = S3Client::new(&shared_config);
    run(service_fn(|event| function_handler(event, &s3_client, &config))).await
}
