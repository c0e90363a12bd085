use anyhow::Context;
use clap::Parser;
use ingestd::config::Args;
use ingestd::consumer::Consumer;
use ingestd::processor::Processor;
use ingestd::reaper::Reaper;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Deadline for in-flight work after a shutdown signal.
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

fn main() -> Result<(), anyhow::Error> {
    // Use reasonable defaults for printing structured logs to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let args = Args::parse();
    tracing::info!(?args, "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let task = runtime.spawn(async move { async_main(args).await });
    let result = runtime.block_on(task);

    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    result?
}

async fn async_main(args: Args) -> Result<(), anyhow::Error> {
    let pg_options = args
        .database_url
        .as_str()
        .parse::<sqlx::postgres::PgConnectOptions>()
        .context("parsing database URL")?
        .application_name("ingestd");

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect_with(pg_options)
        .await
        .context("connecting to database")?;

    // Startup enforces the signing-key invariant: exactly one active key
    // exists once init returns.
    tokens::TokenManager::init(
        &pg_pool,
        tokens::TokenConfig {
            issuer: args.jwt_issuer.clone(),
            audience: args.jwt_audience.clone(),
            access_token_hours: args.jwt_access_token_hours,
        },
    )
    .await
    .context("initializing token manager")?;

    let mut aws_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(args.aws_region.clone()));
    if let (Some(access_key), Some(secret_key)) =
        (&args.aws_access_key_id, &args.aws_secret_access_key)
    {
        tracing::info!("using static aws credentials for development");
        aws_loader = aws_loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ));
    }
    let aws_config = aws_loader.load().await;

    let object_store = Arc::new(object_store::S3ObjectStore::new(
        aws_sdk_s3::Client::new(&aws_config),
        args.bucket.clone(),
        std::time::Duration::from_secs(args.presigned_url_lifetime_secs),
    ));
    let job_queue = Arc::new(queue::SqsJobQueue::new(
        aws_sdk_sqs::Client::new(&aws_config),
        args.queue_url.clone(),
    ));
    let milvus = Arc::new(vector_store::MilvusClient::new(
        args.milvus_url.clone(),
        args.milvus_user.clone(),
        args.milvus_password.clone(),
        args.milvus_database.clone(),
    ));
    let embedder = Arc::new(embeddings::OpenAiEmbeddings::new(
        args.openai_endpoint.clone(),
        args.openai_api_key.clone(),
    ));

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    // Warm-pool provisioner workers.
    let pool_provisioner = provisioner::PoolProvisioner::new(
        pg_pool.clone(),
        milvus.clone(),
        provisioner::PoolConfig {
            min_pool_size: args.min_pool_size,
            max_pool_size: args.max_pool_size,
            provisioning_threshold_minutes: args.time_threshold_minutes,
            max_concurrent: args.max_concurrent_provisioner,
        },
    );
    let (_triggers, provisioner_handles) = pool_provisioner.start(cancel.clone());
    handles.extend(provisioner_handles);

    // Ingestion consumer.
    let processor = Arc::new(Processor::new(
        pg_pool.clone(),
        object_store.clone(),
        milvus,
        embedder,
        chunker::ChunkerConfig::default(),
        ingestd::loaders::LoaderRegistry::default(),
        args.max_concurrent_provisioner,
    ));
    let consumer = Consumer::new(job_queue, processor);
    handles.push(tokio::spawn(consumer.run(cancel.clone())));

    // Orphan reaper.
    let (_reaper_trigger, reaper_rx) = tokio::sync::mpsc::channel(1);
    let reaper = Reaper::new(
        pg_pool,
        object_store,
        std::time::Duration::from_secs(args.reaper_interval_hours * 3600),
        args.stuck_job_ttl_minutes,
    );
    handles.push(tokio::spawn(reaper.run(reaper_rx, cancel.clone())));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("received shutdown signal");
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(handles))
        .await
        .is_err()
    {
        tracing::warn!("workers did not drain before the shutdown deadline");
    }

    Ok(())
}
