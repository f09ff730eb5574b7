use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    model::registry::ModelRegistry,
    retrieval::{
        engines::{
            graph::SurrealGraphEngine, surreal::SurrealRetrievalEngine,
            tantivy_fts::TantivyRetrievalEngine,
        },
        registry::EngineRegistry,
    },
    storage::{db::SurrealDbClient, store::StorageManager},
    stream::manager::StreamManager,
    task::queue::TaskQueue,
    utils::config::get_config,
};
use ingestion_pipeline::{
    parser::DefaultParserService, run_worker_loop, IngestionConfig, IngestionPipeline,
    PipelineServices as IngestionServices,
};
use retrieval_pipeline::reranking::RerankerPool;
use std::sync::Arc;
use tokio::task::LocalSet;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Combined process: runs the HTTP API and the ingestion worker side by
/// side, each against its own `SurrealDbClient` connection. Splitting them
/// into the separate `server`/`worker` binaries is the preferred deployment
/// shape; this target exists for single-process/dev deployments.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.apply_migrations_with_dimension(config.embedding_dimension)
        .await?;

    let storage = StorageManager::new(&config).await?;
    let models = Arc::new(ModelRegistry::new(&config)?);

    let mut engines = EngineRegistry::new();
    engines.register(Arc::new(SurrealRetrievalEngine::new(db.clone())));
    engines.register(Arc::new(TantivyRetrievalEngine::open(std::path::Path::new(
        &config.tantivy_index_dir,
    ))?));
    engines.set_graph(Arc::new(SurrealGraphEngine::new(db.clone())));
    let engines = Arc::new(engines);

    let rerankers = RerankerPool::maybe_from_config(&config)?;
    let streams = Arc::new(StreamManager::new(std::time::Duration::from_secs(
        config.stream_retention_secs,
    )));
    let task_queue = Arc::new(TaskQueue::new(db.clone()));

    let api_state = ApiState {
        db: db.clone(),
        config: config.clone(),
        storage: storage.clone(),
        models: models.clone(),
        engines: engines.clone(),
        rerankers,
        streams,
        task_queue: task_queue.clone(),
    };

    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    // Start the server in a separate OS thread with its own runtime, the
    // worker keeps the current thread's LocalSet.
    let server_handle = std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to build server runtime");
        rt.block_on(async {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Server error: {}", e);
            }
        });
    });

    let local = LocalSet::new();
    local.spawn_local(async move {
        let parser = Arc::new(DefaultParserService::new(models.clone(), config));
        let services = IngestionServices {
            db,
            models,
            engines,
            storage,
            parser,
        };
        let ingestion_pipeline = Arc::new(IngestionPipeline::new(
            services,
            task_queue.clone(),
            IngestionConfig::default(),
        ));

        info!("Starting ingestion worker loop");
        run_worker_loop(task_queue, ingestion_pipeline).await;
    });
    local.await;

    if let Err(e) = server_handle.join() {
        error!("Server thread panicked: {:?}", e);
    }

    Ok(())
}
