use anyhow::Context;
use cortex_rag::blob::FsBlobStore;
use cortex_rag::embedding::HttpEmbeddingClient;
use cortex_rag::generation::HttpGenerationClient;
use cortex_rag::metrics::Metrics;
use cortex_rag::pipelines::{IngestPipeline, QueryPipeline};
use cortex_rag::service::RagService;
use cortex_rag::store::MemoryStore;
use cortex_rag::vector::{QdrantIndex, VectorIndex};
use cortex_rag::workflow::{Engine, MemoryStepStore, RetryPolicy};
use cortex_rag::{api, config, logging};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let store = Arc::new(MemoryStore::new());
    let blob = Arc::new(FsBlobStore::new(&config.blob_root));
    let index = Arc::new(QdrantIndex::new(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        &config.qdrant_collection_name,
        config.embedding_dimension,
    )?);
    index
        .ensure_collection()
        .await
        .context("Failed to prepare the vector collection")?;

    let embeddings = Arc::new(HttpEmbeddingClient::new(
        &config.model_api_url,
        config.model_api_key.clone(),
        &config.embedding_model,
        config.embedding_dimension,
        config.embedding_batch_size,
    )?);
    let generation = Arc::new(HttpGenerationClient::new(
        &config.model_api_url,
        config.model_api_key.clone(),
        &config.generation_model,
    )?);
    let metrics = Arc::new(Metrics::new());

    let mut engine = Engine::new(Arc::new(MemoryStepStore::new()), RetryPolicy::default());
    engine.register(Arc::new(IngestPipeline::new(
        blob.clone(),
        embeddings.clone(),
        index.clone(),
        store.clone(),
        metrics.clone(),
        config.chunk_size,
        config.chunk_overlap,
    )));
    engine.register(Arc::new(QueryPipeline::new(
        embeddings,
        index.clone(),
        generation,
        store.clone(),
        metrics.clone(),
        config.search_top_k,
    )));
    let events = Arc::new(engine).spawn();

    let service = Arc::new(RagService::new(store, blob, index, events, metrics));
    let app = api::create_router(service);

    let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4700..=4799;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4700-4799",
    ))
}
