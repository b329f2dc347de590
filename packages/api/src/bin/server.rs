//! Saksflyt Server
//!
//! Wires configuration, store, extractor, rule engine, worker pool,
//! advisory and the HTTP surface together. Shutdown is graceful: workers
//! finish their current document and roll in-flight cases back.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use saksflyt_advisory::{AdvisoryGenerator, AdvisoryService, HttpAdvisory};
use saksflyt_api::{build_router, AppState};
use saksflyt_core::Config;
use saksflyt_extract::{DisabledOcr, EvidenceExtractor, LexiconNlp};
use saksflyt_pipeline::{BlobStore, FsBlobStore, Orchestrator, WorkerPool};
use saksflyt_rules::RuleEngine;
use saksflyt_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let store = Store::connect(&config.db_url)
        .await
        .context("connecting to the database")?;
    store.migrate().await.context("applying schema")?;

    let nlp = match &config.nlp_model_path {
        Some(path) => {
            let dict = saksflyt_extract::Dictionary::from_path(path)
                .with_context(|| format!("loading dictionaries from {path:?}"))?;
            LexiconNlp::with_dictionary(dict)
        }
        None => LexiconNlp::builtin(),
    };
    // OCR stays a contract; deployments plug an engine in here.
    if config.ocr_enabled {
        tracing::warn!(
            "OCR_ENABLED is set but no OCR engine is linked into this build; \
             image documents will process with the ocr_unavailable warning"
        );
    }
    let extractor = Arc::new(EvidenceExtractor::new(
        Arc::new(DisabledOcr),
        Arc::new(nlp),
        config.extractor_timeout(),
    ));

    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage_root.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        extractor,
        Arc::new(RuleEngine::default()),
        Arc::clone(&blobs),
        config.clone(),
    ));

    let generator = HttpAdvisory::from_config(&config)
        .context("building advisory client")?
        .map(|advisory| Arc::new(advisory) as Arc<dyn AdvisoryGenerator>);
    let advisory = AdvisoryService::new(store.clone(), generator);

    let pool = WorkerPool::start(Arc::clone(&orchestrator), config.worker_pool_size);

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(store, orchestrator, advisory, blobs, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "saksflyt server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving http")?;

    // Workers finish the document in flight, then in-flight cases roll
    // back to DocumentsUploaded.
    pool.shutdown().await;
    tracing::info!("saksflyt server stopped");
    Ok(())
}
