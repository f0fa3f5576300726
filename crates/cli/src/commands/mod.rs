//! CLI subcommands and the shared wiring they build on.

pub mod chat;
pub mod cleanup;
pub mod init;
pub mod status;

use fireside_config::AppConfig;
use fireside_core::engine::InferenceEngine;
use fireside_core::persistence::PersistenceGateway;
use fireside_engines::RemoteEngine;
use fireside_storage::{FileStore, InMemoryStore};
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error>;

/// Build the inference engine selected by the configuration.
pub fn build_engine(config: &AppConfig) -> Result<Arc<dyn InferenceEngine>, BoxError> {
    match config.engine.kind.as_str() {
        "remote" => {
            let api_key = config.engine.api_key.clone().unwrap_or_else(|| "none".into());
            let engine =
                RemoteEngine::new(&config.engine.base_url, api_key, &config.engine.model)?;
            Ok(Arc::new(engine))
        }
        "local" => {
            #[cfg(feature = "local")]
            {
                Ok(Arc::new(fireside_engines::LocalEngine::new(
                    &config.engine.model,
                )))
            }
            #[cfg(not(feature = "local"))]
            {
                Err("This build has no local engine; rebuild with `--features local` \
                     or set engine.kind = \"remote\""
                    .into())
            }
        }
        other => Err(format!("Unknown engine kind: {other}").into()),
    }
}

/// Build the persistence backend selected by the configuration.
pub fn build_store(config: &AppConfig) -> Arc<dyn PersistenceGateway> {
    match config.storage.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        _ => Arc::new(FileStore::new(config.data_dir())),
    }
}
