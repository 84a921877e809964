//! Registry engine thread.
//!
//! A [`FaceRegistry`] and its backend handle are not shareable: every
//! detection needs `&mut` access to the backend. The engine moves the
//! registry onto a dedicated OS thread and serves requests one at a time, so
//! any number of async tasks can share it through a clone-able
//! [`EngineHandle`].

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::backend::VisionBackend;
use crate::config::ClassifierConfig;
use crate::error::RegistryError;
use crate::registry::FaceRegistry;
use crate::types::{DatasetEntry, Descriptor};

const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from handles to the engine thread.
enum EngineRequest<ID> {
    AddOne {
        id: ID,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    SetAll {
        entries: Vec<DatasetEntry<ID>>,
        reply: oneshot::Sender<()>,
    },
    GetAll {
        reply: oneshot::Sender<Vec<DatasetEntry<ID>>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    ReloadIndex {
        reply: oneshot::Sender<usize>,
    },
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Descriptor, RegistryError>>,
    },
    Classify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<DatasetEntry<ID>, RegistryError>>,
    },
    GetConfig {
        reply: oneshot::Sender<ClassifierConfig>,
    },
    SetConfig {
        config: ClassifierConfig,
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the engine thread.
pub struct EngineHandle<ID> {
    tx: mpsc::Sender<EngineRequest<ID>>,
}

impl<ID> Clone for EngineHandle<ID> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<ID> EngineHandle<ID> {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest<ID>,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Detect exactly one face in `image` and register it under `id`.
    pub async fn add_one(&self, id: ID, image: Vec<u8>) -> Result<(), EngineError> {
        Ok(self.request(|reply| EngineRequest::AddOne { id, image, reply }).await??)
    }

    /// Replace every entry. Does not reload the index.
    pub async fn set_all(&self, entries: Vec<DatasetEntry<ID>>) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::SetAll { entries, reply }).await
    }

    /// Snapshot of the current entries.
    pub async fn all(&self) -> Result<Vec<DatasetEntry<ID>>, EngineError> {
        self.request(|reply| EngineRequest::GetAll { reply }).await
    }

    pub async fn clear(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Clear { reply }).await
    }

    /// Rebuild the index, returning the number of indexed points.
    pub async fn reload_index(&self) -> Result<usize, EngineError> {
        self.request(|reply| EngineRequest::ReloadIndex { reply }).await
    }

    pub async fn recognize_single(&self, image: Vec<u8>) -> Result<Descriptor, EngineError> {
        Ok(self.request(|reply| EngineRequest::Recognize { image, reply }).await??)
    }

    pub async fn classify_single(&self, image: Vec<u8>) -> Result<DatasetEntry<ID>, EngineError> {
        Ok(self.request(|reply| EngineRequest::Classify { image, reply }).await??)
    }

    pub async fn config(&self) -> Result<ClassifierConfig, EngineError> {
        self.request(|reply| EngineRequest::GetConfig { reply }).await
    }

    pub async fn set_config(&self, config: ClassifierConfig) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::SetConfig { config, reply }).await
    }
}

/// Move `registry` onto a dedicated thread and return a handle to it.
///
/// The thread exits once every handle has been dropped, closing the
/// registry and its backend.
pub fn spawn_engine<ID, B>(mut registry: FaceRegistry<ID, B>) -> Result<EngineHandle<ID>, EngineError>
where
    ID: Clone + Send + 'static,
    B: VisionBackend + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest<ID>>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("faceid-engine".into())
        .spawn(move || {
            tracing::info!(entries = registry.len(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                serve(&mut registry, req);
            }
            registry.close();
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Handle one request. A dropped reply receiver is not an error.
fn serve<ID: Clone, B: VisionBackend>(registry: &mut FaceRegistry<ID, B>, req: EngineRequest<ID>) {
    match req {
        EngineRequest::AddOne { id, image, reply } => {
            let _ = reply.send(registry.add_one(id, &image));
        }
        EngineRequest::SetAll { entries, reply } => {
            registry.set_all(entries);
            let _ = reply.send(());
        }
        EngineRequest::GetAll { reply } => {
            let _ = reply.send(registry.all().to_vec());
        }
        EngineRequest::Clear { reply } => {
            registry.clear();
            let _ = reply.send(());
        }
        EngineRequest::ReloadIndex { reply } => {
            registry.reload_index();
            let _ = reply.send(registry.indexed_len());
        }
        EngineRequest::Recognize { image, reply } => {
            let _ = reply.send(registry.recognize_single(&image));
        }
        EngineRequest::Classify { image, reply } => {
            let _ = reply.send(registry.classify_single(&image));
        }
        EngineRequest::GetConfig { reply } => {
            let _ = reply.send(*registry.config());
        }
        EngineRequest::SetConfig { config, reply } => {
            registry.set_config(config);
            let _ = reply.send(());
        }
    }
}
