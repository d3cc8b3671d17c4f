use crate::bundle::BundleConfig;
use crate::error::{Result, VfsError};
use crate::vfs::VirtualFileSystem;
use crate::Bundle;
use rand::rng;
#[cfg(not(target_arch = "wasm32"))]
use samod::storage::TokioFilesystemStorage as FilesystemStorage;
use samod::storage::InMemoryStorage;
#[cfg(not(target_arch = "wasm32"))]
use samod::RepoBuilder;
use samod::{DocHandle, DocumentId, PeerId, Repo};
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::sync::Arc;
#[cfg(target_arch = "wasm32")]
use tokio::sync::RwLock;
use tracing::info;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);

    #[wasm_bindgen(js_namespace = console)]
    fn error(s: &str);
}

fn new_concurrency() -> samod::ConcurrencyConfig {
    samod::ConcurrencyConfig::Threadpool(rayon::ThreadPoolBuilder::new().build().unwrap())
}

/// Storage backend selection for a `TonkCore` instance.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Keep all documents in memory; nothing survives process exit.
    InMemory,
    /// Persist documents under the given directory.
    #[cfg(not(target_arch = "wasm32"))]
    Filesystem(PathBuf),
    /// Persist documents to the browser's IndexedDB.
    #[cfg(target_arch = "wasm32")]
    IndexedDB,
}

/// Builder for creating `TonkCore` instances with custom configuration.
pub struct TonkCoreBuilder {
    peer_id: Option<PeerId>,
    storage_config: StorageConfig,
}

impl TonkCoreBuilder {
    /// Create a new builder with default settings (random peer ID, in-memory storage).
    pub fn new() -> Self {
        Self {
            peer_id: None,
            storage_config: StorageConfig::InMemory,
        }
    }

    /// Set a specific peer ID (defaults to random if not set).
    pub fn with_peer_id(mut self, peer_id: PeerId) -> Self {
        self.peer_id = Some(peer_id);
        self
    }

    /// Set the storage backend (defaults to `StorageConfig::InMemory`).
    pub fn with_storage(mut self, storage_config: StorageConfig) -> Self {
        self.storage_config = storage_config;
        self
    }

    fn peer_id_or_random(&self) -> PeerId {
        self.peer_id.clone().unwrap_or_else(|| {
            let mut prng = rng();
            PeerId::new_with_rng(&mut prng)
        })
    }

    /// Build a fresh, empty `TonkCore` with the configured settings.
    pub async fn build(self) -> Result<TonkCore> {
        let peer_id = self.peer_id_or_random();

        #[cfg(not(target_arch = "wasm32"))]
        {
            let runtime = tokio::runtime::Handle::current();
            let samod = match self.storage_config {
                StorageConfig::InMemory => {
                    RepoBuilder::new(runtime)
                        .with_storage(InMemoryStorage::new())
                        .with_peer_id(peer_id)
                        .with_concurrency(new_concurrency())
                        .load()
                        .await
                }
                StorageConfig::Filesystem(path) => {
                    std::fs::create_dir_all(&path).map_err(VfsError::IoError)?;
                    RepoBuilder::new(runtime)
                        .with_storage(FilesystemStorage::new(&path))
                        .with_peer_id(peer_id)
                        .with_concurrency(new_concurrency())
                        .load()
                        .await
                }
            };

            let samod = Arc::new(samod);
            let vfs = Arc::new(VirtualFileSystem::new(samod.clone()).await?);

            info!("TonkCore initialized with peer ID: {}", samod.peer_id());

            Ok(TonkCore { samod, vfs })
        }

        #[cfg(target_arch = "wasm32")]
        {
            let samod = match self.storage_config {
                StorageConfig::InMemory => {
                    Repo::build_wasm()
                        .with_peer_id(peer_id)
                        .with_storage(InMemoryStorage::new())
                        .load()
                        .await
                }
                StorageConfig::IndexedDB => {
                    let storage = samod::storage::IndexedDbStorage::new();
                    Repo::build_wasm()
                        .with_peer_id(peer_id)
                        .with_storage(storage)
                        .load()
                        .await
                }
            };

            let samod = Arc::new(samod);
            let vfs = Arc::new(VirtualFileSystem::new(samod.clone()).await?);

            info!("TonkCore initialized with peer ID: {}", samod.peer_id());

            Ok(TonkCore {
                samod,
                vfs,
                connection_state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                ws_url: Arc::new(RwLock::new(None)),
            })
        }
    }

    /// Load a bundle with the configured storage settings.
    pub async fn from_bundle(self, mut bundle: Bundle<std::io::Cursor<Vec<u8>>>) -> Result<TonkCore> {
        use crate::BundlePath;

        let peer_id = self.peer_id_or_random();

        #[cfg(not(target_arch = "wasm32"))]
        let runtime = tokio::runtime::Handle::current();

        let storage_prefix = BundlePath::from_archive_path("storage");
        let storage_entries = bundle.prefix(&storage_prefix).map_err(VfsError::Other)?;

        let samod = match &self.storage_config {
            StorageConfig::InMemory => {
                let storage = InMemoryStorage::new();
                for (bundle_path, data) in &storage_entries {
                    if let Some(key) = storage_key_from_bundle_path(bundle_path) {
                        samod::storage::Storage::put(&storage, key, data.clone()).await;
                    }
                }

                #[cfg(not(target_arch = "wasm32"))]
                {
                    RepoBuilder::new(runtime)
                        .with_storage(storage)
                        .with_peer_id(peer_id)
                        .with_concurrency(new_concurrency())
                        .load()
                        .await
                }

                #[cfg(target_arch = "wasm32")]
                {
                    Repo::build_wasm()
                        .with_peer_id(peer_id)
                        .with_storage(storage)
                        .load()
                        .await
                }
            }
            #[cfg(not(target_arch = "wasm32"))]
            StorageConfig::Filesystem(storage_path) => {
                std::fs::create_dir_all(storage_path).map_err(VfsError::IoError)?;

                for (bundle_path, data) in &storage_entries {
                    let path_str = bundle_path.to_string();
                    if let Some(relative_path) = path_str.strip_prefix("storage/") {
                        let full_path = storage_path.join(relative_path);
                        if let Some(parent) = full_path.parent() {
                            std::fs::create_dir_all(parent).map_err(VfsError::IoError)?;
                        }
                        std::fs::write(&full_path, data).map_err(VfsError::IoError)?;
                    }
                }

                RepoBuilder::new(runtime)
                    .with_storage(FilesystemStorage::new(storage_path))
                    .with_peer_id(peer_id)
                    .with_concurrency(new_concurrency())
                    .load()
                    .await
            }
            #[cfg(target_arch = "wasm32")]
            StorageConfig::IndexedDB => {
                let storage = samod::storage::IndexedDbStorage::new();
                for (bundle_path, data) in &storage_entries {
                    if let Some(key) = storage_key_from_bundle_path(bundle_path) {
                        storage.put(key, data.clone()).await;
                    }
                }

                Repo::build_wasm()
                    .with_peer_id(peer_id)
                    .with_storage(storage)
                    .load()
                    .await
            }
        };

        let samod = Arc::new(samod);
        let vfs = Arc::new(VirtualFileSystem::from_bundle(samod.clone(), &mut bundle).await?);

        info!(
            "TonkCore loaded from bundle with peer ID: {}",
            samod.peer_id()
        );

        #[cfg(target_arch = "wasm32")]
        {
            Ok(TonkCore {
                samod,
                vfs,
                connection_state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                ws_url: Arc::new(RwLock::new(None)),
            })
        }

        #[cfg(not(target_arch = "wasm32"))]
        Ok(TonkCore { samod, vfs })
    }

    /// Load from bundle bytes with the configured storage settings.
    pub async fn from_bytes(self, data: Vec<u8>) -> Result<TonkCore> {
        let bundle = Bundle::from_bytes(data)?;
        self.from_bundle(bundle).await
    }

    /// Load from a bundle file with the configured storage settings.
    pub async fn from_file<P: AsRef<std::path::Path>>(self, path: P) -> Result<TonkCore> {
        let data = std::fs::read(path).map_err(VfsError::IoError)?;
        self.from_bytes(data).await
    }
}

impl Default for TonkCoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// samod's storage keys split a document ID's first two characters into
/// their own path segment; reverse that when reading a bundle's `storage/`
/// entries back into a `Storage` implementation.
fn storage_key_from_bundle_path(bundle_path: &crate::BundlePath) -> Option<samod::storage::StorageKey> {
    let path_str = bundle_path.to_string();
    let relative_path = path_str.strip_prefix("storage/")?;
    let path_parts: Vec<String> = relative_path.split('/').map(|s| s.to_string()).collect();

    let reconstructed = if path_parts.len() >= 2 && path_parts[0].len() == 2 {
        let mut parts = vec![format!("{}{}", path_parts[0], path_parts[1])];
        parts.extend_from_slice(&path_parts[2..]);
        parts
    } else {
        path_parts
    };

    samod::storage::StorageKey::from_parts(reconstructed).ok()
}

/// Connection lifecycle reported by a WASM WebSocket connection. Native
/// connections are tracked through `websocket::ConnectionHandle` instead.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Connected,
    Failed(String),
}

/// Core synchronization engine that orchestrates CRDT operations and VFS interactions.
///
/// TonkCore combines samod (CRDT synchronization) with a virtual file system layer,
/// providing a unified interface for document synchronization and file operations.
/// By default it uses in-memory storage; for persistence use
/// `TonkCore::builder().with_storage(StorageConfig::Filesystem(path)).build()`.
///
/// # Examples
///
/// ```no_run
/// # use tonk_core::TonkCore;
/// # async fn example() {
/// let tonk = TonkCore::new().await.unwrap();
/// let vfs = tonk.vfs();
/// # }
/// ```
pub struct TonkCore {
    samod: Arc<Repo>,
    vfs: Arc<VirtualFileSystem>,
    #[cfg(target_arch = "wasm32")]
    connection_state: Arc<RwLock<ConnectionState>>,
    #[cfg(target_arch = "wasm32")]
    ws_url: Arc<RwLock<Option<String>>>,
}

impl TonkCore {
    /// Start building a `TonkCore` with a non-default configuration.
    pub fn builder() -> TonkCoreBuilder {
        TonkCoreBuilder::new()
    }

    /// Create a new TonkCore with a randomly generated peer ID and in-memory storage.
    pub async fn new() -> Result<Self> {
        TonkCoreBuilder::new().build().await
    }

    /// Load from file with default in-memory storage.
    pub async fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        TonkCoreBuilder::new().from_file(path).await
    }

    /// Load from bytes with default in-memory storage.
    pub async fn from_bytes(data: Vec<u8>) -> Result<Self> {
        TonkCoreBuilder::new().from_bytes(data).await
    }

    /// Load from a bundle with an explicit storage configuration.
    pub async fn from_bundle(
        bundle: Bundle<std::io::Cursor<Vec<u8>>>,
        storage_config: StorageConfig,
    ) -> Result<Self> {
        TonkCoreBuilder::new()
            .with_storage(storage_config)
            .from_bundle(bundle)
            .await
    }

    /// Create a new TonkCore with a specific peer ID and in-memory storage.
    pub async fn with_peer_id(peer_id: PeerId) -> Result<Self> {
        TonkCoreBuilder::new().with_peer_id(peer_id).build().await
    }

    /// Export the current state to a bundle as bytes.
    pub async fn to_bytes(&self, config: Option<BundleConfig>) -> Result<Vec<u8>> {
        self.vfs.to_bytes(config).await
    }

    /// Current manifest, as it would be written by [`TonkCore::to_bytes`].
    pub async fn manifest(&self) -> Result<crate::Manifest> {
        let bytes = self.to_bytes(None).await?;
        let bundle = Bundle::from_bytes(bytes).map_err(VfsError::Other)?;
        Ok(bundle.manifest().clone())
    }

    /// Export the current state to a bundle file.
    pub async fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes(None).await?;
        std::fs::write(path, bytes).map_err(VfsError::IoError)?;
        Ok(())
    }

    /// Export a copy of `/app` (and `/src`, if present) as a fresh, independent
    /// bundle with its own root document and peer identity.
    pub async fn fork_to_bytes(&self, config: Option<BundleConfig>) -> Result<Vec<u8>> {
        #[cfg(not(target_arch = "wasm32"))]
        let new_samod = {
            let runtime = tokio::runtime::Handle::current();
            let mut prng = rng();
            let peer_id = PeerId::new_with_rng(&mut prng);
            Arc::new(
                RepoBuilder::new(runtime)
                    .with_storage(InMemoryStorage::new())
                    .with_peer_id(peer_id)
                    .with_concurrency(new_concurrency())
                    .load()
                    .await,
            )
        };

        #[cfg(target_arch = "wasm32")]
        let new_samod = {
            let mut prng = rng();
            let peer_id = PeerId::new_with_rng(&mut prng);
            Arc::new(
                Repo::build_wasm()
                    .with_peer_id(peer_id)
                    .with_storage(InMemoryStorage::new())
                    .load()
                    .await,
            )
        };

        let copied_vfs = Arc::new(VirtualFileSystem::new(new_samod.clone()).await?);

        self.copy_directory_recursive(&self.vfs, &copied_vfs, "/app")
            .await?;

        if self.vfs.exists("/src").await? {
            self.copy_directory_recursive(&self.vfs, &copied_vfs, "/src")
                .await?;
        }

        copied_vfs.to_bytes(config).await
    }

    fn copy_directory_recursive<'a>(
        &'a self,
        source_vfs: &'a VirtualFileSystem,
        dest_vfs: &'a VirtualFileSystem,
        path: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            use crate::vfs::backend::AutomergeHelpers;
            use crate::vfs::types::NodeType;
            use bytes::Bytes;

            if path != "/" && !dest_vfs.exists(path).await? {
                dest_vfs.create_directory(path).await?;
            }

            let entries = source_vfs.list_directory(path).await?;

            for entry in entries {
                let entry_path = if path == "/" {
                    format!("/{}", entry.name)
                } else {
                    format!("{}/{}", path, entry.name)
                };

                match entry.node_type {
                    NodeType::Directory => {
                        dest_vfs.create_directory(&entry_path).await?;
                        self.copy_directory_recursive(source_vfs, dest_vfs, &entry_path)
                            .await?;
                    }
                    NodeType::Document => {
                        if let Some(doc_handle) = source_vfs.find_document(&entry_path).await? {
                            let has_bytes = doc_handle.with_document(|doc| {
                                use automerge::ReadDoc;
                                matches!(doc.get(automerge::ROOT, "bytes"), Ok(Some(_)))
                            });

                            if has_bytes {
                                let doc_node = AutomergeHelpers::read_bytes_document::<
                                    serde_json::Value,
                                >(&doc_handle)?;
                                dest_vfs
                                    .create_document_with_bytes(
                                        &entry_path,
                                        doc_node.content,
                                        Bytes::from(doc_node.bytes.unwrap_or_default()),
                                    )
                                    .await?;
                            } else {
                                let doc_node = AutomergeHelpers::read_document::<serde_json::Value>(
                                    &doc_handle,
                                )?;
                                dest_vfs
                                    .create_document(&entry_path, doc_node.content)
                                    .await?;
                            }
                        }
                    }
                }
            }

            Ok(())
        })
    }

    /// Rename (or move) a document or directory within the VFS.
    pub async fn rename(&self, from_path: &str, to_path: &str) -> Result<bool> {
        self.vfs.move_document(from_path, to_path).await
    }

    /// Get access to the VFS layer.
    pub fn vfs(&self) -> Arc<VirtualFileSystem> {
        Arc::clone(&self.vfs)
    }

    /// Get access to the underlying Repo instance.
    pub fn samod(&self) -> Arc<Repo> {
        Arc::clone(&self.samod)
    }

    /// Get the peer ID of this sync engine.
    pub fn peer_id(&self) -> PeerId {
        self.samod.peer_id()
    }

    /// Connect to a WebSocket peer.
    ///
    /// Returns a `ConnectionHandle` that runs the connection in a background
    /// task until the server closes it, `disconnect()` is called, or the
    /// handle is dropped (the connection then continues unattended).
    #[cfg(not(target_arch = "wasm32"))]
    pub async fn connect_websocket(&self, url: &str) -> Result<crate::websocket::ConnectionHandle> {
        info!("Connecting to WebSocket peer at: {}", url);
        let handle = crate::websocket::connect(Arc::clone(&self.samod), url).await?;
        info!("WebSocket connection initiated to: {}", url);
        Ok(handle)
    }

    /// Connect to a WebSocket peer (WASM). The connection runs in the
    /// background; poll `connection_state()`/`is_connected()` for progress.
    #[cfg(target_arch = "wasm32")]
    pub async fn connect_websocket(&self, url: &str) -> Result<()> {
        info!("Connecting to WebSocket peer at: {}", url);

        {
            let mut ws_url = self.ws_url.write().await;
            *ws_url = Some(url.to_string());
        }
        {
            let mut state = self.connection_state.write().await;
            *state = ConnectionState::Connecting;
        }

        let url_str = url.to_string();
        let state_clone = Arc::clone(&self.connection_state);
        let events = self
            .samod
            .connect_wasm_websocket_observable(&url_str, samod::ConnDirection::Outgoing);

        let state_for_open = Arc::clone(&state_clone);
        wasm_bindgen_futures::spawn_local(async move {
            if events.on_open.await.is_ok() {
                let mut state = state_for_open.write().await;
                *state = ConnectionState::Open;
            }
        });

        let state_for_ready = Arc::clone(&state_clone);
        wasm_bindgen_futures::spawn_local(async move {
            if events.on_ready.await.is_ok() {
                let mut state = state_for_ready.write().await;
                *state = ConnectionState::Connected;
            }
        });

        let state_for_finished = Arc::clone(&state_clone);
        wasm_bindgen_futures::spawn_local(async move {
            let reason = events.finished.await;
            let mut state = state_for_finished.write().await;
            *state = match reason {
                samod::ConnFinishedReason::Error(e) => ConnectionState::Failed(e),
                _ => ConnectionState::Disconnected,
            };
        });

        info!("WebSocket connection initiated at: {}", url);
        Ok(())
    }

    #[cfg(target_arch = "wasm32")]
    pub async fn is_connected(&self) -> bool {
        matches!(*self.connection_state.read().await, ConnectionState::Connected)
    }

    #[cfg(target_arch = "wasm32")]
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection_state.read().await.clone()
    }

    #[cfg(target_arch = "wasm32")]
    pub async fn ws_url(&self) -> Option<String> {
        self.ws_url.read().await.clone()
    }

    /// Find a document by its ID.
    pub async fn find_document(&self, doc_id: DocumentId) -> Result<DocHandle> {
        self.samod
            .find(doc_id.clone())
            .await
            .map_err(|e| VfsError::SamodError(format!("Failed to find document {doc_id}: {e}")))?
            .ok_or_else(|| VfsError::SamodError(format!("Document {doc_id} not found")))
    }

    /// Create a new document.
    pub async fn create_document(&self, initial_doc: automerge::Automerge) -> Result<DocHandle> {
        let handle = self
            .samod
            .create(initial_doc)
            .await
            .map_err(|e| VfsError::SamodError(format!("Failed to create document: {e}")))?;

        Ok(handle)
    }
}

impl Clone for TonkCore {
    fn clone(&self) -> Self {
        Self {
            samod: Arc::clone(&self.samod),
            vfs: Arc::clone(&self.vfs),
            #[cfg(target_arch = "wasm32")]
            connection_state: Arc::clone(&self.connection_state),
            #[cfg(target_arch = "wasm32")]
            ws_url: Arc::clone(&self.ws_url),
        }
    }
}
