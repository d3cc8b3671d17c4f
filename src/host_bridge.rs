//! Translates the host page / service worker JSON message protocol into
//! calls against [`TonkCore`]. The browser-side service worker script
//! (fetch interception, `postMessage` wiring) lives outside this crate;
//! this module owns the process-local `tonkState` and the request
//! dispatch table only.

use crate::bundle::Bundle;
use crate::error::{Result, VfsError};
use crate::tonk_core::TonkCore;
use crate::vfs::backend::AutomergeHelpers;
use crate::vfs::types::DocNode;
use crate::StorageConfig;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen]
extern "C" {
    #[wasm_bindgen::prelude::wasm_bindgen(js_namespace = console, js_name = error)]
    fn console_error(s: &str);
}

/// Any request left unanswered for this long is reported as failed.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Deserialize)]
pub struct HostRequest {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResponse {
    fn ok(id: Option<String>, data: Option<Value>) -> Self {
        Self {
            id,
            success: true,
            data,
            error: None,
        }
    }

    fn failed(id: Option<String>, err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        error!("host bridge request failed: {message}");
        #[cfg(target_arch = "wasm32")]
        console_error(&message);
        Self {
            id,
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Broadcast event pushed to the host page outside the request/response
/// cycle (`fileChanged`, `directoryChanged`).
#[derive(Debug, Clone, Serialize)]
pub struct HostEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "watchId")]
    pub watch_id: String,
    #[serde(flatten)]
    pub payload: Value,
}

struct TonkState {
    tonk: Option<TonkCore>,
    app_slug: Option<String>,
    ws_url: Option<String>,
}

/// Owns the single process-wide `tonkState` a service worker holds, and
/// dispatches host-page requests against it. All mutation happens through
/// `handle_message`; fetch handlers should only ever read a snapshot.
pub struct HostBridge {
    state: Arc<RwLock<TonkState>>,
    events_tx: tokio::sync::broadcast::Sender<HostEvent>,
    watches: Arc<RwLock<HashMap<String, watch::Sender<bool>>>>,
}

impl HostBridge {
    pub fn new() -> Self {
        let (events_tx, _) = tokio::sync::broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(TonkState {
                tonk: None,
                app_slug: None,
                ws_url: None,
            })),
            events_tx,
            watches: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to `fileChanged`/`directoryChanged` broadcasts for forwarding
    /// to the host page (e.g. via `postMessage`).
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<HostEvent> {
        self.events_tx.subscribe()
    }

    /// Handle one request, producing the `{success, data, error}` envelope.
    pub async fn handle_message(&self, request: HostRequest) -> HostResponse {
        let id = request.id.clone();
        match self.dispatch(&request).await {
            Ok(data) => HostResponse::ok(id, data),
            Err(e) => HostResponse::failed(id, e),
        }
    }

    async fn dispatch(&self, request: &HostRequest) -> Result<Option<Value>> {
        match request.message_type.as_str() {
            "setAppSlug" => self.set_app_slug(request).await,
            "init" => self.init(request).await,
            "loadBundle" => self.load_bundle(request).await,
            "initializeFromUrl" => self.initialize_from_url(request).await,
            "readFile" => self.read_file(request).await,
            "writeFile" => self.write_file(request).await,
            "deleteFile" => self.delete_file(request).await,
            "rename" => self.rename(request).await,
            "listDirectory" => self.list_directory(request).await,
            "exists" => self.exists(request).await,
            "watchFile" => self.watch_file(request).await,
            "watchDirectory" => self.watch_directory(request).await,
            "unwatchFile" | "unwatchDirectory" => self.unwatch(request).await,
            "toBytes" => self.to_bytes(request, false).await,
            "forkToBytes" => self.to_bytes(request, true).await,
            "getServerUrl" => self.get_server_url().await,
            other => Err(VfsError::Other(anyhow::anyhow!(
                "unrecognized host bridge message type: {other}"
            ))),
        }
    }

    async fn set_app_slug(&self, request: &HostRequest) -> Result<Option<Value>> {
        let slug = request.payload.get("slug").and_then(Value::as_str);
        let mut state = self.state.write().await;
        state.app_slug = slug.map(str::to_string);
        Ok(None)
    }

    /// Idempotent: if a TonkCore is already loaded this is a no-op success;
    /// otherwise it just records the requested sync URL for `loadBundle`.
    async fn init(&self, request: &HostRequest) -> Result<Option<Value>> {
        let ws_url = request
            .payload
            .get("wsUrl")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut state = self.state.write().await;
        if state.tonk.is_some() {
            return Ok(None);
        }
        if ws_url.is_some() {
            state.ws_url = ws_url;
        }
        Ok(None)
    }

    async fn load_bundle(&self, request: &HostRequest) -> Result<Option<Value>> {
        let bytes: Vec<u8> = serde_json::from_value(
            request
                .payload
                .get("bundleBytes")
                .cloned()
                .ok_or_else(|| VfsError::InvalidPath("bundleBytes".to_string()))?,
        )
        .map_err(VfsError::SerializationError)?;

        let ws_url = request
            .payload
            .get("wsUrl")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.load_bundle_bytes(bytes, ws_url).await
    }

    /// Fetches the manifest/bundle bytes for `manifestUrl` and then behaves
    /// exactly like `loadBundle` with those bytes.
    async fn initialize_from_url(&self, request: &HostRequest) -> Result<Option<Value>> {
        let url = request
            .payload
            .get("manifestUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| VfsError::InvalidPath("manifestUrl".to_string()))?
            .to_string();

        let ws_url = request
            .payload
            .get("wsUrl")
            .and_then(Value::as_str)
            .map(str::to_string);

        let bytes = fetch_bytes(&url).await?;
        self.load_bundle_bytes(bytes, ws_url).await
    }

    async fn load_bundle_bytes(
        &self,
        bytes: Vec<u8>,
        ws_url: Option<String>,
    ) -> Result<Option<Value>> {
        let bundle = Bundle::from_bytes(bytes).map_err(VfsError::Other)?;
        let tonk = TonkCore::from_bundle(bundle, StorageConfig::InMemory).await?;

        if let Some(url) = &ws_url {
            #[cfg(not(target_arch = "wasm32"))]
            {
                // Native sync runs continuously once started; there is no
                // discrete "initial sync complete" signal to wait on here.
                let _ = tonk.connect_websocket(url).await;
            }
            #[cfg(target_arch = "wasm32")]
            {
                tonk.connect_websocket(url).await?;
                // Wait for the connection to reach the ready state, up to
                // the documented 20 x 500ms bound, before returning.
                for _ in 0..20 {
                    if tonk.is_connected().await {
                        break;
                    }
                    sleep(Duration::from_millis(500)).await;
                }
            }
        }

        {
            let mut state = self.state.write().await;
            state.tonk = Some(tonk);
            if ws_url.is_some() {
                state.ws_url = ws_url;
            }
        }

        Ok(None)
    }

    async fn get_tonk(&self) -> Result<TonkCore> {
        let state = self.state.read().await;
        state
            .tonk
            .as_ref()
            .cloned()
            .ok_or_else(|| VfsError::Other(anyhow::anyhow!("TonkCore not initialized")))
    }

    fn path_arg<'a>(request: &'a HostRequest) -> Result<&'a str> {
        request
            .payload
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| VfsError::InvalidPath("path".to_string()))
    }

    async fn read_file(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        let tonk = self.get_tonk().await?;
        let vfs = tonk.vfs();
        let handle = vfs
            .find_document(&path)
            .await?
            .ok_or_else(|| VfsError::PathNotFound(path.clone()))?;

        let has_bytes = handle.with_document(|doc| {
            use automerge::ReadDoc;
            matches!(doc.get(automerge::ROOT, "bytes"), Ok(Some(_)))
        });

        let value = if has_bytes {
            let node: DocNode<Value> = AutomergeHelpers::read_bytes_document(&handle)?;
            json!({
                "type": node.node_type,
                "name": node.name,
                "timestamps": node.timestamps,
                "content": node.content,
                "bytes": node.bytes,
            })
        } else {
            let node: DocNode<Value> = AutomergeHelpers::read_document(&handle)?;
            json!({
                "type": node.node_type,
                "name": node.name,
                "timestamps": node.timestamps,
                "content": node.content,
            })
        };

        Ok(Some(value))
    }

    async fn write_file(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        let create = request
            .payload
            .get("create")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let content_obj = request
            .payload
            .get("content")
            .cloned()
            .ok_or_else(|| VfsError::InvalidDocumentStructure)?;
        let content = content_obj.get("content").cloned().unwrap_or(Value::Null);
        let bytes: Option<Vec<u8>> = content_obj
            .get("bytes")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(VfsError::SerializationError)?;

        let tonk = self.get_tonk().await?;
        let vfs = tonk.vfs();
        match (create, bytes) {
            (true, Some(b)) => {
                vfs.create_document_with_bytes(&path, content, Bytes::from(b))
                    .await?;
            }
            (true, None) => {
                vfs.create_document(&path, content).await?;
            }
            (false, Some(b)) => {
                vfs.update_document_with_bytes(&path, content, Bytes::from(b))
                    .await?;
            }
            (false, None) => {
                vfs.update_document(&path, content).await?;
            }
        }
        Ok(None)
    }

    async fn delete_file(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        let tonk = self.get_tonk().await?;
        tonk.vfs().remove_document(&path).await?;
        Ok(None)
    }

    async fn rename(&self, request: &HostRequest) -> Result<Option<Value>> {
        let old_path = request
            .payload
            .get("oldPath")
            .and_then(Value::as_str)
            .ok_or_else(|| VfsError::InvalidPath("oldPath".to_string()))?
            .to_string();
        let new_path = request
            .payload
            .get("newPath")
            .and_then(Value::as_str)
            .ok_or_else(|| VfsError::InvalidPath("newPath".to_string()))?
            .to_string();

        let tonk = self.get_tonk().await?;
        let moved = tonk.rename(&old_path, &new_path).await?;
        if !moved {
            return Err(VfsError::PathNotFound(old_path));
        }
        Ok(None)
    }

    async fn list_directory(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        let tonk = self.get_tonk().await?;
        let entries = tonk.vfs().list_directory(&path).await?;
        Ok(Some(json!(entries)))
    }

    async fn exists(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        let tonk = self.get_tonk().await?;
        let found = tonk.vfs().exists(&path).await?;
        Ok(Some(json!(found)))
    }

    async fn watch_file(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        let watch_id = path.clone();
        self.start_watch(watch_id, path, "fileChanged").await
    }

    async fn watch_directory(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        let watch_id = path.clone();
        self.start_watch(watch_id, path, "directoryChanged").await
    }

    async fn start_watch(
        &self,
        watch_id: String,
        path: String,
        event_type: &'static str,
    ) -> Result<Option<Value>> {
        use crate::vfs::VfsEvent;

        let tonk = self.get_tonk().await?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.watches
            .write()
            .await
            .insert(watch_id.clone(), stop_tx);

        let mut events = tonk.vfs().subscribe_events();
        let events_tx = self.events_tx.clone();
        let task_watch_id = watch_id.clone();

        let run = async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => {
                        let Ok(event) = event else { break; };
                        let matches = match &event {
                            VfsEvent::DocumentUpdated { path: p, .. }
                            | VfsEvent::DocumentCreated { path: p, .. }
                            | VfsEvent::DirectoryCreated { path: p, .. } => p == &path,
                            VfsEvent::DocumentDeleted { path: p } => p == &path,
                        };
                        if matches {
                            let _ = events_tx.send(HostEvent {
                                event_type: event_type.to_string(),
                                watch_id: task_watch_id.clone(),
                                payload: json!({ "path": path }),
                            });
                        }
                    }
                }
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        tokio::spawn(run);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(run);

        info!("watch registered for {watch_id}");
        Ok(None)
    }

    async fn unwatch(&self, request: &HostRequest) -> Result<Option<Value>> {
        let path = Self::path_arg(request)?.to_string();
        if let Some(stop_tx) = self.watches.write().await.remove(&path) {
            let _ = stop_tx.send(true);
        }
        Ok(None)
    }

    async fn to_bytes(&self, _request: &HostRequest, fork: bool) -> Result<Option<Value>> {
        let tonk = self.get_tonk().await?;
        let root_id = tonk.vfs().root_id().to_string();
        let data = if fork {
            tonk.fork_to_bytes(None).await?
        } else {
            tonk.to_bytes(None).await?
        };
        Ok(Some(json!({ "data": data, "rootId": root_id })))
    }

    async fn get_server_url(&self) -> Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(Some(json!(state.ws_url.clone().unwrap_or_default())))
    }
}

/// Fetches bundle bytes from `url`. Only available in the browser, where
/// the service worker's own `window` supplies `fetch`; a bare host process
/// has no HTTP client in its dependency stack and should route through
/// `loadBundle` instead.
#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::Response;

    let window = web_sys::window()
        .ok_or_else(|| VfsError::Other(anyhow::anyhow!("no window available for fetch")))?;

    let resp_value = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|e| VfsError::Other(anyhow::anyhow!("fetch({url}) failed: {e:?}")))?;
    let response: Response = resp_value
        .dyn_into()
        .map_err(|_| VfsError::Other(anyhow::anyhow!("fetch({url}) did not return a Response")))?;

    if !response.ok() {
        return Err(VfsError::Other(anyhow::anyhow!(
            "fetch({url}) returned status {}",
            response.status()
        )));
    }

    let buffer = JsFuture::from(
        response
            .array_buffer()
            .map_err(|e| VfsError::Other(anyhow::anyhow!("response.array_buffer() failed: {e:?}")))?,
    )
    .await
    .map_err(|e| VfsError::Other(anyhow::anyhow!("reading response body failed: {e:?}")))?;

    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

#[cfg(not(target_arch = "wasm32"))]
async fn fetch_bytes(_url: &str) -> Result<Vec<u8>> {
    Err(VfsError::NotImplemented(
        "initializeFromUrl requires the browser fetch API; fetch the manifest bytes on the \
         host page and dispatch loadBundle instead"
            .to_string(),
    ))
}

impl Default for HostBridge {
    fn default() -> Self {
        Self::new()
    }
}
