use futures::stream::StreamExt;
use samod::DocHandle;

/// A watcher for document changes in the VFS
pub struct DocumentWatcher {
    handle: DocHandle,
}

impl DocumentWatcher {
    /// Create a new document watcher
    pub fn new(handle: DocHandle) -> Self {
        Self { handle }
    }

    /// Get the document handle
    pub fn handle(&self) -> &DocHandle {
        &self.handle
    }

    /// Get the document ID being watched
    pub fn document_id(&self) -> samod::DocumentId {
        self.handle.document_id().clone()
    }

    /// Watch for changes and call the callback for each change
    /// This function runs until the changes stream is closed
    pub async fn on_change<F>(self, mut callback: F)
    where
        F: FnMut(&mut automerge::Automerge) + Send,
    {
        let mut changes = self.handle.changes();
        while (changes.next().await).is_some() {
            // When a change occurs, call the callback with the current document state
            self.handle.with_document(|doc| callback(doc));
        }
    }
}
