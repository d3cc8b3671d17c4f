use anyhow::{Context, Result as AnyhowResult};
use automerge::transaction::Transactable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::BundlePath;

/// Error taxonomy for the bundle/manifest/archive layer. Kept separate from
/// `VfsError` so a caller working only with bundles doesn't have to reason
/// about CRDT/sync failure modes; `VfsError::Other` wraps this at the
/// `TonkCore` boundary.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Failed to parse bundle: {0}")]
    BundleParseError(String),

    #[error("Bundle validation failed: {0}")]
    BundleValidationError(String),

    #[error("File not found in bundle: {0}")]
    FileNotFoundError(String),

    #[error("Entrypoint not found in bundle: {0}")]
    EntrypointNotFoundError(String),

    #[error("ZIP operation failed: {0}")]
    ZipOperationError(String),

    #[error("Bundle exceeds maximum size: {actual} bytes (limit {limit} bytes)")]
    BundleSizeError { actual: u64, limit: u64 },

    #[error("Unsupported manifest version: {0}")]
    UnsupportedVersionError(u32),

    #[error("Manifest schema validation failed: {0}")]
    SchemaValidationError(String),

    #[error("Circular reference detected in bundle: {0}")]
    CircularReferenceError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single entry declared in a manifest's `files` list.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: String,
    pub length: u64,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(default)]
    pub compressed: bool,
    #[serde(rename = "uncompressedSize")]
    pub uncompressed_size: u64,
    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<String>,
}

/// Reserved `metadata` key used to stash the Automerge root document id.
/// The manifest schema has no first-class `rootId` field, so the id rides
/// along in `metadata` instead of widening the public schema.
const ROOT_ID_METADATA_KEY: &str = "__tonkRootId";

/// Manifest structure for bundle metadata.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Manifest {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub entrypoints: HashMap<String, String>,
    #[serde(default)]
    pub files: Vec<FileDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<serde_json::Value>,
}

impl Manifest {
    /// The Automerge document id of the VFS root, if one has been stamped.
    pub fn root_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.get(ROOT_ID_METADATA_KEY)?.as_str()
    }

    pub fn set_root_id(&mut self, id: impl Into<String>) {
        let metadata = self
            .metadata
            .get_or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert(
                ROOT_ID_METADATA_KEY.to_string(),
                serde_json::Value::String(id.into()),
            );
        }
    }
}

/// Construction-time options describing how a bundle should be exported or
/// how its manifest should be overlaid. Compression/zip64/comment fields
/// apply only at `to_bytes` time; the rest are merged into the manifest.
#[derive(Debug, Clone, Default)]
pub struct BundleConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub entrypoints: HashMap<String, String>,
    pub metadata: Option<serde_json::Value>,
    /// ZIP compression level, passed straight to `SimpleFileOptions`.
    pub compression_level: Option<i64>,
    /// Whether to force zip64 extensions regardless of size.
    pub force_zip64: bool,
    pub archive_comment: Option<String>,
}

/// Severity of a `ValidationMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub level: ValidationLevel,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<String>,
    #[serde(rename = "filePath", skip_serializing_if = "Option::is_none", default)]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub messages: Vec<ValidationMessage>,
}

impl ValidationResult {
    fn push(
        &mut self,
        level: ValidationLevel,
        code: &str,
        message: impl Into<String>,
        file_path: Option<String>,
    ) {
        self.push_full(level, code, message, file_path, None, None);
    }

    fn push_full(
        &mut self,
        level: ValidationLevel,
        code: &str,
        message: impl Into<String>,
        file_path: Option<String>,
        context: Option<String>,
        suggestion: Option<String>,
    ) {
        if level == ValidationLevel::Error {
            self.valid = false;
        }
        self.messages.push(ValidationMessage {
            level,
            code: code.to_string(),
            message: message.into(),
            context,
            file_path,
            suggestion,
        });
    }
}

/// Options controlling `Bundle::validate`.
#[derive(Clone)]
pub struct ValidationOptions {
    pub max_bundle_size: Option<u64>,
    pub max_file_count: Option<usize>,
    pub strict_mime_types: bool,
    pub fail_fast: bool,
    /// Additional caller-supplied checks, each returning a message if it
    /// flags something about the manifest. Run under `catch_unwind` so one
    /// bad rule can't abort the whole pipeline.
    pub custom_rules: Vec<fn(&Manifest) -> Option<ValidationMessage>>,
}

impl std::fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("max_bundle_size", &self.max_bundle_size)
            .field("max_file_count", &self.max_file_count)
            .field("strict_mime_types", &self.strict_mime_types)
            .field("fail_fast", &self.fail_fast)
            .field("custom_rules", &self.custom_rules.len())
            .finish()
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_bundle_size: None,
            max_file_count: None,
            strict_mime_types: false,
            fail_fast: false,
            custom_rules: Vec::new(),
        }
    }
}

/// A segment matches `[A-Za-z0-9!#$&^_-]` in the type, plus `.` in the
/// subtype, per the manifest content-type grammar.
fn is_valid_mime(mime: &str) -> bool {
    fn is_token_char(c: char, allow_dot: bool) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(c, '!' | '#' | '$' | '&' | '-' | '^' | '_')
            || (allow_dot && c == '.')
    }

    let Some((type_part, subtype_part)) = mime.split_once('/') else {
        return false;
    };
    if type_part.is_empty() || subtype_part.is_empty() {
        return false;
    }

    let mut type_chars = type_part.chars();
    if !type_chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    if !type_chars.all(|c| is_token_char(c, false)) {
        return false;
    }

    let mut sub_chars = subtype_part.chars();
    if !sub_chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    sub_chars.all(|c| is_token_char(c, true))
}

/// Extension -> MIME type table used for auto-detection in `from_files`.
fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "audio/ogg",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn detect_mime(path: &str) -> String {
    path.rsplit_once('.')
        .map(|(_, ext)| mime_for_extension(ext))
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Follow the "entrypoint that targets another entrypoint's own name"
/// pointer chain looking for a cycle. Each entrypoint has at most one
/// outgoing edge, so this is a walk over a functional graph rather than a
/// general one; three-color marking still finds any cycle in one pass.
fn entrypoint_alias_graph(manifest: &Manifest) -> HashMap<String, String> {
    let mut edges = HashMap::new();
    for (name, target) in &manifest.entrypoints {
        let target_name = target.trim_start_matches('/');
        if target_name == name.as_str() || manifest.entrypoints.contains_key(target_name) {
            edges.insert(name.clone(), target_name.to_string());
        }
    }
    edges
}

fn find_cycle(edges: &HashMap<String, String>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<&str, Color> =
        edges.keys().map(|k| (k.as_str(), Color::White)).collect();

    for start in edges.keys() {
        if color.get(start.as_str()).copied() != Some(Color::White) {
            continue;
        }
        let mut path = Vec::new();
        let mut node = start.as_str();
        loop {
            match color.get(node).copied() {
                None | Some(Color::Black) => break,
                Some(Color::Gray) => {
                    let cycle_start = path.iter().position(|n: &String| n == node).unwrap_or(0);
                    let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                Some(Color::White) => {
                    color.insert(node, Color::Gray);
                    path.push(node.to_string());
                    match edges.get(node) {
                        Some(next) => node = next.as_str(),
                        None => break,
                    }
                }
            }
        }
        for n in &path {
            color.insert(n.as_str(), Color::Black);
        }
    }

    None
}

/// Trait for random access to data sources with read and write capabilities.
///
/// This trait provides a unified interface for working with seekable, readable, and
/// writable data sources such as files or in-memory buffers. It extends the standard
/// library traits with additional convenience methods for common operations.
///
/// # Examples
///
/// ```no_run
/// # use tonk_core::bundle::RandomAccess;
/// # use std::io::Cursor;
/// let mut data = Cursor::new(vec![1, 2, 3, 4, 5]);
/// let _pos = data.position();
/// let _result = data.seek_to(2);
/// ```
pub trait RandomAccess: Read + Write + Seek + Send + std::fmt::Debug {
    /// Get the current position in the stream.
    ///
    /// # Returns
    /// The current position as bytes from the beginning of the stream.
    ///
    /// # Errors
    /// Returns an error if the position cannot be determined.
    fn position(&mut self) -> AnyhowResult<u64> {
        self.stream_position().context("Failed to get position")
    }

    /// Seek to a specific position from the start of the stream.
    ///
    /// # Arguments
    /// * `pos` - The position to seek to, in bytes from the start
    ///
    /// # Errors
    /// Returns an error if the seek operation fails.
    fn seek_to(&mut self, pos: u64) -> AnyhowResult<()> {
        self.seek(SeekFrom::Start(pos))
            .with_context(|| format!("Failed to seek to position {pos}"))?;
        Ok(())
    }

    /// Read exact number of bytes at current position
    fn read_exact_at(&mut self, buf: &mut [u8]) -> AnyhowResult<()> {
        self.read_exact(buf).context("Failed to read exact bytes")
    }

    /// Write bytes at current position
    fn write_at(&mut self, data: &[u8]) -> AnyhowResult<()> {
        self.write_all(data).context("Failed to write bytes")
    }

    /// Flush any buffered writes
    fn flush(&mut self) -> AnyhowResult<()> {
        Write::flush(self).context("Failed to flush")
    }

    /// Get total size if available
    fn size(&mut self) -> AnyhowResult<Option<u64>> {
        let current = self.position()?;
        match self.seek(SeekFrom::End(0)) {
            Ok(size) => {
                self.seek_to(current)?;
                Ok(Some(size))
            }
            Err(_) => Ok(None),
        }
    }
}

// Blanket implementation for types that implement the required traits
impl<T> RandomAccess for T where T: Read + Write + Seek + Send + std::fmt::Debug {}

/// Metadata for a ZIP entry stored in our index
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    /// Path within the ZIP file
    pub path: String,
    /// Offset of local file header in ZIP
    pub local_header_offset: u64,
    /// Compressed size
    pub compressed_size: u64,
    /// Uncompressed size
    pub uncompressed_size: u64,
    /// CRC32 checksum
    pub crc32: u32,
    /// Compression method
    pub compression_method: u16,
}

/// Tree node for efficient path-based lookups
#[derive(Debug)]
struct PathTreeNode {
    /// Child nodes indexed by path component
    children: HashMap<String, PathTreeNode>,
    /// Full paths of entries that end at this node
    entries: Vec<String>,
}

impl PathTreeNode {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Insert a path into the tree
    fn insert(&mut self, path_components: &[String], full_path: String) {
        if path_components.is_empty() {
            self.entries.push(full_path);
            return;
        }

        let component = &path_components[0];
        let child = self
            .children
            .entry(component.clone())
            .or_insert_with(PathTreeNode::new);
        child.insert(&path_components[1..], full_path);
    }

    /// Get all entry paths that match the given prefix
    fn prefix_paths(&self, prefix_components: &[String]) -> Vec<&String> {
        if prefix_components.is_empty() {
            // Return all paths from this subtree
            return self.collect_all_paths();
        }

        let component = &prefix_components[0];
        if let Some(child) = self.children.get(component) {
            child.prefix_paths(&prefix_components[1..])
        } else {
            Vec::new()
        }
    }

    /// Collect all paths from this subtree (recursive)
    fn collect_all_paths(&self) -> Vec<&String> {
        let mut paths = Vec::new();

        // Add paths that end at this node
        paths.extend(self.entries.iter());

        // Recursively collect from children
        for child in self.children.values() {
            paths.extend(child.collect_all_paths());
        }

        paths
    }

    /// Remove a path from the tree
    fn remove_path(&mut self, path_components: &[String], full_path: &str) {
        if path_components.is_empty() {
            self.entries.retain(|p| p != full_path);
            return;
        }

        if let Some(child) = self.children.get_mut(&path_components[0]) {
            child.remove_path(&path_components[1..], full_path);

            // Clean up empty nodes
            if child.entries.is_empty() && child.children.is_empty() {
                self.children.remove(&path_components[0]);
            }
        }
    }
}

/// In-memory index of ZIP entries for fast access
#[derive(Debug)]
pub struct BundleIndex {
    /// Map from path to entry metadata
    entries: HashMap<String, EntryMetadata>,
    /// Tree structure for efficient prefix lookups
    path_tree: PathTreeNode,
}

impl BundleIndex {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            path_tree: PathTreeNode::new(),
        }
    }

    /// Add an entry to the index
    pub fn add_entry(&mut self, metadata: EntryMetadata) {
        let path = metadata.path.clone();

        // Add to entries map
        self.entries.insert(path.clone(), metadata);

        // Add to path tree - filter out empty components (directories ending with /)
        let path_components: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        self.path_tree.insert(&path_components, path);
    }

    /// Get entry metadata by path
    pub fn entry(&self, path: &str) -> Option<&EntryMetadata> {
        self.entries.get(path)
    }

    /// Get all entries matching a prefix
    pub fn prefix_entries(&self, prefix: &str) -> Vec<&EntryMetadata> {
        let prefix_components: Vec<String> = if prefix.is_empty() {
            Vec::new()
        } else {
            prefix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        };

        let matching_paths = self.path_tree.prefix_paths(&prefix_components);
        matching_paths
            .iter()
            .filter_map(|path| self.entries.get(*path))
            .collect()
    }

    /// Get all entry paths
    pub fn all_paths(&self) -> Vec<&String> {
        self.entries.keys().collect()
    }

    /// Remove a path from the path tree
    pub fn remove_from_path_tree(&mut self, path: &str) {
        let path_components: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        self.path_tree.remove_path(&path_components, path);
    }
}

impl Default for BundleIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for `Bundle::add_file`.
#[derive(Debug, Clone, Default)]
pub struct AddFileOptions {
    /// Overwrite an existing file descriptor/payload at the same path.
    pub replace: bool,
}

/// Options passed to `Bundle::from_files`.
#[derive(Debug, Clone, Default)]
pub struct FromFilesOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub entrypoints: HashMap<String, String>,
}

/// How `Bundle::merge` should handle a file path declared in both bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    Error,
    Skip,
    Replace,
}

/// How `Bundle::merge` should handle an entrypoint name declared in both bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrypointConflictResolution {
    Error,
    Skip,
    Replace,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub conflict_resolution: ConflictResolution,
    pub entrypoint_conflict_resolution: EntrypointConflictResolution,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            conflict_resolution: ConflictResolution::Error,
            entrypoint_conflict_resolution: EntrypointConflictResolution::Error,
        }
    }
}

#[derive(Debug)]
pub struct Bundle<R: RandomAccess> {
    /// Random access data source
    data_source: R,
    /// In-memory index of ZIP entries
    index: BundleIndex,
    /// Parsed manifest data
    manifest: Manifest,
    /// Staged file contents not yet flushed into the archive by `to_bytes`.
    pending_writes: HashMap<String, Vec<u8>>,
    /// Manifest paths staged for removal on the next `to_bytes`.
    pending_removals: HashSet<String>,
}

impl<R: RandomAccess> Bundle<R> {
    /// Create a new bundle from a random access source
    pub fn from_source(mut data_source: R) -> AnyhowResult<Self> {
        // Read the central directory and build our index
        let index = Self::build_index(&mut data_source)?;

        // Read and parse the manifest
        let manifest = Self::read_manifest(&mut data_source, &index)?;

        let bundle = Bundle {
            data_source,
            index,
            manifest,
            pending_writes: HashMap::new(),
            pending_removals: HashSet::new(),
        };

        Ok(bundle)
    }

    /// Helper function to create a ZipArchive from the data source
    fn create_archive(&mut self) -> AnyhowResult<ZipArchive<&mut R>> {
        self.data_source.seek_to(0)?;
        ZipArchive::new(&mut self.data_source).context("Failed to create zip archive")
    }

    /// Build the index by reading the ZIP central directory
    fn build_index(data_source: &mut R) -> AnyhowResult<BundleIndex> {
        // Reset to the beginning to ensure we can read the ZIP structure properly
        data_source.seek_to(0)?;

        // Use the zip crate to read the central directory
        let mut archive = ZipArchive::new(data_source).context("Failed to open zip archive")?;

        let mut index = BundleIndex::new();

        // Read each entry from the central directory
        for i in 0..archive.len() {
            let file = archive.by_index(i).context("Failed to read zip entry")?;

            // Skip directory entries (paths ending with '/' are typically directories)
            if file.is_dir() {
                continue;
            }

            let metadata = EntryMetadata {
                path: file.name().to_string(),
                local_header_offset: file.header_start(),
                compressed_size: file.compressed_size(),
                uncompressed_size: file.size(),
                crc32: file.crc32(),
                compression_method: match file.compression() {
                    zip::CompressionMethod::Stored => 0,
                    zip::CompressionMethod::Deflated => 8,
                    _ => 0, // Default to stored for unknown methods
                },
            };

            index.add_entry(metadata);
        }

        Ok(index)
    }

    /// Get the root Automerge document from the bundle
    pub fn root_document(&mut self) -> AnyhowResult<automerge::Automerge> {
        let root_id = self
            .manifest
            .root_id()
            .ok_or_else(|| anyhow::anyhow!("manifest has no root document id"))?
            .to_string();

        // Read the document bytes from the bundle
        let doc_bytes = self
            .get(&BundlePath::from_archive_path(&root_id))?
            .ok_or_else(|| anyhow::anyhow!("Root document not found in bundle"))?;

        // Load the Automerge document from bytes
        let doc =
            automerge::Automerge::load(&doc_bytes).context("Failed to load root document")?;

        Ok(doc)
    }

    /// Read a value by key
    pub fn get(&mut self, key: &BundlePath) -> AnyhowResult<Option<Vec<u8>>> {
        let path = key.to_string();

        // Check if file exists in the index
        if let Some(metadata) = self.index.entry(&path).cloned() {
            self.read_entry_data(&metadata)
        } else {
            Ok(None)
        }
    }

    /// Read the actual data for a ZIP entry
    fn read_entry_data(&mut self, metadata: &EntryMetadata) -> AnyhowResult<Option<Vec<u8>>> {
        let mut archive = self.create_archive()?;

        let mut file = archive
            .by_name(&metadata.path)
            .context("Failed to find entry in zip")?;

        let mut buffer = Vec::with_capacity(metadata.uncompressed_size as usize);
        file.read_to_end(&mut buffer)
            .context("Failed to read entry data")?;

        Ok(Some(buffer))
    }

    /// Read all key-value pairs that match a key prefix
    pub fn prefix(&mut self, prefix: &BundlePath) -> AnyhowResult<Vec<(BundlePath, Vec<u8>)>> {
        let prefix_path = prefix.to_string();
        let entries: Vec<EntryMetadata> = self
            .index
            .prefix_entries(&prefix_path)
            .into_iter()
            .cloned()
            .collect();

        let mut results = Vec::new();

        for metadata in entries {
            let path = &metadata.path;

            // Convert path back to BundlePath
            let key = BundlePath::from_archive_path(path);

            // Read the data
            if let Some(data) = self.read_entry_data(&metadata)? {
                results.push((key, data));
            }
        }

        Ok(results)
    }

    /// Get all keys in the bundle
    pub fn list_keys(&self) -> Vec<BundlePath> {
        self.index
            .all_paths()
            .into_iter()
            .map(|path| BundlePath::from_archive_path(path))
            .collect()
    }

    /// Get the parsed manifest data
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// True if `path` is declared in the manifest and not pending removal.
    pub fn has_file(&self, path: &str) -> bool {
        !self.pending_removals.contains(path) && self.manifest.files.iter().any(|f| f.path == path)
    }

    /// Look up a file's descriptor by its manifest path.
    pub fn get_file(&self, path: &str) -> Option<&FileDescriptor> {
        if self.pending_removals.contains(path) {
            return None;
        }
        self.manifest.files.iter().find(|f| f.path == path)
    }

    /// All file descriptors currently declared (excluding pending removals).
    pub fn list_files(&self) -> Vec<&FileDescriptor> {
        self.manifest
            .files
            .iter()
            .filter(|f| !self.pending_removals.contains(&f.path))
            .collect()
    }

    pub fn get_file_count(&self) -> usize {
        self.list_files().len()
    }

    /// Read a declared file's payload, checking pending writes before
    /// falling back to the underlying archive.
    pub fn get_file_data(&mut self, path: &str) -> AnyhowResult<Option<Vec<u8>>> {
        if self.pending_removals.contains(path) {
            return Ok(None);
        }
        if let Some(data) = self.pending_writes.get(path) {
            return Ok(Some(data.clone()));
        }
        if !self.has_file(path) {
            return Ok(None);
        }
        let entry_name = path.trim_start_matches('/').to_string();
        self.get(&BundlePath::from_archive_path(&entry_name))
    }

    pub fn get_entrypoint(&self, name: &str) -> Option<&str> {
        self.manifest.entrypoints.get(name).map(|s| s.as_str())
    }

    pub fn set_entrypoint(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.manifest.entrypoints.insert(name.into(), path.into());
    }

    pub fn remove_entrypoint(&mut self, name: &str) -> bool {
        self.manifest.entrypoints.remove(name).is_some()
    }

    /// Add a new file to the bundle, staging its payload for the next
    /// `to_bytes`. Fails if the path already exists unless `opts.replace`.
    pub fn add_file(
        &mut self,
        mut descriptor: FileDescriptor,
        data: Vec<u8>,
        opts: &AddFileOptions,
    ) -> Result<(), BundleError> {
        if BundlePath::from_str(&descriptor.path).is_err() {
            return Err(BundleError::SchemaValidationError(format!(
                "invalid file path {:?}",
                descriptor.path
            )));
        }

        let existing_index = self.manifest.files.iter().position(|f| f.path == descriptor.path);
        if existing_index.is_some() && !opts.replace {
            return Err(BundleError::SchemaValidationError(format!(
                "{} already exists",
                descriptor.path
            )));
        }

        descriptor.length = data.len() as u64;
        descriptor.uncompressed_size = data.len() as u64;

        self.pending_removals.remove(&descriptor.path);
        self.pending_writes.insert(descriptor.path.clone(), data);

        match existing_index {
            Some(idx) => self.manifest.files[idx] = descriptor,
            None => self.manifest.files.push(descriptor),
        }

        Ok(())
    }

    /// Replace an existing file's payload (and optionally its content type).
    pub fn update_file(
        &mut self,
        path: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<(), BundleError> {
        let idx = self
            .manifest
            .files
            .iter()
            .position(|f| f.path == path)
            .ok_or_else(|| BundleError::FileNotFoundError(path.to_string()))?;

        let file = &mut self.manifest.files[idx];
        file.length = data.len() as u64;
        file.uncompressed_size = data.len() as u64;
        if let Some(content_type) = content_type {
            file.content_type = content_type;
        }

        self.pending_removals.remove(path);
        self.pending_writes.insert(path.to_string(), data);

        Ok(())
    }

    /// Remove a file from the manifest and drop any entrypoints pointing at
    /// it. Returns whether a file was actually present.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let existed = self.manifest.files.iter().any(|f| f.path == path);
        self.manifest.files.retain(|f| f.path != path);
        self.manifest.entrypoints.retain(|_, target| target != path);
        self.pending_writes.remove(path);
        if existed {
            self.pending_removals.insert(path.to_string());
        }
        existed
    }

    /// Merge a `BundleConfig` into the current manifest. Fields present on
    /// `config` are overlaid rather than replacing the manifest outright, so
    /// forking with only new entrypoints keeps existing name/description.
    pub fn set_manifest(&mut self, config: BundleConfig) -> Result<(), BundleError> {
        self.apply_manifest_overlay(&config);
        Ok(())
    }

    fn apply_manifest_overlay(&mut self, config: &BundleConfig) {
        if config.name.is_some() {
            self.manifest.name = config.name.clone();
        }
        if config.description.is_some() {
            self.manifest.description = config.description.clone();
        }
        for (name, target) in &config.entrypoints {
            self.manifest.entrypoints.insert(name.clone(), target.clone());
        }
        if let Some(metadata) = &config.metadata {
            self.manifest.metadata = Some(metadata.clone());
        }
    }

    /// Run the bundle through its nine-step validation pipeline, returning
    /// every message collected (unless `options.fail_fast` stops early on
    /// the first error). The result is valid iff no message is an error.
    pub fn validate(&mut self, options: &ValidationOptions) -> AnyhowResult<ValidationResult> {
        let mut result = ValidationResult {
            valid: true,
            messages: Vec::new(),
        };

        macro_rules! bail_if_fail_fast {
            () => {
                if options.fail_fast && !result.valid {
                    return Ok(result);
                }
            };
        }

        // 1. schema
        if self.manifest.version < 1 {
            result.push(
                ValidationLevel::Error,
                "VALIDATION_ERROR",
                "manifest version must be a positive integer",
                None,
            );
        }
        for file in &self.manifest.files {
            if BundlePath::from_str(&file.path).is_err() {
                result.push(
                    ValidationLevel::Error,
                    "VALIDATION_ERROR",
                    format!("file path {:?} is not a valid virtual path", file.path),
                    Some(file.path.clone()),
                );
            }
        }
        for (name, target) in &self.manifest.entrypoints {
            if BundlePath::from_str(target).is_err() {
                result.push(
                    ValidationLevel::Error,
                    "VALIDATION_ERROR",
                    format!("entrypoint {name} targets an invalid path {target:?}"),
                    Some(target.clone()),
                );
            }
        }
        bail_if_fail_fast!();

        // 2. path uniqueness
        let mut seen_paths = HashSet::new();
        for file in &self.manifest.files {
            if !seen_paths.insert(file.path.as_str()) {
                result.push(
                    ValidationLevel::Error,
                    "DUPLICATE_PATH",
                    format!("path {} is declared more than once", file.path),
                    Some(file.path.clone()),
                );
            }
        }
        bail_if_fail_fast!();

        // 3. entrypoint existence
        let known_paths: HashSet<&str> =
            self.manifest.files.iter().map(|f| f.path.as_str()).collect();
        for (name, target) in &self.manifest.entrypoints {
            if !known_paths.contains(target.as_str()) {
                result.push(
                    ValidationLevel::Error,
                    "VALID_ENTRYPOINTS",
                    format!("{name} -> {target} does not resolve to a declared file"),
                    Some(target.clone()),
                );
            }
        }
        bail_if_fail_fast!();

        // 4. entrypoint graph cycles
        let edges = entrypoint_alias_graph(&self.manifest);
        if let Some(cycle) = find_cycle(&edges) {
            result.push_full(
                ValidationLevel::Error,
                "ENTRYPOINT_CYCLE",
                "entrypoint graph contains a cycle",
                None,
                Some(cycle.join(" -> ")),
                None,
            );
        }
        bail_if_fail_fast!();

        // 5. manifest <-> archive consistency
        let archive_paths: HashSet<String> = self
            .index
            .all_paths()
            .into_iter()
            .filter(|p| p.as_str() != "manifest.json")
            .cloned()
            .collect();
        for file in &self.manifest.files {
            let entry_name = file.path.trim_start_matches('/');
            if !archive_paths.contains(entry_name) {
                result.push(
                    ValidationLevel::Error,
                    "MISSING_ARCHIVE_ENTRY",
                    format!("{} is declared in the manifest but missing from the archive", file.path),
                    Some(file.path.clone()),
                );
            }
        }
        let declared_entries: HashSet<String> = self
            .manifest
            .files
            .iter()
            .map(|f| f.path.trim_start_matches('/').to_string())
            .collect();
        for entry_name in &archive_paths {
            if !declared_entries.contains(entry_name) {
                result.push(
                    ValidationLevel::Warning,
                    "EXTRA_ARCHIVE_ENTRY",
                    format!("archive entry {entry_name} is not declared in the manifest"),
                    Some(entry_name.clone()),
                );
            }
        }
        bail_if_fail_fast!();

        // 6. declared size + bloat
        let declared_total: u64 = self.manifest.files.iter().map(|f| f.length).sum();
        if let Some(max) = options.max_bundle_size {
            if declared_total > max {
                result.push(
                    ValidationLevel::Error,
                    "SIZE_EXCEEDED",
                    format!("bundle payload is {declared_total} bytes, limit is {max}"),
                    None,
                );
            }
        }
        let actual_total: u64 = archive_paths
            .iter()
            .filter_map(|p| self.index.entry(p))
            .map(|m| m.uncompressed_size)
            .sum();
        if declared_total > 0 && actual_total > declared_total.saturating_mul(2) {
            result.push(
                ValidationLevel::Warning,
                "SIZE_BLOAT",
                format!(
                    "archive payload is {actual_total} bytes, more than double the declared {declared_total} bytes"
                ),
                None,
            );
        }
        bail_if_fail_fast!();

        // 7. file count
        if let Some(max) = options.max_file_count {
            let count = self.manifest.files.len();
            if count > max {
                result.push(
                    ValidationLevel::Error,
                    "FILE_COUNT_EXCEEDED",
                    format!("bundle declares {count} files, limit is {max}"),
                    None,
                );
            }
        }
        bail_if_fail_fast!();

        // 8. strict mime types
        if options.strict_mime_types {
            for file in &self.manifest.files {
                if !is_valid_mime(&file.content_type) {
                    result.push(
                        ValidationLevel::Error,
                        "INVALID_MIME_TYPE",
                        format!("{} has invalid content type {:?}", file.path, file.content_type),
                        Some(file.path.clone()),
                    );
                }
            }
        }
        bail_if_fail_fast!();

        // 9. caller-supplied rules, isolated from panics
        for rule in &options.custom_rules {
            let manifest_ref = &self.manifest;
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rule(manifest_ref))) {
                Ok(Some(message)) => {
                    if message.level == ValidationLevel::Error {
                        result.valid = false;
                    }
                    result.messages.push(message);
                }
                Ok(None) => {}
                Err(_) => {
                    result.push(
                        ValidationLevel::Error,
                        "CUSTOM_RULE_ERROR",
                        "a custom validation rule panicked",
                        None,
                    );
                }
            }
            bail_if_fail_fast!();
        }

        Ok(result)
    }

    /// Read and parse the manifest.json file from the bundle
    fn read_manifest(data_source: &mut R, index: &BundleIndex) -> AnyhowResult<Manifest> {
        // Check that manifest.json exists in the bundle
        index
            .entry("manifest.json")
            .ok_or_else(|| anyhow::anyhow!("manifest.json not found in bundle"))?;

        // Reset to the beginning to ensure ZipArchive can read the central directory
        data_source.seek_to(0)?;

        // Create a temporary ZipArchive to read the manifest entry
        let mut archive = ZipArchive::new(data_source)
            .context("Failed to create zip archive for manifest reading")?;

        let mut manifest_file = archive
            .by_name("manifest.json")
            .context("Failed to find manifest.json in zip")?;

        let mut manifest_content = String::new();
        manifest_file
            .read_to_string(&mut manifest_content)
            .context("Failed to read manifest.json content")?;

        // Parse the JSON
        let manifest: Manifest =
            serde_json::from_str(&manifest_content).context("Failed to parse manifest.json")?;

        if manifest.version < 1 {
            return Err(anyhow::anyhow!(
                "Unsupported manifest version: {}. Expected a positive integer.",
                manifest.version
            ));
        }

        Ok(manifest)
    }
}

// Convenience constructors for common cases
impl Bundle<std::io::Cursor<Vec<u8>>> {
    /// Load a bundle from a byte array
    pub fn from_bytes(data: Vec<u8>) -> AnyhowResult<Self> {
        let cursor = std::io::Cursor::new(data);
        Self::from_source(cursor)
    }

    /// Create a new empty bundle with a minimal manifest
    pub fn create_empty() -> AnyhowResult<Self> {
        // Create and initialize root document as directory
        let mut root_doc = automerge::Automerge::new();

        // Initialize as directory
        {
            let mut tx = root_doc.transaction();
            tx.put(automerge::ROOT, "type", "directory")?;
            tx.put(automerge::ROOT, "name", "/")?;

            let now = chrono::Utc::now().timestamp_millis();
            let timestamps_obj =
                tx.put_object(automerge::ROOT, "timestamps", automerge::ObjType::Map)?;
            tx.put(timestamps_obj.clone(), "created", now)?;
            tx.put(timestamps_obj, "modified", now)?;

            tx.put_object(automerge::ROOT, "children", automerge::ObjType::List)?;

            tx.commit();
        }

        // Serialize the root doc
        let root_doc_bytes = root_doc.save();

        let mut manifest = Manifest {
            version: 1,
            name: None,
            description: None,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            entrypoints: HashMap::new(),
            files: Vec::new(),
            metadata: None,
        };
        manifest.set_root_id("root");

        let manifest_json =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;

        // Create in-memory ZIP with just the manifest
        let mut zip_data = Vec::new();
        {
            let mut zip_writer = ZipWriter::new(std::io::Cursor::new(&mut zip_data));

            // Add manifest
            zip_writer.start_file("manifest.json", SimpleFileOptions::default())?;
            zip_writer.write_all(manifest_json.as_bytes())?;

            // Add root document
            zip_writer.start_file("root", SimpleFileOptions::default())?;
            zip_writer.write_all(&root_doc_bytes)?;

            zip_writer.finish()?;
        }

        // Create bundle from the new ZIP data
        Self::from_bytes(zip_data)
    }

    /// Build a bundle from a flat map of virtual path -> file bytes, with
    /// content types auto-detected from the path's extension.
    pub fn from_files(
        files: HashMap<String, Vec<u8>>,
        opts: FromFilesOptions,
    ) -> AnyhowResult<Self> {
        let mut bundle = Self::create_empty()?;
        bundle.manifest.name = opts.name;
        bundle.manifest.description = opts.description;

        for (path, data) in files {
            let content_type = detect_mime(&path);
            let descriptor = FileDescriptor {
                path: path.clone(),
                length: data.len() as u64,
                content_type,
                compressed: true,
                uncompressed_size: data.len() as u64,
                last_modified: None,
            };
            bundle
                .add_file(descriptor, data, &AddFileOptions::default())
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }

        for (name, target) in opts.entrypoints {
            bundle.set_entrypoint(name, target);
        }

        Ok(bundle)
    }

    /// Duplicate this bundle by round-tripping it through its serialized
    /// bytes, flushing any pending writes in the process.
    pub fn clone(&mut self) -> AnyhowResult<Self> {
        let bytes = self.to_bytes(None)?;
        Self::from_bytes(bytes)
    }

    /// Copy every file and entrypoint from `other` into `self`, resolving
    /// conflicts per `opts`.
    pub fn merge(
        &mut self,
        other: &mut Bundle<std::io::Cursor<Vec<u8>>>,
        opts: &MergeOptions,
    ) -> Result<(), BundleError> {
        let other_paths: Vec<String> = other.manifest.files.iter().map(|f| f.path.clone()).collect();

        for path in other_paths {
            let descriptor = other
                .get_file(&path)
                .cloned()
                .expect("path was just listed from the same manifest");
            let data = other
                .get_file_data(&path)
                .map_err(|e| BundleError::BundleParseError(e.to_string()))?
                .ok_or_else(|| BundleError::FileNotFoundError(path.clone()))?;

            let exists = self.manifest.files.iter().any(|f| f.path == path);
            if exists {
                match opts.conflict_resolution {
                    ConflictResolution::Error => {
                        return Err(BundleError::SchemaValidationError(format!(
                            "{path} exists in both bundles"
                        )));
                    }
                    ConflictResolution::Skip => continue,
                    ConflictResolution::Replace => {
                        self.add_file(descriptor, data, &AddFileOptions { replace: true })?;
                    }
                }
            } else {
                self.add_file(descriptor, data, &AddFileOptions::default())?;
            }
        }

        let other_entrypoints: Vec<(String, String)> = other
            .manifest
            .entrypoints
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, target) in other_entrypoints {
            let exists = self.manifest.entrypoints.contains_key(&name);
            if exists {
                match opts.entrypoint_conflict_resolution {
                    EntrypointConflictResolution::Error => {
                        return Err(BundleError::SchemaValidationError(format!(
                            "entrypoint {name} exists in both bundles"
                        )));
                    }
                    EntrypointConflictResolution::Skip => continue,
                    EntrypointConflictResolution::Replace => {
                        self.set_entrypoint(name, target);
                    }
                }
            } else {
                self.set_entrypoint(name, target);
            }
        }

        Ok(())
    }

    /// Serialize the bundle to bytes, flushing any staged `addFile`/
    /// `updateFile`/`removeFile` calls and optionally overlaying `opts` onto
    /// the manifest first. Non-declared archive entries (e.g. the VFS root
    /// document and its storage tree) are carried through untouched.
    pub fn to_bytes(&mut self, opts: Option<BundleConfig>) -> AnyhowResult<Vec<u8>> {
        let (compression_level, force_zip64, archive_comment) = match &opts {
            Some(config) => (
                config.compression_level,
                config.force_zip64,
                config.archive_comment.clone(),
            ),
            None => (None, false, None),
        };
        if let Some(config) = opts {
            self.apply_manifest_overlay(&config);
        }

        self.manifest.files.retain(|f| !self.pending_removals.contains(&f.path));

        // Start from everything already in the archive, overlay pending
        // writes, drop pending removals.
        let mut payloads: HashMap<String, Vec<u8>> = HashMap::new();
        let existing_paths: Vec<String> = self
            .index
            .all_paths()
            .into_iter()
            .filter(|p| p.as_str() != "manifest.json")
            .cloned()
            .collect();
        for entry_name in existing_paths {
            if self.pending_removals.contains(&entry_name)
                || self.pending_removals.contains(&format!("/{entry_name}"))
            {
                continue;
            }
            if let Some(metadata) = self.index.entry(&entry_name).cloned() {
                if let Some(data) = self.read_entry_data(&metadata)? {
                    payloads.insert(entry_name, data);
                }
            }
        }
        for (path, data) in &self.pending_writes {
            payloads.insert(path.trim_start_matches('/').to_string(), data.clone());
        }

        let store_paths: HashSet<String> = self
            .manifest
            .files
            .iter()
            .filter(|f| !f.compressed)
            .map(|f| f.path.trim_start_matches('/').to_string())
            .collect();

        self.pending_writes.clear();
        self.pending_removals.clear();

        let manifest_json =
            serde_json::to_string_pretty(&self.manifest).context("Failed to serialize manifest")?;

        let mut zip_data = Vec::new();
        {
            let mut zip_writer = ZipWriter::new(std::io::Cursor::new(&mut zip_data));
            if let Some(comment) = archive_comment {
                zip_writer.set_raw_comment(comment.into_bytes());
            }

            let mut default_options = SimpleFileOptions::default().large_file(force_zip64);
            if let Some(level) = compression_level {
                default_options = default_options.compression_level(Some(level));
            }

            zip_writer.start_file("manifest.json", default_options)?;
            zip_writer.write_all(manifest_json.as_bytes())?;

            for (entry_name, data) in &payloads {
                let entry_options = if store_paths.contains(entry_name) {
                    SimpleFileOptions::default()
                        .compression_method(zip::CompressionMethod::Stored)
                        .large_file(force_zip64)
                } else {
                    default_options
                };
                zip_writer.start_file(entry_name, entry_options)?;
                zip_writer.write_all(data)?;
            }

            zip_writer.finish()?;
        }

        self.data_source = std::io::Cursor::new(zip_data.clone());
        self.index = Self::build_index(&mut self.data_source)?;

        Ok(zip_data)
    }
}

impl Bundle<std::fs::File> {
    /// Load a bundle from a file path
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> AnyhowResult<Self> {
        use std::fs::OpenOptions;

        // Open the file with read+write permissions to support both reading and writing operations
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .context("Failed to open bundle file with read+write permissions")?;
        Self::from_source(file)
    }
}

// Implement for any Read + Write + Seek source
impl<T: Read + Write + Seek + Send + std::fmt::Debug> Bundle<T> {
    /// Load a bundle from any readable, writable and seekable source
    pub fn from_stream(stream: T) -> AnyhowResult<Self> {
        Self::from_source(stream)
    }
}
