use crate::error::{Result, VfsError};
use crate::vfs::backend::AutomergeHelpers;
use crate::vfs::types::*;
use samod::{DocHandle, DocumentId, Repo};
use std::sync::Arc;

pub struct TraverseResult {
    pub node_handle: DocHandle,
    pub node: DirNode,
    pub target_ref: Option<RefNode>,
    pub parent_path: String,
}

#[derive(Clone)]
pub struct PathTraverser {
    samod: Arc<Repo>,
}

impl PathTraverser {
    pub fn new(samod: Arc<Repo>) -> Self {
        Self { samod }
    }

    /// Traverses the document tree to find or create nodes along a path
    pub async fn traverse(
        &self,
        root_id: DocumentId,
        path: &str,
        create_missing: bool,
    ) -> Result<TraverseResult> {
        // Normalize the path: remove leading slash and trailing slashes
        let normalized_path = path.trim_start_matches('/').trim_end_matches('/');

        let segments: Vec<&str> = if normalized_path.is_empty() {
            Vec::new()
        } else {
            normalized_path
                .split('/')
                .filter(|s| !s.is_empty())
                .collect()
        };

        // No segments means root path
        if segments.is_empty() {
            let root_handle = self
                .samod
                .find(root_id.clone())
                .await
                .map_err(|e| VfsError::SamodError(format!("Failed to find root document: {e}")))?
                .ok_or_else(|| {
                    VfsError::SamodError(format!("Root document {root_id} not found"))
                })?;

            let root_doc = match AutomergeHelpers::read_directory(&root_handle) {
                Ok(doc) => doc,
                Err(_) if create_missing => {
                    // Initialize root if it doesn't exist and we're creating missing nodes
                    AutomergeHelpers::init_as_directory(&root_handle, "/")?;
                    AutomergeHelpers::read_directory(&root_handle)?
                }
                Err(e) => return Err(e),
            };

            return Ok(TraverseResult {
                node_handle: root_handle,
                node: root_doc,
                target_ref: None,
                parent_path: "".to_string(),
            });
        }

        // Navigate through the tree
        let mut current_node_id = root_id;
        let mut current_handle = self
            .samod
            .find(current_node_id.clone())
            .await
            .map_err(|e| VfsError::SamodError(format!("Failed to find root document: {e}")))?
            .ok_or_else(|| {
                VfsError::SamodError(format!("Root document {current_node_id} not found"))
            })?;

        let mut current_doc = match AutomergeHelpers::read_directory(&current_handle) {
            Ok(doc) => doc,
            Err(_) if create_missing => {
                // Initialize root if needed and we're creating missing directories
                AutomergeHelpers::init_as_directory(&current_handle, "/")?;
                AutomergeHelpers::read_directory(&current_handle)?
            }
            Err(e) => return Err(e),
        };

        let mut current_path = String::new();
        let mut last_segment_ref: Option<RefNode> = None;

        // Process each path segment
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                continue;
            }

            let is_last_segment = i == segments.len() - 1;

            // Update current path
            current_path = if current_path.is_empty() {
                format!("/{segment}")
            } else {
                format!("{current_path}/{segment}")
            };

            // Find the child with the matching name
            let child_ref = current_doc.find_child(segment).cloned();

            if let Some(child_ref) = child_ref {
                // Child exists, follow the reference
                last_segment_ref = Some(child_ref.clone());

                // If this is the last segment, we can return without further navigation
                if is_last_segment {
                    return Ok(TraverseResult {
                        node_handle: current_handle,
                        node: current_doc,
                        target_ref: Some(child_ref),
                        parent_path: current_path.clone(),
                    });
                }

                // Only try to navigate further if it's a directory
                if child_ref.node_type == NodeType::Directory {
                    current_node_id = child_ref.pointer;
                    current_handle = self
                        .samod
                        .find(current_node_id.clone())
                        .await
                        .map_err(|e| VfsError::SamodError(format!("Failed to find document: {e}")))?
                        .ok_or_else(|| {
                            VfsError::SamodError(format!("Document {current_node_id} not found"))
                        })?;

                    current_doc = AutomergeHelpers::read_directory(&current_handle)?;
                } else {
                    // Found a document when we need to navigate further, so fail
                    return Err(VfsError::PathNotFound(current_path));
                }
            } else if create_missing && !is_last_segment {
                // Create a new directory document with samod.create()
                let new_doc = automerge::Automerge::new();
                let new_node_handle = self.samod.create(new_doc).await.map_err(|e| {
                    VfsError::SamodError(format!("Failed to create directory document: {e}"))
                })?;
                let new_node_id = new_node_handle.document_id().clone();

                // Initialize the new node as a directory
                AutomergeHelpers::init_as_directory(&new_node_handle, segment)?;

                // Add the new node to the parent's children with duplicate prevention
                let new_dir_ref = RefNode::new_directory(segment.to_string(), new_node_id.clone());

                // Check if a directory with this name already exists (prevents race condition duplicates)
                let updated_current_doc = AutomergeHelpers::read_directory(&current_handle)?;
                if updated_current_doc.find_child(segment).is_some() {
                    // Another concurrent operation already created this directory, use the existing one
                    current_doc = updated_current_doc;
                    let existing_child = current_doc.find_child(segment).unwrap();
                    current_node_id = existing_child.pointer.clone();
                    current_handle = self
                        .samod
                        .find(current_node_id.clone())
                        .await
                        .map_err(|e| VfsError::SamodError(format!("Failed to find document: {e}")))?
                        .ok_or_else(|| {
                            VfsError::SamodError(format!("Document {current_node_id} not found"))
                        })?;
                    current_doc = AutomergeHelpers::read_directory(&current_handle)?;
                } else {
                    // Add our new directory to the parent
                    AutomergeHelpers::add_child_to_directory(&current_handle, &new_dir_ref)?;

                    // Update for next iteration
                    current_handle = new_node_handle;
                    current_doc = AutomergeHelpers::read_directory(&current_handle)?;
                }

                last_segment_ref = None;

                if is_last_segment {
                    return Ok(TraverseResult {
                        node_handle: current_handle,
                        node: current_doc,
                        target_ref: None,
                        parent_path: current_path.clone(),
                    });
                }
            } else if create_missing && is_last_segment {
                // Create the final directory in the path
                let new_doc = automerge::Automerge::new();
                let new_node_handle = self.samod.create(new_doc).await.map_err(|e| {
                    VfsError::SamodError(format!("Failed to create directory document: {e}"))
                })?;
                let new_node_id = new_node_handle.document_id().clone();

                // Initialize the new node as a directory
                AutomergeHelpers::init_as_directory(&new_node_handle, segment)?;

                // Add the new node to the parent's children
                let new_dir_ref = RefNode::new_directory(segment.to_string(), new_node_id.clone());
                AutomergeHelpers::add_child_to_directory(&current_handle, &new_dir_ref)?;

                // Return the newly created directory
                let new_dir_node = AutomergeHelpers::read_directory(&new_node_handle)?;
                return Ok(TraverseResult {
                    node_handle: new_node_handle,
                    node: new_dir_node,
                    target_ref: None,
                    parent_path: current_path.clone(),
                });
            } else if is_last_segment {
                // Target doesn't exist, return parent directory for potential creation
                return Ok(TraverseResult {
                    node_handle: current_handle,
                    node: current_doc,
                    target_ref: None,
                    parent_path: current_path.clone(),
                });
            } else {
                // Node doesn't exist and we're not creating it
                return Err(VfsError::PathNotFound(current_path));
            }
        }

        // If we get here, we've reached the requested node
        Ok(TraverseResult {
            node_handle: current_handle,
            node: current_doc,
            target_ref: last_segment_ref,
            parent_path: current_path,
        })
    }
}
