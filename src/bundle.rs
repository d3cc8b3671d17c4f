pub mod bundle;
pub mod path;

pub use bundle::{
    AddFileOptions, Bundle, BundleConfig, BundleError, BundleIndex, ConflictResolution,
    EntryMetadata, EntrypointConflictResolution, FileDescriptor, FromFilesOptions, Manifest,
    MergeOptions, RandomAccess, ValidationLevel, ValidationMessage, ValidationOptions,
    ValidationResult,
};
pub use path::{BundlePath, PathError};
