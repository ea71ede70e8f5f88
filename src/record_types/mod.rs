//! Record classification.
//!
//! A [`RecordTypeRegistry`] holds an ordered list of [`RecordType`]s.
//! Each incoming record is classified by the first type whose matcher
//! accepts it, with the registry's default type as the catch-all.
//! Types can be renamed, recoloured, re-pointed at a new matcher,
//! reordered and deselected at runtime; views that filter on selection
//! follow those changes through [`RegistryListener`].

mod record_type;
mod registry;

pub use record_type::{RecordType, TypeChange, TypeListener, DEFAULT_TYPE_NAME};
pub use registry::{
    ImportReport, RecordTypeDescriptor, RecordTypeRegistry, RegistryEvent, RegistryListener,
    GENERATED_NAME_PREFIX,
};
