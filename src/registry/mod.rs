//! The document-type registry.
//!
//! A scan ([`Scanner::build`]) produces a complete [`Snapshot`]; the
//! [`DefaultResolver`] annotates it with the current OS defaults, and the
//! [`DefaultMutator`] changes those defaults. Publishing and coordination live
//! in [`crate::service`].

pub mod builder;
pub mod error;
pub mod mutator;
pub mod resolver;
pub mod tables;
pub mod types;

pub use builder::{ScanSettings, Scanner};
pub use error::{RegistryError, Result};
pub use mutator::DefaultMutator;
pub use resolver::DefaultResolver;
pub use types::{
    AppRef, ApplicationRecord, CanonicalType, Category, IconHandle, KeyKind, Role, ScanStats,
    Snapshot, TypeKey, same_identifier,
};
