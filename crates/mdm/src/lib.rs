//! Node-item tree for schema-described documents.
//!
//! Documents are stored as an arena of nodes addressed by [`NodeId`]. Parent links are
//! plain indices, so the tree is owned top-down by the [`Document`] and handed out to
//! evaluators as cheap [`NodeRef`] handles.
//!
//! # Key Types
//!
//! - [`NodeItem`]: the contract the path-language engine is written against
//! - [`DocumentBuilder`]: thread-safe incremental construction
//! - [`Definition`] / [`DataType`]: the slice of the definition model the engine consumes

pub mod datatype;
pub mod definition;
pub mod document;
pub mod error;
pub mod node;
pub mod qname;

pub use datatype::{DataType, RawKind};
pub use definition::{Definition, ModelKind};
pub use document::{Document, DocumentBuilder, NodeId, NodeRef};
pub use error::MdmError;
pub use node::{Location, NodeItem, NodeKind};
pub use qname::QName;
