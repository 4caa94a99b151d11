//! Stable-identity DOM snapshot capture and rebuild.
//!
//! # Scope
//!
//! This crate provides:
//! - **Serialized graph** - [`SerializedNode`] and its JSON form
//! - **Mirror** - bidirectional id/node registry with per-node metadata
//! - **Serializer** - masking, blocking, slim-DOM filtering and inlining of
//!   stylesheets, canvases, images, media and dialog state
//! - **Capture session** - waits on frames, stylesheets, cross-origin sheet
//!   clones and images, resolved on a local [`smol`] executor
//! - **Materializer** - graph back to live nodes, reusing meta-equal ones
//! - **Arena host** - [`ArenaHost`] over a [`replica_dom::DomTree`]
//!
//! # Not Implemented
//!
//! - Incremental mutation recording (the snapshot is one full capture)
//! - Real image codecs; rasters travel as the arena's own data URLs

pub mod arena;
pub mod host;
pub mod mirror;
pub mod policy;
pub mod rebuild;
pub mod resources;
pub mod serialize;
pub mod session;
pub mod stylesheets;
pub mod types;

pub use arena::ArenaHost;
pub use host::{
    DialogMode, Doctype, HostError, LoadOutcome, MediaCommand, MediaSnapshot, NodeFactory,
    Readiness, SheetAccess, SourceKind, SourceTree, StylesheetHost,
};
pub use mirror::Mirror;
pub use policy::{
    BuildOptions, ClassMatcher, DataUrlOptions, MaskInputOptions, SerializePolicy, SlimDomOptions,
};
pub use rebuild::{Materializer, rebuild};
pub use serialize::{CaptureState, Deferred, IdGenerator, Serializer, slim_dom_excluded};
pub use session::{CaptureSession, Completion};
pub use stylesheets::{CLONE_TAG_ATTRIBUTE, StylesheetManager};
pub use types::{
    AttributeValue, Attributes, ElementNode, IGNORED_NODE, NodeData, NodeKind, RrAttribute,
    SCRIPT_PLACEHOLDER, SerializedNode, UNKNOWN_NODE,
};
