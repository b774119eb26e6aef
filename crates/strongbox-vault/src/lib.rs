//! `strongbox-vault`: the document core of Strongbox.
//!
//! Holds the decrypted group/entry tree, undoable editing with soft delete
//! through a trash group, search, the lock lifecycle around the composite
//! key, and the facade that ties them together.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod model;
pub mod tree;

pub mod command;
pub mod editor;
pub mod session;

pub mod search;

pub mod container;
pub mod lock;

pub mod events;
pub mod preferences;

pub mod document;

pub use command::{Command, Mutation, UndoHistory, UndoSink};
pub use container::{ContainerCodec, ContainerHeader, SealedJsonCodec};
pub use document::{Document, Selection};
pub use editor::{Deletion, DuplicateOptions, UndoableEditor};
pub use error::{ContainerError, EditError, StructureError, UnlockError, ValidationError};
pub use events::{DocumentEvent, EventSink};
pub use lock::{LockController, LockState, PasswordChangePolicy};
pub use model::{
    Attribute, Binary, Entry, Group, GroupFields, Node, NodeContent, NodeData, NodeKind, NodeRef,
    Timestamps, TreeData, TreeMeta,
};
pub use preferences::{PasswordChangeIntervals, PreferenceSource, Preferences};
pub use search::{search, SearchContext, SearchFilters, SearchResult, SearchScope};
pub use session::EditSession;
pub use tree::{DetachedSubtree, Tree};
