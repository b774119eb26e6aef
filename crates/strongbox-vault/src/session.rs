//! Draft editing of a single node.
//!
//! A session copies a node's content, lets the caller change the copy
//! freely, and commits it back as one undoable step. Nothing reaches the
//! tree before [`EditSession::commit`].

use uuid::Uuid;

use crate::editor::UndoableEditor;
use crate::error::EditError;
use crate::model::{Entry, GroupFields, NodeContent};
use crate::tree::Tree;

#[derive(Debug, Clone)]
pub struct EditSession {
    node: Uuid,
    original: NodeContent,
    draft: NodeContent,
}

impl EditSession {
    /// Start editing `node`.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `node` is not in `tree`.
    pub fn begin(tree: &Tree, node: Uuid) -> Result<Self, EditError> {
        let original = tree.content(node).ok_or(EditError::InvalidNode(node))?;
        Ok(Self {
            node,
            draft: original.clone(),
            original,
        })
    }

    #[must_use]
    pub const fn node(&self) -> Uuid {
        self.node
    }

    #[must_use]
    pub const fn draft(&self) -> &NodeContent {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut NodeContent {
        &mut self.draft
    }

    /// The draft entry, `None` for a group session.
    pub fn entry_mut(&mut self) -> Option<&mut Entry> {
        match &mut self.draft {
            NodeContent::Entry(entry) => Some(entry.as_mut()),
            NodeContent::Group(_) => None,
        }
    }

    /// The draft group fields, `None` for an entry session.
    pub fn group_mut(&mut self) -> Option<&mut GroupFields> {
        match &mut self.draft {
            NodeContent::Group(fields) => Some(fields),
            NodeContent::Entry(_) => None,
        }
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.draft != self.original
    }

    /// Write the draft back as one undoable edit. Returns `false` when
    /// nothing changed; no command is registered then.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if the node was removed meanwhile.
    pub fn commit(self, editor: &mut UndoableEditor<'_>) -> Result<bool, EditError> {
        self.apply(editor)
    }

    /// As [`EditSession::commit`], but the session survives so a failed
    /// write can be retried.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if the node was removed meanwhile.
    pub fn apply(&self, editor: &mut UndoableEditor<'_>) -> Result<bool, EditError> {
        if !self.has_changes() {
            return Ok(false);
        }
        editor.replace_content(self.node, self.draft.clone())
    }

    /// Discard the draft.
    pub fn cancel(self) {
        tracing::debug!(node_id = %self.node, "Edit session cancelled");
    }
}
