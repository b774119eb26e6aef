//! Reversible tree mutations and the undo stack boundary.
//!
//! Every undoable edit is a [`Command`]: a label, the forward [`Mutation`]
//! and the precomputed inverse, each carrying all the data it needs to
//! run (a removed subtree travels inside its `Attach` inverse). The core
//! hands commands to an [`UndoSink`]; [`UndoHistory`] is the bundled
//! bounded implementation.

use uuid::Uuid;

use crate::error::EditError;
use crate::model::{Attribute, NodeContent};
use crate::tree::{DetachedSubtree, Tree};

/// Undo depth used by [`UndoHistory::default`].
pub const DEFAULT_UNDO_LIMIT: usize = 100;

// ── Mutation ───────────────────────────────────────────────────────

/// One structural change to a [`Tree`].
///
/// Applying a mutation either succeeds completely or fails with the tree
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a subtree at its recorded parent and position.
    Attach(DetachedSubtree),
    /// Remove the subtree rooted at this node.
    Detach(Uuid),
    /// Re-parent a node. `index` counts positions after the node left its
    /// old place and is clamped to the child count.
    Move {
        node: Uuid,
        parent: Uuid,
        index: usize,
    },
    InsertAttribute {
        entry: Uuid,
        index: usize,
        attribute: Attribute,
    },
    RemoveAttribute {
        entry: Uuid,
        key: String,
    },
    /// Overwrite the editable content of a node.
    Replace {
        node: Uuid,
        content: NodeContent,
    },
    /// Several mutations applied in order as one step. If any step fails
    /// the tree is left as it was before the first.
    Sequence(Vec<Mutation>),
}

impl Mutation {
    /// Run this mutation against `tree`.
    ///
    /// # Errors
    ///
    /// Returns the [`EditError`] of the underlying tree primitive, most
    /// often [`EditError::InvalidNode`] when a referenced node is gone.
    pub fn apply(&self, tree: &mut Tree) -> Result<(), EditError> {
        match self {
            Self::Attach(subtree) => tree.attach(subtree),
            Self::Detach(uuid) => tree.detach(*uuid).map(drop),
            Self::Move {
                node,
                parent,
                index,
            } => tree.move_node(*node, *parent, *index).map(drop),
            Self::InsertAttribute {
                entry,
                index,
                attribute,
            } => tree.insert_attribute(*entry, *index, attribute.clone()),
            Self::RemoveAttribute { entry, key } => tree.remove_attribute(*entry, key).map(drop),
            Self::Replace { node, content } => tree.replace_content(*node, content),
            Self::Sequence(steps) => {
                let mut scratch = tree.clone();
                for step in steps {
                    step.apply(&mut scratch)?;
                }
                *tree = scratch;
                Ok(())
            }
        }
    }
}

// ── Command ────────────────────────────────────────────────────────

/// A labelled pair of mutations: what was done and how to take it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    label: String,
    forward: Mutation,
    inverse: Mutation,
}

impl Command {
    #[must_use]
    pub fn new(label: impl Into<String>, forward: Mutation, inverse: Mutation) -> Self {
        Self {
            label: label.into(),
            forward,
            inverse,
        }
    }

    /// Action name shown in "Undo <label>" menu items.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn forward(&self) -> &Mutation {
        &self.forward
    }

    #[must_use]
    pub const fn inverse(&self) -> &Mutation {
        &self.inverse
    }

    /// Apply the forward mutation.
    ///
    /// # Errors
    ///
    /// See [`Mutation::apply`].
    pub fn redo(&self, tree: &mut Tree) -> Result<(), EditError> {
        self.forward.apply(tree)
    }

    /// Apply the inverse mutation.
    ///
    /// # Errors
    ///
    /// See [`Mutation::apply`].
    pub fn undo(&self, tree: &mut Tree) -> Result<(), EditError> {
        self.inverse.apply(tree)
    }
}

// ── Undo sink ──────────────────────────────────────────────────────

/// Receiver of committed commands. The editor pushes every undoable edit
/// here after it has been applied.
pub trait UndoSink {
    fn register(&mut self, command: Command);
}

/// Bounded undo/redo stacks.
///
/// Registering a command clears the redo stack. When the undo stack grows
/// past its limit the oldest command is dropped.
#[derive(Debug, Clone)]
pub struct UndoHistory {
    undo: Vec<Command>,
    redo: Vec<Command>,
    limit: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_UNDO_LIMIT)
    }
}

impl UndoHistory {
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit,
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[must_use]
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.last().map(Command::label)
    }

    #[must_use]
    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(Command::label)
    }

    /// Undo the most recent command. Returns its label, or `None` when
    /// there is nothing to undo.
    ///
    /// # Errors
    ///
    /// When the inverse no longer applies (the content it refers to was
    /// removed by a non-undoable operation), the command is dropped, the
    /// tree is left unchanged and the error is returned.
    pub fn undo(&mut self, tree: &mut Tree) -> Result<Option<String>, EditError> {
        let Some(command) = self.undo.pop() else {
            return Ok(None);
        };
        if let Err(e) = command.undo(tree) {
            tracing::debug!(label = command.label(), error = %e, "Undo failed, command dropped");
            return Err(e);
        }
        let label = command.label.clone();
        self.redo.push(command);
        Ok(Some(label))
    }

    /// Redo the most recently undone command.
    ///
    /// # Errors
    ///
    /// Same contract as [`UndoHistory::undo`].
    pub fn redo(&mut self, tree: &mut Tree) -> Result<Option<String>, EditError> {
        let Some(command) = self.redo.pop() else {
            return Ok(None);
        };
        if let Err(e) = command.redo(tree) {
            tracing::debug!(label = command.label(), error = %e, "Redo failed, command dropped");
            return Err(e);
        }
        let label = command.label.clone();
        self.undo.push(command);
        Ok(Some(label))
    }

    /// Forget every command. Commands can hold secret content, so this
    /// runs whenever the document locks.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl UndoSink for UndoHistory {
    fn register(&mut self, command: Command) {
        self.redo.clear();
        self.undo.push(command);
        let excess = self.undo.len().saturating_sub(self.limit);
        if excess > 0 {
            self.undo.drain(..excess);
        }
    }
}

impl UndoSink for Vec<Command> {
    fn register(&mut self, command: Command) {
        self.push(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, NodeData};

    fn tree_with_entry() -> (Tree, Uuid) {
        let mut tree = Tree::new("Root");
        let root = tree.root_id();
        let entry = tree
            .insert(root, 0, &NodeData::Entry(Entry::new()))
            .unwrap();
        (tree, entry)
    }

    fn add_attribute_command(entry: Uuid, key: &str) -> Command {
        Command::new(
            "Add Attribute",
            Mutation::InsertAttribute {
                entry,
                index: usize::MAX,
                attribute: Attribute::new(key, "", false),
            },
            Mutation::RemoveAttribute {
                entry,
                key: key.to_string(),
            },
        )
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let (mut tree, entry) = tree_with_entry();
        let mut history = UndoHistory::default();
        let command = add_attribute_command(entry, "Pin");
        command.redo(&mut tree).unwrap();
        history.register(command);

        assert_eq!(history.undo(&mut tree).unwrap().as_deref(), Some("Add Attribute"));
        assert!(!tree.find_entry(entry).unwrap().has_attribute("Pin"));
        assert!(history.can_redo());

        history.redo(&mut tree).unwrap();
        assert!(tree.find_entry(entry).unwrap().has_attribute("Pin"));
        assert!(!history.can_redo());
    }

    #[test]
    fn register_clears_redo() {
        let (mut tree, entry) = tree_with_entry();
        let mut history = UndoHistory::default();
        let first = add_attribute_command(entry, "A");
        first.redo(&mut tree).unwrap();
        history.register(first);
        history.undo(&mut tree).unwrap();

        let second = add_attribute_command(entry, "B");
        second.redo(&mut tree).unwrap();
        history.register(second);
        assert!(!history.can_redo());
    }

    #[test]
    fn limit_drops_oldest() {
        let mut history = UndoHistory::with_limit(2);
        let entry = Uuid::new_v4();
        for key in ["A", "B", "C"] {
            history.register(add_attribute_command(entry, key));
        }
        assert_eq!(history.undo.len(), 2);
        assert_eq!(
            history.undo[0].forward(),
            add_attribute_command(entry, "B").forward()
        );
    }

    #[test]
    fn failed_undo_drops_command_and_keeps_tree() {
        let (mut tree, entry) = tree_with_entry();
        let mut history = UndoHistory::default();
        let command = add_attribute_command(entry, "Pin");
        command.redo(&mut tree).unwrap();
        history.register(command);

        tree.detach(entry).unwrap();
        let before = tree.to_data();
        assert_eq!(
            history.undo(&mut tree),
            Err(EditError::InvalidNode(entry))
        );
        assert_eq!(tree.to_data(), before);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn failed_sequence_step_leaves_tree_untouched() {
        let (mut tree, entry) = tree_with_entry();
        let before = tree.to_data();
        let sequence = Mutation::Sequence(vec![
            Mutation::InsertAttribute {
                entry,
                index: 0,
                attribute: Attribute::new("Pin", "1234", true),
            },
            Mutation::Detach(Uuid::new_v4()),
        ]);
        assert!(matches!(
            sequence.apply(&mut tree),
            Err(EditError::InvalidNode(_))
        ));
        assert_eq!(tree.to_data(), before);
    }

    #[test]
    fn empty_history_is_a_no_op() {
        let (mut tree, _) = tree_with_entry();
        let mut history = UndoHistory::default();
        assert_eq!(history.undo(&mut tree), Ok(None));
        assert_eq!(history.redo(&mut tree), Ok(None));
    }
}
