//! Undoable structural editing of a [`Tree`].
//!
//! Each operation validates first, applies its forward [`Mutation`], then
//! registers the [`Command`] with the undo sink. A failed operation leaves
//! both the tree and the sink untouched. [`UndoableEditor::empty_trash`] is
//! the one destructive operation that registers nothing.

use uuid::Uuid;

use crate::command::{Command, Mutation, UndoSink};
use crate::error::EditError;
use crate::model::{
    Attribute, Entry, Group, NodeContent, NodeData, Timestamps, DEFAULT_GROUP_TITLE, TITLE_KEY,
};
use crate::tree::{DetachedSubtree, Tree};

/// Prefix of generated custom attribute keys (`Attribute-1`, ...).
pub const CUSTOM_ATTRIBUTE_PREFIX: &str = "Attribute-";

/// Options for [`UndoableEditor::duplicate_entry_with_options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateOptions {
    /// Copy the source's history into the duplicate.
    pub include_history: bool,
    /// Copy the source's binaries into the duplicate.
    pub include_attachments: bool,
    /// Appended to the duplicate's title.
    pub title_suffix: String,
}

impl Default for DuplicateOptions {
    fn default() -> Self {
        Self {
            include_history: false,
            include_attachments: true,
            title_suffix: " Copy".into(),
        }
    }
}

/// What a delete did with the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// Moved to the end of the trash group.
    MovedToTrash,
    /// Removed from the tree together with its subtree.
    Removed,
}

/// Editing handle over a tree and an undo sink.
///
/// Borrowed for the duration of one or more operations; the tree and the
/// sink are owned elsewhere.
pub struct UndoableEditor<'a> {
    tree: &'a mut Tree,
    sink: &'a mut dyn UndoSink,
    trash_enabled: bool,
    max_history_items: usize,
}

impl<'a> UndoableEditor<'a> {
    pub fn new(tree: &'a mut Tree, sink: &'a mut dyn UndoSink, trash_enabled: bool) -> Self {
        Self {
            tree,
            sink,
            trash_enabled,
            max_history_items: usize::MAX,
        }
    }

    /// Cap on entry history length applied when committing edits.
    #[must_use]
    pub fn with_max_history_items(mut self, max: usize) -> Self {
        self.max_history_items = max;
        self
    }

    #[must_use]
    pub fn tree(&self) -> &Tree {
        &*self.tree
    }

    fn execute(&mut self, command: Command) -> Result<(), EditError> {
        command.redo(self.tree)?;
        self.sink.register(command);
        Ok(())
    }

    fn require_group(&self, uuid: Uuid) -> Result<&Group, EditError> {
        self.tree.find_group(uuid).ok_or(EditError::InvalidNode(uuid))
    }

    fn require_entry(&self, uuid: Uuid) -> Result<&Entry, EditError> {
        self.tree.find_entry(uuid).ok_or(EditError::InvalidNode(uuid))
    }

    /// Insert `data` as the last child of `parent`, undoable.
    fn append(&mut self, label: &str, parent: Uuid, data: NodeData) -> Result<Uuid, EditError> {
        let index = self.require_group(parent)?.children().len();
        self.insert_at(label, parent, index, data)
    }

    fn insert_at(
        &mut self,
        label: &str,
        parent: Uuid,
        index: usize,
        data: NodeData,
    ) -> Result<Uuid, EditError> {
        let uuid = data.uuid();
        let subtree = DetachedSubtree {
            parent,
            index,
            data,
            held_trash: None,
            held_templates: None,
        };
        self.execute(Command::new(
            label,
            Mutation::Attach(subtree),
            Mutation::Detach(uuid),
        ))?;
        Ok(uuid)
    }

    // ── Creation ───────────────────────────────────────────────────

    /// Append a new group titled [`DEFAULT_GROUP_TITLE`] to `parent`.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `parent` is not a group.
    pub fn create_group(&mut self, parent: Uuid) -> Result<Uuid, EditError> {
        let data = NodeData::Group {
            group: Group::new(DEFAULT_GROUP_TITLE),
            children: Vec::new(),
        };
        let uuid = self.append("Add Group", parent, data)?;
        tracing::debug!(group_id = %uuid, parent_id = %parent, "Group created");
        Ok(uuid)
    }

    /// Append a new entry with the standard keys, all empty, to `parent`.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `parent` is not a group.
    pub fn create_entry(&mut self, parent: Uuid) -> Result<Uuid, EditError> {
        let uuid = self.append("Add Entry", parent, NodeData::Entry(Entry::new()))?;
        tracing::debug!(entry_id = %uuid, parent_id = %parent, "Entry created");
        Ok(uuid)
    }

    /// Append a copy of `template` to `target`. The copy gets a fresh UUID,
    /// fresh timestamps and no history.
    ///
    /// # Errors
    ///
    /// - [`EditError::TemplateNotFound`] unless `template` is an entry
    ///   inside the templates group
    /// - [`EditError::InvalidNode`] if `target` is not a group
    pub fn create_entry_from_template(
        &mut self,
        template: Uuid,
        target: Uuid,
    ) -> Result<Uuid, EditError> {
        let templates = self
            .tree
            .meta()
            .templates
            .ok_or(EditError::TemplateNotFound(template))?;
        if !self.tree.is_ancestor(templates, template) {
            return Err(EditError::TemplateNotFound(template));
        }
        let source = self
            .tree
            .find_entry(template)
            .ok_or(EditError::TemplateNotFound(template))?;

        let mut entry = Entry::blank(Uuid::new_v4());
        entry.icon_id = source.icon_id;
        entry.attributes.clone_from(&source.attributes);
        entry.binaries.clone_from(&source.binaries);

        let uuid = self.append("Add Entry From Template", target, NodeData::Entry(entry))?;
        tracing::debug!(entry_id = %uuid, template_id = %template, "Entry created from template");
        Ok(uuid)
    }

    // ── Attributes ─────────────────────────────────────────────────

    /// Add an empty, unprotected attribute under the first free
    /// `Attribute-N` key. Returns the key.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `entry` is not an entry.
    pub fn create_custom_attribute(&mut self, entry: Uuid) -> Result<String, EditError> {
        let target = self.require_entry(entry)?;
        let key = (1_usize..)
            .map(|n| format!("{CUSTOM_ATTRIBUTE_PREFIX}{n}"))
            .find(|key| !target.has_attribute(key))
            .ok_or(EditError::InvalidNode(entry))?;
        self.add_attribute(entry, &key, "", false)?;
        Ok(key)
    }

    /// Append an attribute to `entry`.
    ///
    /// # Errors
    ///
    /// - [`EditError::InvalidNode`] if `entry` is not an entry
    /// - [`EditError::NameCollision`] if `key` already exists
    pub fn add_attribute(
        &mut self,
        entry: Uuid,
        key: &str,
        value: &str,
        protected: bool,
    ) -> Result<(), EditError> {
        let target = self.require_entry(entry)?;
        if target.has_attribute(key) {
            return Err(EditError::NameCollision(key.to_string()));
        }
        let index = target.attributes.len();
        self.execute(Command::new(
            "Add Attribute",
            Mutation::InsertAttribute {
                entry,
                index,
                attribute: Attribute::new(key, value, protected),
            },
            Mutation::RemoveAttribute {
                entry,
                key: key.to_string(),
            },
        ))
    }

    /// Remove the attribute `key` from `entry`.
    ///
    /// # Errors
    ///
    /// - [`EditError::InvalidNode`] if `entry` is not an entry
    /// - [`EditError::UnknownAttribute`] if `key` does not exist
    pub fn remove_attribute(&mut self, entry: Uuid, key: &str) -> Result<(), EditError> {
        let target = self.require_entry(entry)?;
        let (index, attribute) = target
            .attributes
            .iter()
            .enumerate()
            .find(|(_, a)| a.key == key)
            .map(|(i, a)| (i, a.clone()))
            .ok_or_else(|| EditError::UnknownAttribute(key.to_string()))?;
        self.execute(Command::new(
            "Remove Attribute",
            Mutation::RemoveAttribute {
                entry,
                key: key.to_string(),
            },
            Mutation::InsertAttribute {
                entry,
                index,
                attribute,
            },
        ))
    }

    // ── Deletion ───────────────────────────────────────────────────

    /// Delete a group or an entry.
    ///
    /// With trash enabled, a node outside the trash (other than the
    /// templates group) moves to the end of the trash group. A missing
    /// trash group is created by the same command, and undo removes it.
    /// Anything else is removed permanently. Both are undoable.
    ///
    /// # Errors
    ///
    /// - [`EditError::InvalidNode`] if `node` is not in the tree
    /// - [`EditError::ProtectedNode`] for the root, the active trash group
    ///   and any group containing it
    pub fn delete_node(&mut self, node: Uuid) -> Result<Deletion, EditError> {
        if node == self.tree.root_id() {
            return Err(EditError::ProtectedNode(node));
        }
        if !self.tree.contains(node) {
            return Err(EditError::InvalidNode(node));
        }
        if let Some(trash) = self.tree.active_trash(self.trash_enabled) {
            if trash == node || self.tree.is_ancestor(node, trash) {
                return Err(EditError::ProtectedNode(node));
            }
        }

        let is_templates = self.tree.meta().templates == Some(node);
        let trash = self.tree.active_trash(self.trash_enabled);
        if self.trash_enabled && trash.is_none() && !is_templates {
            self.move_to_new_trash(node)?;
            return Ok(Deletion::MovedToTrash);
        }

        match trash {
            Some(trash) if !is_templates && !self.tree.is_trashed(node, Some(trash)) => {
                self.move_to_trash(node, trash)?;
                tracing::debug!(node_id = %node, "Node moved to trash");
                Ok(Deletion::MovedToTrash)
            }
            _ => {
                let snapshot = self.tree.snapshot(node)?;
                self.execute(Command::new(
                    "Delete",
                    Mutation::Detach(node),
                    Mutation::Attach(snapshot),
                ))?;
                tracing::debug!(node_id = %node, "Node deleted permanently");
                Ok(Deletion::Removed)
            }
        }
    }

    fn move_to_trash(&mut self, node: Uuid, trash: Uuid) -> Result<(), EditError> {
        let forward = Mutation::Move {
            node,
            parent: trash,
            index: usize::MAX,
        };
        let (parent, index) = self.tree.move_node(node, trash, usize::MAX)?;
        self.sink.register(Command::new(
            "Move To Trash",
            forward,
            Mutation::Move {
                node,
                parent,
                index,
            },
        ));
        Ok(())
    }

    /// First soft delete: the trash group is created and the node moved
    /// into it as one command, so undo removes the trash group again.
    fn move_to_new_trash(&mut self, node: Uuid) -> Result<(), EditError> {
        let parent = self.tree.parent_of(node).ok_or(EditError::InvalidNode(node))?;
        let index = self.tree.index_of(node).ok_or(EditError::InvalidNode(node))?;
        let trash = self.tree.new_trash();
        let trash_id = trash.uuid();
        self.execute(Command::new(
            "Move To Trash",
            Mutation::Sequence(vec![
                Mutation::Attach(trash),
                Mutation::Move {
                    node,
                    parent: trash_id,
                    index: usize::MAX,
                },
            ]),
            Mutation::Sequence(vec![
                Mutation::Move {
                    node,
                    parent,
                    index,
                },
                Mutation::Detach(trash_id),
            ]),
        ))?;
        tracing::info!(trash_id = %trash_id, node_id = %node, "Trash group created, node moved to trash");
        Ok(())
    }

    /// [`delete_node`](Self::delete_node) restricted to groups.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `group` is not a group, otherwise as
    /// [`delete_node`](Self::delete_node).
    pub fn delete_group(&mut self, group: Uuid) -> Result<Deletion, EditError> {
        self.require_group(group)?;
        self.delete_node(group)
    }

    /// [`delete_node`](Self::delete_node) restricted to entries.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `entry` is not an entry.
    pub fn delete_entry(&mut self, entry: Uuid) -> Result<Deletion, EditError> {
        self.require_entry(entry)?;
        self.delete_node(entry)
    }

    /// Permanently remove every child of the active trash group. The trash
    /// group stays, empty. Not undoable. Returns the number of removed
    /// nodes.
    ///
    /// # Errors
    ///
    /// Propagates a tree error if a trash child cannot be detached.
    pub fn empty_trash(&mut self) -> Result<usize, EditError> {
        let Some(trash) = self.tree.active_trash(self.trash_enabled) else {
            return Ok(0);
        };
        let children = self.require_group(trash)?.children().to_vec();
        let mut removed = 0_usize;
        for child in children {
            let subtree = self.tree.detach(child)?;
            removed = removed.saturating_add(subtree.data.uuids().len());
        }
        tracing::info!(removed, "Trash emptied");
        Ok(removed)
    }

    // ── Duplicate / move ───────────────────────────────────────────

    /// Duplicate with [`DuplicateOptions::default`].
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `entry` is not an entry.
    pub fn duplicate_entry(&mut self, entry: Uuid) -> Result<Uuid, EditError> {
        self.duplicate_entry_with_options(entry, &DuplicateOptions::default())
    }

    /// Insert a deep copy of `entry` right after it. Binaries are
    /// independent copies.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `entry` is not an entry.
    pub fn duplicate_entry_with_options(
        &mut self,
        entry: Uuid,
        options: &DuplicateOptions,
    ) -> Result<Uuid, EditError> {
        let source = self.require_entry(entry)?;
        let parent = source.parent().ok_or(EditError::InvalidNode(entry))?;
        let index = self
            .tree
            .index_of(entry)
            .ok_or(EditError::InvalidNode(entry))?
            .saturating_add(1);

        let mut copy = Entry {
            uuid: Uuid::new_v4(),
            times: Timestamps::now(),
            parent: None,
            ..source.clone()
        };
        if !options.include_history {
            copy.history.clear();
        }
        if !options.include_attachments {
            copy.binaries.clear();
        }
        let title = format!("{}{}", source.title(), options.title_suffix);
        copy.set_value(TITLE_KEY, title);

        let uuid = self.insert_at("Duplicate Entry", parent, index, NodeData::Entry(copy))?;
        tracing::debug!(entry_id = %uuid, source_id = %entry, "Entry duplicated");
        Ok(uuid)
    }

    /// Move `node` under `parent` at `index` (clamped).
    ///
    /// # Errors
    ///
    /// - [`EditError::InvalidNode`] if either node is missing or `parent`
    ///   is not a group
    /// - [`EditError::ProtectedNode`] for the root
    /// - [`EditError::InvalidMove`] if `parent` lies inside `node`
    pub fn move_node(&mut self, node: Uuid, parent: Uuid, index: usize) -> Result<(), EditError> {
        let (old_parent, old_index) = self.tree.move_node(node, parent, index)?;
        self.sink.register(Command::new(
            "Move",
            Mutation::Move {
                node,
                parent,
                index,
            },
            Mutation::Move {
                node,
                parent: old_parent,
                index: old_index,
            },
        ));
        Ok(())
    }

    // ── Content ────────────────────────────────────────────────────

    /// Replace the editable content of `node` in one undoable step. An
    /// entry's previous state is pushed into its history. Returns `false`
    /// and registers nothing when `content` equals the current content.
    ///
    /// # Errors
    ///
    /// [`EditError::InvalidNode`] if `node` is missing or `content` is of
    /// the other variant.
    pub fn replace_content(&mut self, node: Uuid, content: NodeContent) -> Result<bool, EditError> {
        let current = self.tree.content(node).ok_or(EditError::InvalidNode(node))?;
        if current == content {
            return Ok(false);
        }
        let next = match (&current, content) {
            (NodeContent::Entry(previous), NodeContent::Entry(mut draft)) => {
                draft.push_history((**previous).clone(), self.max_history_items);
                draft.times.touch();
                NodeContent::Entry(draft)
            }
            (NodeContent::Group(_), next @ NodeContent::Group(_)) => next,
            _ => return Err(EditError::InvalidNode(node)),
        };
        self.execute(Command::new(
            "Edit",
            Mutation::Replace {
                node,
                content: next,
            },
            Mutation::Replace {
                node,
                content: current,
            },
        ))?;
        tracing::debug!(node_id = %node, "Node content replaced");
        Ok(true)
    }
}
