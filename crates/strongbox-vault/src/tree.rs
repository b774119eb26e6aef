//! The document tree: root group, UUID index and structural primitives.
//!
//! Nodes live in a `HashMap<Uuid, Node>` arena. A group lists its children
//! by UUID and every node names its parent by UUID, so lookups are O(1) and
//! no node owns another. All structural changes go through the `pub(crate)`
//! primitives here, which keep three invariants:
//!
//! - UUIDs are unique across the tree
//! - `meta.trash` / `meta.templates`, when set, name groups in the tree
//! - the root is never removed and no node is its own ancestor

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EditError, StructureError};
use crate::model::{
    Attribute, Entry, Group, Node, NodeContent, NodeData, TreeData, TreeMeta, TRASH_ICON,
};

/// Title of a trash group created on demand.
pub const TRASH_TITLE: &str = "Trash";

/// A subtree cut out of the tree (or copied from it), together with the
/// place it occupied. Re-attaching it restores structure, content and any
/// special role (trash, templates) a group inside it played.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedSubtree {
    pub parent: Uuid,
    pub index: usize,
    pub data: NodeData,
    pub(crate) held_trash: Option<Uuid>,
    pub(crate) held_templates: Option<Uuid>,
}

impl DetachedSubtree {
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.data.uuid()
    }
}

/// The aggregate root of a decrypted document.
#[derive(Debug, Clone)]
pub struct Tree {
    root: Uuid,
    nodes: HashMap<Uuid, Node>,
    meta: TreeMeta,
}

impl Tree {
    /// A tree holding only a root group titled `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let root = Group::new(name);
        let root_id = root.uuid;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, Node::Group(root));
        Self {
            root: root_id,
            nodes,
            meta: TreeMeta {
                name: name.to_string(),
                ..TreeMeta::default()
            },
        }
    }

    /// Build a tree from its nested form, validating every invariant.
    ///
    /// # Errors
    ///
    /// - [`StructureError::RootNotGroup`] if the root is an entry
    /// - [`StructureError::DuplicateUuid`] if two nodes share a UUID
    /// - [`StructureError::DanglingTrash`] / [`StructureError::DanglingTemplates`]
    ///   if a special group reference names no group in the tree
    /// - [`StructureError::RootAsSpecialGroup`] if either reference names
    ///   the root
    pub fn from_data(data: TreeData) -> Result<Self, StructureError> {
        let TreeData { meta, root } = data;
        let NodeData::Group { group, children } = root else {
            return Err(StructureError::RootNotGroup);
        };

        let mut seen = HashSet::new();
        for uuid in children.iter().flat_map(NodeData::uuids) {
            if uuid == group.uuid || !seen.insert(uuid) {
                return Err(StructureError::DuplicateUuid(uuid));
            }
        }

        let root_id = group.uuid;
        let mut root = group;
        root.parent = None;
        root.children = children.iter().map(NodeData::uuid).collect();

        let mut tree = Self {
            root: root_id,
            nodes: HashMap::with_capacity(seen.len().saturating_add(1)),
            meta,
        };
        tree.nodes.insert(root_id, Node::Group(root));
        for child in &children {
            tree.insert_data(root_id, child);
        }

        for special in [tree.meta.trash, tree.meta.templates].into_iter().flatten() {
            if special == root_id {
                return Err(StructureError::RootAsSpecialGroup(special));
            }
        }
        if let Some(trash) = tree.meta.trash {
            if tree.find_group(trash).is_none() {
                return Err(StructureError::DanglingTrash(trash));
            }
        }
        if let Some(templates) = tree.meta.templates {
            if tree.find_group(templates).is_none() {
                return Err(StructureError::DanglingTemplates(templates));
            }
        }

        Ok(tree)
    }

    /// The nested form of the whole tree.
    #[must_use]
    pub fn to_data(&self) -> TreeData {
        TreeData {
            meta: self.meta.clone(),
            root: self.subtree_data(self.root).unwrap_or_else(|| NodeData::Group {
                group: Group::new(&self.meta.name),
                children: Vec::new(),
            }),
        }
    }

    // -- Accessors ---------------------------------------------------------

    #[must_use]
    pub const fn root_id(&self) -> Uuid {
        self.root
    }

    /// The root group. Only `None` on a tree whose arena lost its root,
    /// which the structural primitives never allow.
    #[must_use]
    pub fn root(&self) -> Option<&Group> {
        self.find_group(self.root)
    }

    #[must_use]
    pub const fn meta(&self) -> &TreeMeta {
        &self.meta
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn contains(&self, uuid: Uuid) -> bool {
        self.nodes.contains_key(&uuid)
    }

    #[must_use]
    pub fn node(&self, uuid: Uuid) -> Option<&Node> {
        self.nodes.get(&uuid)
    }

    /// Look up a group by UUID. Entries and unknown UUIDs yield `None`.
    #[must_use]
    pub fn find_group(&self, uuid: Uuid) -> Option<&Group> {
        self.nodes.get(&uuid).and_then(Node::as_group)
    }

    /// Look up an entry by UUID. Groups and unknown UUIDs yield `None`.
    #[must_use]
    pub fn find_entry(&self, uuid: Uuid) -> Option<&Entry> {
        self.nodes.get(&uuid).and_then(Node::as_entry)
    }

    pub(crate) fn group_mut(&mut self, uuid: Uuid) -> Option<&mut Group> {
        match self.nodes.get_mut(&uuid) {
            Some(Node::Group(g)) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn entry_mut(&mut self, uuid: Uuid) -> Option<&mut Entry> {
        match self.nodes.get_mut(&uuid) {
            Some(Node::Entry(e)) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn parent_of(&self, uuid: Uuid) -> Option<Uuid> {
        self.nodes.get(&uuid).and_then(Node::parent)
    }

    /// Position of `uuid` among its siblings.
    #[must_use]
    pub fn index_of(&self, uuid: Uuid) -> Option<usize> {
        let parent = self.find_group(self.parent_of(uuid)?)?;
        parent.children.iter().position(|&c| c == uuid)
    }

    /// Whether `ancestor` lies strictly above `uuid`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: Uuid, uuid: Uuid) -> bool {
        let mut current = self.parent_of(uuid);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    // -- Traversal ---------------------------------------------------------

    /// Every node below `start` in preorder (parents before children,
    /// children in position order). `start` itself is excluded.
    fn descendants(&self, start: Uuid) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Uuid> = self
            .find_group(start)
            .map(|g| g.children.iter().rev().copied().collect())
            .unwrap_or_default();

        while let Some(uuid) = stack.pop() {
            let Some(node) = self.nodes.get(&uuid) else {
                continue;
            };
            if let Node::Group(g) = node {
                stack.extend(g.children.iter().rev().copied());
            }
            out.push(node);
        }
        out
    }

    /// All groups below the root, in traversal order.
    #[must_use]
    pub fn all_groups(&self) -> Vec<&Group> {
        self.descendants(self.root)
            .into_iter()
            .filter_map(Node::as_group)
            .collect()
    }

    /// All entries in the tree, in traversal order.
    #[must_use]
    pub fn all_entries(&self) -> Vec<&Entry> {
        self.descendants(self.root)
            .into_iter()
            .filter_map(Node::as_entry)
            .collect()
    }

    /// All entries below `group`, in traversal order.
    #[must_use]
    pub fn entries_in(&self, group: Uuid) -> Vec<&Entry> {
        self.descendants(group)
            .into_iter()
            .filter_map(Node::as_entry)
            .collect()
    }

    /// Nested copy of the subtree rooted at `uuid`.
    #[must_use]
    pub fn subtree_data(&self, uuid: Uuid) -> Option<NodeData> {
        match self.nodes.get(&uuid)? {
            Node::Entry(e) => Some(NodeData::Entry(e.clone())),
            Node::Group(g) => {
                let children = g
                    .children
                    .iter()
                    .filter_map(|&c| self.subtree_data(c))
                    .collect();
                Some(NodeData::Group {
                    group: g.clone(),
                    children,
                })
            }
        }
    }

    // -- Trash / templates -------------------------------------------------

    /// The trash group if trash is enabled and the group exists.
    #[must_use]
    pub fn active_trash(&self, trash_enabled: bool) -> Option<Uuid> {
        if !trash_enabled {
            return None;
        }
        self.meta.trash.filter(|&t| self.find_group(t).is_some())
    }

    /// Whether `uuid` lies inside `trash`. The trash group itself is not
    /// trashed, and nothing is trashed when `trash` is `None`.
    #[must_use]
    pub fn is_trashed(&self, uuid: Uuid, trash: Option<Uuid>) -> bool {
        trash.is_some_and(|t| t != uuid && self.is_ancestor(t, uuid))
    }

    /// Set (or clear) the trash group.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::InvalidNode`] if `trash` is not a group below root.
    pub fn set_trash(&mut self, trash: Option<Uuid>) -> Result<(), EditError> {
        self.check_special_group(trash)?;
        self.meta.trash = trash;
        Ok(())
    }

    /// Set (or clear) the templates group.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::InvalidNode`] if `templates` is not a group below root.
    pub fn set_templates(&mut self, templates: Option<Uuid>) -> Result<(), EditError> {
        self.check_special_group(templates)?;
        self.meta.templates = templates;
        Ok(())
    }

    fn check_special_group(&self, uuid: Option<Uuid>) -> Result<(), EditError> {
        match uuid {
            Some(u) if u == self.root || self.find_group(u).is_none() => {
                Err(EditError::InvalidNode(u))
            }
            _ => Ok(()),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.meta.name = name.into();
    }

    pub fn set_allow_empty_key(&mut self, allow: bool) {
        self.meta.allow_empty_key = allow;
    }

    pub(crate) fn set_master_key_changed(&mut self, at: DateTime<Utc>) {
        self.meta.master_key_changed = Some(at);
    }

    /// A new, empty trash group placed at the end of root. Attaching it
    /// registers it as the trash group; detaching it clears the role.
    pub(crate) fn new_trash(&self) -> DetachedSubtree {
        let mut trash = Group::new(TRASH_TITLE);
        trash.icon_id = TRASH_ICON;
        let uuid = trash.uuid;
        DetachedSubtree {
            parent: self.root,
            index: self.root().map_or(0, |r| r.children.len()),
            data: NodeData::Group {
                group: trash,
                children: Vec::new(),
            },
            held_trash: Some(uuid),
            held_templates: None,
        }
    }

    // -- Structural primitives ---------------------------------------------

    /// Insert the nested `data` under `parent` at `index` (clamped).
    pub(crate) fn insert(
        &mut self,
        parent: Uuid,
        index: usize,
        data: &NodeData,
    ) -> Result<Uuid, EditError> {
        if self.find_group(parent).is_none() {
            return Err(EditError::InvalidNode(parent));
        }
        let mut incoming = HashSet::new();
        for uuid in data.uuids() {
            if self.nodes.contains_key(&uuid) || !incoming.insert(uuid) {
                return Err(EditError::DuplicateNode(uuid));
            }
        }

        let uuid = self.insert_data(parent, data);
        if let Some(group) = self.group_mut(parent) {
            let index = index.min(group.children.len());
            group.children.insert(index, uuid);
        }
        Ok(uuid)
    }

    /// Put every node of `data` into the arena with `parent` as the
    /// subtree's parent. Does not touch `parent`'s child list.
    fn insert_data(&mut self, parent: Uuid, data: &NodeData) -> Uuid {
        match data {
            NodeData::Entry(e) => {
                let mut entry = e.clone();
                entry.parent = Some(parent);
                let uuid = entry.uuid;
                self.nodes.insert(uuid, Node::Entry(entry));
                uuid
            }
            NodeData::Group { group, children } => {
                let mut group = group.clone();
                group.parent = Some(parent);
                group.children = children.iter().map(NodeData::uuid).collect();
                let uuid = group.uuid;
                self.nodes.insert(uuid, Node::Group(group));
                for child in children {
                    self.insert_data(uuid, child);
                }
                uuid
            }
        }
    }

    /// Copy the subtree at `uuid` together with its location.
    pub(crate) fn snapshot(&self, uuid: Uuid) -> Result<DetachedSubtree, EditError> {
        if uuid == self.root {
            return Err(EditError::ProtectedNode(uuid));
        }
        let parent = self.parent_of(uuid).ok_or(EditError::InvalidNode(uuid))?;
        let index = self.index_of(uuid).ok_or(EditError::InvalidNode(uuid))?;
        let data = self
            .subtree_data(uuid)
            .ok_or(EditError::InvalidNode(uuid))?;
        let inside = |special: Option<Uuid>| {
            special.filter(|&s| s == uuid || self.is_ancestor(uuid, s))
        };
        Ok(DetachedSubtree {
            parent,
            index,
            held_trash: inside(self.meta.trash),
            held_templates: inside(self.meta.templates),
            data,
        })
    }

    /// Remove the subtree at `uuid` from the tree and return it.
    pub(crate) fn detach(&mut self, uuid: Uuid) -> Result<DetachedSubtree, EditError> {
        let detached = self.snapshot(uuid)?;

        if let Some(parent) = self.group_mut(detached.parent) {
            parent.children.retain(|&c| c != uuid);
        }
        for removed in detached.data.uuids() {
            self.nodes.remove(&removed);
        }
        if detached.held_trash.is_some() {
            self.meta.trash = None;
        }
        if detached.held_templates.is_some() {
            self.meta.templates = None;
        }
        Ok(detached)
    }

    /// Re-insert a detached subtree where it came from.
    pub(crate) fn attach(&mut self, detached: &DetachedSubtree) -> Result<(), EditError> {
        self.insert(detached.parent, detached.index, &detached.data)?;
        if detached.held_trash.is_some() {
            self.meta.trash = detached.held_trash;
        }
        if detached.held_templates.is_some() {
            self.meta.templates = detached.held_templates;
        }
        Ok(())
    }

    /// Move `uuid` under `parent` at `index` (clamped, counted after the
    /// node left its old place). Returns the old parent and position.
    pub(crate) fn move_node(
        &mut self,
        uuid: Uuid,
        parent: Uuid,
        index: usize,
    ) -> Result<(Uuid, usize), EditError> {
        if uuid == self.root {
            return Err(EditError::ProtectedNode(uuid));
        }
        if self.find_group(parent).is_none() {
            return Err(EditError::InvalidNode(parent));
        }
        if parent == uuid || self.is_ancestor(uuid, parent) {
            return Err(EditError::InvalidMove {
                node: uuid,
                target: parent,
            });
        }
        let old_parent = self.parent_of(uuid).ok_or(EditError::InvalidNode(uuid))?;
        let old_index = self.index_of(uuid).ok_or(EditError::InvalidNode(uuid))?;

        if let Some(group) = self.group_mut(old_parent) {
            group.children.remove(old_index);
        }
        if let Some(group) = self.group_mut(parent) {
            let index = index.min(group.children.len());
            group.children.insert(index, uuid);
        }
        if let Some(node) = self.nodes.get_mut(&uuid) {
            node.set_parent(Some(parent));
        }
        Ok((old_parent, old_index))
    }

    pub(crate) fn insert_attribute(
        &mut self,
        entry: Uuid,
        index: usize,
        attribute: Attribute,
    ) -> Result<(), EditError> {
        let target = self.entry_mut(entry).ok_or(EditError::InvalidNode(entry))?;
        if target.has_attribute(&attribute.key) {
            return Err(EditError::NameCollision(attribute.key.clone()));
        }
        let index = index.min(target.attributes.len());
        target.attributes.insert(index, attribute);
        target.times.touch();
        Ok(())
    }

    pub(crate) fn remove_attribute(
        &mut self,
        entry: Uuid,
        key: &str,
    ) -> Result<(usize, Attribute), EditError> {
        let target = self.entry_mut(entry).ok_or(EditError::InvalidNode(entry))?;
        let index = target
            .attributes
            .iter()
            .position(|a| a.key == key)
            .ok_or_else(|| EditError::UnknownAttribute(key.to_string()))?;
        let removed = target.attributes.remove(index);
        target.times.touch();
        Ok((index, removed))
    }

    /// Editable content of `uuid`.
    #[must_use]
    pub fn content(&self, uuid: Uuid) -> Option<NodeContent> {
        match self.nodes.get(&uuid)? {
            Node::Group(g) => Some(NodeContent::Group(g.fields())),
            Node::Entry(e) => Some(NodeContent::Entry(Box::new(e.clone()))),
        }
    }

    /// Overwrite the content of `uuid`. UUID, parent and creation time are
    /// kept from the node in the tree.
    pub(crate) fn replace_content(
        &mut self,
        uuid: Uuid,
        content: &NodeContent,
    ) -> Result<(), EditError> {
        match (self.nodes.get_mut(&uuid), content) {
            (Some(Node::Group(g)), NodeContent::Group(fields)) => {
                g.title.clone_from(&fields.title);
                g.notes.clone_from(&fields.notes);
                g.icon_id = fields.icon_id;
                g.times.expires = fields.expires;
                g.times.touch();
                Ok(())
            }
            (Some(Node::Entry(e)), NodeContent::Entry(draft)) => {
                let parent = e.parent;
                let created = e.times.created;
                *e = Entry {
                    uuid,
                    parent,
                    ..(**draft).clone()
                };
                e.times.created = created;
                Ok(())
            }
            _ => Err(EditError::InvalidNode(uuid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TITLE_KEY;

    fn sample() -> (Tree, Uuid, Uuid, Uuid) {
        let mut tree = Tree::new("Root");
        let root = tree.root_id();
        let group = tree
            .insert(
                root,
                usize::MAX,
                &NodeData::Group {
                    group: Group::new("Mail"),
                    children: Vec::new(),
                },
            )
            .unwrap();
        let mut entry = Entry::new();
        entry.set_value(TITLE_KEY, "Inbox");
        let entry = tree.insert(group, 0, &NodeData::Entry(entry)).unwrap();
        (tree, root, group, entry)
    }

    #[test]
    fn lookup_resolves_every_node() {
        let (tree, root, group, entry) = sample();
        assert!(tree.find_group(root).is_some());
        assert!(tree.find_group(group).is_some());
        assert!(tree.find_entry(entry).is_some());
        assert!(tree.find_entry(group).is_none());
        assert!(tree.find_group(Uuid::new_v4()).is_none());
        assert_eq!(tree.parent_of(entry), Some(group));
    }

    #[test]
    fn all_groups_excludes_root() {
        let (tree, _, group, _) = sample();
        let groups: Vec<Uuid> = tree.all_groups().iter().map(|g| g.uuid).collect();
        assert_eq!(groups, vec![group]);
    }

    #[test]
    fn insert_rejects_existing_uuid() {
        let (mut tree, root, _, entry) = sample();
        let duplicate = NodeData::Entry(tree.find_entry(entry).unwrap().clone());
        assert_eq!(
            tree.insert(root, 0, &duplicate),
            Err(EditError::DuplicateNode(entry))
        );
    }

    #[test]
    fn detach_then_attach_restores_position() {
        let (mut tree, root, group, _) = sample();
        let before = tree.to_data();
        let detached = tree.detach(group).unwrap();
        assert_eq!(tree.node_count(), 1);
        tree.attach(&detached).unwrap();
        assert_eq!(tree.to_data(), before);
        assert_eq!(tree.index_of(group), Some(0));
        assert_eq!(tree.parent_of(group), Some(root));
    }

    #[test]
    fn detach_clears_and_attach_restores_special_roles() {
        let (mut tree, _, group, _) = sample();
        tree.set_templates(Some(group)).unwrap();
        let detached = tree.detach(group).unwrap();
        assert_eq!(tree.meta().templates, None);
        tree.attach(&detached).unwrap();
        assert_eq!(tree.meta().templates, Some(group));
    }

    #[test]
    fn root_cannot_be_detached_or_moved() {
        let (mut tree, root, group, _) = sample();
        assert_eq!(tree.detach(root), Err(EditError::ProtectedNode(root)));
        assert_eq!(
            tree.move_node(root, group, 0),
            Err(EditError::ProtectedNode(root))
        );
    }

    #[test]
    fn move_into_own_subtree_is_rejected() {
        let (mut tree, root, group, _) = sample();
        let child = tree
            .insert(
                group,
                0,
                &NodeData::Group {
                    group: Group::new("Sub"),
                    children: Vec::new(),
                },
            )
            .unwrap();
        assert_eq!(
            tree.move_node(group, child, 0),
            Err(EditError::InvalidMove {
                node: group,
                target: child
            })
        );
        assert_eq!(tree.parent_of(group), Some(root));
    }

    #[test]
    fn trash_group_is_not_trashed_but_its_content_is() {
        let (mut tree, root, group, entry) = sample();
        let subtree = tree.new_trash();
        let trash = subtree.uuid();
        tree.attach(&subtree).unwrap();
        assert_eq!(tree.meta().trash, Some(trash));
        assert_eq!(tree.root().unwrap().children().last(), Some(&trash));
        assert_eq!(tree.parent_of(trash), Some(root));
        tree.move_node(group, trash, 0).unwrap();
        let active = tree.active_trash(true);
        assert_eq!(active, Some(trash));
        assert!(!tree.is_trashed(trash, active));
        assert!(tree.is_trashed(group, active));
        assert!(tree.is_trashed(entry, active));
        assert!(!tree.is_trashed(entry, tree.active_trash(false)));
    }

    #[test]
    fn from_data_rejects_duplicate_uuid() {
        let (tree, _, _, entry) = sample();
        let mut data = tree.to_data();
        if let NodeData::Group { children, .. } = &mut data.root {
            children.push(NodeData::Entry(tree.find_entry(entry).unwrap().clone()));
        }
        assert_eq!(
            Tree::from_data(data).unwrap_err(),
            StructureError::DuplicateUuid(entry)
        );
    }

    #[test]
    fn from_data_rejects_dangling_trash() {
        let (tree, _, _, entry) = sample();
        let mut data = tree.to_data();
        data.meta.trash = Some(entry);
        assert_eq!(
            Tree::from_data(data).unwrap_err(),
            StructureError::DanglingTrash(entry)
        );
    }

    #[test]
    fn from_data_rejects_root_as_trash_or_templates() {
        let (tree, root, group, _) = sample();
        let mut data = tree.to_data();
        data.meta.trash = Some(root);
        assert_eq!(
            Tree::from_data(data).unwrap_err(),
            StructureError::RootAsSpecialGroup(root)
        );

        let mut data = tree.to_data();
        data.meta.trash = Some(group);
        data.meta.templates = Some(root);
        assert_eq!(
            Tree::from_data(data).unwrap_err(),
            StructureError::RootAsSpecialGroup(root)
        );
    }

    #[test]
    fn root_group_is_present_after_construction_and_load() {
        let (tree, root, group, _) = sample();
        assert_eq!(tree.root().map(|r| r.uuid), Some(root));
        assert_eq!(tree.root().unwrap().children(), &[group]);

        let rebuilt = Tree::from_data(tree.to_data()).unwrap();
        assert_eq!(rebuilt.root().map(|r| r.uuid), Some(root));
        assert_eq!(rebuilt.root().unwrap().parent(), None);
    }

    #[test]
    fn set_trash_rejects_root_and_entries() {
        let (mut tree, root, _, entry) = sample();
        assert_eq!(tree.set_trash(Some(root)), Err(EditError::InvalidNode(root)));
        assert_eq!(tree.set_trash(Some(entry)), Err(EditError::InvalidNode(entry)));
        assert_eq!(tree.set_trash(None), Ok(()));
    }
}
