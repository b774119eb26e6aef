//! The document facade.
//!
//! [`Document`] ties the lock lifecycle, the editor, undo history, search,
//! selection and the edit session together, and tells subscribers what
//! happened. Every mutation refreshes the search result and drops
//! selections of nodes that no longer exist. Locking or reverting clears
//! all of that state, since undo commands and drafts can carry secrets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use strongbox_crypto_core::CompositeKey;
use uuid::Uuid;

use crate::command::UndoHistory;
use crate::container::ContainerCodec;
use crate::editor::{Deletion, DuplicateOptions, UndoableEditor};
use crate::error::{ContainerError, EditError, UnlockError, ValidationError};
use crate::events::{DocumentEvent, EventSink};
use crate::lock::{LockController, LockState};
use crate::model::{NodeKind, NodeRef};
use crate::preferences::PreferenceSource;
use crate::search::{search, SearchContext, SearchResult};
use crate::session::EditSession;
use crate::tree::Tree;

/// What the user has selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub group: Option<Uuid>,
    pub entry: Option<Uuid>,
    /// The item shown in the inspector; either a group or an entry.
    pub item: Option<NodeRef>,
}

pub struct Document {
    lock: LockController,
    undo: UndoHistory,
    sinks: Vec<Box<dyn EventSink>>,
    selection: Selection,
    search_context: Option<SearchContext>,
    search_result: SearchResult,
    session: Option<EditSession>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("lock", &self.lock)
            .field("selection", &self.selection)
            .field("search_context", &self.search_context)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// A locked document over existing container bytes.
    pub fn open(
        document_id: impl Into<String>,
        container: Vec<u8>,
        codec: Arc<dyn ContainerCodec>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        Self::from_controller(LockController::open(
            document_id,
            container,
            codec,
            preferences,
        ))
    }

    /// A new, unlocked document holding an empty root group named `name`.
    pub fn create(
        document_id: impl Into<String>,
        name: &str,
        key: CompositeKey,
        codec: Arc<dyn ContainerCodec>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        Self::from_controller(LockController::with_tree(
            document_id,
            Tree::new(name),
            key,
            codec,
            preferences,
        ))
    }

    fn from_controller(lock: LockController) -> Self {
        Self {
            lock,
            undo: UndoHistory::default(),
            sinks: Vec::new(),
            selection: Selection::default(),
            search_context: None,
            search_result: SearchResult::default(),
            session: None,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    #[must_use]
    pub const fn lock_controller(&self) -> &LockController {
        &self.lock
    }

    #[must_use]
    pub const fn state(&self) -> LockState {
        self.lock.state()
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.lock.is_unlocked()
    }

    #[must_use]
    pub fn tree(&self) -> Option<&Tree> {
        self.lock.tree()
    }

    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub const fn undo_history(&self) -> &UndoHistory {
        &self.undo
    }

    /// Active trash group, honouring the trash preference.
    #[must_use]
    pub fn trash(&self) -> Option<Uuid> {
        let enabled = self.lock.preferences().trash_enabled();
        self.tree().and_then(|t| t.active_trash(enabled))
    }

    /// Whether `node` lies inside the active trash group.
    #[must_use]
    pub fn is_trashed(&self, node: Uuid) -> bool {
        let trash = self.trash();
        self.tree().is_some_and(|t| t.is_trashed(node, trash))
    }

    // ── Events ─────────────────────────────────────────────────────

    pub fn subscribe(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    fn emit(&mut self, event: DocumentEvent) {
        for sink in &mut self.sinks {
            sink.notify(event);
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// See [`LockController::unlock`]. Emits [`DocumentEvent::Unlocked`].
    ///
    /// # Errors
    ///
    /// Propagates [`UnlockError`].
    pub fn unlock(
        &mut self,
        password: Option<&str>,
        key_file: Option<&Path>,
    ) -> Result<(), UnlockError> {
        self.lock.unlock(password, key_file)?;
        self.refresh_search();
        self.emit(DocumentEvent::Unlocked);
        Ok(())
    }

    /// Encode, lock and clear undo history, search, selection and any
    /// open edit session. Emits [`DocumentEvent::Locked`]; no-op when
    /// already locked.
    ///
    /// # Errors
    ///
    /// Propagates the encoding error; nothing is cleared then.
    pub fn lock(&mut self) -> Result<(), ContainerError> {
        if !self.lock.is_unlocked() {
            return Ok(());
        }
        self.lock.lock()?;
        self.clear_transient_state();
        self.emit(DocumentEvent::Locked);
        Ok(())
    }

    /// Replace the encrypted container with `container`, discarding the
    /// decrypted state without saving it. Emits [`DocumentEvent::Reverted`].
    pub fn revert(&mut self, container: Vec<u8>) {
        self.lock.revert(container);
        self.clear_transient_state();
        self.emit(DocumentEvent::Reverted);
    }

    fn clear_transient_state(&mut self) {
        self.undo.clear();
        self.search_result = SearchResult::default();
        self.selection = Selection::default();
        self.session = None;
    }

    /// Encode the tree and return the container bytes. Emits
    /// [`DocumentEvent::WillSave`] first.
    ///
    /// # Errors
    ///
    /// Propagates the codec error.
    pub fn save(&mut self) -> Result<Vec<u8>, ContainerError> {
        self.emit(DocumentEvent::WillSave);
        self.lock.save().map(<[u8]>::to_vec)
    }

    /// See [`LockController::change_credentials`].
    ///
    /// # Errors
    ///
    /// Propagates [`ValidationError`].
    pub fn change_credentials(
        &mut self,
        password: Option<&str>,
        key_file: Option<&Path>,
    ) -> Result<(), ValidationError> {
        self.lock.change_credentials(password, key_file)
    }

    #[must_use]
    pub fn suggested_key_file_location(&self) -> Option<PathBuf> {
        self.lock.suggested_key_file_location()
    }

    #[must_use]
    pub fn should_recommend_password_change(&self) -> bool {
        self.lock.should_recommend_password_change()
    }

    #[must_use]
    pub fn should_enforce_password_change(&self) -> bool {
        self.lock.should_enforce_password_change()
    }

    // ── Editing ────────────────────────────────────────────────────

    fn edit<T>(
        &mut self,
        op: impl FnOnce(&mut UndoableEditor<'_>) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        let preferences = self.lock.preferences();
        let trash_enabled = preferences.trash_enabled();
        let max_history = preferences.max_history_items();

        let tree = self.lock.tree_mut()?;
        let mut editor = UndoableEditor::new(tree, &mut self.undo, trash_enabled)
            .with_max_history_items(max_history);
        let out = op(&mut editor)?;
        self.after_mutation();
        Ok(out)
    }

    fn after_mutation(&mut self) {
        self.refresh_search();
        self.prune_selection();
    }

    /// Append a new group to `parent`. Emits [`DocumentEvent::GroupAdded`].
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::create_group`].
    pub fn create_group(&mut self, parent: Uuid) -> Result<Uuid, EditError> {
        let uuid = self.edit(|e| e.create_group(parent))?;
        self.emit(DocumentEvent::GroupAdded(NodeRef {
            uuid,
            kind: NodeKind::Group,
        }));
        Ok(uuid)
    }

    /// Append a new entry to `parent`. Emits [`DocumentEvent::EntryAdded`].
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::create_entry`].
    pub fn create_entry(&mut self, parent: Uuid) -> Result<Uuid, EditError> {
        let uuid = self.edit(|e| e.create_entry(parent))?;
        self.emit_entry_added(uuid);
        Ok(uuid)
    }

    /// Copy `template` into the selected group, or into root when no group
    /// is selected.
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as
    /// [`UndoableEditor::create_entry_from_template`].
    pub fn create_entry_from_template(&mut self, template: Uuid) -> Result<Uuid, EditError> {
        let root = self
            .tree()
            .map(Tree::root_id)
            .ok_or(EditError::NotUnlocked)?;
        let target = self.selection.group.unwrap_or(root);
        let uuid = self.edit(|e| e.create_entry_from_template(template, target))?;
        self.emit_entry_added(uuid);
        Ok(uuid)
    }

    fn emit_entry_added(&mut self, uuid: Uuid) {
        self.emit(DocumentEvent::EntryAdded(NodeRef {
            uuid,
            kind: NodeKind::Entry,
        }));
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as
    /// [`UndoableEditor::create_custom_attribute`].
    pub fn create_custom_attribute(&mut self, entry: Uuid) -> Result<String, EditError> {
        self.edit(|e| e.create_custom_attribute(entry))
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::add_attribute`].
    pub fn add_attribute(
        &mut self,
        entry: Uuid,
        key: &str,
        value: &str,
        protected: bool,
    ) -> Result<(), EditError> {
        self.edit(|e| e.add_attribute(entry, key, value, protected))
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::remove_attribute`].
    pub fn remove_attribute(&mut self, entry: Uuid, key: &str) -> Result<(), EditError> {
        self.edit(|e| e.remove_attribute(entry, key))
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::delete_node`].
    pub fn delete_node(&mut self, node: Uuid) -> Result<Deletion, EditError> {
        self.edit(|e| e.delete_node(node))
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::delete_group`].
    pub fn delete_group(&mut self, group: Uuid) -> Result<Deletion, EditError> {
        self.edit(|e| e.delete_group(group))
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::delete_entry`].
    pub fn delete_entry(&mut self, entry: Uuid) -> Result<Deletion, EditError> {
        self.edit(|e| e.delete_entry(entry))
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::empty_trash`].
    pub fn empty_trash(&mut self) -> Result<usize, EditError> {
        self.edit(|e| e.empty_trash())
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::duplicate_entry`].
    pub fn duplicate_entry(&mut self, entry: Uuid) -> Result<Uuid, EditError> {
        self.duplicate_entry_with_options(entry, &DuplicateOptions::default())
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as
    /// [`UndoableEditor::duplicate_entry_with_options`].
    pub fn duplicate_entry_with_options(
        &mut self,
        entry: Uuid,
        options: &DuplicateOptions,
    ) -> Result<Uuid, EditError> {
        let uuid = self.edit(|e| e.duplicate_entry_with_options(entry, options))?;
        self.emit_entry_added(uuid);
        Ok(uuid)
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or as [`UndoableEditor::move_node`].
    pub fn move_node(&mut self, node: Uuid, parent: Uuid, index: usize) -> Result<(), EditError> {
        self.edit(|e| e.move_node(node, parent, index))
    }

    /// Designate the trash group. Not undoable.
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`], or [`EditError::InvalidNode`] if `group`
    /// is not a group below root.
    pub fn set_trash_group(&mut self, group: Option<Uuid>) -> Result<(), EditError> {
        self.lock.tree_mut()?.set_trash(group)?;
        self.after_mutation();
        Ok(())
    }

    /// Designate the templates group. Not undoable.
    ///
    /// # Errors
    ///
    /// As [`Document::set_trash_group`].
    pub fn set_templates_group(&mut self, group: Option<Uuid>) -> Result<(), EditError> {
        self.lock.tree_mut()?.set_templates(group)?;
        Ok(())
    }

    // ── Undo / redo ────────────────────────────────────────────────

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.is_unlocked() && self.undo.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.is_unlocked() && self.undo.can_redo()
    }

    /// Undo the last command. No add events are emitted.
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`], or the error of an inverse that no
    /// longer applies (the command is dropped, the tree unchanged).
    pub fn undo(&mut self) -> Result<Option<String>, EditError> {
        let tree = self.lock.tree_mut()?;
        let label = self.undo.undo(tree)?;
        self.after_mutation();
        Ok(label)
    }

    /// Redo the last undone command.
    ///
    /// # Errors
    ///
    /// As [`Document::undo`].
    pub fn redo(&mut self) -> Result<Option<String>, EditError> {
        let tree = self.lock.tree_mut()?;
        let label = self.undo.redo(tree)?;
        self.after_mutation();
        Ok(label)
    }

    // ── Selection ──────────────────────────────────────────────────

    fn require_node(&self, uuid: Uuid, kind: NodeKind) -> Result<(), EditError> {
        let tree = self.tree().ok_or(EditError::NotUnlocked)?;
        match tree.node(uuid) {
            Some(node) if node.kind() == kind => Ok(()),
            _ => Err(EditError::InvalidNode(uuid)),
        }
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`], or [`EditError::InvalidNode`] if `group`
    /// is not a group.
    pub fn select_group(&mut self, group: Option<Uuid>) -> Result<(), EditError> {
        if let Some(uuid) = group {
            self.require_node(uuid, NodeKind::Group)?;
        }
        self.selection.group = group;
        Ok(())
    }

    /// # Errors
    ///
    /// [`EditError::NotUnlocked`], or [`EditError::InvalidNode`] if `entry`
    /// is not an entry.
    pub fn select_entry(&mut self, entry: Option<Uuid>) -> Result<(), EditError> {
        if let Some(uuid) = entry {
            self.require_node(uuid, NodeKind::Entry)?;
        }
        self.selection.entry = entry;
        Ok(())
    }

    /// Set the inspected item. Emits [`DocumentEvent::CurrentItemChanged`]
    /// when it actually changes.
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`], or [`EditError::InvalidNode`] if the
    /// reference does not match a node.
    pub fn set_current_item(&mut self, item: Option<NodeRef>) -> Result<(), EditError> {
        if let Some(node) = item {
            self.require_node(node.uuid, node.kind)?;
        }
        if self.selection.item != item {
            self.selection.item = item;
            self.emit(DocumentEvent::CurrentItemChanged(item));
        }
        Ok(())
    }

    fn prune_selection(&mut self) {
        let Some(tree) = self.lock.tree() else {
            return;
        };
        let gone = |uuid: Option<Uuid>| uuid.is_some_and(|u| !tree.contains(u));
        let group_gone = gone(self.selection.group);
        let entry_gone = gone(self.selection.entry);
        let item_gone = gone(self.selection.item.map(|i| i.uuid));

        if group_gone {
            self.selection.group = None;
        }
        if entry_gone {
            self.selection.entry = None;
        }
        if item_gone {
            self.selection.item = None;
            self.emit(DocumentEvent::CurrentItemChanged(None));
        }
    }

    // ── Search ─────────────────────────────────────────────────────

    /// A fresh context with preference defaults applied.
    #[must_use]
    pub fn new_search_context(&self) -> SearchContext {
        SearchContext {
            include_trashed: self.lock.preferences().search_includes_trash(),
            ..SearchContext::default()
        }
    }

    /// Set the search context and recompute the result.
    pub fn set_search_context(&mut self, context: SearchContext) {
        self.search_context = Some(context);
        self.refresh_search();
    }

    pub fn clear_search(&mut self) {
        self.search_context = None;
        self.search_result = SearchResult::default();
    }

    #[must_use]
    pub const fn search_context(&self) -> Option<&SearchContext> {
        self.search_context.as_ref()
    }

    #[must_use]
    pub const fn search_result(&self) -> &SearchResult {
        &self.search_result
    }

    fn refresh_search(&mut self) {
        let trash = self.trash();
        self.search_result = match (self.lock.tree(), &self.search_context) {
            (Some(tree), Some(context)) => search(tree, context, trash, Utc::now()),
            _ => SearchResult::default(),
        };
    }

    // ── Edit session ───────────────────────────────────────────────

    /// Open an edit session on `node`, replacing any open one.
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] or [`EditError::InvalidNode`].
    pub fn begin_edit(&mut self, node: Uuid) -> Result<(), EditError> {
        let tree = self.tree().ok_or(EditError::NotUnlocked)?;
        self.session = Some(EditSession::begin(tree, node)?);
        Ok(())
    }

    #[must_use]
    pub const fn edit_session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn edit_session_mut(&mut self) -> Option<&mut EditSession> {
        self.session.as_mut()
    }

    /// Commit the open session as one undoable edit. Returns `false` when
    /// the draft had no changes. On failure the session stays open with
    /// its draft.
    ///
    /// # Errors
    ///
    /// [`EditError::NoEditSession`], [`EditError::NotUnlocked`] or the
    /// error of [`UndoableEditor::replace_content`].
    pub fn commit_edit(&mut self) -> Result<bool, EditError> {
        let session = self.session.take().ok_or(EditError::NoEditSession)?;
        match self.edit(|e| session.apply(e)) {
            Ok(changed) => Ok(changed),
            Err(e) => {
                self.session = Some(session);
                Err(e)
            }
        }
    }

    /// Discard the open session, if any.
    pub fn cancel_edit(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
    }
}
