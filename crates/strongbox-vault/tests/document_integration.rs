#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the document facade: events, selection, search
//! refresh and the state cleared by lock and revert.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use strongbox_crypto_core::{Argon2idParams, CompositeKey};
use strongbox_vault::model::TITLE_KEY;
use strongbox_vault::{
    Deletion, Document, DocumentEvent, EditError, LockState, NodeKind, NodeRef, Preferences,
    SealedJsonCodec, SearchScope, Selection, UnlockError,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const PASSWORD: &str = "correct horse";

const fn fast_params() -> Argon2idParams {
    Argon2idParams {
        m_cost: 32,
        t_cost: 1,
        p_cost: 1,
    }
}

fn create_with(prefs: Preferences) -> (Document, Receiver<DocumentEvent>) {
    let mut doc = Document::create(
        "journal.sbx",
        "Journal",
        CompositeKey::from_password(PASSWORD),
        Arc::new(SealedJsonCodec::new(fast_params())),
        Arc::new(prefs),
    );
    let (tx, rx) = mpsc::channel();
    doc.subscribe(Box::new(tx));
    (doc, rx)
}

fn create() -> (Document, Receiver<DocumentEvent>) {
    create_with(Preferences::default())
}

fn root(doc: &Document) -> Uuid {
    doc.tree().unwrap().root_id()
}

fn titled_entry(doc: &mut Document, parent: Uuid, title: &str) -> Uuid {
    let entry = doc.create_entry(parent).unwrap();
    doc.begin_edit(entry).unwrap();
    doc.edit_session_mut()
        .unwrap()
        .entry_mut()
        .unwrap()
        .set_value(TITLE_KEY, title);
    assert!(doc.commit_edit().unwrap());
    entry
}

fn drain(rx: &Receiver<DocumentEvent>) -> Vec<DocumentEvent> {
    rx.try_iter().collect()
}

const fn group_ref(uuid: Uuid) -> NodeRef {
    NodeRef {
        uuid,
        kind: NodeKind::Group,
    }
}

const fn entry_ref(uuid: Uuid) -> NodeRef {
    NodeRef {
        uuid,
        kind: NodeKind::Entry,
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn creation_emits_add_events_but_undo_redo_do_not() {
    let (mut doc, rx) = create();
    let root = root(&doc);

    let group = doc.create_group(root).unwrap();
    let entry = doc.create_entry(group).unwrap();
    assert_eq!(
        drain(&rx),
        vec![
            DocumentEvent::GroupAdded(group_ref(group)),
            DocumentEvent::EntryAdded(entry_ref(entry)),
        ]
    );

    doc.undo().unwrap();
    doc.undo().unwrap();
    doc.redo().unwrap();
    doc.redo().unwrap();
    assert!(drain(&rx).is_empty());
    assert!(doc.tree().unwrap().find_entry(entry).is_some());
}

#[test]
fn duplicate_emits_entry_added() {
    let (mut doc, rx) = create();
    let root = root(&doc);
    let entry = titled_entry(&mut doc, root, "Diary");
    drain(&rx);

    let copy = doc.duplicate_entry(entry).unwrap();
    assert_eq!(drain(&rx), vec![DocumentEvent::EntryAdded(entry_ref(copy))]);
    assert_eq!(doc.tree().unwrap().find_entry(copy).unwrap().title(), "Diary Copy");
    assert_eq!(doc.tree().unwrap().index_of(copy), Some(1));
}

#[test]
fn lifecycle_events_in_order() {
    let (mut doc, rx) = create();
    let bytes = doc.save().unwrap();
    doc.lock().unwrap();
    doc.lock().unwrap();
    doc.unlock(Some(PASSWORD), None).unwrap();
    doc.revert(bytes);

    assert_eq!(
        drain(&rx),
        vec![
            DocumentEvent::WillSave,
            DocumentEvent::Locked,
            DocumentEvent::Unlocked,
            DocumentEvent::Reverted,
        ]
    );
    assert_eq!(doc.state(), LockState::Locked);
}

#[test]
fn current_item_events_fire_on_change_only() {
    let (mut doc, rx) = create();
    let root = root(&doc);
    let entry = doc.create_entry(root).unwrap();
    drain(&rx);

    doc.set_current_item(Some(entry_ref(entry))).unwrap();
    doc.set_current_item(Some(entry_ref(entry))).unwrap();
    assert_eq!(
        drain(&rx),
        vec![DocumentEvent::CurrentItemChanged(Some(entry_ref(entry)))]
    );

    // Permanent removal clears the inspected item.
    doc.undo().unwrap();
    assert_eq!(drain(&rx), vec![DocumentEvent::CurrentItemChanged(None)]);
    assert_eq!(doc.selection().item, None);
}

#[test]
fn dropped_receiver_does_not_break_editing() {
    let (mut doc, rx) = create();
    drop(rx);
    let root = root(&doc);
    doc.create_group(root).unwrap();
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[test]
fn template_outside_templates_group_is_rejected_without_mutation() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let templates = doc.create_group(root).unwrap();
    doc.set_templates_group(Some(templates)).unwrap();
    let stray = titled_entry(&mut doc, root, "Not a template");

    let before = doc.tree().unwrap().to_data();
    let undo_label = doc.undo_history().undo_label().map(str::to_owned);
    assert_eq!(
        doc.create_entry_from_template(stray),
        Err(EditError::TemplateNotFound(stray))
    );
    assert_eq!(doc.tree().unwrap().to_data(), before);
    assert_eq!(doc.undo_history().undo_label().map(str::to_owned), undo_label);
}

#[test]
fn template_copy_lands_in_selected_group() {
    let (mut doc, rx) = create();
    let root = root(&doc);
    let templates = doc.create_group(root).unwrap();
    doc.set_templates_group(Some(templates)).unwrap();
    let nested = doc.create_group(templates).unwrap();
    let template = titled_entry(&mut doc, nested, "Server Login");
    doc.add_attribute(template, "Host", "", false).unwrap();
    let target = doc.create_group(root).unwrap();
    doc.select_group(Some(target)).unwrap();
    drain(&rx);

    let copy = doc.create_entry_from_template(template).unwrap();
    let tree = doc.tree().unwrap();
    let created = tree.find_entry(copy).unwrap();
    assert_eq!(tree.parent_of(copy), Some(target));
    assert_eq!(created.title(), "Server Login");
    assert!(created.has_attribute("Host"));
    assert!(created.history.is_empty());
    assert_eq!(drain(&rx), vec![DocumentEvent::EntryAdded(entry_ref(copy))]);
}

#[test]
fn deleting_templates_group_is_permanent_and_undo_restores_role() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let templates = doc.create_group(root).unwrap();
    doc.set_templates_group(Some(templates)).unwrap();

    assert_eq!(doc.delete_group(templates), Ok(Deletion::Removed));
    assert_eq!(doc.tree().unwrap().meta().templates, None);
    doc.undo().unwrap();
    assert_eq!(doc.tree().unwrap().meta().templates, Some(templates));
}

// ---------------------------------------------------------------------------
// Trash through the facade
// ---------------------------------------------------------------------------

#[test]
fn first_delete_creates_trash_and_empty_trash_is_not_undoable() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let entry = titled_entry(&mut doc, root, "Old");
    assert_eq!(doc.trash(), None);

    assert_eq!(doc.delete_entry(entry), Ok(Deletion::MovedToTrash));
    let trash = doc.trash().unwrap();
    assert!(doc.is_trashed(entry));
    assert!(!doc.is_trashed(trash));

    assert_eq!(doc.empty_trash(), Ok(1));
    assert!(doc.tree().unwrap().find_entry(entry).is_none());
    assert_eq!(doc.undo(), Err(EditError::InvalidNode(entry)));
    assert!(doc.tree().unwrap().find_group(trash).unwrap().children().is_empty());
}

#[test]
fn disabled_trash_deletes_permanently() {
    let prefs = Preferences {
        trash_enabled: false,
        ..Preferences::default()
    };
    let (mut doc, _rx) = create_with(prefs);
    let root = root(&doc);
    let entry = doc.create_entry(root).unwrap();

    assert_eq!(doc.delete_node(entry), Ok(Deletion::Removed));
    assert_eq!(doc.trash(), None);
    assert!(doc.tree().unwrap().meta().trash.is_none());
}

// ---------------------------------------------------------------------------
// Search refresh
// ---------------------------------------------------------------------------

#[test]
fn search_result_follows_tree_changes() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let bank = titled_entry(&mut doc, root, "Bank");

    let mut context = doc.new_search_context();
    context.query = "bank".into();
    context.scope = SearchScope::titles_only();
    doc.set_search_context(context);
    assert_eq!(doc.search_result().entries(), &[bank]);

    let savings = titled_entry(&mut doc, root, "Savings Bank");
    assert_eq!(doc.search_result().entries(), &[bank, savings]);

    doc.delete_node(bank).unwrap();
    assert_eq!(doc.search_result().entries(), &[savings]);

    doc.undo().unwrap();
    assert_eq!(doc.search_result().entries(), &[bank, savings]);

    doc.clear_search();
    assert!(doc.search_result().is_empty());
    assert!(doc.search_context().is_none());
}

#[test]
fn search_context_defaults_follow_preferences() {
    let prefs = Preferences {
        search_includes_trash: true,
        ..Preferences::default()
    };
    let (doc, _rx) = create_with(prefs);
    assert!(doc.new_search_context().include_trashed);
}

// ---------------------------------------------------------------------------
// Lock / revert
// ---------------------------------------------------------------------------

#[test]
fn lock_clears_transient_state_and_keeps_edits() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let entry = titled_entry(&mut doc, root, "Bank");
    doc.select_entry(Some(entry)).unwrap();
    let mut context = doc.new_search_context();
    context.query = "bank".into();
    doc.set_search_context(context);
    doc.begin_edit(entry).unwrap();

    doc.lock().unwrap();
    assert!(!doc.can_undo());
    assert!(doc.search_result().is_empty());
    assert_eq!(doc.selection(), &Selection::default());
    assert!(doc.edit_session().is_none());
    assert_eq!(doc.create_group(root), Err(EditError::NotUnlocked));

    doc.unlock(Some(PASSWORD), None).unwrap();
    assert_eq!(doc.tree().unwrap().find_entry(entry).unwrap().title(), "Bank");
    // The context survives locking; the result is recomputed on unlock.
    assert_eq!(doc.search_result().entries(), &[entry]);
}

#[test]
fn revert_discards_unsaved_edits() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let kept = titled_entry(&mut doc, root, "Kept");
    let saved = doc.save().unwrap();
    let dropped = titled_entry(&mut doc, root, "Dropped");

    doc.revert(saved);
    assert!(!doc.can_undo());
    doc.unlock(Some(PASSWORD), None).unwrap();
    let tree = doc.tree().unwrap();
    assert!(tree.find_entry(kept).is_some());
    assert!(tree.find_entry(dropped).is_none());
}

#[test]
fn reopened_document_needs_the_right_password() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let entry = titled_entry(&mut doc, root, "Bank");
    let bytes = doc.save().unwrap();

    let mut reopened = Document::open(
        "journal.sbx",
        bytes,
        Arc::new(SealedJsonCodec::new(fast_params())),
        Arc::new(Preferences::default()),
    );
    assert!(matches!(
        reopened.unlock(Some("wrong"), None),
        Err(UnlockError::WrongCredentials)
    ));
    assert_eq!(reopened.state(), LockState::Locked);
    assert_eq!(reopened.lock_controller().unlock_count(), 0);

    reopened.unlock(Some(PASSWORD), None).unwrap();
    assert_eq!(reopened.tree().unwrap().find_entry(entry).unwrap().title(), "Bank");
}

// ---------------------------------------------------------------------------
// Edit session
// ---------------------------------------------------------------------------

#[test]
fn cancelled_session_changes_nothing() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let entry = titled_entry(&mut doc, root, "Original");
    let label = doc.undo_history().undo_label().map(str::to_owned);

    doc.begin_edit(entry).unwrap();
    doc.edit_session_mut()
        .unwrap()
        .entry_mut()
        .unwrap()
        .set_value(TITLE_KEY, "Changed");
    doc.cancel_edit();

    assert_eq!(doc.tree().unwrap().find_entry(entry).unwrap().title(), "Original");
    assert_eq!(doc.undo_history().undo_label().map(str::to_owned), label);
    assert_eq!(doc.commit_edit(), Err(EditError::NoEditSession));
}

#[test]
fn committed_session_is_one_undo_step_with_history() {
    let (mut doc, _rx) = create();
    let root = root(&doc);
    let entry = titled_entry(&mut doc, root, "First");

    doc.begin_edit(entry).unwrap();
    doc.edit_session_mut()
        .unwrap()
        .entry_mut()
        .unwrap()
        .set_value(TITLE_KEY, "Second");
    doc.commit_edit().unwrap();

    let current = doc.tree().unwrap().find_entry(entry).unwrap();
    assert_eq!(current.title(), "Second");
    assert_eq!(current.history.last().unwrap().title(), "First");

    doc.undo().unwrap();
    assert_eq!(doc.tree().unwrap().find_entry(entry).unwrap().title(), "First");
}
