//! Document change notifications.
//!
//! The facade emits a [`DocumentEvent`] to every registered [`EventSink`]
//! synchronously, after the change it describes has been committed.

use std::sync::mpsc::Sender;

use crate::model::NodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    /// A group was created by the user. Not emitted on undo/redo.
    GroupAdded(NodeRef),
    /// An entry was created by the user. Not emitted on undo/redo.
    EntryAdded(NodeRef),
    /// The encrypted container was replaced and the document locked.
    Reverted,
    Locked,
    Unlocked,
    /// The selected item changed; `None` when the selection was cleared.
    CurrentItemChanged(Option<NodeRef>),
    /// The document is about to be encoded for saving.
    WillSave,
}

/// Receiver of document events.
pub trait EventSink: Send {
    fn notify(&mut self, event: DocumentEvent);
}

impl EventSink for Sender<DocumentEvent> {
    /// A disconnected receiver is ignored.
    fn notify(&mut self, event: DocumentEvent) {
        if self.send(event).is_err() {
            tracing::debug!(?event, "Event receiver disconnected");
        }
    }
}

impl EventSink for Vec<DocumentEvent> {
    fn notify(&mut self, event: DocumentEvent) {
        self.push(event);
    }
}
