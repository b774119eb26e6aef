//! Node types of the document tree.
//!
//! A tree member is either a [`Group`] or an [`Entry`], wrapped in the
//! closed [`Node`] sum type. Parent links are stored as the parent's UUID
//! and resolved through the owning [`Tree`](crate::tree::Tree); nodes never
//! own or reference their parent directly. The nested [`NodeData`] form is
//! what crosses the codec boundary and what undo snapshots hold.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const TITLE_KEY: &str = "Title";
pub const USERNAME_KEY: &str = "UserName";
pub const PASSWORD_KEY: &str = "Password";
pub const URL_KEY: &str = "URL";
pub const NOTES_KEY: &str = "Notes";

/// Keys every plain entry starts with, in display order.
pub const STANDARD_KEYS: [&str; 5] = [TITLE_KEY, USERNAME_KEY, PASSWORD_KEY, URL_KEY, NOTES_KEY];

/// Default icon for groups (folder).
pub const GROUP_ICON: u32 = 48;
/// Default icon for entries (key).
pub const ENTRY_ICON: u32 = 0;
/// Icon of the trash group.
pub const TRASH_ICON: u32 = 43;

/// Title given to groups created through the editor.
pub const DEFAULT_GROUP_TITLE: &str = "New Group";

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Creation, modification and optional expiry times of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl Timestamps {
    /// Created and modified now, no expiry.
    #[must_use]
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            modified: now,
            expires: None,
        }
    }

    /// Mark as modified now.
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    /// Whether an expiry is set and lies at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }
}

// ---------------------------------------------------------------------------
// Attribute / Binary
// ---------------------------------------------------------------------------

/// A named value on an entry. Values are zeroized on drop.
///
/// A protected attribute holds sensitive data; its value is redacted from
/// `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Attribute {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub protected: bool,
}

impl Attribute {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>, protected: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            protected,
        }
    }

    /// Whether the key is one of [`STANDARD_KEYS`].
    #[must_use]
    pub fn is_standard(&self) -> bool {
        STANDARD_KEYS.contains(&self.key.as_str())
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: &dyn fmt::Debug = if self.protected { &"***" } else { &self.value };
        f.debug_struct("Attribute")
            .field("key", &self.key)
            .field("value", value)
            .field("protected", &self.protected)
            .finish()
    }
}

/// A named attachment. Each entry owns its own copy of the bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binary {
    pub name: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binary")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A credential record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub uuid: Uuid,
    pub icon_id: u32,
    pub times: Timestamps,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub binaries: Vec<Binary>,
    /// Prior versions of this entry, oldest first. Detached copies.
    #[serde(default)]
    pub history: Vec<Entry>,
    #[serde(skip)]
    pub(crate) parent: Option<Uuid>,
}

impl Entry {
    /// An entry with a fresh UUID and the standard keys, all empty.
    #[must_use]
    pub fn new() -> Self {
        let mut entry = Self::blank(Uuid::new_v4());
        for key in STANDARD_KEYS {
            entry
                .attributes
                .push(Attribute::new(key, "", key == PASSWORD_KEY));
        }
        entry
    }

    /// An entry with no attributes at all.
    #[must_use]
    pub fn blank(uuid: Uuid) -> Self {
        Self {
            uuid,
            icon_id: ENTRY_ICON,
            times: Timestamps::now(),
            attributes: Vec::new(),
            binaries: Vec::new(),
            history: Vec::new(),
            parent: None,
        }
    }

    #[must_use]
    pub const fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    #[must_use]
    pub fn attribute_mut(&mut self, key: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.key == key)
    }

    #[must_use]
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some()
    }

    /// Value of `key`, or `""` when absent.
    #[must_use]
    pub fn value(&self, key: &str) -> &str {
        self.attribute(key).map_or("", |a| a.value.as_str())
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.value(TITLE_KEY)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        self.value(USERNAME_KEY)
    }

    #[must_use]
    pub fn password(&self) -> &str {
        self.value(PASSWORD_KEY)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.value(URL_KEY)
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        self.value(NOTES_KEY)
    }

    /// Set `key` to `value`, creating the attribute when missing.
    /// New `Password` attributes are protected.
    pub fn set_value(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(attribute) = self.attribute_mut(key) {
            attribute.value.zeroize();
            attribute.value = value;
        } else {
            self.attributes
                .push(Attribute::new(key, value, key == PASSWORD_KEY));
        }
    }

    /// Attributes that are not one of the standard keys.
    pub fn custom_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| !a.is_standard())
    }

    /// Copy of this entry suitable for the history list.
    #[must_use]
    pub fn history_snapshot(&self) -> Self {
        Self {
            history: Vec::new(),
            parent: None,
            ..self.clone()
        }
    }

    /// Append the current state to history, dropping the oldest versions
    /// beyond `max_items`.
    pub fn push_history(&mut self, previous: Self, max_items: usize) {
        self.history.push(previous.history_snapshot());
        let excess = self.history.len().saturating_sub(max_items);
        if excess > 0 {
            self.history.drain(..excess);
        }
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A folder of groups and entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub uuid: Uuid,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    pub icon_id: u32,
    pub times: Timestamps,
    #[serde(skip)]
    pub(crate) parent: Option<Uuid>,
    #[serde(skip)]
    pub(crate) children: Vec<Uuid>,
}

impl Group {
    /// A group with a fresh UUID and no children.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            notes: String::new(),
            icon_id: GROUP_ICON,
            times: Timestamps::now(),
            parent: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub const fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    /// Child UUIDs in position order.
    #[must_use]
    pub fn children(&self) -> &[Uuid] {
        &self.children
    }

    #[must_use]
    pub fn fields(&self) -> GroupFields {
        GroupFields {
            title: self.title.clone(),
            notes: self.notes.clone(),
            icon_id: self.icon_id,
            expires: self.times.expires,
        }
    }
}

/// The editable fields of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFields {
    pub title: String,
    pub notes: String,
    pub icon_id: u32,
    pub expires: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Variant tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Group,
    Entry,
}

/// A lightweight handle to a node, used in events and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub uuid: Uuid,
    pub kind: NodeKind,
}

/// A tree member.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Group(Group),
    Entry(Entry),
}

impl Node {
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        match self {
            Self::Group(g) => g.uuid,
            Self::Entry(e) => e.uuid,
        }
    }

    #[must_use]
    pub const fn parent(&self) -> Option<Uuid> {
        match self {
            Self::Group(g) => g.parent,
            Self::Entry(e) => e.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Uuid>) {
        match self {
            Self::Group(g) => g.parent = parent,
            Self::Entry(e) => e.parent = parent,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Group(_) => NodeKind::Group,
            Self::Entry(_) => NodeKind::Entry,
        }
    }

    #[must_use]
    pub const fn node_ref(&self) -> NodeRef {
        NodeRef {
            uuid: self.uuid(),
            kind: self.kind(),
        }
    }

    #[must_use]
    pub const fn times(&self) -> &Timestamps {
        match self {
            Self::Group(g) => &g.times,
            Self::Entry(e) => &e.times,
        }
    }

    #[must_use]
    pub const fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(g) => Some(g),
            Self::Entry(_) => None,
        }
    }

    #[must_use]
    pub const fn as_entry(&self) -> Option<&Entry> {
        match self {
            Self::Entry(e) => Some(e),
            Self::Group(_) => None,
        }
    }
}

/// Editable content of a node, as held by an edit session.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Group(GroupFields),
    Entry(Box<Entry>),
}

// ---------------------------------------------------------------------------
// Nested (serialized) form
// ---------------------------------------------------------------------------

/// A node together with its whole subtree, owned and detached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeData {
    Group {
        #[serde(flatten)]
        group: Group,
        #[serde(default)]
        children: Vec<NodeData>,
    },
    Entry(Entry),
}

impl NodeData {
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        match self {
            Self::Group { group, .. } => group.uuid,
            Self::Entry(e) => e.uuid,
        }
    }

    /// Every UUID in this subtree, preorder.
    #[must_use]
    pub fn uuids(&self) -> Vec<Uuid> {
        let mut out = Vec::new();
        self.collect_uuids(&mut out);
        out
    }

    fn collect_uuids(&self, out: &mut Vec<Uuid>) {
        out.push(self.uuid());
        if let Self::Group { children, .. } = self {
            for child in children {
                child.collect_uuids(out);
            }
        }
    }
}

/// Document-level metadata carried inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub trash: Option<Uuid>,
    #[serde(default)]
    pub templates: Option<Uuid>,
    #[serde(default)]
    pub master_key_changed: Option<DateTime<Utc>>,
    /// Whether the container may be sealed with a key that has no source.
    #[serde(default)]
    pub allow_empty_key: bool,
}

/// The whole tree in nested form: what the codec reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeData {
    pub meta: TreeMeta,
    pub root: NodeData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_has_empty_standard_keys() {
        let entry = Entry::new();
        assert_eq!(entry.attributes.len(), 5);
        assert_eq!(entry.title(), "");
        assert!(entry.attribute(PASSWORD_KEY).unwrap().protected);
        assert!(!entry.attribute(TITLE_KEY).unwrap().protected);
        assert_eq!(entry.custom_attributes().count(), 0);
    }

    #[test]
    fn set_value_creates_missing_attribute() {
        let mut entry = Entry::blank(Uuid::new_v4());
        entry.set_value("Pin", "1234");
        entry.set_value(PASSWORD_KEY, "secret");
        assert_eq!(entry.value("Pin"), "1234");
        assert!(!entry.attribute("Pin").unwrap().protected);
        assert!(entry.attribute(PASSWORD_KEY).unwrap().protected);
        assert_eq!(entry.custom_attributes().count(), 1);
    }

    #[test]
    fn protected_attribute_debug_is_redacted() {
        let attribute = Attribute::new(PASSWORD_KEY, "hunter2", true);
        let debug = format!("{attribute:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));

        let plain = Attribute::new(TITLE_KEY, "Bank", false);
        assert!(format!("{plain:?}").contains("Bank"));
    }

    #[test]
    fn push_history_caps_length() {
        let mut entry = Entry::new();
        for i in 0..5 {
            let previous = entry.clone();
            entry.set_value(TITLE_KEY, format!("v{i}"));
            entry.push_history(previous, 3);
        }
        assert_eq!(entry.history.len(), 3);
        assert_eq!(entry.history[0].title(), "v1");
        assert!(entry.history.iter().all(|h| h.history.is_empty()));
    }

    #[test]
    fn expiry_is_inclusive() {
        let mut times = Timestamps::now();
        let now = times.created;
        assert!(!times.is_expired(now));
        times.expires = Some(now);
        assert!(times.is_expired(now));
    }

    #[test]
    fn node_data_json_carries_kind_tag() {
        let data = NodeData::Group {
            group: Group::new("Root"),
            children: vec![NodeData::Entry(Entry::new())],
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains(r#""kind":"group""#));
        assert!(json.contains(r#""kind":"entry""#));
        let back: NodeData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.uuids(), data.uuids());
    }
}
