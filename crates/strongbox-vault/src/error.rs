//! Error types for `strongbox-vault`.
//!
//! Each operation family has its own enum so callers can match on the
//! category they care about: unlock failures, edit failures, credential
//! validation failures, and container (codec) failures.

use std::path::PathBuf;

use strongbox_crypto_core::CryptoError;
use thiserror::Error;
use uuid::Uuid;

/// Why an unlock attempt failed. The document stays locked in every case.
#[derive(Debug, Error)]
pub enum UnlockError {
    /// The composite key does not open the container.
    #[error("wrong password or key file")]
    WrongCredentials,

    /// The container is structurally invalid or its content is inconsistent.
    #[error("container is corrupt: {0}")]
    CorruptContainer(String),

    /// The container was written by a newer format version.
    #[error("unsupported container version {found} (newest supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the container header.
        found: u8,
        /// Newest version this build can read.
        supported: u8,
    },

    /// The key file could not be read.
    #[error("I/O error: {0}")]
    IoFailure(#[from] std::io::Error),

    /// Neither password nor key file was given and the container does not
    /// permit an empty key.
    #[error("a password or key file is required")]
    MissingCredentials,

    /// The document is already unlocked.
    #[error("document is already unlocked")]
    AlreadyUnlocked,
}

/// Why a structural edit was refused. The tree is unchanged in every case.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    /// The node is not part of this tree, or is of the wrong variant.
    #[error("node {0} is not a valid target in this tree")]
    InvalidNode(Uuid),

    /// The document is locked.
    #[error("document is locked")]
    NotUnlocked,

    /// The template is not an entry inside the templates group.
    #[error("template {0} not found")]
    TemplateNotFound(Uuid),

    /// An attribute with this key already exists on the entry.
    #[error("attribute {0:?} already exists")]
    NameCollision(String),

    /// Root and the active trash group cannot be deleted.
    #[error("node {0} cannot be deleted")]
    ProtectedNode(Uuid),

    /// Moving the node would place it inside its own subtree.
    #[error("node {node} cannot be moved into {target}")]
    InvalidMove {
        /// Node being moved.
        node: Uuid,
        /// Requested new parent.
        target: Uuid,
    },

    /// No edit session is open.
    #[error("no edit session is active")]
    NoEditSession,

    /// A UUID is already present in the tree.
    #[error("node {0} already exists in this tree")]
    DuplicateNode(Uuid),

    /// The entry has no attribute with this key.
    #[error("attribute {0:?} does not exist")]
    UnknownAttribute(String),
}

/// Why a credential change was rejected. The current key stays active.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The new credentials produce the key already in use.
    #[error("new credentials are identical to the current ones")]
    CredentialsUnchanged,

    /// The key file could not be read.
    #[error("key file {path} is unreadable: {source}")]
    KeyFileUnreadable {
        /// Path that was given.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Neither password nor key file was given and the document does not
    /// permit an empty key.
    #[error("a password or key file is required")]
    EmptyKeyNotPermitted,

    /// The document is locked.
    #[error("document is locked")]
    NotUnlocked,
}

/// Failures of the container codec.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Authentication of the payload failed.
    #[error("container does not open with this key")]
    WrongKey,

    /// Bad magic bytes, truncated data, or an unparsable header/payload.
    #[error("malformed container: {0}")]
    Malformed(String),

    /// The header declares a version newer than this build supports.
    #[error("container version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the header.
        found: u8,
        /// Newest version this build can read.
        supported: u8,
    },

    /// The decoded tree violates a structural invariant.
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// Key derivation or sealing failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Structural invariant violations found while building a tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    /// Two nodes share a UUID.
    #[error("duplicate node uuid {0}")]
    DuplicateUuid(Uuid),

    /// The trash reference names no group reachable from root.
    #[error("trash group {0} is not part of the tree")]
    DanglingTrash(Uuid),

    /// The templates reference names no group reachable from root.
    #[error("templates group {0} is not part of the tree")]
    DanglingTemplates(Uuid),

    /// The root node is an entry.
    #[error("root node must be a group")]
    RootNotGroup,

    /// The trash or templates reference names the root group.
    #[error("root group {0} cannot be the trash or templates group")]
    RootAsSpecialGroup(Uuid),
}

impl From<ContainerError> for UnlockError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::WrongKey | ContainerError::Crypto(CryptoError::Decryption) => {
                Self::WrongCredentials
            }
            ContainerError::UnsupportedVersion { found, supported } => {
                Self::UnsupportedVersion { found, supported }
            }
            ContainerError::Malformed(detail) => Self::CorruptContainer(detail),
            ContainerError::Structure(e) => Self::CorruptContainer(e.to_string()),
            ContainerError::Crypto(e) => Self::CorruptContainer(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_errors_map_to_unlock_categories() {
        assert!(matches!(
            UnlockError::from(ContainerError::WrongKey),
            UnlockError::WrongCredentials
        ));
        assert!(matches!(
            UnlockError::from(ContainerError::Crypto(CryptoError::Decryption)),
            UnlockError::WrongCredentials
        ));
        assert!(matches!(
            UnlockError::from(ContainerError::UnsupportedVersion {
                found: 9,
                supported: 1
            }),
            UnlockError::UnsupportedVersion {
                found: 9,
                supported: 1
            }
        ));
        assert!(matches!(
            UnlockError::from(ContainerError::Malformed("bad magic".into())),
            UnlockError::CorruptContainer(_)
        ));
        assert!(matches!(
            UnlockError::from(ContainerError::Structure(StructureError::RootNotGroup)),
            UnlockError::CorruptContainer(_)
        ));
    }

    #[test]
    fn messages_never_mention_secrets() {
        let msg = UnlockError::WrongCredentials.to_string();
        assert_eq!(msg, "wrong password or key file");
    }
}
