//! Lock lifecycle: the encrypted container, the composite key and the
//! decrypted tree.
//!
//! ```text
//! Locked --unlock--> Unlocking --ok--> Unlocked --lock--> Locking --> Locked
//!                        \--err--> Locked        \--encode err--> Unlocked
//! ```
//!
//! While locked only the encrypted bytes are held. While unlocked the tree
//! and the key are held; the bytes are refreshed on every lock and save.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use strongbox_crypto_core::CompositeKey;
use zeroize::Zeroizing;

use crate::container::ContainerCodec;
use crate::error::{ContainerError, EditError, UnlockError, ValidationError};
use crate::preferences::{PasswordChangeIntervals, PreferenceSource};
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocking,
    Unlocked,
    Locking,
}

// ── Password change policy ─────────────────────────────────────────

/// Pure evaluation of master-password age against the configured
/// intervals. A document whose key was never changed is never due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordChangePolicy {
    pub last_change: Option<DateTime<Utc>>,
    pub intervals: PasswordChangeIntervals,
}

impl PasswordChangePolicy {
    fn due(&self, days: Option<u32>, now: DateTime<Utc>) -> bool {
        match (self.last_change, days) {
            (Some(changed), Some(days)) => {
                now.signed_duration_since(changed) >= Duration::days(i64::from(days))
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn should_enforce(&self, now: DateTime<Utc>) -> bool {
        self.due(self.intervals.enforce_after_days, now)
    }

    /// True whenever [`should_enforce`](Self::should_enforce) is.
    #[must_use]
    pub fn should_recommend(&self, now: DateTime<Utc>) -> bool {
        self.should_enforce(now) || self.due(self.intervals.recommend_after_days, now)
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Owns the document's secrets and the transitions between them.
pub struct LockController {
    document_id: String,
    state: LockState,
    container: Option<Vec<u8>>,
    tree: Option<Tree>,
    key: Option<CompositeKey>,
    key_file: Option<PathBuf>,
    unlock_count: u32,
    codec: Arc<dyn ContainerCodec>,
    preferences: Arc<dyn PreferenceSource>,
}

impl fmt::Debug for LockController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockController")
            .field("document_id", &self.document_id)
            .field("state", &self.state)
            .field("unlock_count", &self.unlock_count)
            .finish_non_exhaustive()
    }
}

impl LockController {
    /// A locked controller over existing container bytes.
    pub fn open(
        document_id: impl Into<String>,
        container: Vec<u8>,
        codec: Arc<dyn ContainerCodec>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            state: LockState::Locked,
            container: Some(container),
            tree: None,
            key: None,
            key_file: None,
            unlock_count: 0,
            codec,
            preferences,
        }
    }

    /// An unlocked controller for a new document. No container bytes exist
    /// until the first save or lock.
    pub fn with_tree(
        document_id: impl Into<String>,
        tree: Tree,
        key: CompositeKey,
        codec: Arc<dyn ContainerCodec>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            state: LockState::Unlocked,
            container: None,
            tree: Some(tree),
            key: Some(key),
            key_file: None,
            unlock_count: 0,
            codec,
            preferences,
        }
    }

    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    #[must_use]
    pub const fn state(&self) -> LockState {
        self.state
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.state == LockState::Unlocked
    }

    /// Successful unlocks since construction.
    #[must_use]
    pub const fn unlock_count(&self) -> u32 {
        self.unlock_count
    }

    /// Latest encrypted bytes, if any have been produced or loaded.
    #[must_use]
    pub fn container(&self) -> Option<&[u8]> {
        self.container.as_deref()
    }

    #[must_use]
    pub fn key(&self) -> Option<&CompositeKey> {
        self.key.as_ref()
    }

    /// Key file used by the last successful unlock or credential change.
    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    #[must_use]
    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// Mutable tree access for editing.
    ///
    /// # Errors
    ///
    /// [`EditError::NotUnlocked`] while locked.
    pub fn tree_mut(&mut self) -> Result<&mut Tree, EditError> {
        self.tree.as_mut().ok_or(EditError::NotUnlocked)
    }

    #[must_use]
    pub fn preferences(&self) -> &dyn PreferenceSource {
        &*self.preferences
    }

    /// Discard the decrypted state without encoding it and take `container`
    /// as the new encrypted bytes. Ends [`LockState::Locked`].
    pub fn revert(&mut self, container: Vec<u8>) {
        if let Some(mut key) = self.key.take() {
            key.invalidate();
        }
        self.tree = None;
        self.key_file = None;
        self.container = Some(container);
        self.state = LockState::Locked;
        tracing::info!(document = %self.document_id, "Document reverted");
    }

    // ── Unlock ─────────────────────────────────────────────────────

    /// Decrypt the container with the given credentials.
    ///
    /// # Errors
    ///
    /// - [`UnlockError::AlreadyUnlocked`] when unlocked
    /// - [`UnlockError::MissingCredentials`] when neither source is given
    ///   and the container does not permit an empty key
    /// - [`UnlockError::IoFailure`] when the key file cannot be read
    /// - [`UnlockError::WrongCredentials`], [`UnlockError::CorruptContainer`]
    ///   or [`UnlockError::UnsupportedVersion`] from decoding
    ///
    /// On any error the state stays [`LockState::Locked`] and the unlock
    /// count is unchanged.
    pub fn unlock(
        &mut self,
        password: Option<&str>,
        key_file: Option<&Path>,
    ) -> Result<(), UnlockError> {
        if self.state == LockState::Unlocked {
            return Err(UnlockError::AlreadyUnlocked);
        }
        let container = self
            .container
            .as_deref()
            .ok_or_else(|| UnlockError::CorruptContainer("no container data".into()))?;

        if password.is_none() && key_file.is_none() && !self.codec.allows_empty_key(container) {
            return Err(UnlockError::MissingCredentials);
        }
        let key_file_bytes = key_file.map(std::fs::read).transpose()?.map(Zeroizing::new);

        self.state = LockState::Unlocking;
        tracing::info!(document = %self.document_id, "Unlock attempt");

        let mut candidate = CompositeKey::new(password, key_file_bytes.as_deref().map(Vec::as_slice));
        let decoded = self
            .codec
            .decode(container, &candidate)
            .and_then(|data| Tree::from_data(data).map_err(ContainerError::from));

        match decoded {
            Ok(tree) => {
                self.tree = Some(tree);
                self.key = Some(candidate);
                self.key_file = key_file.map(Path::to_path_buf);
                self.unlock_count = self.unlock_count.saturating_add(1);
                self.state = LockState::Unlocked;
                tracing::info!(
                    document = %self.document_id,
                    unlock_count = self.unlock_count,
                    "Document unlocked"
                );
                Ok(())
            }
            Err(e) => {
                candidate.invalidate();
                self.state = LockState::Locked;
                let err = UnlockError::from(e);
                tracing::warn!(document = %self.document_id, error = %err, "Unlock failed");
                Err(err)
            }
        }
    }

    // ── Lock / save ────────────────────────────────────────────────

    /// Encode the tree into the held container, then forget the key and
    /// the tree. No-op when already locked.
    ///
    /// # Errors
    ///
    /// Returns the encoding error; the document then stays unlocked.
    pub fn lock(&mut self) -> Result<(), ContainerError> {
        if self.state != LockState::Unlocked {
            return Ok(());
        }
        self.state = LockState::Locking;

        if let Err(e) = self.save().map(drop) {
            self.state = LockState::Unlocked;
            tracing::warn!(document = %self.document_id, error = %e, "Lock aborted, encoding failed");
            return Err(e);
        }

        if let Some(mut key) = self.key.take() {
            key.invalidate();
        }
        self.tree = None;
        self.state = LockState::Locked;
        tracing::info!(document = %self.document_id, "Document locked");
        Ok(())
    }

    /// Encode the tree with the current key into the held container and
    /// return the bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] from the codec. Calling this while locked
    /// returns the held bytes unchanged.
    pub fn save(&mut self) -> Result<&[u8], ContainerError> {
        if let (Some(tree), Some(key)) = (&self.tree, &self.key) {
            let bytes = self.codec.encode(&tree.to_data(), key)?;
            tracing::debug!(document = %self.document_id, len = bytes.len(), "Container encoded");
            self.container = Some(bytes);
        }
        self.container
            .as_deref()
            .ok_or_else(|| ContainerError::Malformed("no container data".into()))
    }

    // ── Credentials ────────────────────────────────────────────────

    /// Replace the composite key.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::NotUnlocked`] while locked
    /// - [`ValidationError::KeyFileUnreadable`] if the key file cannot be read
    /// - [`ValidationError::EmptyKeyNotPermitted`] if both sources are
    ///   absent and the document does not allow an empty key
    /// - [`ValidationError::CredentialsUnchanged`] if the new key equals the
    ///   current one
    ///
    /// The current key stays active on every error.
    pub fn change_credentials(
        &mut self,
        password: Option<&str>,
        key_file: Option<&Path>,
    ) -> Result<(), ValidationError> {
        let (Some(tree), Some(current)) = (self.tree.as_mut(), self.key.as_mut()) else {
            return Err(ValidationError::NotUnlocked);
        };

        let key_file_bytes = key_file
            .map(|path| {
                std::fs::read(path)
                    .map(Zeroizing::new)
                    .map_err(|source| ValidationError::KeyFileUnreadable {
                        path: path.to_path_buf(),
                        source,
                    })
            })
            .transpose()?;

        if password.is_none() && key_file.is_none() && !tree.meta().allow_empty_key {
            return Err(ValidationError::EmptyKeyNotPermitted);
        }

        let new_key = CompositeKey::new(password, key_file_bytes.as_deref().map(Vec::as_slice));
        if new_key == *current {
            return Err(ValidationError::CredentialsUnchanged);
        }

        let mut old = std::mem::replace(current, new_key);
        old.invalidate();
        tree.set_master_key_changed(Utc::now());
        self.key_file = key_file.map(Path::to_path_buf);
        tracing::info!(document = %self.document_id, "Credentials changed");
        Ok(())
    }

    /// Remembered key-file location for this document, `None` when
    /// remembering is disabled or nothing is stored.
    #[must_use]
    pub fn suggested_key_file_location(&self) -> Option<PathBuf> {
        self.preferences.remembered_key_file(&self.document_id)
    }

    fn password_policy(&self) -> Option<PasswordChangePolicy> {
        let tree = self.tree.as_ref()?;
        Some(PasswordChangePolicy {
            last_change: tree.meta().master_key_changed,
            intervals: self.preferences.password_change_intervals(),
        })
    }

    /// `false` while locked.
    #[must_use]
    pub fn should_recommend_password_change(&self) -> bool {
        self.password_policy()
            .is_some_and(|p| p.should_recommend(Utc::now()))
    }

    /// `false` while locked.
    #[must_use]
    pub fn should_enforce_password_change(&self) -> bool {
        self.password_policy()
            .is_some_and(|p| p.should_enforce(Utc::now()))
    }
}
