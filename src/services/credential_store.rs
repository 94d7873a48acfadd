use std::sync::Mutex;

use crate::domain::credential::Credential;
use crate::services::error::StoreError;

/// The single process-wide credential slot.
pub trait CredentialStore: Send + Sync {
    /// Returns the persisted token. Unreadable storage is reported as absent.
    fn read(&self) -> Option<Credential>;

    /// Overwrites any prior value.
    fn write(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Removes the stored token. Clearing an empty slot succeeds.
    fn clear(&self) -> Result<(), StoreError>;

    /// Clears the slot only while it still holds `credential`.
    ///
    /// Returns whether the slot was cleared.
    fn clear_if_current(&self, credential: &Credential) -> Result<bool, StoreError> {
        if self.read().as_ref() != Some(credential) {
            return Ok(false);
        }
        self.clear()?;
        Ok(true)
    }

    fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }
}

/// Non-persistent slot, scoped to a single session.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self) -> Option<Credential> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write(&self, credential: &Credential) -> Result<(), StoreError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Ok(())
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn read(&self) -> Option<Credential> {
        (**self).read()
    }

    fn write(&self, credential: &Credential) -> Result<(), StoreError> {
        (**self).write(credential)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}
