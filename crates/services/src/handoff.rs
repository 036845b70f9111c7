use std::sync::{Mutex, MutexGuard};

use crate::error::HandoffError;

/// Single-value mailbox for passing a freshly generated practice test to the page
/// that runs it. Written once, read once.
#[derive(Debug)]
pub struct HandoffSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> Default for HandoffSlot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }
}

impl<T> HandoffSlot<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// # Errors
    ///
    /// Returns `HandoffError::Occupied` if a value is waiting to be taken.
    pub fn put(&self, value: T) -> Result<(), HandoffError> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(HandoffError::Occupied);
        }
        *slot = Some(value);
        Ok(())
    }

    /// Take the value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}
