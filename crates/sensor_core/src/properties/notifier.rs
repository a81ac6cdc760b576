//! Property change subscribers

use std::sync::{Arc, PoisonError, RwLock};

use contracts::{PropertyTag, PropertyValue};

/// Invoked after the device accepted a write.
pub type PropertyChangeCallback = Arc<dyn Fn(PropertyTag, &PropertyValue) + Send + Sync>;

#[derive(Default)]
pub struct ChangeNotifier {
    callbacks: RwLock<Vec<PropertyChangeCallback>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: PropertyChangeCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Calls every subscriber on the current thread.
    pub fn notify(&self, tag: PropertyTag, value: &PropertyValue) {
        // snapshot so a callback may subscribe without deadlocking
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(tag, value);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.len())
            .finish()
    }
}
