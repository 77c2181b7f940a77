//! Per-request critical sections
//!
//! Every read-sign-submit-write sequence for one request id runs while
//! holding that id's lock, so a double tap or two overlapping poll callbacks
//! on this device cannot submit the same request twice.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct SubmissionGuard {
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `request_id`. Released on drop.
    pub async fn lock(&self, request_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(request_id).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(Mutex::new(()));
                    locks.insert(request_id.to_string(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        entry.lock_owned().await
    }
}
