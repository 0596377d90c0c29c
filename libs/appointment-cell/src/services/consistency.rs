// libs/appointment-cell/src/services/consistency.rs
//
// Serializes check-then-write sequences per doctor so two concurrent bookings
// for the same doctor cannot both pass the conflict check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

type LockTable = Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>;

#[derive(Debug, Default)]
pub struct SchedulingLocks {
    locks: Arc<LockTable>,
}

/// Exclusive scheduling access to one doctor. Releasing the last holder or
/// waiter drops the doctor's entry from the table.
#[derive(Debug)]
pub struct SchedulingGuard {
    doctor_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
}

impl Drop for SchedulingGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Waiters hold their own clone of the mutex, so a count of one means
        // only the table still refers to it.
        let idle = locks
            .get(&self.doctor_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.doctor_id);
            debug!("Released scheduling lock for doctor {}", self.doctor_id);
        }
    }
}

impl SchedulingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, doctor_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(doctor_id).or_default().clone()
    }

    /// Waits for exclusive scheduling access to `doctor_id`. Held until the
    /// returned guard is dropped.
    pub async fn acquire(&self, doctor_id: Uuid) -> SchedulingGuard {
        let lock = self.lock_for(doctor_id);
        let guard = lock.lock_owned().await;
        debug!("Acquired scheduling lock for doctor {}", doctor_id);

        SchedulingGuard {
            doctor_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    pub fn tracked_doctors(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
