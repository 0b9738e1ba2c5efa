//! Deduplicating work queue of resource identities.
//!
//! - pending duplicates collapse into one entry
//! - an identity handed to a worker is never handed out again until `done`;
//!   adds arriving meanwhile mark it dirty and it is re-queued on `done`
//! - failed identities are re-added after a per-identity exponential backoff

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crmetrics_core::ResourceIdentity;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ResourceIdentity>,
    dirty: HashSet<ResourceIdentity>,
    processing: HashSet<ResourceIdentity>,
    failures: HashMap<ResourceIdentity, u32>,
    shutting_down: bool,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    retry_base: Duration,
    retry_max: Duration,
}

impl WorkQueue {
    pub fn new(retry_base: Duration, retry_max: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            retry_base,
            retry_max,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add(&self, id: ResourceIdentity) {
        let mut st = self.lock();
        if st.shutting_down || st.dirty.contains(&id) {
            return;
        }
        st.dirty.insert(id.clone());
        if st.processing.contains(&id) {
            return;
        }
        st.queue.push_back(id);
        drop(st);
        self.notify.notify_one();
    }

    /// Wait for the next identity. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ResourceIdentity> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.lock();
                if st.shutting_down {
                    return None;
                }
                if let Some(id) = st.queue.pop_front() {
                    st.dirty.remove(&id);
                    st.processing.insert(id.clone());
                    return Some(id);
                }
            }
            notified.await;
        }
    }

    /// Release an identity handed out by `get`.
    pub fn done(&self, id: &ResourceIdentity) {
        let mut st = self.lock();
        st.processing.remove(id);
        if st.dirty.contains(id) && !st.shutting_down {
            st.queue.push_back(id.clone());
            drop(st);
            self.notify.notify_one();
        }
    }

    /// Schedule a retry after the identity's backoff and return the delay.
    pub fn add_rate_limited(self: &Arc<Self>, id: ResourceIdentity) -> Duration {
        let delay = {
            let mut st = self.lock();
            let failures = st.failures.entry(id.clone()).or_insert(0);
            let delay = backoff(self.retry_base, self.retry_max, *failures);
            *failures = failures.saturating_add(1);
            delay
        };
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(id);
        });
        delay
    }

    /// Reset the backoff of an identity after a successful pass.
    pub fn forget(&self, id: &ResourceIdentity) {
        self.lock().failures.remove(id);
    }

    pub fn num_requeues(&self, id: &ResourceIdentity) -> u32 {
        self.lock().failures.get(id).copied().unwrap_or(0)
    }

    /// Pending identities (not counting those being processed).
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing pending and nothing in flight.
    pub fn is_idle(&self) -> bool {
        let st = self.lock();
        st.queue.is_empty() && st.processing.is_empty()
    }

    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }
}

fn backoff(base: Duration, max: Duration, failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}
