//! A lazily resolved value fetched at most once at a time.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::SyncResult;

const NOT_STARTED: u8 = 0;
const IN_FLIGHT: u8 = 1;
const RESOLVED: u8 = 2;

type SharedFetch<T> = Shared<BoxFuture<'static, SyncResult<T>>>;

/// Resolves a value on first use and shares it with every caller.
///
/// The first caller to move the gate from not-started to in-flight runs the
/// fetch. Callers arriving while it runs await the same shared future, so
/// concurrent first calls produce exactly one underlying fetch. A failed fetch
/// moves the gate back to not-started and the next caller tries again.
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    state: AtomicU8,
    slot: Mutex<Option<SharedFetch<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        SingleFlight {
            state: AtomicU8::new(NOT_STARTED),
            slot: Mutex::new(None),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state.load(Ordering::Acquire) == RESOLVED
    }

    /// Returns the resolved value, running `fetch` only if no other caller has
    /// resolved it or is resolving it right now.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let mut fetch = Some(fetch);
        loop {
            if let Some(shared) = self.current() {
                return self.settle(shared).await;
            }

            let won = self
                .state
                .compare_exchange(NOT_STARTED, IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();

            if won {
                let Some(fetch) = fetch.take() else {
                    continue;
                };
                let shared = fetch().boxed().shared();
                *self.lock() = Some(shared.clone());
                return self.settle(shared).await;
            }

            // Another caller won the gate but has not published its future yet.
            tokio::task::yield_now().await;
        }
    }

    fn current(&self) -> Option<SharedFetch<T>> {
        self.lock().clone()
    }

    async fn settle(&self, shared: SharedFetch<T>) -> SyncResult<T> {
        let result = shared.clone().await;
        match &result {
            Ok(_) => {
                self.state.store(RESOLVED, Ordering::Release);
            }
            Err(_) => {
                let mut slot = self.lock();
                // Only the caller still seeing the failed future resets the gate.
                if slot.as_ref().is_some_and(|s| s.ptr_eq(&shared)) {
                    *slot = None;
                    self.state.store(NOT_STARTED, Ordering::Release);
                }
            }
        }
        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SharedFetch<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
