//! In-memory resource kinds for scheduler tests.

use async_trait::async_trait;
use nuke_core::{BackendError, ItemCache, Resource, Result, TeardownConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered record of calls made on fake kinds.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub(crate) fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

struct Inner {
    name: String,
    deps: Vec<String>,
    backend: Mutex<Vec<String>>,
    cache: ItemCache<()>,
    errors: Mutex<VecDeque<String>>,
    persistent_error: Mutex<Option<String>>,
    list_error: Mutex<Option<String>>,
    list_panics: AtomicBool,
    cached_list_fails: AtomicBool,
    remove_delay: Mutex<Duration>,
    deleted: AtomicU32,
    log: CallLog,
}

/// A resource kind backed by an in-memory item list.
///
/// Clones share state, so a test can keep a handle on a kind it registered.
#[derive(Clone)]
pub(crate) struct FakeKind {
    inner: Arc<Inner>,
}

impl FakeKind {
    pub(crate) fn new(name: &str, deps: &[&str], log: &CallLog) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                deps: deps.iter().map(|d| d.to_string()).collect(),
                backend: Mutex::new(Vec::new()),
                cache: ItemCache::new(),
                errors: Mutex::new(VecDeque::new()),
                persistent_error: Mutex::new(None),
                list_error: Mutex::new(None),
                list_panics: AtomicBool::new(false),
                cached_list_fails: AtomicBool::new(false),
                remove_delay: Mutex::new(Duration::ZERO),
                deleted: AtomicU32::new(0),
                log: log.clone(),
            }),
        }
    }

    /// Items live in the backend; they reach the cache on `list(true)`.
    pub(crate) fn with_items(self, items: &[&str]) -> Self {
        *self.inner.backend.lock().unwrap() = items.iter().map(|i| i.to_string()).collect();
        self
    }

    /// Errors returned by the next `remove` calls, in order.
    pub(crate) fn with_errors(self, errors: &[&str]) -> Self {
        self.inner
            .errors
            .lock()
            .unwrap()
            .extend(errors.iter().map(|e| e.to_string()));
        self
    }

    /// Error returned by every `remove` call.
    pub(crate) fn failing_with(self, error: &str) -> Self {
        *self.inner.persistent_error.lock().unwrap() = Some(error.to_string());
        self
    }

    /// Time each non-empty `remove` spends before touching the backend.
    pub(crate) fn with_remove_delay(self, delay: Duration) -> Self {
        *self.inner.remove_delay.lock().unwrap() = delay;
        self
    }

    /// Error returned by every `list(true)` call.
    pub(crate) fn failing_list(self, error: &str) -> Self {
        *self.inner.list_error.lock().unwrap() = Some(error.to_string());
        self
    }

    /// Fail every `list(false)` call.
    pub(crate) fn failing_cached_list(self) -> Self {
        self.inner.cached_list_fails.store(true, Ordering::SeqCst);
        self
    }

    /// Panic inside `list(true)`.
    pub(crate) fn panicking_list(self) -> Self {
        self.inner.list_panics.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn cached(&self) -> Vec<String> {
        self.inner.cache.names()
    }

    /// Number of items deleted from the backend so far.
    pub(crate) fn deleted(&self) -> u32 {
        self.inner.deleted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resource for FakeKind {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn setup(&mut self, _config: &TeardownConfig) -> Result<()> {
        self.inner.log.record(format!("{}.setup", self.inner.name));
        Ok(())
    }

    async fn list(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            if self.inner.cached_list_fails.load(Ordering::SeqCst) {
                return Err(BackendError::other("cache unavailable"));
            }
            let names = self.inner.cache.names();
            self.inner
                .log
                .record(format!("{}.list(false)={}", self.inner.name, names.len()));
            return Ok(names);
        }

        self.inner.log.record(format!("{}.list(true)", self.inner.name));
        if self.inner.list_panics.load(Ordering::SeqCst) {
            panic!("{} listing blew up", self.inner.name);
        }
        if let Some(error) = self.inner.list_error.lock().unwrap().clone() {
            return Err(BackendError::other(error));
        }
        let live = self.inner.backend.lock().unwrap().clone();
        Ok(self.inner.cache.replace(live.into_iter().map(|i| (i, ()))))
    }

    fn dependencies(&self) -> Vec<String> {
        self.inner.deps.clone()
    }

    async fn remove(&self) -> Result<()> {
        self.inner.log.record(format!("{}.remove", self.inner.name));
        if self.inner.cache.is_empty() {
            return Ok(());
        }

        let delay = *self.inner.remove_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.inner.errors.lock().unwrap().pop_front() {
            return Err(BackendError::other(error));
        }
        if let Some(error) = self.inner.persistent_error.lock().unwrap().clone() {
            return Err(BackendError::other(error));
        }

        let removed = self.inner.cache.names();
        self.inner
            .backend
            .lock()
            .unwrap()
            .retain(|item| !removed.contains(item));
        self.inner.cache.clear();
        self.inner
            .deleted
            .fetch_add(removed.len() as u32, Ordering::SeqCst);
        Ok(())
    }
}
