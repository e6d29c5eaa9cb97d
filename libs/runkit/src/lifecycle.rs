//! Lifecycle registry - serializes boot/teardown decisions per backend kind.
//!
//! Every sandbox instance of a given kind shares one expensive booted runtime.
//! The registry deduplicates concurrent boot attempts into a single in-flight
//! operation, reference-counts holders so teardown happens exactly once when
//! the last holder releases, and tracks the most recent failure per kind.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex;

use crate::driver::{Handle, RuntimeDriver};
use crate::errors::SandboxError;

/// A boot in flight: one future, arbitrarily many waiters. Both the success
/// and the failure value are cloned out to every joiner.
type BootFuture = Shared<BoxFuture<'static, Result<Handle, SandboxError>>>;

/// Per-kind shared state. All read-modify-write happens under the record's
/// async mutex; the lock is dropped while awaiting a joined boot (the
/// documented interleaving point) and held across teardown so a racing
/// acquire never observes a half-cleared record.
#[derive(Default)]
struct RuntimeRecord {
    handle: Option<Handle>,
    holders: usize,
    pending_boot: Option<BootFuture>,
    last_error: Option<SandboxError>,
}

/// Registry of shared backend runtimes, keyed by backend kind.
///
/// Constructed once at process start and injected into sandbox instances;
/// tests construct a fresh registry each to keep sharing state isolated.
pub struct LifecycleRegistry {
    records: DashMap<&'static str, Arc<Mutex<RuntimeRecord>>>,
}

impl std::fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&'static str> = self.records.iter().map(|e| *e.key()).collect();
        f.debug_struct("LifecycleRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    fn record(&self, kind: &'static str) -> Arc<Mutex<RuntimeRecord>> {
        self.records.entry(kind).or_default().clone()
    }

    /// Acquire a handle to the shared runtime for `driver.kind()`, booting it
    /// if necessary or joining an already in-flight boot.
    ///
    /// The caller is counted as a holder as soon as validation passes, before
    /// the handle exists, so a racing release cannot tear down a boot this
    /// caller is about to observe. On boot failure the increment is rolled
    /// back and the same error is propagated to every joiner of that attempt.
    pub async fn acquire(&self, driver: &Arc<dyn RuntimeDriver>) -> Result<Handle, SandboxError> {
        let kind = driver.kind();
        let rec = self.record(kind);

        if let Err(err) = driver.validate_environment() {
            let mut r = rec.lock().await;
            r.last_error = Some(err.clone());
            return Err(err);
        }

        let boot = {
            let mut r = rec.lock().await;
            r.holders += 1;

            if let Some(handle) = &r.handle {
                tracing::debug!(kind, holders = r.holders, "reusing booted runtime");
                return Ok(handle.clone());
            }

            if let Some(pending) = &r.pending_boot {
                tracing::debug!(kind, holders = r.holders, "joining in-flight boot");
                pending.clone()
            } else {
                tracing::info!(kind, "booting runtime");
                let driver = Arc::clone(driver);
                let fut: BootFuture = async move { driver.boot().await }.boxed().shared();
                r.pending_boot = Some(fut.clone());
                fut
            }
        };

        let result = boot.clone().await;

        let mut r = rec.lock().await;
        // Only clear the slot if it still holds this attempt; a failed boot
        // may already have been replaced by a newer one.
        let owns_slot = r.pending_boot.as_ref().is_some_and(|p| p.ptr_eq(&boot));
        match result {
            Ok(handle) => {
                if owns_slot {
                    r.pending_boot = None;
                }
                if r.handle.is_none() {
                    r.handle = Some(handle.clone());
                }
                tracing::debug!(kind, holders = r.holders, "runtime boot completed");
                Ok(handle)
            }
            Err(err) => {
                if owns_slot {
                    r.pending_boot = None;
                }
                r.holders = r.holders.saturating_sub(1);
                r.last_error = Some(err.clone());
                tracing::warn!(kind, holders = r.holders, error = %err, "runtime boot failed");
                Err(err)
            }
        }
    }

    /// Release one holder of `driver.kind()`.
    ///
    /// No-op when the holder count is already zero. The release that brings
    /// the count to exactly zero tears the shared handle down; a teardown
    /// failure is surfaced to this caller but the record is cleared
    /// regardless, so a dead runtime can never block future boots.
    pub async fn release(&self, driver: &dyn RuntimeDriver) -> Result<(), SandboxError> {
        let kind = driver.kind();
        let rec = self.record(kind);
        let mut r = rec.lock().await;

        if r.holders == 0 {
            return Ok(());
        }
        r.holders -= 1;
        tracing::debug!(kind, holders = r.holders, "released runtime holder");

        if r.holders == 0 {
            if let Some(handle) = r.handle.take() {
                tracing::info!(kind, "last holder released; tearing down runtime");
                if let Err(err) = driver.teardown(handle).await {
                    tracing::warn!(kind, error = %err, "runtime teardown failed");
                    r.last_error = Some(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Unconditionally tear down any live handle (ignoring errors) and clear
    /// all per-kind state. Test/diagnostic use only.
    pub async fn reset(&self, driver: &dyn RuntimeDriver) {
        let kind = driver.kind();
        let rec = self.record(kind);
        let mut r = rec.lock().await;

        if let Some(handle) = r.handle.take() {
            if let Err(err) = driver.teardown(handle).await {
                tracing::debug!(kind, error = %err, "ignoring teardown failure during reset");
            }
        }
        r.holders = 0;
        r.pending_boot = None;
        r.last_error = None;
    }

    /// Number of instances currently holding the kind's runtime.
    pub async fn holders(&self, kind: &str) -> usize {
        match self.records.get(kind) {
            Some(rec) => rec.lock().await.holders,
            None => 0,
        }
    }

    /// Most recent acquisition/teardown failure recorded against the kind.
    pub async fn last_error(&self, kind: &str) -> Option<SandboxError> {
        match self.records.get(kind) {
            Some(rec) => rec.lock().await.last_error.clone(),
            None => None,
        }
    }

    /// Whether a booted handle currently exists for the kind.
    pub async fn is_booted(&self, kind: &str) -> bool {
        match self.records.get(kind) {
            Some(rec) => rec.lock().await.handle.is_some(),
            None => false,
        }
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
