//! Lock-serialized overrides of the class-level table attribute.
//!
//! [`LockingOverride`] rewrites the table attribute of plain models in place,
//! which every thread observes. To keep overlapping scopes from trampling each
//! other, every model gets its own reentrant lock from a process-wide table;
//! a scope holds the locks of all its models until its guard is dropped.
//!
//! Locks are always taken in ascending [`ModelId`] order, so two scopes over
//! the same set of models cannot deadlock each other. The owning thread may
//! enter further scopes on a model it already holds.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{ArcReentrantMutexGuard, RawMutex, RawThreadId, ReentrantMutex};
use tracing::{debug, trace, warn};

use crate::config::TableOverrideConfig;
use crate::error::OverrideError;
use crate::model::{ModelId, ModelMeta};
use crate::scope::{self, Entered, EntryState, Layers, Withdrawal};
use crate::Result;

/// Reentrant per-model lock guarding the model's override layers and, through
/// them, its class-level table attribute.
type ModelLock = ReentrantMutex<RefCell<Layers>>;

type HeldLock = ArcReentrantMutexGuard<RawMutex, RawThreadId, RefCell<Layers>>;

static LOCK_TABLE: LazyLock<DashMap<ModelId, Arc<ModelLock>>> = LazyLock::new(DashMap::new);

/// Lock of `model`, created on first use and kept for the life of the process.
fn lock_for(model: ModelId) -> Arc<ModelLock> {
    if let Some(lock) = LOCK_TABLE.get(&model) {
        return Arc::clone(&lock);
    }
    Arc::clone(&LOCK_TABLE.entry(model).or_default())
}

/// Takes `lock` for the calling thread, waiting until `deadline` at most.
fn acquire(lock: &Arc<ModelLock>, deadline: Option<Instant>) -> Option<HeldLock> {
    match deadline {
        None => Some(lock.lock_arc()),
        Some(deadline) => lock.try_lock_arc_until(deadline),
    }
}

/// Overrides the class-level table attribute of one or more models,
/// serialized process-wide per model.
///
/// Keep these scopes short: any other thread entering an overlapping scope
/// blocks until the guard is dropped.
#[derive(Debug)]
pub struct LockingOverride {
    pairs: Vec<(&'static ModelMeta, String)>,
    acquire_order: Vec<usize>,
    lock_timeout: Option<Duration>,
    label: String,
    entry: EntryState,
}

impl LockingOverride {
    /// Builds a scope over `(model, table)` pairs.
    ///
    /// # Errors
    /// Returns `OverrideError::EmptyScope` for no pairs and
    /// `OverrideError::InvalidTableName` for an unusable table name.
    pub fn new<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'static ModelMeta, S)>,
        S: Into<String>,
    {
        let pairs = scope::collect_pairs(pairs)?;
        let mut acquire_order: Vec<usize> = (0..pairs.len()).collect();
        acquire_order.sort_by_key(|&index| pairs[index].0.id());
        let label = scope::label(&pairs);
        Ok(Self {
            pairs,
            acquire_order,
            lock_timeout: None,
            label,
            entry: EntryState::default(),
        })
    }

    /// Builds a scope over a single model.
    ///
    /// # Errors
    /// Returns `OverrideError::InvalidTableName` for an unusable table name.
    pub fn single(model: &'static ModelMeta, table: impl Into<String>) -> Result<Self> {
        Self::new([(model, table.into())])
    }

    /// Gives up entering after waiting `timeout` for any single model lock.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: &TableOverrideConfig) -> Self {
        self.lock_timeout = config.lock_timeout;
        self
    }

    #[must_use]
    pub fn is_entered(&self) -> bool {
        self.entry.is_active()
    }

    /// Takes every model lock, then rewrites the table attributes.
    ///
    /// Blocks while another thread holds any of the locks.
    ///
    /// # Errors
    /// Returns `OverrideError::AlreadyEntered` if a guard of this instance is
    /// still alive, or `OverrideError::LockTimeout` when a lock could not be
    /// taken in time. On timeout every lock taken so far is released and every
    /// attribute rewritten so far is restored before returning.
    pub fn enter(&self) -> Result<LockingGuard<'_>> {
        let entered = self.entry.enter(&self.label)?;
        let token = entered.token();
        let mut guard = LockingGuard {
            scope: self,
            held: Vec::with_capacity(self.pairs.len()),
            entered,
        };
        for &index in &self.acquire_order {
            let (model, table) = &self.pairs[index];
            let lock = lock_for(model.id());
            trace!(model = model.name(), "waiting for table lock");
            let deadline = self
                .lock_timeout
                .and_then(|timeout| Instant::now().checked_add(timeout));
            let Some(layers) = acquire(&lock, deadline) else {
                let waited = self.lock_timeout.unwrap_or_default();
                warn!(model = model.name(), ?waited, "table lock wait timed out");
                return Err(OverrideError::LockTimeout {
                    model: model.name().to_owned(),
                    waited,
                });
            };
            layers.borrow_mut().push(token, table.clone());
            model.set_class_table(Cow::Owned(table.clone()));
            trace!(model = model.name(), "table lock held");
            guard.held.push(Held { model, layers });
            debug!(model = model.name(), table = %table, "class table overridden");
        }
        Ok(guard)
    }

    /// Runs `f` with the overrides in place, restoring them afterwards
    /// whatever `f` returns.
    ///
    /// # Errors
    /// Returns entry errors converted into `E`, or whatever `f` returns.
    pub fn run<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&LockingGuard<'_>) -> std::result::Result<T, E>,
        E: From<OverrideError>,
    {
        let guard = self.enter()?;
        f(&guard)
    }
}

/// One model locked by a live scope.
struct Held {
    model: &'static ModelMeta,
    layers: HeldLock,
}

impl fmt::Debug for Held {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Held")
            .field("model", &self.model.name())
            .finish_non_exhaustive()
    }
}

/// Live class-level override. Dropping it withdraws this scope's layer from
/// every model, leaves each attribute at the innermost override still live
/// (or the declared default) and releases the locks in reverse acquisition
/// order.
#[must_use = "the override is withdrawn as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockingGuard<'a> {
    scope: &'a LockingOverride,
    held: Vec<Held>,
    entered: Entered<'a>,
}

impl LockingGuard<'_> {
    /// First governed model.
    #[must_use]
    pub fn model(&self) -> &'static ModelMeta {
        self.scope.pairs[0].0
    }

    /// Governed models in the order they were supplied.
    #[must_use]
    pub fn models(&self) -> Vec<&'static ModelMeta> {
        self.scope.pairs.iter().map(|(model, _)| *model).collect()
    }
}

impl Drop for LockingGuard<'_> {
    fn drop(&mut self) {
        let token = self.entered.token();
        while let Some(Held { model, layers }) = self.held.pop() {
            let (withdrawal, table) = {
                let mut stack = layers.borrow_mut();
                let withdrawal = stack.withdraw(token);
                let table = stack
                    .top()
                    .map_or(Cow::Borrowed(model.default_table()), |top| {
                        Cow::Owned(top.to_owned())
                    });
                (withdrawal, table)
            };
            match withdrawal {
                Withdrawal::Top => {}
                Withdrawal::Buried => {
                    debug!(model = model.name(), "class table override exited out of order");
                }
                Withdrawal::Missing => {
                    warn!(model = model.name(), "class table override missing from lock state");
                }
            }
            model.set_class_table(table);
            drop(layers);
            debug!(
                model = model.name(),
                table = %model.table_name(),
                "class table restored"
            );
        }
    }
}
