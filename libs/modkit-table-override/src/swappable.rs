//! Thread-local table overrides for swappable models.
//!
//! A [`SwappableModel`] resolves its table name through the calling thread's
//! slot before falling back to its declaration. [`OverrideTables`] publishes
//! overrides into that slot for the lifetime of an [`OverrideGuard`], so only
//! the entering thread ever observes them and no coordination between threads
//! is needed.
//!
//! ```rust
//! use modkit_table_override::{OverrideTables, SwappableModel};
//!
//! static EVENTS: SwappableModel = SwappableModel::new("audit.Event", "events", &["id", "kind"]);
//!
//! let outer = OverrideTables::single(&EVENTS, "events_a")?;
//! let inner = OverrideTables::single(&EVENTS, "events_b")?;
//! {
//!     let _a = outer.enter()?;
//!     {
//!         let _b = inner.enter()?;
//!         assert_eq!(EVENTS.table_name(), "events_b");
//!     }
//!     assert_eq!(EVENTS.table_name(), "events_a");
//!     assert!(outer.enter().is_err());
//! }
//! assert_eq!(EVENTS.table_name(), "events");
//! # Ok::<(), modkit_table_override::OverrideError>(())
//! ```

use std::ops::Deref;

use tracing::{debug, warn};

use crate::error::OverrideError;
use crate::model::{ModelMeta, TableSource};
use crate::scope::{self, Entered, EntryState, Withdrawal};
use crate::{Result, slot};

/// A concrete model whose table name can be overridden per thread.
#[derive(Debug)]
pub struct SwappableModel {
    meta: ModelMeta,
}

impl SwappableModel {
    #[must_use]
    pub const fn new(
        name: &'static str,
        default_table: &'static str,
        fields: &'static [&'static str],
    ) -> Self {
        Self {
            meta: ModelMeta::thread_local(name, default_table, fields),
        }
    }

    #[must_use]
    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    /// True while some scope on the calling thread overrides this model.
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        slot::is_published(self.meta.id())
    }
}

impl Deref for SwappableModel {
    type Target = ModelMeta;

    fn deref(&self) -> &ModelMeta {
        &self.meta
    }
}

impl AsRef<ModelMeta> for SwappableModel {
    fn as_ref(&self) -> &ModelMeta {
        &self.meta
    }
}

impl TableSource for SwappableModel {
    fn model_name(&self) -> &str {
        self.meta.name()
    }

    fn table_name(&self) -> String {
        self.meta.table_name()
    }

    fn fields(&self) -> &[&'static str] {
        self.meta.fields()
    }
}

/// Overrides the table names of one or more swappable models on the calling
/// thread while entered.
///
/// An instance may be entered again after its guard is dropped, but not while
/// a guard is alive.
#[derive(Debug)]
pub struct OverrideTables {
    pairs: Vec<(&'static SwappableModel, String)>,
    label: String,
    entry: EntryState,
}

impl OverrideTables {
    /// Builds a scope over `(model, table)` pairs.
    ///
    /// # Errors
    /// Returns `OverrideError::EmptyScope` for no pairs and
    /// `OverrideError::InvalidTableName` for an unusable table name.
    pub fn new<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'static SwappableModel, S)>,
        S: Into<String>,
    {
        let pairs = scope::collect_pairs(pairs)?;
        let label = scope::label(&pairs);
        Ok(Self {
            pairs,
            label,
            entry: EntryState::default(),
        })
    }

    /// Builds a scope over a single model.
    ///
    /// # Errors
    /// Returns `OverrideError::InvalidTableName` for an unusable table name.
    pub fn single(model: &'static SwappableModel, table: impl Into<String>) -> Result<Self> {
        Self::new([(model, table.into())])
    }

    #[must_use]
    pub fn is_entered(&self) -> bool {
        self.entry.is_active()
    }

    /// Publishes the overrides for the calling thread.
    ///
    /// # Errors
    /// Returns `OverrideError::AlreadyEntered` if a guard of this instance is
    /// still alive, or `OverrideError::SlotUnavailable` when called while the
    /// thread is tearing down its thread-local storage.
    pub fn enter(&self) -> Result<OverrideGuard<'_>> {
        let entered = self.entry.enter(&self.label)?;
        let token = entered.token();
        let mut guard = OverrideGuard {
            scope: self,
            published: 0,
            entered,
        };
        for (model, table) in &self.pairs {
            slot::publish(model.id(), token, table.clone()).map_err(|_| {
                OverrideError::SlotUnavailable {
                    model: model.name().to_owned(),
                }
            })?;
            debug!(model = model.name(), table = %table, "table override published");
            guard.published += 1;
        }
        Ok(guard)
    }

    /// Runs `f` with the overrides published, withdrawing them afterwards
    /// whatever `f` returns.
    ///
    /// # Errors
    /// Returns entry errors converted into `E`, or whatever `f` returns.
    pub fn run<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&OverrideGuard<'_>) -> std::result::Result<T, E>,
        E: From<OverrideError>,
    {
        let guard = self.enter()?;
        f(&guard)
    }
}

/// Live thread-local override. Dropping it withdraws this scope's layer;
/// overrides of other live scopes stay in place.
#[must_use = "the override is withdrawn as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OverrideGuard<'a> {
    scope: &'a OverrideTables,
    published: usize,
    entered: Entered<'a>,
}

impl OverrideGuard<'_> {
    /// First governed model.
    #[must_use]
    pub fn model(&self) -> &'static SwappableModel {
        self.scope.pairs[0].0
    }

    /// Governed models in the order they were supplied.
    #[must_use]
    pub fn models(&self) -> Vec<&'static SwappableModel> {
        self.scope.pairs.iter().map(|(model, _)| *model).collect()
    }
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        let token = self.entered.token();
        for (model, table) in self.scope.pairs[..self.published].iter().rev() {
            match slot::withdraw(model.id(), token) {
                Ok(Withdrawal::Top) => {}
                Ok(Withdrawal::Buried) => debug!(
                    model = model.name(),
                    table = %table,
                    "table override exited out of order"
                ),
                Ok(Withdrawal::Missing) => warn!(
                    model = model.name(),
                    table = %table,
                    "table override missing from thread-local slot"
                ),
                Err(_) => {
                    warn!(
                        model = model.name(),
                        "thread-local table slot gone before override exit"
                    );
                    continue;
                }
            }
            debug!(model = model.name(), table = %model.table_name(), "table override withdrawn");
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    static FINCH: SwappableModel = SwappableModel::new("swappable_tests.Finch", "finch", &["id"]);

    #[test]
    #[traced_test]
    fn test_publish_and_withdraw_are_logged() {
        let scope = OverrideTables::single(&FINCH, "finch_t1").unwrap();
        {
            let guard = scope.enter().unwrap();
            assert_eq!(guard.model().table_name(), "finch_t1");
        }
        assert!(logs_contain("table override published"));
        assert!(logs_contain("table override withdrawn"));
        assert!(!logs_contain("exited out of order"));
    }

    #[test]
    #[traced_test]
    fn test_out_of_order_exit_restores_default() {
        let outer = OverrideTables::single(&FINCH, "finch_outer").unwrap();
        let inner = OverrideTables::single(&FINCH, "finch_inner").unwrap();

        let outer_guard = outer.enter().unwrap();
        let inner_guard = inner.enter().unwrap();
        drop(outer_guard);
        assert!(logs_contain("table override exited out of order"));
        assert_eq!(FINCH.table_name(), "finch_inner");

        drop(inner_guard);
        assert_eq!(FINCH.table_name(), "finch");
        assert!(!FINCH.is_overridden());
        assert!(!logs_contain("missing from thread-local slot"));
    }

    #[test]
    fn test_models_follow_supplied_order() {
        static WREN: SwappableModel = SwappableModel::new("swappable_tests.Wren", "wren", &["id"]);

        let scope = OverrideTables::new([(&WREN, "w"), (&FINCH, "f")]).unwrap();
        let guard = scope.enter().unwrap();
        assert!(std::ptr::eq(guard.model(), &WREN));
        assert_eq!(guard.models().len(), 2);
        assert!(WREN.is_overridden());
    }
}
