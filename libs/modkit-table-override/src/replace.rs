//! Derived models with a fixed table name.
//!
//! [`ReplaceTable`] never touches shared state: entering it builds a fresh
//! [`DerivedModel`] from an abstract base, with the override table baked in.
//! Callers query through the derived model explicitly, so any number of
//! threads and nested scopes can derive from the same base at once.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::OverrideError;
use crate::model::{ModelMeta, TableSource, validate_table_name};
use crate::scope::{Entered, EntryState};
use crate::Result;

static DERIVED_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A concrete model derived at runtime from an abstract base.
///
/// Inherits the base's fields; its table name is fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedModel {
    name: String,
    base: &'static ModelMeta,
    table: String,
}

impl DerivedModel {
    fn derive(base: &'static ModelMeta, table: &str) -> Self {
        let sequence = DERIVED_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            name: format!("{}@{table}#{sequence}", base.name()),
            base,
            table: table.to_owned(),
        }
    }

    /// Process-unique name of this derived model.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base(&self) -> &'static ModelMeta {
        self.base
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl TableSource for DerivedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn table_name(&self) -> String {
        self.table.clone()
    }

    fn fields(&self) -> &[&'static str] {
        self.base.fields()
    }
}

/// Yields a [`DerivedModel`] of an abstract base bound to another table.
#[derive(Debug)]
pub struct ReplaceTable {
    base: &'static ModelMeta,
    table: String,
    entry: EntryState,
}

impl ReplaceTable {
    /// # Errors
    /// Returns `OverrideError::InvalidTableName` for an unusable table name.
    pub fn new(base: &'static ModelMeta, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(base.name(), &table)?;
        Ok(Self {
            base,
            table,
            entry: EntryState::default(),
        })
    }

    #[must_use]
    pub fn is_entered(&self) -> bool {
        self.entry.is_active()
    }

    /// Builds the derived model.
    ///
    /// # Errors
    /// Returns `OverrideError::ConcreteModel` if the base is not abstract
    /// (nothing is built), or `OverrideError::AlreadyEntered` if a guard of
    /// this instance is still alive.
    pub fn enter(&self) -> Result<ReplaceGuard<'_>> {
        if !self.base.is_abstract() {
            return Err(OverrideError::ConcreteModel {
                model: self.base.name().to_owned(),
            });
        }
        let entered = self.entry.enter(self.base.name())?;
        let model = DerivedModel::derive(self.base, &self.table);
        debug!(
            base = self.base.name(),
            derived = model.name(),
            table = %self.table,
            "derived model built"
        );
        Ok(ReplaceGuard {
            model,
            _entered: entered,
        })
    }

    /// Runs `f` with a freshly derived model.
    ///
    /// # Errors
    /// Returns entry errors converted into `E`, or whatever `f` returns.
    pub fn run<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&DerivedModel) -> std::result::Result<T, E>,
        E: From<OverrideError>,
    {
        let guard = self.enter()?;
        f(guard.model())
    }
}

/// Holds the derived model for the duration of the scope.
#[must_use]
#[derive(Debug)]
pub struct ReplaceGuard<'a> {
    model: DerivedModel,
    _entered: Entered<'a>,
}

impl ReplaceGuard<'_> {
    #[must_use]
    pub fn model(&self) -> &DerivedModel {
        &self.model
    }

    /// Ends the scope and keeps the derived model.
    #[must_use]
    pub fn into_model(self) -> DerivedModel {
        self.model
    }
}

impl Deref for ReplaceGuard<'_> {
    type Target = DerivedModel;

    fn deref(&self) -> &DerivedModel {
        &self.model
    }
}
