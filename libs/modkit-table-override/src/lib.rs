#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `ModKit` scoped table-name overrides.
//!
//! Lets one logical model target different physical tables (for example one
//! table per tenant) for the duration of a scope, without leaving the model
//! permanently altered. Three strategies share the same contract:
//!
//! | Strategy | Type | Visibility | Coordination |
//! |----------|------|------------|--------------|
//! | Thread-local attribute | [`OverrideTables`] | entering thread only | none |
//! | Locked class attribute | [`LockingOverride`] | process-wide | per-model reentrant lock |
//! | Derived model | [`ReplaceTable`] | holder of the derived model | none |
//!
//! Every scope is entered with `enter()`, which returns a guard; dropping the
//! guard (normal return, `?`, or panic unwind) restores the previous state.
//! The `run()` helpers wrap the same thing in a closure.
//!
//! # Example
//! ```rust
//! use modkit_table_override::{ModelQuery, OverrideTables, SwappableModel, TableSource};
//!
//! static ORDERS: SwappableModel = SwappableModel::new("billing.Order", "orders", &["id", "total"]);
//!
//! let scope = OverrideTables::single(&ORDERS, "orders_tenant_42")?;
//! {
//!     let guard = scope.enter()?;
//!     assert_eq!(guard.model().table_name(), "orders_tenant_42");
//!     let query = ModelQuery::for_model(guard.model())?;
//!     assert!(query.to_sql().contains(r#"FROM "orders_tenant_42""#));
//! }
//! assert_eq!(ORDERS.table_name(), "orders");
//! # Ok::<(), modkit_table_override::OverrideError>(())
//! ```

pub mod config;
mod error;
pub mod locking;
pub mod model;
pub mod query;
pub mod replace;
mod scope;
mod slot;
pub mod swappable;

pub use config::{SqlDialect, TableOverrideConfig};
pub use error::OverrideError;
pub use locking::{LockingGuard, LockingOverride};
pub use model::{ModelId, ModelKind, ModelMeta, TableSource};
pub use query::ModelQuery;
pub use replace::{DerivedModel, ReplaceGuard, ReplaceTable};
pub use swappable::{OverrideGuard, OverrideTables, SwappableModel};

/// Library-local result type.
pub type Result<T> = std::result::Result<T, OverrideError>;
