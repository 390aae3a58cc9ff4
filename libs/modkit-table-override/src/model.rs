//! Model declarations and table-name resolution.
//!
//! A model is declared once as a `static` and keeps its declaration for the
//! life of the process. How its table name resolves is fixed by the
//! constructor used for that `static`:
//!
//! - [`ModelMeta::new`]: concrete model, plain class-level table attribute.
//! - [`ModelMeta::abstract_model`]: abstract base, only usable through
//!   [`ReplaceTable`](crate::ReplaceTable).
//! - [`SwappableModel::new`](crate::SwappableModel::new): concrete model whose
//!   table name resolves through a thread-local slot first.

use std::borrow::Cow;
use std::fmt;

use parking_lot::RwLock;

use crate::error::OverrideError;
use crate::{Result, slot};

/// Stable identity of a declared model.
///
/// Ordered by model name first and by the address of the declaration second,
/// so multi-model lock acquisition follows the same order at every call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId {
    name: &'static str,
    addr: usize,
}

impl ModelId {
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Whether a model is mapped to storage on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Concrete,
    Abstract,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resolution {
    Attribute,
    ThreadLocal,
}

/// Static description of a mapped model: its name, declared table and fields.
///
/// The class-level table attribute starts out as the declared default and is
/// only ever rewritten by [`LockingOverride`](crate::LockingOverride) while it
/// holds the model's lock.
pub struct ModelMeta {
    name: &'static str,
    default_table: &'static str,
    fields: &'static [&'static str],
    kind: ModelKind,
    resolution: Resolution,
    table: RwLock<Cow<'static, str>>,
}

impl ModelMeta {
    /// Declares a concrete model with a plain class-level table attribute.
    #[must_use]
    pub const fn new(
        name: &'static str,
        default_table: &'static str,
        fields: &'static [&'static str],
    ) -> Self {
        Self::declare(
            name,
            default_table,
            fields,
            ModelKind::Concrete,
            Resolution::Attribute,
        )
    }

    /// Declares an abstract model: never queried directly, only derived from.
    #[must_use]
    pub const fn abstract_model(
        name: &'static str,
        default_table: &'static str,
        fields: &'static [&'static str],
    ) -> Self {
        Self::declare(
            name,
            default_table,
            fields,
            ModelKind::Abstract,
            Resolution::Attribute,
        )
    }

    pub(crate) const fn thread_local(
        name: &'static str,
        default_table: &'static str,
        fields: &'static [&'static str],
    ) -> Self {
        Self::declare(
            name,
            default_table,
            fields,
            ModelKind::Concrete,
            Resolution::ThreadLocal,
        )
    }

    const fn declare(
        name: &'static str,
        default_table: &'static str,
        fields: &'static [&'static str],
        kind: ModelKind,
        resolution: Resolution,
    ) -> Self {
        Self {
            name,
            default_table,
            fields,
            kind,
            resolution,
            table: parking_lot::const_rwlock(Cow::Borrowed(default_table)),
        }
    }

    #[must_use]
    pub fn id(&self) -> ModelId {
        ModelId {
            name: self.name,
            addr: std::ptr::from_ref(self).addr(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Table name given in the declaration, regardless of active overrides.
    #[must_use]
    pub fn default_table(&self) -> &'static str {
        self.default_table
    }

    #[must_use]
    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.kind == ModelKind::Abstract
    }

    /// True when the table name resolves through the thread-local slot.
    #[must_use]
    pub fn is_swappable(&self) -> bool {
        self.resolution == Resolution::ThreadLocal
    }

    /// Resolves the table name as seen by the calling thread right now.
    #[must_use]
    pub fn table_name(&self) -> String {
        if self.is_swappable()
            && let Some(table) = slot::current(self.id())
        {
            return table;
        }
        self.class_table()
    }

    pub(crate) fn class_table(&self) -> String {
        self.table.read().clone().into_owned()
    }

    /// Rewrites the class-level attribute. Only called with the model lock held.
    pub(crate) fn set_class_table(&self, table: Cow<'static, str>) {
        *self.table.write() = table;
    }
}

impl fmt::Debug for ModelMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMeta")
            .field("name", &self.name)
            .field("default_table", &self.default_table)
            .field("fields", &self.fields)
            .field("kind", &self.kind)
            .field("swappable", &self.is_swappable())
            .field("table", &*self.table.read())
            .finish()
    }
}

/// Models compare by identity, not by declaration contents.
impl PartialEq for ModelMeta {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ModelMeta {}

impl AsRef<ModelMeta> for ModelMeta {
    fn as_ref(&self) -> &ModelMeta {
        self
    }
}

/// Anything the host mapping layer can build a query against.
pub trait TableSource {
    fn model_name(&self) -> &str;

    /// Table name resolved at the time of the call.
    fn table_name(&self) -> String;

    fn fields(&self) -> &[&'static str];

    fn is_abstract(&self) -> bool {
        false
    }
}

impl TableSource for ModelMeta {
    fn model_name(&self) -> &str {
        self.name
    }

    fn table_name(&self) -> String {
        ModelMeta::table_name(self)
    }

    fn fields(&self) -> &[&'static str] {
        self.fields
    }

    fn is_abstract(&self) -> bool {
        ModelMeta::is_abstract(self)
    }
}

/// Rejects names no mapping layer could use. Existence is never checked.
pub(crate) fn validate_table_name(model: &str, table: &str) -> Result<()> {
    let reason = if table.trim().is_empty() {
        "must not be empty"
    } else if table.trim() != table {
        "must not have leading or trailing whitespace"
    } else if table.chars().any(char::is_control) {
        "must not contain control characters"
    } else {
        return Ok(());
    };
    Err(OverrideError::InvalidTableName {
        model: model.to_owned(),
        reason,
    })
}
