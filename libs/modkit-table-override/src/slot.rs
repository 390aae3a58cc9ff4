//! Per-thread table slots backing swappable models.
//!
//! A model has an entry only while some scope on this thread overrides it;
//! no entry means "use the class attribute".

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread::AccessError;

use crate::model::ModelId;
use crate::scope::{Layers, ScopeToken, Withdrawal};

thread_local! {
    static ACTIVE_TABLES: RefCell<HashMap<ModelId, Layers>> = RefCell::new(HashMap::new());
}

/// Innermost table published for `model` on the calling thread, if any.
#[must_use]
pub fn current(model: ModelId) -> Option<String> {
    ACTIVE_TABLES
        .try_with(|tables| {
            tables
                .borrow()
                .get(&model)
                .and_then(Layers::top)
                .map(str::to_owned)
        })
        .ok()
        .flatten()
}

/// Publishes `table` for `model` as the innermost layer owned by `token`.
pub fn publish(model: ModelId, token: ScopeToken, table: String) -> Result<(), AccessError> {
    ACTIVE_TABLES.try_with(|tables| {
        tables
            .borrow_mut()
            .entry(model)
            .or_default()
            .push(token, table);
    })
}

/// Removes the layer `token` published for `model`, dropping the entry once
/// no layer is left.
pub fn withdraw(model: ModelId, token: ScopeToken) -> Result<Withdrawal, AccessError> {
    ACTIVE_TABLES.try_with(|tables| {
        let mut tables = tables.borrow_mut();
        let Some(layers) = tables.get_mut(&model) else {
            return Withdrawal::Missing;
        };
        let withdrawal = layers.withdraw(token);
        if layers.is_empty() {
            tables.remove(&model);
        }
        withdrawal
    })
}

#[must_use]
pub fn is_published(model: ModelId) -> bool {
    ACTIVE_TABLES
        .try_with(|tables| tables.borrow().contains_key(&model))
        .unwrap_or(false)
}
