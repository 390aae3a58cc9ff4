//! Pieces shared by all override scopes: pair normalisation, the
//! single-entry flag and the per-model override stack.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::OverrideError;
use crate::model::{ModelMeta, validate_table_name};
use crate::Result;

/// Validates and de-duplicates (model, table) pairs.
///
/// A model listed twice keeps the position of its first appearance and the
/// table of its last one.
pub fn collect_pairs<M, I, S>(pairs: I) -> Result<Vec<(&'static M, String)>>
where
    M: AsRef<ModelMeta> + ?Sized + 'static,
    I: IntoIterator<Item = (&'static M, S)>,
    S: Into<String>,
{
    let mut collected: Vec<(&'static M, String)> = Vec::new();
    for (model, table) in pairs {
        let meta = model.as_ref();
        let table = table.into();
        validate_table_name(meta.name(), &table)?;
        let id = meta.id();
        if let Some(existing) = collected
            .iter_mut()
            .find(|(seen, _)| seen.as_ref().id() == id)
        {
            existing.1 = table;
        } else {
            collected.push((model, table));
        }
    }
    if collected.is_empty() {
        return Err(OverrideError::EmptyScope);
    }
    Ok(collected)
}

/// Human-readable label for errors and logs.
#[must_use]
pub fn label<M>(pairs: &[(&'static M, String)]) -> String
where
    M: AsRef<ModelMeta> + ?Sized + 'static,
{
    pairs
        .iter()
        .map(|(model, _)| model.as_ref().name())
        .collect::<Vec<_>>()
        .join(", ")
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies one enter/exit cycle of one scope instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeToken(u64);

impl ScopeToken {
    fn fresh() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// How a scope's layer left the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Withdrawal {
    /// It was the innermost layer.
    Top,
    /// Layers entered later are still on top of it.
    Buried,
    /// Nothing carried the token.
    Missing,
}

/// Overrides currently active for one model, innermost last.
///
/// Each scope removes only its own layer, so the resolved table stays the
/// innermost live override whatever order guards are dropped in, and falls
/// back to the default once the stack is empty.
#[derive(Debug, Default)]
pub struct Layers(Vec<(ScopeToken, String)>);

impl Layers {
    pub fn push(&mut self, token: ScopeToken, table: String) {
        self.0.push((token, table));
    }

    pub fn withdraw(&mut self, token: ScopeToken) -> Withdrawal {
        let Some(position) = self.0.iter().rposition(|(owner, _)| *owner == token) else {
            return Withdrawal::Missing;
        };
        self.0.remove(position);
        if position == self.0.len() {
            Withdrawal::Top
        } else {
            Withdrawal::Buried
        }
    }

    #[must_use]
    pub fn top(&self) -> Option<&str> {
        self.0.last().map(|(_, table)| table.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tracks whether a scope instance currently has a live guard.
#[derive(Debug, Default)]
pub struct EntryState {
    active: Cell<bool>,
}

impl EntryState {
    pub fn enter(&self, label: &str) -> Result<Entered<'_>> {
        if self.active.replace(true) {
            return Err(OverrideError::AlreadyEntered {
                model: label.to_owned(),
            });
        }
        Ok(Entered {
            active: &self.active,
            token: ScopeToken::fresh(),
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Clears the entry flag when the owning guard goes away.
///
/// Holds a `&Cell`, which keeps every guard embedding it on its own thread.
#[derive(Debug)]
pub struct Entered<'a> {
    active: &'a Cell<bool>,
    token: ScopeToken,
}

impl Entered<'_> {
    #[must_use]
    pub fn token(&self) -> ScopeToken {
        self.token
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.active.set(false);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    static FIRST: ModelMeta = ModelMeta::new("scope_tests.First", "first", &["id"]);
    static SECOND: ModelMeta = ModelMeta::new("scope_tests.Second", "second", &["id"]);

    #[test]
    fn test_duplicates_keep_first_position_and_last_table() {
        let pairs = collect_pairs([(&FIRST, "a"), (&SECOND, "b"), (&FIRST, "c")]).unwrap();
        let flattened: Vec<_> = pairs
            .iter()
            .map(|(model, table)| (model.name(), table.as_str()))
            .collect();
        assert_eq!(
            flattened,
            vec![("scope_tests.First", "c"), ("scope_tests.Second", "b")]
        );
        assert_eq!(label(&pairs), "scope_tests.First, scope_tests.Second");
    }

    #[test]
    fn test_empty_and_invalid_pairs_are_rejected() {
        let none: Vec<(&'static ModelMeta, &str)> = Vec::new();
        assert!(matches!(collect_pairs(none), Err(OverrideError::EmptyScope)));
        assert!(matches!(
            collect_pairs([(&FIRST, "")]),
            Err(OverrideError::InvalidTableName { .. })
        ));
    }

    #[test]
    fn test_entry_flag_is_single_use_until_dropped() {
        let state = EntryState::default();
        let entered = state.enter("x").unwrap();
        assert!(state.is_active());
        assert!(matches!(
            state.enter("x"),
            Err(OverrideError::AlreadyEntered { .. })
        ));
        let first_token = entered.token();
        drop(entered);
        assert!(!state.is_active());
        let again = state.enter("x").unwrap();
        assert_ne!(again.token(), first_token);
    }

    #[test]
    fn test_layers_resolve_to_innermost_live_override() {
        let outer = ScopeToken::fresh();
        let inner = ScopeToken::fresh();
        let mut layers = Layers::default();
        layers.push(outer, "outer".to_owned());
        layers.push(inner, "inner".to_owned());

        assert_eq!(layers.withdraw(outer), Withdrawal::Buried);
        assert_eq!(layers.top(), Some("inner"));
        assert_eq!(layers.withdraw(outer), Withdrawal::Missing);
        assert_eq!(layers.withdraw(inner), Withdrawal::Top);
        assert!(layers.is_empty());
        assert_eq!(layers.top(), None);
    }
}
