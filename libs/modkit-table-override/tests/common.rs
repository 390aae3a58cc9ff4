#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use modkit_table_override::{ModelQuery, TableSource};

pub const BIRD_FIELDS: &[&str] = &["id", "name"];

/// `SELECT ... WHERE name = <name>` against whatever table `source` resolves to now.
#[must_use]
pub fn select_by_name(source: &(impl TableSource + ?Sized), name: &str) -> String {
    ModelQuery::for_model(source)
        .unwrap()
        .filter_eq("name", name)
        .unwrap()
        .to_sql()
}

#[must_use]
pub fn reads_from(sql: &str, table: &str) -> bool {
    sql.contains(&format!(r#"FROM "{table}""#)) && sql.contains(&format!(r#""{table}"."name""#))
}

/// Ordered log of checkpoints shared between test threads.
#[derive(Clone, Default)]
pub struct Sequence(Arc<Mutex<Vec<&'static str>>>);

impl Sequence {
    pub fn mark(&self, checkpoint: &'static str) {
        self.0.lock().unwrap().push(checkpoint);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}
