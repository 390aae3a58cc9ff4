//! Read queries against overridable models, built with sea-query.
//!
//! A [`ModelQuery`] snapshots the table name when it is created: a query
//! built before a scope keeps the old table, one built inside the scope keeps
//! the override after the scope ends.

use sea_orm::Value;
use sea_orm::sea_query::{
    Alias, Expr, MysqlQueryBuilder, PostgresQueryBuilder, Query, SelectStatement,
    SqliteQueryBuilder,
};

use crate::config::SqlDialect;
use crate::error::OverrideError;
use crate::model::TableSource;
use crate::Result;

/// `SELECT <fields> FROM <table> [WHERE <field> = <value> AND ...]` for one model.
#[derive(Clone, Debug)]
pub struct ModelQuery {
    model: String,
    table: String,
    fields: Vec<&'static str>,
    filters: Vec<(&'static str, Value)>,
}

impl ModelQuery {
    /// Starts a query selecting every field of `source`, resolving its table
    /// name now.
    ///
    /// # Errors
    /// Returns `OverrideError::AbstractModel` for abstract models.
    pub fn for_model<S>(source: &S) -> Result<Self>
    where
        S: TableSource + ?Sized,
    {
        if source.is_abstract() {
            return Err(OverrideError::AbstractModel {
                model: source.model_name().to_owned(),
            });
        }
        Ok(Self {
            model: source.model_name().to_owned(),
            table: source.table_name(),
            fields: source.fields().to_vec(),
            filters: Vec::new(),
        })
    }

    /// Adds `"<table>"."<field>" = value`.
    ///
    /// # Errors
    /// Returns `OverrideError::UnknownField` if the model has no such field.
    pub fn filter_eq(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        let Some(field) = self.fields.iter().copied().find(|known| *known == field) else {
            return Err(OverrideError::UnknownField {
                model: self.model,
                field: field.to_owned(),
            });
        };
        self.filters.push((field, value.into()));
        Ok(self)
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// sea-query statement, ready for `DbBackend::build`.
    #[must_use]
    pub fn statement(&self) -> SelectStatement {
        let table = Alias::new(self.table.as_str());
        let mut stmt = Query::select();
        for field in &self.fields {
            stmt.column((table.clone(), Alias::new(*field)));
        }
        stmt.from(table.clone());
        for (field, value) in &self.filters {
            stmt.and_where(Expr::col((table.clone(), Alias::new(*field))).eq(value.clone()));
        }
        stmt
    }

    /// Renders with the default (`SQLite`) dialect and inlined values.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.to_sql_with(SqlDialect::default())
    }

    #[must_use]
    pub fn to_sql_with(&self, dialect: SqlDialect) -> String {
        let stmt = self.statement();
        match dialect {
            SqlDialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
            SqlDialect::Postgres => stmt.to_string(PostgresQueryBuilder),
            SqlDialect::MySql => stmt.to_string(MysqlQueryBuilder),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::ModelMeta;

    static BIRD: ModelMeta = ModelMeta::new("query_tests.Bird", "pigeon", &["id", "name"]);
    static ABSTRACT_BIRD: ModelMeta =
        ModelMeta::abstract_model("query_tests.AbstractBird", "pigeon", &["id", "name"]);

    #[test]
    fn test_select_with_filter() {
        let sql = ModelQuery::for_model(&BIRD)
            .unwrap()
            .filter_eq("name", "James")
            .unwrap()
            .to_sql();
        assert!(sql.starts_with(r#"SELECT "pigeon"."id", "pigeon"."name" FROM "pigeon""#));
        assert!(sql.contains(r#"WHERE "pigeon"."name" = 'James'"#), "{sql}");
    }

    #[test]
    fn test_dialects_quote_differently() {
        let query = ModelQuery::for_model(&BIRD).unwrap();
        assert!(query.to_sql_with(SqlDialect::Postgres).contains(r#"FROM "pigeon""#));
        assert!(query.to_sql_with(SqlDialect::MySql).contains("FROM `pigeon`"));
    }

    #[test]
    fn test_unknown_field_and_abstract_model_are_rejected() {
        let err = ModelQuery::for_model(&BIRD)
            .unwrap()
            .filter_eq("wingspan", 3)
            .unwrap_err();
        assert!(matches!(err, OverrideError::UnknownField { .. }));

        let err = ModelQuery::for_model(&ABSTRACT_BIRD).unwrap_err();
        assert!(matches!(err, OverrideError::AbstractModel { .. }));
    }
}
