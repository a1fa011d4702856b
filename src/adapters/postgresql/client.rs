//! PostgreSQL client implementation
//!
//! One raw `tokio-postgres` session per migration run. The connection future
//! is spawned on the tokio runtime and joined again on [`close`].
//!
//! [`close`]: MigrationDatabase::close

use crate::adapters::database::traits::{MigrationDatabase, Row, SqlValue, Vendor};
use crate::domain::{CairnError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Statement};

/// Owned parameter ready for tokio-postgres
type PgParam = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL session used by the migration engine
pub struct PostgresDatabase {
    client: Client,
    connection_task: JoinHandle<()>,
}

impl PostgresDatabase {
    /// Wraps a connected client and its spawned connection task
    pub fn new(client: Client, connection_task: JoinHandle<()>) -> Self {
        Self {
            client,
            connection_task,
        }
    }

    /// Prepares `sql` and converts `params` to the types the server inferred
    async fn prepare(&self, sql: &str, params: &[SqlValue]) -> Result<(Statement, Vec<PgParam>)> {
        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| CairnError::Database(describe(&e)))?;

        if statement.params().len() != params.len() {
            return Err(CairnError::Database(format!(
                "Statement expects {} parameters, {} given: {sql}",
                statement.params().len(),
                params.len()
            )));
        }

        let converted = params
            .iter()
            .zip(statement.params())
            .map(|(value, ty)| to_pg_param(value, ty))
            .collect::<Result<Vec<_>>>()?;

        Ok((statement, converted))
    }
}

/// Renders a driver error with the server's SQLSTATE when there is one
fn describe(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{} (SQLSTATE {})", db.message(), db.code().code()),
        None => err.to_string(),
    }
}

fn to_pg_param(value: &SqlValue, ty: &Type) -> Result<PgParam> {
    let out_of_range =
        |v: i64| CairnError::Database(format!("Integer {v} does not fit parameter type {ty}"));

    let param: PgParam = match value {
        SqlValue::Null => match *ty {
            Type::BOOL => Box::new(None::<bool>),
            Type::INT2 => Box::new(None::<i16>),
            Type::INT4 => Box::new(None::<i32>),
            Type::INT8 => Box::new(None::<i64>),
            Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
            Type::TIMESTAMPTZ => Box::new(None::<DateTime<Utc>>),
            _ => Box::new(None::<String>),
        },
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int(v) => match *ty {
            Type::INT2 => Box::new(i16::try_from(*v).map_err(|_| out_of_range(*v))?),
            Type::INT4 => Box::new(i32::try_from(*v).map_err(|_| out_of_range(*v))?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(v.to_string()),
            _ => Box::new(*v),
        },
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Timestamp(ts) => match *ty {
            Type::TIMESTAMP => Box::new(ts.naive_utc()),
            _ => Box::new(*ts),
        },
    };
    Ok(param)
}

fn convert_row(pg_row: &tokio_postgres::Row) -> Row {
    let columns: Vec<String> = pg_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let values = pg_row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| match *col.type_() {
            Type::BOOL => pg_row
                .try_get::<_, Option<bool>>(i)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, SqlValue::Bool),
            Type::INT2 => pg_row
                .try_get::<_, Option<i16>>(i)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
            Type::INT4 => pg_row
                .try_get::<_, Option<i32>>(i)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
            Type::INT8 => pg_row
                .try_get::<_, Option<i64>>(i)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, SqlValue::Int),
            Type::TIMESTAMP => pg_row
                .try_get::<_, Option<NaiveDateTime>>(i)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, |v| SqlValue::Timestamp(v.and_utc())),
            Type::TIMESTAMPTZ => pg_row
                .try_get::<_, Option<DateTime<Utc>>>(i)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, SqlValue::Timestamp),
            _ => pg_row
                .try_get::<_, Option<String>>(i)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, SqlValue::Text),
        })
        .collect();

    Row::new(columns, values)
}

fn as_refs(params: &[PgParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl MigrationDatabase for PostgresDatabase {
    fn vendor(&self) -> Vendor {
        Vendor::PostgreSql
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let (statement, converted) = self.prepare(sql, params).await?;
        self.client
            .execute(&statement, &as_refs(&converted))
            .await
            .map_err(|e| CairnError::Database(describe(&e)))
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let (statement, converted) = self.prepare(sql, params).await?;
        let rows = self
            .client
            .query(&statement, &as_refs(&converted))
            .await
            .map_err(|e| CairnError::Database(describe(&e)))?;
        Ok(rows.iter().map(convert_row).collect())
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| CairnError::Database(describe(&e)))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .query(
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1",
                &[SqlValue::Text(table.to_lowercase())],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PostgresDatabase {
            client,
            connection_task,
        } = *self;
        drop(client);
        connection_task
            .await
            .map_err(|e| CairnError::Database(format!("PostgreSQL connection task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_params_follow_server_types() {
        assert!(to_pg_param(&SqlValue::Int(7), &Type::INT4).is_ok());
        assert!(to_pg_param(&SqlValue::Int(i64::MAX), &Type::INT4).is_err());
        assert!(to_pg_param(&SqlValue::Int(40_000), &Type::INT2).is_err());
        assert!(to_pg_param(&SqlValue::Int(i64::MAX), &Type::INT8).is_ok());
    }

    #[test]
    fn test_typed_nulls_accept_their_column_type() {
        for ty in [Type::BOOL, Type::INT4, Type::TIMESTAMP, Type::TEXT] {
            let param = to_pg_param(&SqlValue::Null, &ty).unwrap();
            assert_eq!(format!("{param:?}"), "None");
        }
    }
}
