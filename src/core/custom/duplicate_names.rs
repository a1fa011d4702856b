//! Repair of duplicate attribute type names
//!
//! Before a unique constraint can be put on an attribute type table's name
//! column, existing duplicates have to go. Within every group of rows sharing
//! a name the row with the lowest id keeps it; the others are renamed
//! `<name>_<n>` where `n` is the lowest counter (starting at 1 for each name)
//! that does not collide with a name already in the table.
//!
//! All renames happen under one savepoint: either every duplicate is renamed
//! or none is.

use super::{ChangeContext, CustomChange};
use crate::adapters::database::SqlValue;
use crate::domain::{CairnError, Result};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;

const SAVEPOINT: &str = "cairn_duplicate_names";

const DEFAULT_TABLE: &str = "location_attribute_type";

const KNOWN_PARAMS: [&str; 5] = [
    "table",
    "id_column",
    "name_column",
    "changed_by_column",
    "date_changed_column",
];

/// Renames duplicate names in an attribute type table
///
/// Parameters (all optional):
/// - `table` (default `location_attribute_type`)
/// - `id_column` (default `<table>_id`)
/// - `name_column` (default `name`)
/// - `changed_by_column` (default `changed_by`)
/// - `date_changed_column` (default `date_changed`)
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateAttributeTypeNameChange;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    table: String,
    id_column: String,
    name_column: String,
    changed_by_column: String,
    date_changed_column: String,
}

impl Target {
    fn from_params(params: &BTreeMap<String, String>) -> Result<Self> {
        if let Some(unknown) = params.keys().find(|k| !KNOWN_PARAMS.contains(&k.as_str())) {
            return Err(CairnError::Validation(format!(
                "Unknown parameter '{unknown}' for duplicate-attribute-type-names"
            )));
        }

        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| CairnError::Validation(format!("Invalid identifier pattern: {e}")))?;
        let get = |key: &str, default: String| -> Result<String> {
            let value = params.get(key).cloned().unwrap_or(default);
            if identifier.is_match(&value) {
                Ok(value)
            } else {
                Err(CairnError::Validation(format!(
                    "Parameter '{key}' is not a valid identifier: '{value}'"
                )))
            }
        };

        let table = get("table", DEFAULT_TABLE.to_string())?;
        Ok(Self {
            id_column: get("id_column", format!("{table}_id"))?,
            name_column: get("name_column", "name".to_string())?,
            changed_by_column: get("changed_by_column", "changed_by".to_string())?,
            date_changed_column: get("date_changed_column", "date_changed".to_string())?,
            table,
        })
    }
}

impl DuplicateAttributeTypeNameChange {
    /// Ids of rows sharing a name, lowest id first, grouped by name
    async fn duplicates(
        &self,
        ctx: &ChangeContext<'_>,
        target: &Target,
    ) -> Result<BTreeMap<String, Vec<i64>>> {
        let Target {
            table,
            id_column,
            name_column,
            ..
        } = target;
        let sql = format!(
            "SELECT t.{id_column} AS row_id, t.{name_column} AS row_name FROM {table} t \
             INNER JOIN (SELECT {name_column} FROM {table} GROUP BY {name_column} \
             HAVING COUNT(*) > 1) dup ON t.{name_column} = dup.{name_column} \
             ORDER BY t.{name_column}, t.{id_column}"
        );

        let mut groups: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for row in ctx.db.query(&sql, &[]).await? {
            groups
                .entry(row.get_str("row_name")?)
                .or_default()
                .push(row.get_i64("row_id")?);
        }
        Ok(groups)
    }

    async fn name_taken(
        &self,
        ctx: &ChangeContext<'_>,
        target: &Target,
        candidate: &str,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT 1 AS taken FROM {} WHERE {} = {}",
            target.table,
            target.name_column,
            ctx.db.vendor().placeholder(1)
        );
        Ok(!ctx.db.query(&sql, &[SqlValue::from(candidate)]).await?.is_empty())
    }

    async fn rename_all(&self, ctx: &mut ChangeContext<'_>, target: &Target) -> Result<usize> {
        let groups = self.duplicates(ctx, target).await?;
        if groups.is_empty() {
            return Ok(0);
        }

        let v = ctx.db.vendor();
        let update = format!(
            "UPDATE {} SET {} = {}, {} = {}, {} = {} WHERE {} = {}",
            target.table,
            target.name_column,
            v.placeholder(1),
            target.changed_by_column,
            v.placeholder(2),
            target.date_changed_column,
            v.placeholder(3),
            target.id_column,
            v.placeholder(4)
        );

        let mut renamed = 0;
        for (name, ids) in groups {
            let mut suffix = 1;
            for id in ids.into_iter().skip(1) {
                let mut candidate = format!("{name}_{suffix}");
                while self.name_taken(ctx, target, &candidate).await? {
                    suffix += 1;
                    candidate = format!("{name}_{suffix}");
                }

                ctx.db
                    .execute(
                        &update,
                        &[
                            SqlValue::from(candidate.as_str()),
                            SqlValue::from(ctx.authenticated_user_id),
                            SqlValue::Timestamp(Utc::now()),
                            SqlValue::Int(id),
                        ],
                    )
                    .await?;
                suffix += 1;
                renamed += 1;

                ctx.warn(format!(
                    "Renamed {} {id} from '{name}' to '{candidate}' because the name was not unique",
                    target.table
                ));
            }
        }
        Ok(renamed)
    }
}

#[async_trait]
impl CustomChange for DuplicateAttributeTypeNameChange {
    fn name(&self) -> &'static str {
        "duplicate-attribute-type-names"
    }

    fn confirmation_message(&self) -> String {
        "Completed updating duplicate attribute type names".to_string()
    }

    fn validate(&self, params: &BTreeMap<String, String>) -> Result<()> {
        Target::from_params(params).map(|_| ())
    }

    async fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<()> {
        let target = Target::from_params(ctx.params)?;
        ctx.db.batch_execute(&format!("SAVEPOINT {SAVEPOINT}")).await?;

        match self.rename_all(ctx, &target).await {
            Ok(renamed) => {
                ctx.db
                    .batch_execute(&format!("RELEASE SAVEPOINT {SAVEPOINT}"))
                    .await?;
                tracing::info!(table = %target.table, renamed, "Duplicate names repaired");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(table = %target.table, error = %e, "Rolling back duplicate name repair");
                if let Err(rollback) = ctx
                    .db
                    .batch_execute(&format!(
                        "ROLLBACK TO SAVEPOINT {SAVEPOINT}; RELEASE SAVEPOINT {SAVEPOINT}"
                    ))
                    .await
                {
                    tracing::warn!(error = %rollback, "Savepoint rollback failed");
                }
                Err(CairnError::CustomChange(format!(
                    "Failed to update one or more duplicate names in {}: {e}",
                    target.table
                )))
            }
        }
    }
}
