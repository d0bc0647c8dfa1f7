//! SQLite-backed plan store
//!
//! The core is synchronous; async callers go through the planforge state
//! manager actor, which owns one `Store` per process.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::plan::{Contact, Plan, PlanPatch, PlanStatus};
use crate::usage::UsageLogEntry;

/// Database connection and plan operations
pub struct Store {
    connection: Connection,
}

impl Store {
    /// Open (or create) the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path)?;
        let store = Self { connection };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an ephemeral in-memory database (tests, one-shot runs)
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        let store = Self { connection };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.connection.execute("PRAGMA foreign_keys = ON", [])?;
        self.connection.execute_batch(include_str!("../assets/schema.sql"))?;
        Ok(())
    }

    /// Insert a new plan row
    pub fn create(&self, plan: &Plan) -> Result<()> {
        debug!(plan_id = %plan.id, "store: create plan");
        self.connection.execute(
            "INSERT INTO plans (id, status, questionnaire, contact_email, contact_name,
                analyst_brief, review, final_document, error_message, total_cost,
                created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                plan.id,
                plan.status.as_str(),
                serde_json::to_string(&plan.questionnaire)?,
                plan.contact.as_ref().map(|c| c.email.as_str()),
                plan.contact.as_ref().and_then(|c| c.name.as_deref()),
                plan.analyst_brief.as_ref().map(serde_json::to_string).transpose()?,
                plan.review.as_ref().map(serde_json::to_string).transpose()?,
                plan.final_document,
                plan.error_message,
                plan.total_cost,
                plan.created_at.to_rfc3339(),
                plan.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Fetch a plan by id
    pub fn get(&self, id: &str) -> Result<Option<Plan>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, status, questionnaire, contact_email, contact_name,
                    analyst_brief, review, final_document, error_message, total_cost,
                    created_at, completed_at
             FROM plans WHERE id = ?1",
        )?;
        let plan = stmt.query_row(params![id], row_to_plan).optional()?;
        Ok(plan)
    }

    /// Apply a partial update
    ///
    /// An empty patch is a no-op. Returns `NotFound` when no row matches.
    pub fn apply(&self, id: &str, patch: &PlanPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        debug!(plan_id = %id, ?patch.status, "store: apply patch");

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(ref brief) = patch.analyst_brief {
            sets.push("analyst_brief = ?");
            values.push(Box::new(serde_json::to_string(brief)?));
        }
        if let Some(ref review) = patch.review {
            sets.push("review = ?");
            values.push(Box::new(serde_json::to_string(review)?));
        }
        if let Some(ref document) = patch.final_document {
            sets.push("final_document = ?");
            values.push(Box::new(document.clone()));
        }
        if let Some(ref message) = patch.error_message {
            sets.push("error_message = ?");
            values.push(Box::new(message.clone()));
        }
        if let Some(cost) = patch.total_cost {
            sets.push("total_cost = ?");
            values.push(Box::new(cost));
        }
        if let Some(completed_at) = patch.completed_at {
            sets.push("completed_at = ?");
            values.push(Box::new(completed_at.to_rfc3339()));
        }

        let query = format!("UPDATE plans SET {} WHERE id = ?", sets.join(", "));
        values.push(Box::new(id.to_string()));

        let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| &**v).collect();
        let affected = self.connection.execute(&query, &params_refs[..])?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Mark a plan failed only while it is still in flight
    ///
    /// Terminal states are never overwritten. Returns whether a row changed.
    pub fn fail_if_in_flight(&self, id: &str, message: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = self.connection.execute(
            "UPDATE plans SET status = 'failed', error_message = ?1, completed_at = ?2
             WHERE id = ?3
               AND status IN ('pending', 'analysing', 'generating', 'reviewing', 'finalising')",
            params![message, now, id],
        )?;
        debug!(plan_id = %id, changed = affected > 0, "store: fail_if_in_flight");
        Ok(affected > 0)
    }

    /// Flip `finalising` to `completed` when the document already landed
    ///
    /// Recovery path for a run that persisted the document but died before
    /// its final status write. Returns whether a row changed.
    pub fn complete_if_finalising(&self, id: &str, total_cost: f64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = self.connection.execute(
            "UPDATE plans SET status = 'completed', total_cost = ?1, completed_at = ?2
             WHERE id = ?3 AND status = 'finalising' AND final_document IS NOT NULL",
            params![total_cost, now, id],
        )?;
        debug!(plan_id = %id, changed = affected > 0, "store: complete_if_finalising");
        Ok(affected > 0)
    }

    /// Append a usage-log row; returns the new row id
    pub fn append_usage(&self, entry: &UsageLogEntry) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO usage_log (plan_id, stage, model, input_tokens, output_tokens,
                cost, duration_ms, fallback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.plan_id,
                entry.stage,
                entry.model,
                entry.input_tokens as i64,
                entry.output_tokens as i64,
                entry.cost,
                entry.duration_ms as i64,
                entry.fallback,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.connection.last_insert_rowid())
    }

    /// All usage rows for one plan, in insertion order
    pub fn usage_for_plan(&self, plan_id: &str) -> Result<Vec<UsageLogEntry>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, plan_id, stage, model, input_tokens, output_tokens,
                    cost, duration_ms, fallback, created_at
             FROM usage_log WHERE plan_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![plan_id], row_to_usage)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Sum of usage costs for a plan; zero when nothing is logged
    pub fn total_cost(&self, plan_id: &str) -> Result<f64> {
        let total: f64 = self.connection.query_row(
            "SELECT COALESCE(SUM(cost), 0.0) FROM usage_log WHERE plan_id = ?1",
            params![plan_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// List plans, newest first, optionally filtered by status
    pub fn list(&self, status: Option<PlanStatus>) -> Result<Vec<Plan>> {
        let mut query = String::from(
            "SELECT id, status, questionnaire, contact_email, contact_name,
                    analyst_brief, review, final_document, error_message, total_cost,
                    created_at, completed_at
             FROM plans",
        );
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(status) = status {
            query.push_str(" WHERE status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut stmt = self.connection.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| &**v).collect();
        let plans = stmt
            .query_map(&params_refs[..], row_to_plan)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(plans)
    }
}

fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plan> {
    let status_str: String = row.get(1)?;
    let status = PlanStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("invalid plan status: {status_str}").into(),
        )
    })?;

    let contact_email: Option<String> = row.get(3)?;
    let contact_name: Option<String> = row.get(4)?;
    let contact = contact_email.map(|email| Contact { email, name: contact_name });

    Ok(Plan {
        id: row.get(0)?,
        status,
        questionnaire: json_column(row, 2)?,
        contact,
        analyst_brief: json_column_opt(row, 5)?,
        review: json_column_opt(row, 6)?,
        final_document: row.get(7)?,
        error_message: row.get(8)?,
        total_cost: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
        completed_at: timestamp_column_opt(row, 11)?,
    })
}

fn row_to_usage(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageLogEntry> {
    Ok(UsageLogEntry {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        stage: row.get::<_, i64>(2)? as u8,
        model: row.get(3)?,
        input_tokens: row.get::<_, i64>(4)? as u64,
        output_tokens: row.get::<_, i64>(5)? as u64,
        cost: row.get(6)?,
        duration_ms: row.get::<_, i64>(7)? as u64,
        fallback: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

fn json_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn json_column_opt(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => serde_json::from_str(&s).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn timestamp_column_opt(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_plan() -> Plan {
        Plan::new(json!({
            "respostas": {"1_nome": "Padaria Central", "2_setor": "padaria artesanal"}
        }))
    }

    #[test]
    fn test_open_creates_schema_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plans.db");
        let store = Store::open(&path).unwrap();
        store.create(&sample_plan()).unwrap();
        drop(store);

        // Reopening must not clobber existing rows
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list(None).unwrap().len(), 1);
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan()
            .with_contact(Contact::new("dona@padaria.pt", Some("Maria".to_string())));
        store.create(&plan).unwrap();

        let loaded = store.get(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.id, plan.id);
        assert_eq!(loaded.status, PlanStatus::Pending);
        assert_eq!(loaded.questionnaire, plan.questionnaire);
        assert_eq!(loaded.contact, plan.contact);
        assert!(loaded.analyst_brief.is_none());
        assert_eq!(loaded.created_at.timestamp(), plan.created_at.timestamp());
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get("no-such-plan").unwrap().is_none());
    }

    #[test]
    fn test_apply_partial_update() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan();
        store.create(&plan).unwrap();

        let patch = PlanPatch::new()
            .with_status(PlanStatus::Analysing)
            .with_analyst_brief(json!({"setor": {"descricao": "mercado local"}}));
        store.apply(&plan.id, &patch).unwrap();

        let loaded = store.get(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.status, PlanStatus::Analysing);
        assert_eq!(
            loaded.analyst_brief,
            Some(json!({"setor": {"descricao": "mercado local"}}))
        );
        // untouched columns survive
        assert_eq!(loaded.questionnaire, plan.questionnaire);
        assert!(loaded.final_document.is_none());
    }

    #[test]
    fn test_apply_empty_patch_is_noop() {
        let store = Store::open_in_memory().unwrap();
        // would be NotFound if it hit the database
        store.apply("missing", &PlanPatch::new()).unwrap();
    }

    #[test]
    fn test_apply_unknown_plan_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .apply("missing", &PlanPatch::new().with_status(PlanStatus::Failed))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn test_fail_if_in_flight_flips_running_plan() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan();
        store.create(&plan).unwrap();
        store
            .apply(&plan.id, &PlanPatch::new().with_status(PlanStatus::Generating))
            .unwrap();

        let changed = store.fail_if_in_flight(&plan.id, "Timeout: a geração excedeu o tempo máximo.").unwrap();
        assert!(changed);

        let loaded = store.get(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.status, PlanStatus::Failed);
        assert_eq!(
            loaded.error_message.as_deref(),
            Some("Timeout: a geração excedeu o tempo máximo.")
        );
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_fail_if_in_flight_never_touches_terminal() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan();
        store.create(&plan).unwrap();
        store
            .apply(
                &plan.id,
                &PlanPatch::new()
                    .with_status(PlanStatus::Completed)
                    .with_final_document("# PLANO"),
            )
            .unwrap();

        let changed = store.fail_if_in_flight(&plan.id, "too late").unwrap();
        assert!(!changed);
        let loaded = store.get(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.status, PlanStatus::Completed);
        assert!(loaded.error_message.is_none());
    }

    #[test]
    fn test_complete_if_finalising_requires_document() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan();
        store.create(&plan).unwrap();
        store
            .apply(&plan.id, &PlanPatch::new().with_status(PlanStatus::Finalising))
            .unwrap();

        // no document yet: guard holds
        assert!(!store.complete_if_finalising(&plan.id, 0.1).unwrap());

        store
            .apply(&plan.id, &PlanPatch::new().with_final_document("# PLANO"))
            .unwrap();
        assert!(store.complete_if_finalising(&plan.id, 0.1).unwrap());

        let loaded = store.get(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.status, PlanStatus::Completed);
        assert_eq!(loaded.total_cost, Some(0.1));
        assert!(loaded.completed_at.is_some());

        // second flip finds nothing finalising
        assert!(!store.complete_if_finalising(&plan.id, 0.2).unwrap());
    }

    #[test]
    fn test_complete_if_finalising_ignores_other_statuses() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan();
        store.create(&plan).unwrap();
        store
            .apply(&plan.id, &PlanPatch::new().with_final_document("# PLANO"))
            .unwrap();

        // still pending: guard holds
        assert!(!store.complete_if_finalising(&plan.id, 0.1).unwrap());
    }

    #[test]
    fn test_append_and_list_usage() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan();
        store.create(&plan).unwrap();

        let first = UsageLogEntry::new(&plan.id, 2, "gpt-4o")
            .with_tokens(1000, 2000)
            .with_cost(0.0225);
        let second = UsageLogEntry::new(&plan.id, 3, "claude-sonnet-4-5-20250929")
            .with_tokens(3000, 6000)
            .with_cost(0.099)
            .with_fallback(true);

        let id1 = store.append_usage(&first).unwrap();
        let id2 = store.append_usage(&second).unwrap();
        assert!(id2 > id1);

        let entries = store.usage_for_plan(&plan.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, 2);
        assert_eq!(entries[0].model, "gpt-4o");
        assert_eq!(entries[0].input_tokens, 1000);
        assert!(!entries[0].fallback);
        assert_eq!(entries[1].stage, 3);
        assert!(entries[1].fallback);
    }

    #[test]
    fn test_total_cost_sums_entries() {
        let store = Store::open_in_memory().unwrap();
        let plan = sample_plan();
        store.create(&plan).unwrap();

        assert_eq!(store.total_cost(&plan.id).unwrap(), 0.0);

        store
            .append_usage(&UsageLogEntry::new(&plan.id, 2, "gpt-4o").with_cost(0.01))
            .unwrap();
        store
            .append_usage(&UsageLogEntry::new(&plan.id, 4, "gpt-4o").with_cost(0.02))
            .unwrap();

        assert!((store.total_cost(&plan.id).unwrap() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_list_newest_first_and_filter() {
        let store = Store::open_in_memory().unwrap();

        let mut older = sample_plan();
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        store.create(&older).unwrap();

        let newer = sample_plan();
        store.create(&newer).unwrap();
        store
            .apply(&newer.id, &PlanPatch::new().with_status(PlanStatus::Completed))
            .unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newer.id);
        assert_eq!(all[1].id, older.id);

        let completed = store.list(Some(PlanStatus::Completed)).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, newer.id);
    }
}
