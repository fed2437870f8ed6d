// crates/fleetconf-store-sqlite/src/queries.rs
// ============================================================================
// Module: SQLite Config Store Queries
// Description: Item search, history reads, and the access log.
// Purpose: Filtered read paths over the projection and ledger tables.
// Dependencies: fleetconf-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Filters are assembled into a `WHERE` clause with positional parameters;
//! caller text is only ever bound, never interpolated. Ledger reads return
//! the most recent rows first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use fleetconf_core::AccessLogEntry;
use fleetconf_core::AccessLogQuery;
use fleetconf_core::ConfigHistory;
use fleetconf_core::ConfigItem;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::HistoryQuery;
use fleetconf_core::ItemSearch;
use fleetconf_core::time::unix_millis;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::store::SqliteConfigStore;
use crate::store::db_error;
use crate::store::sql_limit;

// ============================================================================
// SECTION: Filter Builder
// ============================================================================

/// Accumulates `WHERE` clauses and their bound values in order.
#[derive(Default)]
struct SqlFilter {
    /// Clauses joined with `AND`.
    clauses: Vec<&'static str>,
    /// Positional values, one per `?`.
    values: Vec<SqlValue>,
}

impl SqlFilter {
    /// Adds a clause with one bound value.
    fn push(&mut self, clause: &'static str, value: SqlValue) {
        self.clauses.push(clause);
        self.values.push(value);
    }

    /// Adds an equality clause when `value` is present.
    fn push_text(&mut self, clause: &'static str, value: Option<&String>) {
        if let Some(value) = value {
            self.push(clause, SqlValue::Text(value.clone()));
        }
    }

    /// Renders the `WHERE` fragment.
    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Escapes `LIKE` wildcards and wraps the text for substring matching.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

// ============================================================================
// SECTION: Queries
// ============================================================================

impl SqliteConfigStore {
    /// Searches the item projection.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn search_items(&self, search: &ItemSearch) -> Result<Vec<ConfigItem>, ConfigStoreError> {
        let mut filter = SqlFilter::default();
        if let Some(query) = search.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = like_pattern(query);
            filter.clauses.push(
                "(key LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' OR value LIKE ? \
                 ESCAPE '\\')",
            );
            for _ in 0..3 {
                filter.values.push(SqlValue::Text(pattern.clone()));
            }
        }
        filter.push_text("service = ?", search.service.as_ref());
        filter.push_text("value_type = ?", search.value_type.as_ref());
        filter.push_text("complexity = ?", search.complexity.as_ref());
        if let Some(is_secret) = search.is_secret {
            filter.push("is_secret = ?", SqlValue::Integer(i64::from(is_secret)));
        }
        filter.values.push(SqlValue::Integer(sql_limit(search.limit)));
        let sql = format!(
            "SELECT service, key, value, value_type, complexity, description, is_secret FROM \
             config_items{} ORDER BY service, key LIMIT ?",
            filter.where_sql()
        );
        let guard = self.lock()?;
        let mut stmt = guard.prepare(&sql).map_err(db_error)?;
        let rows = stmt
            .query_map(params_from_iter(filter.values.iter()), |row| {
                Ok(ConfigItem {
                    service: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    value_type: row.get(3)?,
                    complexity: row.get(4)?,
                    description: row.get(5)?,
                    is_secret: row.get(6)?,
                })
            })
            .map_err(db_error)?;
        let items = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        Ok(items)
    }

    /// Returns history rows matching `query`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails or a stored
    /// value is not valid JSON.
    pub fn get_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<ConfigHistory>, ConfigStoreError> {
        let mut filter = SqlFilter::default();
        filter.push_text("service = ?", query.service.as_ref());
        filter.push_text("key = ?", query.key.as_ref());
        if let Some(since) = query.since {
            filter.push("changed_at >= ?", SqlValue::Integer(since));
        }
        if let Some(until) = query.until {
            filter.push("changed_at <= ?", SqlValue::Integer(until));
        }
        filter.values.push(SqlValue::Integer(sql_limit(query.limit)));
        let sql = format!(
            "SELECT id, service, key, old_value, new_value, changed_at, changed_by, change_reason \
             FROM config_history{} ORDER BY id DESC LIMIT ?",
            filter.where_sql()
        );
        let raw = {
            let guard = self.lock()?;
            let mut stmt = guard.prepare(&sql).map_err(db_error)?;
            let rows = stmt
                .query_map(params_from_iter(filter.values.iter()), |row| {
                    Ok(HistoryRow {
                        id: row.get(0)?,
                        service: row.get(1)?,
                        key: row.get(2)?,
                        old_value: row.get(3)?,
                        new_value: row.get(4)?,
                        changed_at: row.get(5)?,
                        changed_by: row.get(6)?,
                        change_reason: row.get(7)?,
                    })
                })
                .map_err(db_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?
        };
        raw.into_iter().map(HistoryRow::into_history).collect()
    }

    /// Returns the history of one key, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn get_key_history(
        &self,
        service: &str,
        key: &str,
        limit: usize,
    ) -> Result<Vec<ConfigHistory>, ConfigStoreError> {
        self.get_history(&HistoryQuery {
            service: Some(service.to_string()),
            key: Some(key.to_string()),
            since: None,
            until: None,
            limit,
        })
    }

    /// Appends an access log entry and returns its row id.
    ///
    /// A zero `timestamp` is replaced with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the write fails.
    pub fn log_access(&self, entry: &AccessLogEntry) -> Result<i64, ConfigStoreError> {
        let timestamp = if entry.timestamp > 0 { entry.timestamp } else { unix_millis() };
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO access_log (user_id, action, service, key, success, reason, \
                 timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.user_id,
                    entry.action,
                    entry.service,
                    entry.key,
                    entry.success,
                    entry.reason,
                    timestamp
                ],
            )
            .map_err(db_error)?;
        Ok(guard.last_insert_rowid())
    }

    /// Returns access log entries matching `query`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn access_log(
        &self,
        query: &AccessLogQuery,
    ) -> Result<Vec<AccessLogEntry>, ConfigStoreError> {
        let mut filter = SqlFilter::default();
        filter.push_text("user_id = ?", query.user_id.as_ref());
        filter.push_text("service = ?", query.service.as_ref());
        filter.push_text("action = ?", query.action.as_ref());
        filter.values.push(SqlValue::Integer(sql_limit(query.limit)));
        let sql = format!(
            "SELECT id, user_id, action, service, key, success, reason, timestamp FROM \
             access_log{} ORDER BY id DESC LIMIT ?",
            filter.where_sql()
        );
        let guard = self.lock()?;
        let mut stmt = guard.prepare(&sql).map_err(db_error)?;
        let rows = stmt
            .query_map(params_from_iter(filter.values.iter()), |row| {
                Ok(AccessLogEntry {
                    id: Some(row.get(0)?),
                    user_id: row.get(1)?,
                    action: row.get(2)?,
                    service: row.get(3)?,
                    key: row.get(4)?,
                    success: row.get(5)?,
                    reason: row.get(6)?,
                    timestamp: row.get(7)?,
                })
            })
            .map_err(db_error)?;
        let entries = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        Ok(entries)
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Raw history row with JSON text columns.
struct HistoryRow {
    /// Row id.
    id: i64,
    /// Service.
    service: String,
    /// Key.
    key: String,
    /// Old value JSON.
    old_value: Option<String>,
    /// New value JSON.
    new_value: Option<String>,
    /// Commit time.
    changed_at: i64,
    /// Writer.
    changed_by: Option<String>,
    /// Reason.
    change_reason: Option<String>,
}

impl HistoryRow {
    /// Parses the JSON columns.
    fn into_history(self) -> Result<ConfigHistory, ConfigStoreError> {
        Ok(ConfigHistory {
            old_value: parse_value(self.id, self.old_value.as_deref())?,
            new_value: parse_value(self.id, self.new_value.as_deref())?,
            id: self.id,
            service: self.service,
            key: self.key,
            changed_at: self.changed_at,
            changed_by: self.changed_by,
            change_reason: self.change_reason,
        })
    }
}

/// Parses an optional JSON column.
fn parse_value(id: i64, text: Option<&str>) -> Result<Option<Value>, ConfigStoreError> {
    text.map(|text| {
        serde_json::from_str(text)
            .map_err(|err| ConfigStoreError::Storage(format!("corrupt history row {id}: {err}")))
    })
    .transpose()
}
