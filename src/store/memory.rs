//! In-process store
//!
//! Same filter semantics as the REST backend (SQL-style: comparisons against
//! NULL never match). Used by tests, demos and single-device setups.

use super::{ApprovalStore, Filter, FilterOp, OrderBy, Predicate};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn compare(left: &str, right: &str) -> Ordering {
    let as_time = |s: &str| DateTime::<FixedOffset>::parse_from_rfc3339(s).ok();
    if let (Some(l), Some(r)) = (as_time(left), as_time(right)) {
        return l.cmp(&r);
    }
    if let (Ok(l), Ok(r)) = (left.parse::<i128>(), right.parse::<i128>()) {
        return l.cmp(&r);
    }
    left.cmp(right)
}

fn matches(row: &Value, predicate: &Predicate) -> bool {
    let field = row.get(&predicate.column).unwrap_or(&Value::Null);

    if predicate.op == FilterOp::Is {
        return match predicate.value.as_str() {
            "null" => field.is_null(),
            "true" => field.as_bool() == Some(true),
            "false" => field.as_bool() == Some(false),
            _ => false,
        };
    }

    let Some(text) = scalar_text(field) else {
        return false;
    };
    let ordering = compare(&text, &predicate.value);
    match predicate.op {
        FilterOp::Eq => text == predicate.value || ordering == Ordering::Equal,
        FilterOp::Neq => !(text == predicate.value || ordering == Ordering::Equal),
        FilterOp::Gt => ordering == Ordering::Greater,
        FilterOp::Gte => ordering != Ordering::Less,
        FilterOp::Lt => ordering == Ordering::Less,
        FilterOp::Lte => ordering != Ordering::Greater,
        FilterOp::Is => unreachable!("handled above"),
    }
}

fn matches_all(row: &Value, filter: &Filter) -> bool {
    filter.predicates().iter().all(|p| matches(row, p))
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn insert(&self, table: &str, mut record: Value) -> Result<Vec<Value>> {
        let obj = record
            .as_object_mut()
            .ok_or_else(|| Error::InvalidArgument("record must be a JSON object".to_string()))?;
        if obj.get("id").map_or(true, Value::is_null) {
            obj.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }

        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(vec![record])
    }

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Value>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).and_then(scalar_text).unwrap_or_default();
                let right = b.get(&order.column).and_then(scalar_text).unwrap_or_default();
                let ordering = compare(&left, &right);
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        Ok(rows)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        let patch = patch
            .as_object()
            .ok_or_else(|| Error::InvalidArgument("patch must be a JSON object".to_string()))?;

        // Single write lock: matching and patching happen as one step.
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches_all(row, filter)) {
            if let Some(obj) = row.as_object_mut() {
                for (key, value) in patch {
                    obj.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }
}
