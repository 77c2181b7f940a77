//! Durable approval-request store
//!
//! The store is the single source of truth for request status. Records are
//! untyped JSON rows; `approval::ApprovalRequest` gives them structure.
//!
//! Filters use the `column=op.value` dialect joined by `&`, e.g.
//! `status=eq.pending_guardian&expires_at=gt.2026-01-01T00:00:00.000Z`.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `is.null`, `is.true`, `is.false`
    Is,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Is => "is",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "is" => FilterOp::Is,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

/// Conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, column: &str, op: FilterOp, value: impl ToString) -> Self {
        self.predicates.push(Predicate {
            column: column.to_string(),
            op,
            value: value.to_string(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.with(column, FilterOp::Eq, value)
    }

    pub fn neq(self, column: &str, value: impl ToString) -> Self {
        self.with(column, FilterOp::Neq, value)
    }

    pub fn gt(self, column: &str, value: impl ToString) -> Self {
        self.with(column, FilterOp::Gt, value)
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.with(column, FilterOp::Gte, value)
    }

    pub fn lt(self, column: &str, value: impl ToString) -> Self {
        self.with(column, FilterOp::Lt, value)
    }

    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.with(column, FilterOp::Lte, value)
    }

    pub fn is_null(self, column: &str) -> Self {
        self.with(column, FilterOp::Is, "null")
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// `(column, "op.value")` pairs for a query string.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.predicates
            .iter()
            .map(|p| (p.column.clone(), format!("{}.{}", p.op.as_str(), p.value)))
            .collect()
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut filter = Filter::new();
        for part in input.split('&').filter(|p| !p.is_empty()) {
            let (column, rest) = part
                .split_once('=')
                .ok_or_else(|| Error::InvalidArgument(format!("Bad filter term: {}", part)))?;
            let (op, value) = rest
                .split_once('.')
                .ok_or_else(|| Error::InvalidArgument(format!("Bad filter term: {}", part)))?;
            let op = FilterOp::parse(op)
                .ok_or_else(|| Error::InvalidArgument(format!("Unknown filter op: {}", op)))?;
            filter = filter.with(column, op, value);
        }
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .predicates
            .iter()
            .map(|p| format!("{}={}.{}", p.column, p.op.as_str(), p.value))
            .collect();
        f.write_str(&terms.join("&"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.column,
            if self.descending { "desc" } else { "asc" }
        )
    }
}

/// Keyed-record storage shared by ward and guardian devices.
///
/// `update` must apply the patch to every row matching the filter as one
/// write and return the rows it changed; callers use a status predicate in
/// the filter as a compare-and-set.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn insert(&self, table: &str, record: Value) -> Result<Vec<Value>>;

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Value>>;

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>>;
}

/// Handle for a running poll; dropping it does not stop the poll.
pub struct PollSubscription {
    handle: JoinHandle<()>,
    paused: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollSubscription {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Skip ticks until `resume`.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Clear the pause and poll right away.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Run `select` every `interval` and hand the rows to `callback` until it
/// returns `ControlFlow::Break`.
///
/// The filter is rebuilt on every tick so time-relative predicates
/// (`expires_at=gt.<now>`) stay current. Failed polls are logged and
/// retried on the next tick.
pub fn poll<F, C>(
    store: Arc<dyn ApprovalStore>,
    table: impl Into<String>,
    filter: F,
    order: Option<OrderBy>,
    interval: Duration,
    callback: C,
) -> PollSubscription
where
    F: Fn() -> Filter + Send + Sync + 'static,
    C: Fn(Vec<Value>) -> ControlFlow<()> + Send + Sync + 'static,
{
    let table = table.into();
    let paused = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    let (task_paused, task_wake) = (paused.clone(), wake.clone());
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = task_wake.notified() => {}
            }
            if task_paused.load(Ordering::SeqCst) {
                continue;
            }
            let current = filter();
            match store.select(&table, &current, order.as_ref()).await {
                Ok(rows) => {
                    if callback(rows).is_break() {
                        tracing::debug!(table = %table, "Poll consumer gone, stopping");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(table = %table, filter = %current, error = %e, "Store poll failed");
                }
            }
        }
    });
    PollSubscription {
        handle,
        paused,
        wake,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn filter_display_and_parse_agree() {
        let filter = Filter::new()
            .eq("status", "pending_guardian")
            .gt("expires_at", "2026-01-01T00:00:00.000Z")
            .is_null("tx_hash");
        let text = filter.to_string();
        assert_eq!(
            text,
            "status=eq.pending_guardian&expires_at=gt.2026-01-01T00:00:00.000Z&tx_hash=is.null"
        );
        assert_eq!(Filter::parse(&text).unwrap(), filter);
    }

    #[test]
    fn parse_rejects_unknown_ops() {
        assert!(Filter::parse("status=like.pending").is_err());
        assert!(Filter::parse("status").is_err());
    }

    #[test]
    fn query_pairs_keep_op_prefix() {
        let pairs = Filter::new().eq("id", "abc").to_query_pairs();
        assert_eq!(pairs, vec![("id".to_string(), "eq.abc".to_string())]);
        assert_eq!(OrderBy::desc("created_at").to_string(), "created_at.desc");
    }

    #[tokio::test]
    async fn poll_delivers_rows_until_unsubscribed() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("t", json!({"status": "pending_ward_sig"}))
            .await
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sub = poll(
            store.clone(),
            "t",
            || Filter::new().eq("status", "pending_ward_sig"),
            None,
            Duration::from_millis(10),
            move |rows| {
                counter.fetch_add(rows.len(), Ordering::SeqCst);
                ControlFlow::Continue(())
            },
        );

        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(sub.is_active());
        sub.unsubscribe();
        let after_stop = seen.load(Ordering::SeqCst);
        assert!(after_stop >= 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(seen.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn paused_poll_skips_ticks_and_resume_polls_at_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert("t", json!({"status": "x"})).await.unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sub = poll(
            store,
            "t",
            Filter::new,
            None,
            Duration::from_secs(3600),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            },
        );
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        sub.pause();
        assert!(sub.is_paused());
        sub.resume();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn callback_break_ends_the_poll() {
        let store = Arc::new(MemoryStore::new());
        let sub = poll(
            store,
            "t",
            Filter::new,
            None,
            Duration::from_millis(5),
            |_| ControlFlow::Break(()),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!sub.is_active());
    }
}
