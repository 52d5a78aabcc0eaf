//! Append-only capital ledger
//!
//! Balances are never stored. Every movement of capital is a [`LedgerEvent`]
//! with a monotonic sequence number, and an agent's balance is the fold of
//! its events. Checks and appends happen under one write lock, so two
//! concurrent debits can never both spend the same capital.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, WardenError};

/// Slack for float comparisons against a balance
const BALANCE_EPSILON: f64 = 1e-9;

/// What a ledger event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    Credit,
    Debit,
    /// Capital locked into a budget
    BudgetIssue,
    /// Unspent budget credited back
    BudgetReturn,
    /// Payment for a permission bypass
    Bypass,
}

impl LedgerEventKind {
    /// Whether the event adds to the balance
    pub fn is_inflow(&self) -> bool {
        matches!(self, LedgerEventKind::Credit | LedgerEventKind::BudgetReturn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventKind::Credit => "credit",
            LedgerEventKind::Debit => "debit",
            LedgerEventKind::BudgetIssue => "budget_issue",
            LedgerEventKind::BudgetReturn => "budget_return",
            LedgerEventKind::Bypass => "bypass",
        }
    }
}

impl std::fmt::Display for LedgerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one capital movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Position in the ledger, strictly increasing
    pub seq: u64,
    pub agent_id: String,
    pub kind: LedgerEventKind,
    /// Always non-negative; the kind gives the sign
    pub amount: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEvent {
    /// Effect of the event on the agent's balance
    pub fn signed_amount(&self) -> f64 {
        if self.kind.is_inflow() {
            self.amount
        } else {
            -self.amount
        }
    }
}

/// A posting to append; see [`CapitalLedger::record`]
#[derive(Debug, Clone)]
pub struct Posting<'a> {
    pub agent_id: &'a str,
    pub kind: LedgerEventKind,
    pub amount: f64,
    pub reason: &'a str,
    pub correlation_id: Option<&'a str>,
    pub metadata: Value,
}

impl<'a> Posting<'a> {
    pub fn new(agent_id: &'a str, kind: LedgerEventKind, amount: f64, reason: &'a str) -> Self {
        Self {
            agent_id,
            kind,
            amount,
            reason,
            correlation_id: None,
            metadata: Value::Null,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<&'a str>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only event log of capital movements
#[derive(Debug, Default)]
pub struct CapitalLedger {
    events: RwLock<Vec<LedgerEvent>>,
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(WardenError::InvalidAmount(amount));
    }
    Ok(())
}

fn fold_balance(events: &[LedgerEvent], agent_id: &str) -> f64 {
    events
        .iter()
        .filter(|e| e.agent_id == agent_id)
        .map(LedgerEvent::signed_amount)
        .sum()
}

impl CapitalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from an exported event log
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Configuration`] if sequence numbers are not
    /// strictly increasing, or [`WardenError::InvalidAmount`] for a bad amount.
    pub fn from_events(events: Vec<LedgerEvent>) -> Result<Self> {
        let mut last: Option<u64> = None;
        for event in &events {
            validate_amount(event.amount)?;
            if last.is_some_and(|prev| event.seq <= prev) {
                return Err(WardenError::Configuration(format!(
                    "ledger sequence not increasing at seq {}",
                    event.seq
                )));
            }
            last = Some(event.seq);
        }
        Ok(Self {
            events: RwLock::new(events),
        })
    }

    /// Append a posting
    ///
    /// Inflows always succeed. Outflows succeed only when the agent's balance
    /// covers the amount; otherwise nothing is appended and `None` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::InvalidAmount`] for negative or non-finite
    /// amounts.
    pub fn record(&self, posting: Posting<'_>) -> Result<Option<LedgerEvent>> {
        validate_amount(posting.amount)?;

        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);

        if !posting.kind.is_inflow() {
            let balance = fold_balance(&events, posting.agent_id);
            if posting.amount > balance + BALANCE_EPSILON {
                tracing::debug!(
                    agent = %posting.agent_id,
                    kind = %posting.kind,
                    amount = posting.amount,
                    balance,
                    "Ledger outflow rejected"
                );
                return Ok(None);
            }
        }

        let seq = events.last().map_or(0, |e| e.seq + 1);
        let event = LedgerEvent {
            seq,
            agent_id: posting.agent_id.to_string(),
            kind: posting.kind,
            amount: posting.amount,
            reason: posting.reason.to_string(),
            correlation_id: posting.correlation_id.map(str::to_string),
            metadata: posting.metadata,
            timestamp: Utc::now(),
        };
        events.push(event.clone());

        tracing::debug!(
            agent = %event.agent_id,
            kind = %event.kind,
            amount = event.amount,
            seq = event.seq,
            "Ledger event appended"
        );
        Ok(Some(event))
    }

    /// Add capital to an agent
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::InvalidAmount`] for negative or non-finite
    /// amounts.
    pub fn credit(
        &self,
        agent_id: &str,
        amount: f64,
        reason: &str,
        correlation_id: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<LedgerEvent> {
        let posting = Posting::new(agent_id, LedgerEventKind::Credit, amount, reason)
            .with_correlation_id(correlation_id)
            .with_metadata(metadata.unwrap_or(Value::Null));
        self.record(posting)?
            .ok_or_else(|| WardenError::Other("credit was not appended".to_string()))
    }

    /// Remove capital from an agent; `None` if the balance does not cover it
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::InvalidAmount`] for negative or non-finite
    /// amounts.
    pub fn debit(
        &self,
        agent_id: &str,
        amount: f64,
        reason: &str,
        correlation_id: Option<&str>,
    ) -> Result<Option<LedgerEvent>> {
        self.record(
            Posting::new(agent_id, LedgerEventKind::Debit, amount, reason)
                .with_correlation_id(correlation_id),
        )
    }

    /// Current balance: the fold of the agent's events
    pub fn balance(&self, agent_id: &str) -> f64 {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        fold_balance(&events, agent_id)
    }

    /// The agent's events in append order
    pub fn events_for(&self, agent_id: &str) -> Vec<LedgerEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Every event in append order
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the event log as JSON lines, replacing `path`
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.events();
        let mut buffer = String::new();
        for event in &snapshot {
            buffer.push_str(&serde_json::to_string(event)?);
            buffer.push('\n');
        }

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        tracing::info!(path = %path.display(), events = snapshot.len(), "Ledger exported");
        Ok(())
    }

    /// Load a ledger previously written by [`export_jsonl`](Self::export_jsonl)
    pub async fn import_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let events = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(WardenError::from))
            .collect::<Result<Vec<LedgerEvent>>>()?;
        Self::from_events(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_balance_is_fold_of_events() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 10.0, "seed", None, None).unwrap();
        ledger.debit("a", 4.0, "tool", Some("req-1")).unwrap().unwrap();
        ledger.credit("b", 1.0, "seed", None, None).unwrap();

        assert_eq!(ledger.balance("a"), 6.0);
        assert_eq!(ledger.balance("b"), 1.0);
        assert_eq!(ledger.balance("nobody"), 0.0);

        let folded: f64 = ledger
            .events_for("a")
            .iter()
            .map(LedgerEvent::signed_amount)
            .sum();
        assert_eq!(folded, ledger.balance("a"));
    }

    #[test]
    fn test_insufficient_debit_appends_nothing() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 5.0, "seed", None, None).unwrap();

        assert!(ledger.debit("a", 5.5, "too much", None).unwrap().is_none());
        assert_eq!(ledger.len(), 1);

        let exact = ledger.debit("a", 5.0, "all of it", None).unwrap();
        assert!(exact.is_some());
        assert_eq!(ledger.balance("a"), 0.0);
    }

    #[test]
    fn test_invalid_amounts_rejected() {
        let ledger = CapitalLedger::new();
        assert!(matches!(
            ledger.credit("a", -1.0, "bad", None, None),
            Err(WardenError::InvalidAmount(_))
        ));
        assert!(ledger.debit("a", f64::NAN, "bad", None).is_err());
        assert!(ledger.credit("a", f64::INFINITY, "bad", None, None).is_err());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 3.0, "seed", None, None).unwrap();
        ledger.debit("a", 1.0, "x", None).unwrap();
        ledger.debit("a", 1.0, "y", None).unwrap();

        let seqs: Vec<u64> = ledger.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_concurrent_debits_never_overspend() {
        let ledger = Arc::new(CapitalLedger::new());
        ledger.credit("a", 10.0, "seed", None, None).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.debit("a", 1.0, "race", None).unwrap().is_some())
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 10);
        assert_eq!(ledger.balance("a"), 0.0);
    }

    #[test]
    fn test_from_events_rejects_unordered_log() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 1.0, "one", None, None).unwrap();
        ledger.credit("a", 1.0, "two", None, None).unwrap();

        let mut events = ledger.events();
        events.swap(0, 1);
        assert!(matches!(
            CapitalLedger::from_events(events),
            Err(WardenError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let ledger = CapitalLedger::new();
        ledger
            .credit("a", 10.0, "seed", Some("grant-1"), Some(serde_json::json!({"source": "ops"})))
            .unwrap();
        ledger.debit("a", 2.5, "tool", None).unwrap();
        ledger.export_jsonl(&path).await.unwrap();

        let restored = CapitalLedger::import_jsonl(&path).await.unwrap();
        assert_eq!(restored.events(), ledger.events());
        assert_eq!(restored.balance("a"), 7.5);

        // Appends continue the sequence
        let next = restored.debit("a", 1.0, "more", None).unwrap().unwrap();
        assert_eq!(next.seq, 2);
    }
}
