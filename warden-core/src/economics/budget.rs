//! Scoped resource budgets
//!
//! Issuing a budget debits the full amount from the ledger up front. The
//! returned [`ResourceBudget`] is a guard: it is settled exactly once, either
//! by an explicit [`settle`](ResourceBudget::settle) or when it is dropped,
//! and settlement credits `remaining * recovery_rate` back.
//!
//! Sub-budgets drawn with [`suballocate`](ResourceBudget::suballocate) return
//! everything they did not spend to their parent.

use chrono::Utc;
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use super::ledger::{CapitalLedger, LedgerEventKind, Posting};
use crate::error::{Result, WardenError};
use crate::events::{EventSink, LifecycleEvent};

#[derive(Debug)]
struct CellState {
    remaining: f64,
    settled: bool,
}

#[derive(Debug)]
enum SettleTarget {
    Ledger(Arc<CapitalLedger>),
    Parent(Arc<BudgetCell>),
}

#[derive(Debug)]
struct BudgetCell {
    agent_id: String,
    amount: f64,
    recovery_rate: f64,
    correlation_id: String,
    state: Mutex<CellState>,
    target: SettleTarget,
}

impl BudgetCell {
    fn lock(&self) -> std::sync::MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spend(&self, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
        let mut state = self.lock();
        if state.settled || amount > state.remaining {
            return false;
        }
        state.remaining -= amount;
        true
    }

    fn remaining(&self) -> f64 {
        self.lock().remaining
    }

    /// Close the cell; `None` if it was already settled
    fn close(&self) -> Option<f64> {
        let mut state = self.lock();
        if state.settled {
            return None;
        }
        state.settled = true;
        Some(std::mem::take(&mut state.remaining))
    }

    /// Pass `amount` to wherever this cell settles into
    fn return_funds(&self, amount: f64) -> Result<()> {
        match &self.target {
            SettleTarget::Ledger(ledger) => {
                if amount <= 0.0 {
                    return Ok(());
                }
                ledger.record(
                    Posting::new(
                        &self.agent_id,
                        LedgerEventKind::BudgetReturn,
                        amount,
                        "budget settlement",
                    )
                    .with_correlation_id(Some(self.correlation_id.as_str()))
                    .with_metadata(json!({
                        "issued": self.amount,
                        "recovery_rate": self.recovery_rate,
                    })),
                )?;
                Ok(())
            }
            SettleTarget::Parent(parent) => {
                {
                    let mut state = parent.lock();
                    if !state.settled {
                        state.remaining += amount;
                        return Ok(());
                    }
                }
                // Parent closed first: settle the funds as the parent would have
                parent.return_funds(amount * parent.recovery_rate)
            }
        }
    }
}

/// Guard over capital locked for a unit of work
///
/// Single owner; hand concurrent sub-tasks a [`suballocate`]d budget or a
/// [`BudgetHandle`].
///
/// [`suballocate`]: ResourceBudget::suballocate
pub struct ResourceBudget {
    cell: Arc<BudgetCell>,
    events: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for ResourceBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBudget")
            .field("agent_id", &self.cell.agent_id)
            .field("amount", &self.cell.amount)
            .field("remaining", &self.remaining())
            .field("recovery_rate", &self.cell.recovery_rate)
            .finish()
    }
}

fn validate_rate(recovery_rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&recovery_rate) {
        return Err(WardenError::Configuration(format!(
            "recovery rate must be within [0, 1], got {}",
            recovery_rate
        )));
    }
    Ok(())
}

/// Debit `amount` from the agent and lock it into a budget
///
/// # Errors
///
/// - [`WardenError::InsufficientCapital`] if the balance does not cover `amount`
/// - [`WardenError::InvalidAmount`] for a negative or non-finite amount
/// - [`WardenError::Configuration`] if `recovery_rate` is outside `[0, 1]`
pub fn issue_budget(
    ledger: &Arc<CapitalLedger>,
    agent_id: &str,
    amount: f64,
    recovery_rate: f64,
) -> Result<ResourceBudget> {
    validate_rate(recovery_rate)?;

    let correlation_id = Uuid::new_v4().to_string();
    let posting = Posting::new(agent_id, LedgerEventKind::BudgetIssue, amount, "budget issue")
        .with_correlation_id(Some(correlation_id.as_str()))
        .with_metadata(json!({ "recovery_rate": recovery_rate }));

    if ledger.record(posting)?.is_none() {
        let available = ledger.balance(agent_id);
        tracing::warn!(agent = %agent_id, requested = amount, available, "Budget refused");
        return Err(WardenError::InsufficientCapital {
            agent: agent_id.to_string(),
            requested: amount,
            available,
        });
    }

    tracing::info!(agent = %agent_id, amount, recovery_rate, budget = %correlation_id, "Budget issued");
    Ok(ResourceBudget {
        cell: Arc::new(BudgetCell {
            agent_id: agent_id.to_string(),
            amount,
            recovery_rate,
            correlation_id,
            state: Mutex::new(CellState {
                remaining: amount,
                settled: false,
            }),
            target: SettleTarget::Ledger(Arc::clone(ledger)),
        }),
        events: None,
    })
}

impl ResourceBudget {
    /// Report issue and settlement to an event sink
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        sink.try_emit(LifecycleEvent::BudgetIssued {
            agent_id: self.cell.agent_id.clone(),
            amount: self.cell.amount,
            timestamp: Utc::now(),
        });
        self.events = Some(sink);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.cell.agent_id
    }

    /// Amount the budget was issued with
    pub fn amount(&self) -> f64 {
        self.cell.amount
    }

    pub fn remaining(&self) -> f64 {
        self.cell.remaining()
    }

    pub fn recovery_rate(&self) -> f64 {
        self.cell.recovery_rate
    }

    /// Correlation id shared by the issue and return ledger events
    pub fn correlation_id(&self) -> &str {
        &self.cell.correlation_id
    }

    pub fn is_settled(&self) -> bool {
        self.cell.lock().settled
    }

    /// Consume `amount`; `false` when it does not fit or the budget is closed
    pub fn spend(&self, amount: f64) -> bool {
        self.cell.spend(amount)
    }

    /// Cloneable spending handle for code that must not settle the budget
    pub fn handle(&self) -> BudgetHandle {
        BudgetHandle {
            cell: Arc::clone(&self.cell),
        }
    }

    /// Carve a child budget out of this one
    ///
    /// The child returns all of its unspent funds to this budget when it is
    /// settled.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::InsufficientCapital`] when `amount` exceeds
    /// what is left, or [`WardenError::InvalidAmount`] for a bad amount.
    pub fn suballocate(&self, amount: f64) -> Result<ResourceBudget> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(WardenError::InvalidAmount(amount));
        }
        if !self.cell.spend(amount) {
            return Err(WardenError::InsufficientCapital {
                agent: self.cell.agent_id.clone(),
                requested: amount,
                available: self.remaining(),
            });
        }

        tracing::debug!(agent = %self.cell.agent_id, amount, "Budget suballocated");
        Ok(ResourceBudget {
            cell: Arc::new(BudgetCell {
                agent_id: self.cell.agent_id.clone(),
                amount,
                recovery_rate: 1.0,
                correlation_id: self.cell.correlation_id.clone(),
                state: Mutex::new(CellState {
                    remaining: amount,
                    settled: false,
                }),
                target: SettleTarget::Parent(Arc::clone(&self.cell)),
            }),
            events: self.events.clone(),
        })
    }

    /// Close the budget and return the recoverable remainder
    ///
    /// Returns the amount credited back. Idempotent: every call after the
    /// first returns `0.0` and writes nothing.
    pub fn settle(&self) -> f64 {
        let Some(remaining) = self.cell.close() else {
            return 0.0;
        };
        let returned = remaining * self.cell.recovery_rate;

        if let Err(e) = self.cell.return_funds(returned) {
            tracing::error!(agent = %self.cell.agent_id, error = %e, "Budget return failed");
            return 0.0;
        }

        tracing::info!(
            agent = %self.cell.agent_id,
            remaining,
            returned,
            budget = %self.cell.correlation_id,
            "Budget settled"
        );
        if let Some(events) = &self.events {
            events.try_emit(LifecycleEvent::BudgetSettled {
                agent_id: self.cell.agent_id.clone(),
                remaining,
                returned,
                timestamp: Utc::now(),
            });
        }
        returned
    }
}

impl Drop for ResourceBudget {
    fn drop(&mut self) {
        self.settle();
    }
}

/// Spending view of a [`ResourceBudget`]
///
/// Handles never settle; spending through one after the budget is settled
/// always fails.
#[derive(Debug, Clone)]
pub struct BudgetHandle {
    cell: Arc<BudgetCell>,
}

impl BudgetHandle {
    pub fn spend(&self, amount: f64) -> bool {
        self.cell.spend(amount)
    }

    pub fn remaining(&self) -> f64 {
        self.cell.remaining()
    }
}

/// Run `work` with a freshly issued budget and settle it afterwards
///
/// The budget is settled when `work` completes and also if the returned
/// future is dropped part way through. Returns the work's output together
/// with the amount credited back.
///
/// # Errors
///
/// Fails like [`issue_budget`] when the budget cannot be issued.
pub async fn with_budget<F, Fut, T>(
    ledger: &Arc<CapitalLedger>,
    agent_id: &str,
    amount: f64,
    recovery_rate: f64,
    work: F,
) -> Result<(T, f64)>
where
    F: FnOnce(BudgetHandle) -> Fut,
    Fut: Future<Output = T>,
{
    let budget = issue_budget(ledger, agent_id, amount, recovery_rate)?;
    let output = work(budget.handle()).await;
    let returned = budget.settle();
    Ok((output, returned))
}
