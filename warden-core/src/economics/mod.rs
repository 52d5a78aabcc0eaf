//! Capital accounting for tool use
//!
//! - [`CapitalLedger`]: append-only event log; balances are folds
//! - [`CostFactor`]: composable pricing functions
//! - [`ResourceBudget`]: scoped capital with guaranteed settlement
//! - [`purchase_bypass`]: paid override of a permission decision

mod budget;
mod bypass;
mod cost;
mod ledger;

pub use budget::{BudgetHandle, ResourceBudget, issue_budget, with_budget};
pub use bypass::{
    BypassGrant, BypassRequest, DEFAULT_BYPASS_SECONDS, purchase_bypass, purchase_bypass_with,
};
pub use cost::{
    CostContext, CostFactor, JUDGMENT_DEFICIT_SCALE, RESOURCE_PENALTY, RISK_PREMIUM_SCALE, base,
    bypass_cost, judgment_deficit, resource_penalty, risk_premium,
};
pub use ledger::{CapitalLedger, LedgerEvent, LedgerEventKind, Posting};
