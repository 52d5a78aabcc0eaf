//! Paid permission overrides
//!
//! A bypass lets an agent run a tool the classifier would refuse, at a price
//! set by [`bypass_cost`]. The payment is a `bypass` ledger event and the
//! resulting token carries that event's sequence number, so every execution
//! under it can be traced back to what was paid.

use chrono::Utc;
use serde_json::json;

use super::cost::{CostContext, CostFactor, bypass_cost};
use super::ledger::{CapitalLedger, LedgerEvent, LedgerEventKind, Posting};
use crate::error::{Result, WardenError};
use crate::events::LifecycleEvent;
use crate::security::{
    AgentContext, CapabilityToken, PermissionClassifier, PermissionLevel, ToolCapabilities,
};

/// Default lifetime of a purchased token
pub const DEFAULT_BYPASS_SECONDS: i64 = 300;

/// What an agent wants to bypass
#[derive(Debug, Clone)]
pub struct BypassRequest {
    pub tool_id: String,
    pub capabilities: ToolCapabilities,
    pub context: AgentContext,
    pub cost_context: CostContext,
    pub duration_seconds: i64,
    pub correlation_id: Option<String>,
}

impl BypassRequest {
    pub fn new(
        tool_id: impl Into<String>,
        capabilities: ToolCapabilities,
        context: AgentContext,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            capabilities,
            context,
            cost_context: CostContext::default(),
            duration_seconds: DEFAULT_BYPASS_SECONDS,
            correlation_id: None,
        }
    }

    pub fn with_cost_context(mut self, cost_context: CostContext) -> Self {
        self.cost_context = cost_context;
        self
    }

    pub fn with_duration(mut self, duration_seconds: i64) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A paid-for token and its receipt
#[derive(Debug, Clone)]
pub struct BypassGrant {
    pub token: CapabilityToken,
    pub cost: f64,
    /// The `bypass` ledger event that paid for the token
    pub event: LedgerEvent,
    /// What the classifier would have decided without the bypass
    pub classified_as: PermissionLevel,
}

impl BypassGrant {
    /// Lifecycle notification describing the purchase
    pub fn lifecycle_event(&self) -> LifecycleEvent {
        LifecycleEvent::BypassPurchased {
            agent_id: self.event.agent_id.clone(),
            tool_id: self.token.tool_id.clone(),
            cost: self.cost,
            timestamp: Utc::now(),
        }
    }
}

/// Buy a bypass priced with [`bypass_cost`]
///
/// # Errors
///
/// Returns [`WardenError::InsufficientCapital`] when the agent cannot pay;
/// nothing is debited and no token is issued.
pub fn purchase_bypass(
    ledger: &CapitalLedger,
    classifier: &PermissionClassifier,
    request: &BypassRequest,
) -> Result<BypassGrant> {
    purchase_bypass_with(ledger, classifier, request, &bypass_cost())
}

/// Buy a bypass priced with a custom cost factor
///
/// # Errors
///
/// Returns [`WardenError::InsufficientCapital`] when the agent cannot pay,
/// or [`WardenError::InvalidAmount`] if the factor prices it negative or
/// non-finite.
pub fn purchase_bypass_with(
    ledger: &CapitalLedger,
    classifier: &PermissionClassifier,
    request: &BypassRequest,
    pricing: &CostFactor,
) -> Result<BypassGrant> {
    let agent_id = request.context.agent_id.as_str();
    let classified_as = classifier.classify(&request.capabilities, &request.context);
    let cost = pricing.evaluate(&request.cost_context);

    let posting = Posting::new(agent_id, LedgerEventKind::Bypass, cost, "permission bypass")
        .with_correlation_id(request.correlation_id.as_deref())
        .with_metadata(json!({
            "tool_id": request.tool_id,
            "cost_factor": pricing.name(),
            "cost_context": request.cost_context,
            "classified_as": classified_as,
            "context": request.context,
        }));

    // Issue before debiting
    let token = CapabilityToken::issue(
        &request.tool_id,
        agent_id,
        request.capabilities.clone(),
        PermissionLevel::AllowedAudited,
        request.duration_seconds,
    );

    let Some(event) = ledger.record(posting)? else {
        let available = ledger.balance(agent_id);
        tracing::warn!(
            agent = %agent_id,
            tool = %request.tool_id,
            cost,
            available,
            "Bypass refused: insufficient capital"
        );
        return Err(WardenError::InsufficientCapital {
            agent: agent_id.to_string(),
            requested: cost,
            available,
        });
    };

    let token = token.with_bypass_event(event.seq);

    tracing::info!(
        agent = %agent_id,
        tool = %request.tool_id,
        cost,
        classified_as = %classified_as,
        seq = event.seq,
        token = %token.id,
        "Bypass purchased"
    );

    Ok(BypassGrant {
        token,
        cost,
        event,
        classified_as,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BypassRequest {
        BypassRequest::new(
            "shell",
            ToolCapabilities::none().with_code_execution(),
            AgentContext::new("a"),
        )
        .with_cost_context(CostContext::new(0.5, 0.3, false))
    }

    #[test]
    fn test_bypass_debits_exact_cost() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 10.0, "seed", None, None).unwrap();
        let classifier = PermissionClassifier::new();

        let expected = bypass_cost().evaluate(&CostContext::new(0.5, 0.3, false));
        let grant = purchase_bypass(&ledger, &classifier, &request()).unwrap();

        assert_eq!(grant.cost, expected);
        assert_eq!(grant.event.kind, LedgerEventKind::Bypass);
        assert_eq!(grant.event.amount, expected);
        assert!((ledger.balance("a") - (10.0 - expected)).abs() < 1e-9);
        assert_eq!(grant.event.metadata["cost_factor"], bypass_cost().name());
    }

    #[test]
    fn test_bypass_token_overrides_denial() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 10.0, "seed", None, None).unwrap();
        let classifier = PermissionClassifier::new();

        let grant = purchase_bypass(&ledger, &classifier, &request()).unwrap();

        assert_eq!(grant.classified_as, PermissionLevel::Denied);
        assert_eq!(grant.token.permission, PermissionLevel::AllowedAudited);
        assert_eq!(grant.token.bypass_event, Some(grant.event.seq));
        assert!(grant.token.is_valid());
        assert_eq!(grant.lifecycle_event().event_type(), "bypass_purchased");
    }

    #[test]
    fn test_bypass_insufficient_capital() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 1.0, "seed", None, None).unwrap();
        let classifier = PermissionClassifier::new();

        let err = purchase_bypass(&ledger, &classifier, &request()).unwrap_err();
        assert!(matches!(err, WardenError::InsufficientCapital { .. }));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.balance("a"), 1.0);
    }

    #[test]
    fn test_huge_duration_is_paid_once() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 10.0, "seed", None, None).unwrap();
        let classifier = PermissionClassifier::new();

        let long = request().with_duration(10_000_000_000_000);
        let grant = purchase_bypass(&ledger, &classifier, &long).unwrap();

        assert!(grant.token.is_valid());
        assert_eq!(grant.token.bypass_event, Some(grant.event.seq));
        assert_eq!(ledger.len(), 2);
        assert!((ledger.balance("a") - (10.0 - grant.cost)).abs() < 1e-9);
    }

    #[test]
    fn test_custom_pricing() {
        let ledger = CapitalLedger::new();
        ledger.credit("a", 10.0, "seed", None, None).unwrap();
        let classifier = PermissionClassifier::new();

        let flat = CostFactor::constant("flat", 2.0);
        let grant = purchase_bypass_with(&ledger, &classifier, &request(), &flat).unwrap();
        assert_eq!(grant.cost, 2.0);
        assert_eq!(ledger.balance("a"), 8.0);
    }
}
