//! Attribute-based permission classification
//!
//! Classification runs in two phases:
//!
//! 1. Custom rules, in registration order. The first rule returning `Some`
//!    decides and nothing else is evaluated.
//! 2. Built-in attribute checks. Each check may force `Denied` or
//!    `Restricted`; the most restrictive outcome wins. When nothing fires the
//!    result is `AllowedAudited`. Plain `Allowed` can only come from a custom
//!    rule.
//!
//! Classification is pure: it reads the capabilities and the context and
//! never mutates either.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::capability::{AgentContext, SecurityLevel, ToolCapabilities};
use super::token::CapabilityToken;
use crate::error::{Result, WardenError};

/// Ordered classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Denied,
    Restricted,
    AllowedAudited,
    Allowed,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Denied => "denied",
            PermissionLevel::Restricted => "restricted",
            PermissionLevel::AllowedAudited => "allowed_audited",
            PermissionLevel::Allowed => "allowed",
        }
    }

    /// Anything other than `Denied` may run
    pub fn permits_execution(&self) -> bool {
        *self != PermissionLevel::Denied
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Custom rule signature
pub type RuleFn =
    Arc<dyn Fn(&ToolCapabilities, &AgentContext) -> Option<PermissionLevel> + Send + Sync>;

#[derive(Clone)]
struct NamedRule {
    name: String,
    rule: RuleFn,
}

/// Full classification result
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub level: PermissionLevel,
    /// Name of the custom rule that decided, if any
    pub decided_by: Option<String>,
    /// Built-in checks that fired
    pub reasons: Vec<String>,
}

impl Classification {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        match (&self.decided_by, self.reasons.is_empty()) {
            (Some(rule), _) => format!("custom rule '{}' returned {}", rule, self.level),
            (None, true) => format!("no restriction applies ({})", self.level),
            (None, false) => self.reasons.join("; "),
        }
    }
}

/// Permission classifier with ordered custom-rule override
#[derive(Clone, Default)]
pub struct PermissionClassifier {
    rules: Vec<NamedRule>,
}

impl std::fmt::Debug for PermissionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionClassifier")
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PermissionClassifier {
    /// Classifier with built-in checks only
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom rule; rules are evaluated in registration order
    pub fn add_rule<F>(&mut self, name: impl Into<String>, rule: F) -> &mut Self
    where
        F: Fn(&ToolCapabilities, &AgentContext) -> Option<PermissionLevel> + Send + Sync + 'static,
    {
        self.rules.push(NamedRule {
            name: name.into(),
            rule: Arc::new(rule),
        });
        self
    }

    /// Builder-style variant of [`add_rule`](Self::add_rule)
    pub fn with_rule<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&ToolCapabilities, &AgentContext) -> Option<PermissionLevel> + Send + Sync + 'static,
    {
        self.add_rule(name, rule);
        self
    }

    /// Names of registered rules, in evaluation order
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Classify and keep the reasoning
    pub fn evaluate(&self, caps: &ToolCapabilities, ctx: &AgentContext) -> Classification {
        for named in &self.rules {
            if let Some(level) = (named.rule)(caps, ctx) {
                tracing::debug!(
                    agent = %ctx.agent_id,
                    rule = %named.name,
                    level = %level,
                    "Custom rule decided permission"
                );
                return Classification {
                    level,
                    decided_by: Some(named.name.clone()),
                    reasons: Vec::new(),
                };
            }
        }

        let (level, reasons) = builtin_checks(caps, ctx);
        tracing::debug!(
            agent = %ctx.agent_id,
            level = %level,
            reasons = reasons.len(),
            "Built-in checks decided permission"
        );
        Classification {
            level,
            decided_by: None,
            reasons,
        }
    }

    /// Classify an invocation
    pub fn classify(&self, caps: &ToolCapabilities, ctx: &AgentContext) -> PermissionLevel {
        self.evaluate(caps, ctx).level
    }

    /// Built-in checks that fire for this pair (empty when a rule decides)
    pub fn explain(&self, caps: &ToolCapabilities, ctx: &AgentContext) -> Vec<String> {
        self.evaluate(caps, ctx).reasons
    }

    /// Classify and, unless denied, issue a token valid for `duration_seconds`
    pub fn grant_temporary(
        &self,
        tool_id: &str,
        caps: &ToolCapabilities,
        ctx: &AgentContext,
        duration_seconds: i64,
    ) -> Result<CapabilityToken> {
        let classification = self.evaluate(caps, ctx);

        if !classification.level.permits_execution() {
            tracing::warn!(
                agent = %ctx.agent_id,
                tool = %tool_id,
                "Temporary permission denied"
            );
            return Err(WardenError::Permission {
                tool: tool_id.to_string(),
                reason: classification.summary(),
            });
        }

        let token = CapabilityToken::issue(
            tool_id,
            &ctx.agent_id,
            caps.clone(),
            classification.level,
            duration_seconds,
        );
        tracing::info!(
            agent = %ctx.agent_id,
            tool = %tool_id,
            token = %token.id,
            level = %classification.level,
            duration_seconds,
            "Temporary permission granted"
        );
        Ok(token)
    }
}

fn builtin_checks(caps: &ToolCapabilities, ctx: &AgentContext) -> (PermissionLevel, Vec<String>) {
    let mut level = PermissionLevel::AllowedAudited;
    let mut reasons = Vec::new();
    let mut restrict = |to: PermissionLevel, reason: String| {
        level = level.min(to);
        reasons.push(reason);
    };

    if caps.requires_network && !ctx.allow_network {
        restrict(PermissionLevel::Denied, "network access not allowed".to_string());
    }
    if caps.requires_file_access() && !ctx.allow_file_access {
        restrict(PermissionLevel::Denied, "file access not allowed".to_string());
    }
    if caps.requires_code_execution {
        if !ctx.allow_code_execution {
            restrict(PermissionLevel::Denied, "code execution not allowed".to_string());
        } else if ctx.security_level == SecurityLevel::Critical {
            restrict(
                PermissionLevel::Denied,
                "code execution forbidden at critical security level".to_string(),
            );
        }
    }
    if caps.accesses_pii && !ctx.pii_authorized {
        restrict(PermissionLevel::Denied, "PII access not authorized".to_string());
    }
    if caps.max_cost_usd > ctx.max_cost_usd {
        restrict(
            PermissionLevel::Denied,
            format!(
                "tool cost {:.4} exceeds context limit {:.4}",
                caps.max_cost_usd, ctx.max_cost_usd
            ),
        );
    }
    if caps.requires_user_approval && !ctx.user_present {
        restrict(
            PermissionLevel::Restricted,
            "user approval required but no user present".to_string(),
        );
    }

    // Production never runs un-audited
    if ctx.is_production() {
        level = level.min(PermissionLevel::AllowedAudited);
    }

    (level, reasons)
}
