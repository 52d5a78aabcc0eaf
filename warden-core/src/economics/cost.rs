//! Composable cost factors
//!
//! A [`CostFactor`] is a named pure function of a [`CostContext`]. Factors
//! compose with `+` and scale with `f64 * factor`; the composite keeps a
//! readable name so a priced event can say exactly how it was priced.
//!
//! ```rust
//! use warden_core::economics::{CostContext, base, risk_premium};
//!
//! let price = base() + 0.5 * risk_premium();
//! assert_eq!(price.name(), "base + 0.5*risk_premium");
//! assert_eq!(price.evaluate(&CostContext::new(0.5, 1.0, true)), 3.5);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul};
use std::sync::Arc;

/// Multiplier applied to risk in [`risk_premium`]
pub const RISK_PREMIUM_SCALE: f64 = 10.0;

/// Multiplier applied to missing judgment in [`judgment_deficit`]
pub const JUDGMENT_DEFICIT_SCALE: f64 = 10.0;

/// Flat charge when resources are constrained
pub const RESOURCE_PENALTY: f64 = 2.0;

/// Inputs a cost factor is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostContext {
    /// Risk of the action, nominally in `[0, 1]`
    pub risk: f64,
    /// Confidence in the caller's judgment, nominally in `[0, 1]`
    pub judgment_score: f64,
    /// Whether system resources are healthy
    pub resources_ok: bool,
}

impl Default for CostContext {
    fn default() -> Self {
        Self {
            risk: 0.0,
            judgment_score: 1.0,
            resources_ok: true,
        }
    }
}

impl CostContext {
    pub fn new(risk: f64, judgment_score: f64, resources_ok: bool) -> Self {
        Self {
            risk,
            judgment_score,
            resources_ok,
        }
    }
}

type CostFn = Arc<dyn Fn(&CostContext) -> f64 + Send + Sync>;

/// Named pure function from context to cost
#[derive(Clone)]
pub struct CostFactor {
    name: String,
    compute: CostFn,
    /// Built by `+`; scaling wraps the name in parentheses
    composite: bool,
}

impl std::fmt::Debug for CostFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostFactor")
            .field("name", &self.name)
            .field("composite", &self.composite)
            .finish()
    }
}

impl CostFactor {
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&CostContext) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compute: Arc::new(compute),
            composite: false,
        }
    }

    /// A factor that always costs `value`
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, move |_| value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, context: &CostContext) -> f64 {
        (self.compute)(context)
    }
}

impl Add for CostFactor {
    type Output = CostFactor;

    fn add(self, rhs: CostFactor) -> CostFactor {
        let name = format!("{} + {}", self.name, rhs.name);
        let (lhs, rhs) = (self.compute, rhs.compute);
        CostFactor {
            name,
            compute: Arc::new(move |ctx: &CostContext| lhs(ctx) + rhs(ctx)),
            composite: true,
        }
    }
}

impl Mul<CostFactor> for f64 {
    type Output = CostFactor;

    fn mul(self, rhs: CostFactor) -> CostFactor {
        let name = if rhs.composite {
            format!("{}*({})", self, rhs.name)
        } else {
            format!("{}*{}", self, rhs.name)
        };
        let inner = rhs.compute;
        CostFactor {
            name,
            compute: Arc::new(move |ctx: &CostContext| self * inner(ctx)),
            composite: false,
        }
    }
}

/// Flat unit cost
pub fn base() -> CostFactor {
    CostFactor::constant("base", 1.0)
}

/// Grows linearly with risk
pub fn risk_premium() -> CostFactor {
    CostFactor::new("risk_premium", |ctx| RISK_PREMIUM_SCALE * ctx.risk)
}

/// Grows as judgment confidence drops; never negative
pub fn judgment_deficit() -> CostFactor {
    CostFactor::new("judgment_deficit", |ctx| {
        (JUDGMENT_DEFICIT_SCALE * (1.0 - ctx.judgment_score)).max(0.0)
    })
}

/// Charged only when resources are constrained
pub fn resource_penalty() -> CostFactor {
    CostFactor::new("resource_penalty", |ctx| {
        if ctx.resources_ok { 0.0 } else { RESOURCE_PENALTY }
    })
}

/// Price of overriding a permission decision
pub fn bypass_cost() -> CostFactor {
    base() + 0.1 * risk_premium() + 0.1 * judgment_deficit() + resource_penalty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_builtin_factors() {
        let calm = CostContext::default();
        assert_eq!(base().evaluate(&calm), 1.0);
        assert_eq!(risk_premium().evaluate(&calm), 0.0);
        assert_eq!(judgment_deficit().evaluate(&calm), 0.0);
        assert_eq!(resource_penalty().evaluate(&calm), 0.0);

        let stressed = CostContext::new(0.5, 0.3, false);
        assert!(approx(risk_premium().evaluate(&stressed), 5.0));
        assert!(approx(judgment_deficit().evaluate(&stressed), 7.0));
        assert_eq!(resource_penalty().evaluate(&stressed), 2.0);
    }

    #[test]
    fn test_judgment_deficit_clamped() {
        let overconfident = CostContext::new(0.0, 1.5, true);
        assert_eq!(judgment_deficit().evaluate(&overconfident), 0.0);
    }

    #[test]
    fn test_bypass_cost_composition() {
        let cost = bypass_cost();
        assert_eq!(
            cost.name(),
            "base + 0.1*risk_premium + 0.1*judgment_deficit + resource_penalty"
        );

        // 1 + 0.1*5 + 0.1*7 + 2
        let ctx = CostContext::new(0.5, 0.3, false);
        assert!(approx(cost.evaluate(&ctx), 4.2));
        assert_eq!(cost.evaluate(&CostContext::default()), 1.0);
    }

    #[test]
    fn test_scaling_a_sum_keeps_grouping() {
        let doubled = 2.0 * (base() + resource_penalty());
        assert_eq!(doubled.name(), "2*(base + resource_penalty)");
        assert_eq!(doubled.evaluate(&CostContext::new(0.0, 1.0, false)), 6.0);
    }

    #[test]
    fn test_grouping_follows_structure_not_name() {
        let named_like_a_sum = CostFactor::constant("egress + storage", 1.5);
        let doubled = 2.0 * named_like_a_sum;
        assert_eq!(doubled.name(), "2*egress + storage");
        assert_eq!(doubled.evaluate(&CostContext::default()), 3.0);

        // A scaled sum is a single term again
        let nested = 3.0 * (2.0 * (base() + base()));
        assert_eq!(nested.name(), "3*2*(base + base)");
        assert_eq!(nested.evaluate(&CostContext::default()), 12.0);
    }

    #[test]
    fn test_custom_factor() {
        let per_call = CostFactor::constant("per_call", 0.25);
        let total = per_call + risk_premium();
        assert!(approx(total.evaluate(&CostContext::new(0.1, 1.0, true)), 1.25));
    }
}
