//! Declared tool capabilities and caller security posture
//!
//! [`ToolCapabilities`] describe what a tool *might* do and are fixed at
//! registration. [`AgentContext`] describes what the caller is currently
//! allowed to do and may change over the caller's lifetime.

use serde::{Deserialize, Serialize};

/// Environment name that forces audited execution
pub const PRODUCTION_ENVIRONMENT: &str = "production";

/// Capabilities a tool declares at registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCapabilities {
    /// Makes network requests
    #[serde(default)]
    pub requires_network: bool,

    /// Reads from the filesystem
    #[serde(default)]
    pub requires_file_read: bool,

    /// Writes to the filesystem
    #[serde(default)]
    pub requires_file_write: bool,

    /// Executes arbitrary code or subprocesses
    #[serde(default)]
    pub requires_code_execution: bool,

    /// Touches personally identifiable information
    #[serde(default)]
    pub accesses_pii: bool,

    /// Needs a human in the loop
    #[serde(default)]
    pub requires_user_approval: bool,

    /// Worst-case spend of a single invocation
    #[serde(default)]
    pub max_cost_usd: f64,
}

impl ToolCapabilities {
    /// A tool that needs nothing
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_network(mut self) -> Self {
        self.requires_network = true;
        self
    }

    pub fn with_file_read(mut self) -> Self {
        self.requires_file_read = true;
        self
    }

    pub fn with_file_write(mut self) -> Self {
        self.requires_file_write = true;
        self
    }

    pub fn with_code_execution(mut self) -> Self {
        self.requires_code_execution = true;
        self
    }

    pub fn with_pii(mut self) -> Self {
        self.accesses_pii = true;
        self
    }

    pub fn with_user_approval(mut self) -> Self {
        self.requires_user_approval = true;
        self
    }

    pub fn with_max_cost(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_usd = max_cost_usd;
        self
    }

    /// Whether the tool touches the filesystem at all
    pub fn requires_file_access(&self) -> bool {
        self.requires_file_read || self.requires_file_write
    }
}

/// Ordered caller security level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
            SecurityLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The caller's current security posture
///
/// Every flag defaults to the restrictive setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    /// Calling agent
    pub agent_id: String,

    /// Security level; `Critical` forbids code execution outright
    #[serde(default)]
    pub security_level: SecurityLevel,

    /// Network access permitted
    #[serde(default)]
    pub allow_network: bool,

    /// Filesystem read/write permitted
    #[serde(default)]
    pub allow_file_access: bool,

    /// Code execution permitted
    #[serde(default)]
    pub allow_code_execution: bool,

    /// PII handling authorized
    #[serde(default)]
    pub pii_authorized: bool,

    /// A human is available to approve
    #[serde(default)]
    pub user_present: bool,

    /// Deployment environment, e.g. "development" or "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Spend ceiling per invocation
    #[serde(default)]
    pub max_cost_usd: f64,
}

fn default_environment() -> String {
    "development".to_string()
}

impl AgentContext {
    /// Create a restrictive context for an agent
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            security_level: SecurityLevel::default(),
            allow_network: false,
            allow_file_access: false,
            allow_code_execution: false,
            pii_authorized: false,
            user_present: false,
            environment: default_environment(),
            max_cost_usd: 0.0,
        }
    }

    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    pub fn with_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    pub fn with_file_access(mut self, allow: bool) -> Self {
        self.allow_file_access = allow;
        self
    }

    pub fn with_code_execution(mut self, allow: bool) -> Self {
        self.allow_code_execution = allow;
        self
    }

    pub fn with_pii_authorized(mut self, authorized: bool) -> Self {
        self.pii_authorized = authorized;
        self
    }

    pub fn with_user_present(mut self, present: bool) -> Self {
        self.user_present = present;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_max_cost(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_usd = max_cost_usd;
        self
    }

    /// Whether the context runs in production
    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION_ENVIRONMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_ordering() {
        assert!(SecurityLevel::Low < SecurityLevel::Medium);
        assert!(SecurityLevel::Medium < SecurityLevel::High);
        assert!(SecurityLevel::High < SecurityLevel::Critical);
    }

    #[test]
    fn test_context_defaults_are_restrictive() {
        let ctx = AgentContext::new("agent-1");

        assert!(!ctx.allow_network);
        assert!(!ctx.allow_file_access);
        assert!(!ctx.allow_code_execution);
        assert!(!ctx.pii_authorized);
        assert!(!ctx.user_present);
        assert!(!ctx.is_production());
        assert_eq!(ctx.max_cost_usd, 0.0);
    }

    #[test]
    fn test_capabilities_builder() {
        let caps = ToolCapabilities::none().with_file_write().with_max_cost(0.5);

        assert!(caps.requires_file_access());
        assert!(!caps.requires_network);
        assert_eq!(caps.max_cost_usd, 0.5);
    }

    #[test]
    fn test_context_deserializes_with_defaults() {
        let ctx: AgentContext =
            serde_json::from_str(r#"{"agent_id": "a", "security_level": "high"}"#).unwrap();

        assert_eq!(ctx.security_level, SecurityLevel::High);
        assert_eq!(ctx.environment, "development");
        assert!(!ctx.allow_network);
    }
}
