//! Wiring of registry, orchestrator, ledger and sinks from one configuration

use std::sync::Arc;

use crate::config::WardenConfig;
use crate::economics::{BypassGrant, BypassRequest, CapitalLedger, ResourceBudget};
use crate::error::Result;
use crate::events::{ChannelEventSink, EventReceiver, EventSink, event_channel};
use crate::security::{
    AgentContext, AuditSink, InMemoryAuditLog, JsonlAuditLog, PermissionClassifier,
    SecureExecutor, ToolCapabilities,
};
use crate::tools::{BoxedTool, ToolRegistry};
use crate::workflow::Orchestrator;

/// An assembled runtime
///
/// Every executor built through [`Warden::executor_for`] shares the same
/// classifier, audit sink, event sink and executor settings; budgets and
/// bypasses draw on the same ledger.
pub struct Warden {
    config: WardenConfig,
    registry: ToolRegistry,
    orchestrator: Orchestrator,
    ledger: Arc<CapitalLedger>,
    audit: Arc<dyn AuditSink>,
    events: Option<Arc<dyn EventSink>>,
    receiver: Option<EventReceiver>,
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("ledger_events", &self.ledger.len())
            .field("has_event_sink", &self.events.is_some())
            .finish()
    }
}

/// Builder for [`Warden`]
#[derive(Default)]
pub struct WardenBuilder {
    config: Option<WardenConfig>,
    classifier: Option<PermissionClassifier>,
    ledger: Option<Arc<CapitalLedger>>,
    audit: Option<Arc<dyn AuditSink>>,
    events: Option<Arc<dyn EventSink>>,
    event_channel: bool,
}

impl WardenBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: WardenConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Classifier with custom rules; built-ins only otherwise
    pub fn with_classifier(mut self, classifier: PermissionClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Existing ledger, e.g. one restored with [`CapitalLedger::import_jsonl`]
    pub fn with_ledger(mut self, ledger: Arc<CapitalLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Audit sink; overrides `audit.path`
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Publish lifecycle events on a channel sized by `events.buffer_size`
    ///
    /// Take the receiving end with [`Warden::take_event_receiver`]. Ignored
    /// when an explicit event sink is set.
    pub fn with_event_channel(mut self) -> Self {
        self.event_channel = true;
        self
    }

    /// Validate the configuration and assemble the runtime
    ///
    /// Opens the JSON lines audit log when `audit.path` is set and no sink
    /// was injected; audits to memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or an audit file that
    /// cannot be opened.
    pub async fn build(self) -> Result<Warden> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let audit: Arc<dyn AuditSink> = match (self.audit, &config.audit.path) {
            (Some(sink), _) => sink,
            (None, Some(path)) => Arc::new(JsonlAuditLog::open(path).await?),
            (None, None) => Arc::new(InMemoryAuditLog::new()),
        };

        let (events, receiver) = match self.events {
            Some(sink) => (Some(sink), None),
            None if self.event_channel => {
                let (tx, rx) = event_channel(config.events.buffer_size);
                let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink::new(tx));
                (Some(sink), Some(rx))
            }
            None => (None, None),
        };

        let classifier = Arc::new(self.classifier.unwrap_or_default());
        let mut registry = ToolRegistry::new()
            .with_classifier(classifier)
            .with_audit_sink(Arc::clone(&audit))
            .with_config(config.executor.clone());
        let mut orchestrator = Orchestrator::new().with_config(config.orchestrator.clone());
        if let Some(sink) = &events {
            registry = registry.with_event_sink(Arc::clone(sink));
            orchestrator = orchestrator.with_event_sink(Arc::clone(sink));
        }

        tracing::info!(
            max_concurrency = config.orchestrator.max_concurrency,
            timeout = ?config.executor.default_timeout,
            audit_file = ?config.audit.path,
            "Warden runtime assembled"
        );

        Ok(Warden {
            registry,
            orchestrator,
            ledger: self.ledger.unwrap_or_default(),
            audit,
            events,
            receiver,
            config,
        })
    }
}

impl Warden {
    pub fn builder() -> WardenBuilder {
        WardenBuilder::new()
    }

    /// Runtime from [`WardenConfig::load`]
    pub async fn from_env() -> Result<Self> {
        WardenBuilder::new()
            .with_config(WardenConfig::load()?)
            .build()
            .await
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn ledger(&self) -> &Arc<CapitalLedger> {
        &self.ledger
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub fn classifier(&self) -> &Arc<PermissionClassifier> {
        self.registry.classifier()
    }

    /// Receiving end of the event channel, once
    pub fn take_event_receiver(&mut self) -> Option<EventReceiver> {
        self.receiver.take()
    }

    pub fn register(&mut self, tool: BoxedTool, capabilities: ToolCapabilities) -> Result<()> {
        self.registry.register(tool, capabilities)
    }

    /// Shareable executor for a registered tool
    pub fn executor_for(&self, name: &str, context: AgentContext) -> Result<Arc<SecureExecutor>> {
        self.registry.executor_for(name, context).map(Arc::new)
    }

    /// Budget at the configured default recovery rate
    pub fn issue_budget(&self, agent_id: &str, amount: f64) -> Result<ResourceBudget> {
        let budget = crate::economics::issue_budget(
            &self.ledger,
            agent_id,
            amount,
            self.config.budget.default_recovery_rate,
        )?;
        Ok(match &self.events {
            Some(sink) => budget.with_event_sink(Arc::clone(sink)),
            None => budget,
        })
    }

    /// Buy a bypass with this runtime's classifier and ledger
    pub async fn purchase_bypass(&self, request: &BypassRequest) -> Result<BypassGrant> {
        let grant =
            crate::economics::purchase_bypass(&self.ledger, self.classifier(), request)?;
        if let Some(sink) = &self.events {
            sink.emit(grant.lifecycle_event()).await;
        }
        Ok(grant)
    }
}
