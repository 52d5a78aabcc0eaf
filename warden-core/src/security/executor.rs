//! Permission-gated execution of a single tool
//!
//! A [`SecureExecutor`] owns one tool, its declared capabilities and a
//! handle to the caller's [`AgentContext`]. Every call goes through the same
//! gate: token or classification, timed invocation, audit entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Instant, timeout};

use super::audit::{AuditEntry, AuditKind, AuditSink};
use super::capability::{AgentContext, ToolCapabilities};
use super::classifier::{PermissionClassifier, PermissionLevel};
use super::token::CapabilityToken;
use crate::config::ExecutorConfig;
use crate::error::{Result, WardenError};
use crate::events::{EventSink, LifecycleEvent};
use crate::tools::BoxedTool;

/// Snapshot of an executor's permission state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub tool_id: String,
    pub context_id: String,
    /// Level the next call would run at
    pub permission: PermissionLevel,
    /// `None` when no token is attached
    pub token_valid: Option<bool>,
    pub token_uses: Option<u64>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Whether the attached token was paid for with a bypass
    pub bypass: bool,
}

/// Gate around one tool invocation
pub struct SecureExecutor {
    tool: BoxedTool,
    capabilities: ToolCapabilities,
    context: Arc<RwLock<AgentContext>>,
    classifier: Arc<PermissionClassifier>,
    audit: Option<Arc<dyn AuditSink>>,
    events: Option<Arc<dyn EventSink>>,
    config: ExecutorConfig,
    token: Mutex<Option<CapabilityToken>>,
}

impl std::fmt::Debug for SecureExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureExecutor")
            .field("tool", &self.tool.name())
            .field("capabilities", &self.capabilities)
            .field("timeout", &self.config.default_timeout)
            .finish()
    }
}

impl SecureExecutor {
    /// Create an executor with the built-in classifier and no sinks
    pub fn new(tool: BoxedTool, capabilities: ToolCapabilities, context: AgentContext) -> Self {
        Self::with_shared_context(tool, capabilities, Arc::new(RwLock::new(context)))
    }

    /// Create an executor whose context is shared with the agent runtime
    ///
    /// Escalations written through the handle apply to the next call.
    pub fn with_shared_context(
        tool: BoxedTool,
        capabilities: ToolCapabilities,
        context: Arc<RwLock<AgentContext>>,
    ) -> Self {
        Self {
            tool,
            capabilities,
            context,
            classifier: Arc::new(PermissionClassifier::new()),
            audit: None,
            events: None,
            config: ExecutorConfig::default(),
            token: Mutex::new(None),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<PermissionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the invocation deadline
    pub fn with_timeout(mut self, deadline: Duration) -> Self {
        self.config.default_timeout = deadline;
        self
    }

    /// Start with a token already attached
    pub fn with_token(mut self, token: CapabilityToken) -> Self {
        self.token = Mutex::new(Some(token));
        self
    }

    pub fn tool_id(&self) -> &str {
        self.tool.name()
    }

    pub fn capabilities(&self) -> &ToolCapabilities {
        &self.capabilities
    }

    pub fn timeout(&self) -> Duration {
        self.config.default_timeout
    }

    /// Shared handle to the caller's context
    pub fn context_handle(&self) -> Arc<RwLock<AgentContext>> {
        Arc::clone(&self.context)
    }

    /// Apply a change to the caller's context
    pub async fn update_context<F>(&self, update: F)
    where
        F: FnOnce(&mut AgentContext),
    {
        let mut context = self.context.write().await;
        update(&mut context);
    }

    /// Run the tool through the permission gate
    ///
    /// # Errors
    ///
    /// - [`WardenError::Permission`] when classification denies the call
    /// - [`WardenError::Token`] when the attached token is expired or revoked
    /// - [`WardenError::ToolTimeout`] when the invocation exceeds its deadline
    /// - [`WardenError::ToolExecution`] carrying the tool's own error
    pub async fn execute(&self, input: Value) -> Result<Value> {
        let context = self.context.read().await.clone();
        let tool_id = self.tool.name().to_string();

        let gate = {
            let mut held = self.token.lock().await;
            held.as_mut().map(|token| {
                if let Some(reason) = foreign_token(token, &tool_id, &context.agent_id) {
                    return Err((
                        token.permission,
                        WardenError::Permission {
                            tool: tool_id.clone(),
                            reason,
                        },
                    ));
                }
                token
                    .use_token()
                    .map(|()| (token.permission, token.bypass_event.is_some()))
                    .map_err(|error| (token.permission, WardenError::from(error)))
            })
        };

        let (permission, bypass) = match gate {
            Some(Ok(granted)) => granted,
            Some(Err((permission, error))) => {
                tracing::warn!(
                    agent = %context.agent_id,
                    tool = %tool_id,
                    error = %error,
                    "Token rejected"
                );
                self.record(
                    AuditEntry::new(
                        AuditKind::PermissionCheck,
                        &tool_id,
                        self.tool.name(),
                        &context.agent_id,
                        permission,
                        &input,
                        self.config.summary_chars,
                    )
                    .failed(error.to_string()),
                )
                .await;
                self.emit(LifecycleEvent::PermissionDenied {
                    agent_id: context.agent_id.clone(),
                    tool_id,
                    reason: error.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
                return Err(error);
            }
            None => {
                let classification = self.classifier.evaluate(&self.capabilities, &context);
                if !classification.level.permits_execution() {
                    let reason = classification.summary();
                    tracing::warn!(
                        agent = %context.agent_id,
                        tool = %tool_id,
                        reason = %reason,
                        "Tool call denied"
                    );
                    self.record(
                        AuditEntry::new(
                            AuditKind::PermissionCheck,
                            &tool_id,
                            self.tool.name(),
                            &context.agent_id,
                            classification.level,
                            &input,
                            self.config.summary_chars,
                        )
                        .failed(reason.clone()),
                    )
                    .await;
                    self.emit(LifecycleEvent::PermissionDenied {
                        agent_id: context.agent_id.clone(),
                        tool_id: tool_id.clone(),
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
                    return Err(WardenError::Permission {
                        tool: tool_id,
                        reason,
                    });
                }
                (classification.level, false)
            }
        };

        let entry = AuditEntry::new(
            AuditKind::Execution,
            &tool_id,
            self.tool.name(),
            &context.agent_id,
            permission,
            &input,
            self.config.summary_chars,
        );
        let entry = if bypass { entry.with_flag("bypass") } else { entry };

        let deadline = self.config.default_timeout;
        let started = Instant::now();
        let invocation = AssertUnwindSafe(async { self.tool.invoke(input).await }).catch_unwind();
        let outcome = match timeout(deadline, invocation).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(error))) => Err(WardenError::ToolExecution(error)),
            Ok(Err(payload)) => Err(WardenError::Other(format!(
                "tool '{}' panicked: {}",
                tool_id,
                panic_message(payload.as_ref())
            ))),
            Err(_) => Err(WardenError::ToolTimeout {
                tool: tool_id.clone(),
                timeout: deadline,
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let entry = entry.with_duration_ms(duration_ms);
        let entry = match &outcome {
            Ok(output) => entry.succeeded(Some(output), self.config.summary_chars),
            Err(error) => entry.failed(error.to_string()),
        };
        self.record(entry).await;

        match &outcome {
            Ok(_) => tracing::debug!(
                agent = %context.agent_id,
                tool = %tool_id,
                permission = %permission,
                duration_ms,
                "Tool call completed"
            ),
            Err(error) => tracing::warn!(
                agent = %context.agent_id,
                tool = %tool_id,
                duration_ms,
                error = %error,
                "Tool call failed"
            ),
        }

        self.emit(LifecycleEvent::ToolCompleted {
            agent_id: context.agent_id.clone(),
            tool_id,
            success: outcome.is_ok(),
            duration_ms,
            error: outcome.as_ref().err().map(|e| e.to_string()),
            timestamp: Utc::now(),
        })
        .await;

        outcome
    }

    /// Classify now and attach a token valid for `duration_seconds`
    ///
    /// Replaces any previously attached token.
    pub async fn request_permission(&self, duration_seconds: i64) -> Result<PermissionLevel> {
        let context = self.context.read().await.clone();
        let tool_id = self.tool.name().to_string();

        match self.classifier.grant_temporary(
            &tool_id,
            &self.capabilities,
            &context,
            duration_seconds,
        ) {
            Ok(token) => {
                let level = token.permission;
                self.record(
                    AuditEntry::new(
                        AuditKind::PermissionCheck,
                        &tool_id,
                        self.tool.name(),
                        &context.agent_id,
                        level,
                        &Value::Null,
                        self.config.summary_chars,
                    )
                    .succeeded(None, self.config.summary_chars),
                )
                .await;
                self.emit(LifecycleEvent::PermissionGranted {
                    agent_id: context.agent_id.clone(),
                    tool_id,
                    level,
                    expires_at: token.expires_at,
                    timestamp: Utc::now(),
                })
                .await;
                *self.token.lock().await = Some(token);
                Ok(level)
            }
            Err(error) => {
                self.record(
                    AuditEntry::new(
                        AuditKind::PermissionCheck,
                        &tool_id,
                        self.tool.name(),
                        &context.agent_id,
                        PermissionLevel::Denied,
                        &Value::Null,
                        self.config.summary_chars,
                    )
                    .failed(error.to_string()),
                )
                .await;
                self.emit(LifecycleEvent::PermissionDenied {
                    agent_id: context.agent_id.clone(),
                    tool_id,
                    reason: error.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
                Err(error)
            }
        }
    }

    /// [`request_permission`](Self::request_permission) with the configured token lifetime
    pub async fn request_default_permission(&self) -> Result<PermissionLevel> {
        let seconds = i64::try_from(self.config.token_duration.as_secs()).unwrap_or(i64::MAX);
        self.request_permission(seconds).await
    }

    /// Attach a token obtained elsewhere, e.g. a purchased bypass
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Permission`] if the token was issued for a
    /// different tool or a different agent.
    pub async fn attach_token(&self, token: CapabilityToken) -> Result<()> {
        let agent_id = self.context.read().await.agent_id.clone();
        if let Some(reason) = foreign_token(&token, self.tool.name(), &agent_id) {
            return Err(WardenError::Permission {
                tool: self.tool.name().to_string(),
                reason,
            });
        }
        tracing::debug!(tool = %token.tool_id, token = %token.id, "Token attached");
        *self.token.lock().await = Some(token);
        Ok(())
    }

    /// Revoke the attached token, if any
    ///
    /// Returns `false` when there was no token to revoke.
    pub async fn revoke_token(&self, reason: &str) -> bool {
        let revoked = {
            let mut held = self.token.lock().await;
            match held.as_mut() {
                Some(token) if !token.is_revoked() => {
                    token.revoke(reason);
                    true
                }
                _ => false,
            }
        };

        if revoked {
            let agent_id = self.context.read().await.agent_id.clone();
            tracing::info!(agent = %agent_id, tool = %self.tool.name(), reason, "Token revoked");
            self.emit(LifecycleEvent::TokenRevoked {
                agent_id,
                tool_id: self.tool.name().to_string(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        }
        revoked
    }

    /// Drop the attached token so the next call classifies afresh
    pub async fn clear_token(&self) -> Option<CapabilityToken> {
        self.token.lock().await.take()
    }

    /// Current permission level and token state; never mutates anything
    pub async fn get_permission_status(&self) -> PermissionStatus {
        let context = self.context.read().await.clone();
        let held = self.token.lock().await;

        let permission = match held.as_ref() {
            Some(token)
                if token.is_valid()
                    && foreign_token(token, self.tool.name(), &context.agent_id).is_none() =>
            {
                token.permission
            }
            _ => self.classifier.classify(&self.capabilities, &context),
        };

        PermissionStatus {
            tool_id: self.tool.name().to_string(),
            context_id: context.agent_id,
            permission,
            token_valid: held.as_ref().map(CapabilityToken::is_valid),
            token_uses: held.as_ref().map(CapabilityToken::uses),
            token_expires_at: held.as_ref().map(|t| t.expires_at),
            bypass: held.as_ref().is_some_and(|t| t.bypass_event.is_some()),
        }
    }

    async fn record(&self, entry: AuditEntry) {
        if let Some(sink) = &self.audit {
            if let Err(e) = sink.record(entry).await {
                tracing::error!(tool = %self.tool.name(), error = %e, "Failed to write audit entry");
            }
        }
    }

    async fn emit(&self, event: LifecycleEvent) {
        if let Some(sink) = &self.events {
            sink.emit(event).await;
        }
    }
}

/// Why `token` may not be used by `agent_id` on `tool_id`, if it may not
fn foreign_token(token: &CapabilityToken, tool_id: &str, agent_id: &str) -> Option<String> {
    if token.tool_id != tool_id {
        Some(format!("token was issued for tool '{}'", token.tool_id))
    } else if token.context_id != agent_id {
        Some(format!("token was issued to agent '{}'", token.context_id))
    } else {
        None
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelEventSink, event_channel};
    use crate::security::InMemoryAuditLog;
    use crate::tools::{FnTool, ToolError, ToolMetadata};
    use serde_json::json;

    fn echo_tool() -> BoxedTool {
        Arc::new(FnTool::new(
            ToolMetadata::new("echo", "Echoes input"),
            |input| async move { Ok(input) },
        ))
    }

    fn failing_tool() -> BoxedTool {
        Arc::new(FnTool::new(
            ToolMetadata::new("broken", "Always fails"),
            |_| async move { Err(ToolError::internal("disk on fire")) },
        ))
    }

    fn slow_tool() -> BoxedTool {
        Arc::new(FnTool::new(
            ToolMetadata::new("slow", "Sleeps for a minute"),
            |_| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!("late"))
            },
        ))
    }

    #[tokio::test]
    async fn test_execute_allowed_writes_audit() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = SecureExecutor::new(echo_tool(), ToolCapabilities::none(), AgentContext::new("agent"))
            .with_audit_sink(audit.clone());

        let output = executor.execute(json!({"x": 1})).await.unwrap();
        assert_eq!(output, json!({"x": 1}));

        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, AuditKind::Execution);
        assert!(entries[0].success);
        assert!(!entries[0].flagged);
        assert_eq!(entries[0].permission, PermissionLevel::AllowedAudited);
    }

    #[tokio::test]
    async fn test_denied_call_never_invokes() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = invoked.clone();
        let tool: BoxedTool = Arc::new(FnTool::new(
            ToolMetadata::new("fetch", "Fetches a URL"),
            move |_| {
                let flag = flag.clone();
                async move {
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!(null))
                }
            },
        ));
        let executor = SecureExecutor::new(
            tool,
            ToolCapabilities::none().with_network(),
            AgentContext::new("agent"),
        )
        .with_audit_sink(audit.clone());

        let err = executor.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, WardenError::Permission { .. }));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));

        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, AuditKind::PermissionCheck);
        assert!(entries[0].flagged);
    }

    #[tokio::test]
    async fn test_tool_error_passes_through() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = SecureExecutor::new(failing_tool(), ToolCapabilities::none(), AgentContext::new("agent"))
            .with_audit_sink(audit.clone());

        let err = executor.execute(json!({})).await.unwrap_err();
        let tool_error = err.tool_error().unwrap();
        assert_eq!(tool_error.message, "disk on fire");
        assert_eq!(tool_error.code.as_deref(), Some("INTERNAL_ERROR"));

        let flagged = audit.flagged().await;
        assert_eq!(flagged.len(), 1);
        assert!(!flagged[0].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failure() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = SecureExecutor::new(slow_tool(), ToolCapabilities::none(), AgentContext::new("agent"))
            .with_audit_sink(audit.clone())
            .with_timeout(Duration::from_millis(100));

        let err = executor.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, WardenError::ToolTimeout { .. }));
        assert!(err.is_retryable());

        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].flagged);
        assert!(entries[0].duration_ms >= 100);
    }

    #[tokio::test]
    async fn test_restricted_runs_and_flags() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = SecureExecutor::new(
            echo_tool(),
            ToolCapabilities::none().with_user_approval(),
            AgentContext::new("agent"),
        )
        .with_audit_sink(audit.clone());

        executor.execute(json!("hi")).await.unwrap();

        let entries = audit.entries().await;
        assert_eq!(entries[0].permission, PermissionLevel::Restricted);
        assert!(entries[0].success);
        assert_eq!(entries[0].flag_reason.as_deref(), Some("restricted permission"));
    }

    #[tokio::test]
    async fn test_token_uses_counted() {
        let executor = SecureExecutor::new(echo_tool(), ToolCapabilities::none(), AgentContext::new("agent"));

        let level = executor.request_permission(60).await.unwrap();
        assert_eq!(level, PermissionLevel::AllowedAudited);

        executor.execute(json!(1)).await.unwrap();
        executor.execute(json!(2)).await.unwrap();

        let status = executor.get_permission_status().await;
        assert_eq!(status.token_valid, Some(true));
        assert_eq!(status.token_uses, Some(2));
    }

    #[tokio::test]
    async fn test_revoked_token_fails_without_invoking() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = SecureExecutor::new(echo_tool(), ToolCapabilities::none(), AgentContext::new("agent"))
            .with_audit_sink(audit.clone());

        executor.request_permission(60).await.unwrap();
        assert!(executor.revoke_token("operator request").await);
        assert!(!executor.revoke_token("again").await);

        let err = executor.execute(json!({})).await.unwrap_err();
        match err {
            WardenError::Token(crate::error::TokenError::Revoked { reason }) => {
                assert_eq!(reason, "operator request");
            }
            other => panic!("unexpected error: {other}"),
        }

        let executions: Vec<_> = audit
            .entries()
            .await
            .into_iter()
            .filter(|e| e.kind == AuditKind::Execution)
            .collect();
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_fails() {
        let executor = SecureExecutor::new(echo_tool(), ToolCapabilities::none(), AgentContext::new("agent"));
        executor.request_permission(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let err = executor.execute(json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            WardenError::Token(crate::error::TokenError::Expired)
        ));

        // Clearing the token falls back to classification
        executor.clear_token().await;
        executor.execute(json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_context_escalation_applies_to_next_call() {
        let executor = SecureExecutor::new(
            echo_tool(),
            ToolCapabilities::none().with_network(),
            AgentContext::new("agent"),
        );

        assert!(executor.execute(json!({})).await.is_err());

        executor.update_context(|ctx| ctx.allow_network = true).await;
        assert!(executor.execute(json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_has_no_side_effects() {
        let executor = SecureExecutor::new(
            echo_tool(),
            ToolCapabilities::none().with_pii(),
            AgentContext::new("agent"),
        );

        let first = executor.get_permission_status().await;
        let second = executor.get_permission_status().await;
        assert_eq!(first, second);
        assert_eq!(first.permission, PermissionLevel::Denied);
        assert_eq!(first.token_valid, None);
    }

    #[tokio::test]
    async fn test_attach_token_for_other_tool_rejected() {
        let executor = SecureExecutor::new(echo_tool(), ToolCapabilities::none(), AgentContext::new("agent"));
        let token = CapabilityToken::issue(
            "other",
            "agent",
            ToolCapabilities::none(),
            PermissionLevel::Allowed,
            60,
        );
        assert!(executor.attach_token(token).await.is_err());
    }

    #[tokio::test]
    async fn test_bypass_token_is_flagged() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = SecureExecutor::new(
            echo_tool(),
            ToolCapabilities::none().with_network(),
            AgentContext::new("agent"),
        )
        .with_audit_sink(audit.clone());

        let token = CapabilityToken::issue(
            "echo",
            "agent",
            ToolCapabilities::none().with_network(),
            PermissionLevel::AllowedAudited,
            60,
        )
        .with_bypass_event(7);
        executor.attach_token(token).await.unwrap();

        executor.execute(json!({})).await.unwrap();

        let entries = audit.entries().await;
        assert_eq!(entries[0].flag_reason.as_deref(), Some("bypass"));
        assert!(executor.get_permission_status().await.bypass);
    }

    #[tokio::test]
    async fn test_lifecycle_events_emitted() {
        let (tx, mut rx) = event_channel(8);
        let executor = SecureExecutor::new(echo_tool(), ToolCapabilities::none(), AgentContext::new("agent"))
            .with_event_sink(Arc::new(ChannelEventSink::new(tx)));

        executor.request_permission(60).await.unwrap();
        executor.execute(json!({})).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event_type(), "permission_granted");
        assert_eq!(rx.recv().await.unwrap().event_type(), "tool_completed");
    }

    #[tokio::test]
    async fn test_token_for_other_agent_rejected() {
        let caps = ToolCapabilities::none().with_network();
        let other = AgentContext::new("b").with_network(true);
        let token = PermissionClassifier::new()
            .grant_temporary("echo", &caps, &other, 60)
            .unwrap();

        let executor = SecureExecutor::new(echo_tool(), caps, AgentContext::new("a"));
        let err = executor.attach_token(token).await.unwrap_err();
        assert!(matches!(err, WardenError::Permission { .. }));
        assert!(err.to_string().contains("agent 'b'"));

        assert!(matches!(
            executor.execute(json!({})).await,
            Err(WardenError::Permission { .. })
        ));
    }

    #[tokio::test]
    async fn test_foreign_token_from_builder_fails_at_use() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let token = CapabilityToken::issue(
            "echo",
            "b",
            ToolCapabilities::none().with_network(),
            PermissionLevel::Allowed,
            60,
        );
        let executor = SecureExecutor::new(
            echo_tool(),
            ToolCapabilities::none().with_network(),
            AgentContext::new("a"),
        )
        .with_audit_sink(audit.clone())
        .with_token(token);

        assert!(matches!(
            executor.execute(json!({})).await,
            Err(WardenError::Permission { .. })
        ));
        assert_eq!(
            executor.get_permission_status().await.permission,
            PermissionLevel::Denied
        );

        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, AuditKind::PermissionCheck);
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn test_panicking_tool_is_audited() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let (tx, mut rx) = event_channel(8);
        let tool: BoxedTool = Arc::new(FnTool::new(
            ToolMetadata::new("exploding", "Panics"),
            |input| async move {
                let explode = true;
                if explode {
                    panic!("kaboom");
                }
                Ok(input)
            },
        ));
        let executor = SecureExecutor::new(tool, ToolCapabilities::none(), AgentContext::new("agent"))
            .with_audit_sink(audit.clone())
            .with_event_sink(Arc::new(ChannelEventSink::new(tx)));

        let err = executor.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("kaboom"));

        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, AuditKind::Execution);
        assert!(!entries[0].success);
        assert!(entries[0].flagged);

        match rx.recv().await.unwrap() {
            LifecycleEvent::ToolCompleted { success, .. } => assert!(!success),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
