//! Invocation input and result types.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────────────────

/// Input for an agent-type capability: a free-text instruction plus optional
/// structured context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub instruction: String,
    /// Conversation scope; the executor derives it from task id and role so
    /// repeated invocations of the same role share a session.
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl AgentInput {
    pub fn new(instruction: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            session_id: session_id.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trace events
// ─────────────────────────────────────────────────────────────────────────────

/// A sub-operation observed during an agent invocation.
///
/// Ordering of trace events reflects real invocation order; they are used
/// only for postcondition checking and must never be re-ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Name of the sub-operation the agent invoked.
    pub operation: String,
    /// HTTP status or equivalent outcome code.
    pub status: u16,
}

impl TraceEvent {
    pub fn new(operation: impl Into<String>, status: u16) -> Self {
        Self {
            operation: operation.into(),
            status,
        }
    }

    /// True if the sub-operation reported success.
    pub fn succeeded(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Invocation result
// ─────────────────────────────────────────────────────────────────────────────

/// The normalized result of one agent invocation.
///
/// Ephemeral: consumed by the executor for postcondition checks and payload
/// extraction, never persisted beyond logs.
#[derive(Debug, Clone, Default)]
pub struct CapabilityInvocation {
    pub capability_id: String,
    /// Text deltas concatenated in arrival order.
    pub final_text: String,
    /// Trace events in arrival order.
    pub trace_events: Vec<TraceEvent>,
}

impl CapabilityInvocation {
    pub fn new(capability_id: impl Into<String>) -> Self {
        Self {
            capability_id: capability_id.into(),
            ..Default::default()
        }
    }

    /// An invocation with text output and no trace (common for reasoning-only
    /// roles).
    pub fn with_text(capability_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            capability_id: capability_id.into(),
            final_text: text.into(),
            trace_events: Vec::new(),
        }
    }

    /// Names of sub-operations that were invoked with a success status.
    pub fn succeeded_operations(&self) -> Vec<&str> {
        self.trace_events
            .iter()
            .filter(|e| e.succeeded())
            .map(|e| e.operation.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_event_success_window() {
        assert!(TraceEvent::new("create-branch", 201).succeeded());
        assert!(TraceEvent::new("create-branch", 200).succeeded());
        assert!(!TraceEvent::new("create-branch", 422).succeeded());
        assert!(!TraceEvent::new("create-branch", 500).succeeded());
        assert!(!TraceEvent::new("create-branch", 302).succeeded());
    }

    #[test]
    fn test_succeeded_operations_filters_failures() {
        let mut inv = CapabilityInvocation::new("pr-manager-1");
        inv.trace_events.push(TraceEvent::new("create-branch", 201));
        inv.trace_events.push(TraceEvent::new("create-file", 500));
        inv.trace_events
            .push(TraceEvent::new("open-change-request", 201));
        assert_eq!(
            inv.succeeded_operations(),
            vec!["create-branch", "open-change-request"]
        );
    }
}
