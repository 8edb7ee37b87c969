// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Agent callback channel.
//!
//! The engine never talks to the agent host directly; `agent`, `checkpoint`
//! and `mcp` steps (and documentation preload) go through one capability:
//! `invoke(verb, payload) -> value`. Richer typing can be layered on by the
//! host without changing the engine.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Verbs the engine may invoke on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackVerb {
    /// Preload documentation libraries before steps run.
    UseContext7,
    /// Execute an agent-delegated step.
    ExecuteStep,
    /// Ask the host whether to continue past a checkpoint.
    Checkpoint,
    /// Call an MCP tool on behalf of a step.
    McpCall,
}

impl CallbackVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UseContext7 => "use_context7",
            Self::ExecuteStep => "execute_step",
            Self::Checkpoint => "checkpoint",
            Self::McpCall => "mcp_call",
        }
    }
}

impl std::fmt::Display for CallbackVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a host callback.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Host-supplied capability for agent-delegated work.
#[async_trait]
pub trait AgentCallback: Send + Sync {
    /// Invoke the host with a verb and a JSON payload, returning whatever
    /// JSON value the host produces.
    async fn invoke(&self, verb: CallbackVerb, payload: Value) -> Result<Value, CallbackError>;
}

/// Truthiness of a JSON value, matching dynamic-language semantics:
/// null, false, zero, the empty string and empty containers are falsy.
pub fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verb_names() {
        assert_eq!(CallbackVerb::UseContext7.as_str(), "use_context7");
        assert_eq!(CallbackVerb::ExecuteStep.as_str(), "execute_step");
        assert_eq!(CallbackVerb::Checkpoint.as_str(), "checkpoint");
        assert_eq!(CallbackVerb::McpCall.as_str(), "mcp_call");
    }

    #[test]
    fn test_value_truthy() {
        assert!(!value_truthy(&Value::Null));
        assert!(!value_truthy(&json!(false)));
        assert!(!value_truthy(&json!(0)));
        assert!(!value_truthy(&json!("")));
        assert!(!value_truthy(&json!([])));
        assert!(!value_truthy(&json!({})));

        assert!(value_truthy(&json!(true)));
        assert!(value_truthy(&json!(1)));
        assert!(value_truthy(&json!("ok")));
        assert!(value_truthy(&json!([1])));
        assert!(value_truthy(&json!({"k": 1})));
    }
}
