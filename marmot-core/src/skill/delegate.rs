//! Delegate skill manager
//!
//! Synthesizes exactly one tool named after the target expert. Calling that
//! tool is never executed here — it is the signal the classifier turns into
//! a delegation pause.

use super::gate::InitGate;
use super::{SkillKind, SkillManager, ToolOutput};
use crate::error::SkillError;
use crate::expert::{delegate_tool_name, ExpertIdentity};
use crate::types::ToolDef;
use async_trait::async_trait;
use serde_json::Value;

pub struct DelegateSkillManager {
    skill_name: String,
    target: ExpertIdentity,
    tool_name: String,
    gate: InitGate,
}

impl DelegateSkillManager {
    pub fn new(skill_name: impl Into<String>, target: ExpertIdentity) -> Self {
        let tool_name = delegate_tool_name(&target.key);
        Self {
            skill_name: skill_name.into(),
            target,
            tool_name,
            gate: InitGate::new(),
        }
    }

    /// The synthesized tool's name
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn tool_def(&self) -> ToolDef {
        ToolDef {
            name: self.tool_name.clone(),
            description: format!(
                "Delegate a sub-task to the '{}' expert. The expert answers the query \
                 independently and its result is returned as this tool's output.",
                self.target.name
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The sub-task for the delegate expert"
                    }
                },
                "required": ["query"]
            }),
        }
    }
}

#[async_trait]
impl SkillManager for DelegateSkillManager {
    fn kind(&self) -> SkillKind {
        SkillKind::Delegate
    }

    fn name(&self) -> &str {
        &self.skill_name
    }

    async fn init(&self) -> Result<(), SkillError> {
        self.gate.run_init(|| async { Ok(()) }).await
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDef>, SkillError> {
        self.gate.wait_ready().await?;
        Ok(vec![self.tool_def()])
    }

    async fn call_tool(&self, _name: &str, _args: &Value) -> Result<ToolOutput, SkillError> {
        // Invocation is a classifier signal; there is nothing to execute.
        Ok(ToolOutput::empty())
    }

    async fn close(&self) -> Result<(), SkillError> {
        Ok(())
    }

    fn delegate_target(&self) -> Option<&ExpertIdentity> {
        Some(&self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DelegateSkillManager {
        DelegateSkillManager::new(
            "math".to_string(),
            ExpertIdentity {
                key: "acme/math-expert".to_string(),
                name: "Math Expert".to_string(),
                version: "2.1.0".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_synthesizes_single_query_tool() {
        let m = manager();
        m.init().await.unwrap();
        let tools = m.tool_definitions().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "math-expert");
        assert_eq!(tools[0].input_schema["required"][0], "query");
    }

    #[tokio::test]
    async fn test_tool_definitions_require_init() {
        let m = manager();
        let err = m.tool_definitions().await.unwrap_err();
        assert!(matches!(err, SkillError::NotInitialized));
    }

    #[tokio::test]
    async fn test_call_is_a_noop_signal() {
        let m = manager();
        m.init().await.unwrap();
        let out = m
            .call_tool("math-expert", &serde_json::json!({"query": "2+2"}))
            .await
            .unwrap();
        assert!(out.parts.is_empty());
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn test_exposes_delegate_target() {
        let m = manager();
        assert_eq!(m.delegate_target().unwrap().key, "acme/math-expert");
    }
}
