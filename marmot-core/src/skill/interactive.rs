//! Interactive skill manager
//!
//! Serves a statically declared tool set whose answers come from outside the
//! engine (a human, an external channel). Invocation only marks a pause
//! point; the actual answer arrives later as resumed input.

use super::gate::InitGate;
use super::{SkillKind, SkillManager, ToolOutput};
use crate::error::SkillError;
use crate::types::ToolDef;
use async_trait::async_trait;
use serde_json::Value;

pub struct InteractiveSkillManager {
    skill_name: String,
    tools: Vec<ToolDef>,
    gate: InitGate,
}

impl InteractiveSkillManager {
    pub fn new(skill_name: impl Into<String>, tools: Vec<ToolDef>) -> Self {
        Self {
            skill_name: skill_name.into(),
            tools,
            gate: InitGate::new(),
        }
    }
}

#[async_trait]
impl SkillManager for InteractiveSkillManager {
    fn kind(&self) -> SkillKind {
        SkillKind::Interactive
    }

    fn name(&self) -> &str {
        &self.skill_name
    }

    async fn init(&self) -> Result<(), SkillError> {
        self.gate.run_init(|| async { Ok(()) }).await
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDef>, SkillError> {
        self.gate.wait_ready().await?;
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, _name: &str, _args: &Value) -> Result<ToolOutput, SkillError> {
        Ok(ToolOutput::empty())
    }

    async fn close(&self) -> Result<(), SkillError> {
        Ok(())
    }
}
