//! Remote skill manager
//!
//! Adapts one MCP connection to the core `SkillManager` contract. Init
//! connects and lists tools exactly once; provider-side tool failures are
//! folded into error-text output so a misbehaving tool never aborts the run,
//! while transport breakage surfaces as a fatal `SkillError::Transport`.

use crate::{McpConnection, McpError};
use async_trait::async_trait;
use marmot_core::{
    Expert, InitGate, RemoteSkillConfig, SkillConfig, SkillError, SkillKind, SkillManager,
    ToolDef, ToolOutput,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct RemoteSkillManager {
    skill_name: String,
    config: RemoteSkillConfig,
    gate: InitGate,
    connection: RwLock<Option<McpConnection>>,
    tools: RwLock<Vec<ToolDef>>,
    closed: AtomicBool,
}

impl RemoteSkillManager {
    pub fn new(skill_name: impl Into<String>, config: RemoteSkillConfig) -> Self {
        Self {
            skill_name: skill_name.into(),
            config,
            gate: InitGate::new(),
            connection: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Build one remote manager per remote skill an expert declares
    pub fn for_expert(expert: &Expert) -> Vec<Arc<dyn SkillManager>> {
        expert
            .skills
            .iter()
            .filter_map(|(name, config)| match config {
                SkillConfig::Remote(remote) => Some(Arc::new(RemoteSkillManager::new(
                    name.clone(),
                    remote.clone(),
                )) as Arc<dyn SkillManager>),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SkillManager for RemoteSkillManager {
    fn kind(&self) -> SkillKind {
        SkillKind::Remote
    }

    fn name(&self) -> &str {
        &self.skill_name
    }

    async fn init(&self) -> Result<(), SkillError> {
        self.gate
            .run_init(|| async {
                let connection = McpConnection::connect(&self.skill_name, &self.config)
                    .await
                    .map_err(init_error)?;
                let tools = connection.list_tools().await.map_err(init_error)?;
                tracing::info!(
                    skill = %self.skill_name,
                    tools = tools.len(),
                    "remote skill initialized"
                );
                *self.connection.write().await = Some(connection);
                *self.tools.write().await = tools;
                Ok(())
            })
            .await
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDef>, SkillError> {
        self.gate.wait_ready().await?;
        Ok(self.tools.read().await.clone())
    }

    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolOutput, SkillError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SkillError::Closed);
        }
        self.gate.wait_ready().await?;

        let guard = self.connection.read().await;
        let Some(connection) = guard.as_ref() else {
            return Err(SkillError::Closed);
        };

        match connection.call_tool(name, args).await {
            Ok(outcome) => Ok(ToolOutput {
                parts: outcome.parts,
                is_error: outcome.is_error,
            }),
            Err(err) if err.is_transport() => Err(SkillError::Transport {
                reason: err.to_string(),
            }),
            Err(err) => Ok(ToolOutput::error_text(err.to_string())),
        }
    }

    async fn close(&self) -> Result<(), SkillError> {
        // Idempotent; closing twice is a no-op.
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(connection) = self.connection.write().await.take() {
            if let Err(err) = connection.close().await {
                tracing::debug!(
                    skill = %self.skill_name,
                    error = %err,
                    "error closing MCP connection"
                );
            }
        }
        Ok(())
    }
}

fn init_error(err: McpError) -> SkillError {
    SkillError::InitFailed {
        reason: err.to_string(),
    }
}
