//! Expert definitions and resolution
//!
//! An expert is a declaratively defined agent: an instruction plus the tool
//! providers (skills) and delegate experts it may call. Experts are immutable
//! once loaded and resolved exactly once before a run starts.

use crate::error::RunError;
use crate::setting::RunSetting;
use crate::types::ToolDef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named, versioned agent definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Expert {
    /// Stable key, possibly namespaced (e.g. `acme/math-expert`)
    pub key: String,
    /// Display name
    pub name: String,
    /// Semver version string
    pub version: String,
    /// Free-text instruction injected as the system message
    pub instruction: String,
    /// Named skills attached to this expert
    #[serde(default)]
    pub skills: IndexMap<String, SkillConfig>,
    /// Keys of experts this one may delegate to
    #[serde(default)]
    pub delegates: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Expert {
    /// All delegate keys this expert references, from both the `delegates`
    /// list and delegate-typed skills.
    pub fn delegate_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.delegates.iter().map(String::as_str).collect();
        for config in self.skills.values() {
            if let SkillConfig::Delegate { expert } = config {
                if !keys.contains(&expert.as_str()) {
                    keys.push(expert);
                }
            }
        }
        keys
    }
}

/// The slice of an expert's identity carried in checkpoints and events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExpertIdentity {
    pub key: String,
    pub name: String,
    pub version: String,
}

impl From<&Expert> for ExpertIdentity {
    fn from(expert: &Expert) -> Self {
        Self {
            key: expert.key.clone(),
            name: expert.name.clone(),
            version: expert.version.clone(),
        }
    }
}

/// Configuration of one skill attached to an expert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkillConfig {
    /// A remote MCP-style tool server
    Remote(RemoteSkillConfig),
    /// Delegation to another expert; calling its synthesized tool pauses
    /// the run instead of executing anything
    Delegate { expert: String },
    /// Statically declared tools answered by a human/external channel
    Interactive { tools: Vec<ToolDef> },
}

/// Transport configuration for a remote tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteSkillConfig {
    /// Spawn a subprocess and speak over stdio
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Connect to a server over HTTP
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Transport selection (default: streamable-http)
        #[serde(default)]
        transport: Option<HttpTransport>,
    },
}

/// HTTP transport selection for URL-based tool servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HttpTransport {
    #[default]
    StreamableHttp,
    Sse,
}

/// Derive the short tool name a delegate skill exposes for an expert key.
///
/// Keys may be namespaced; only the last segment becomes the tool name, and
/// characters outside `[A-Za-z0-9_-]` are mapped to `_` so the name is valid
/// for every provider's tool-name grammar.
pub fn delegate_tool_name(key: &str) -> String {
    let short = key.rsplit('/').next().unwrap_or(key);
    short
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Validate that the target expert and every transitively referenced
/// delegate resolve inside the setting's expert map.
///
/// This is the fatal setup check per run: it fires before any checkpoint is
/// produced, so an unresolved delegate can never surface mid-run.
pub fn resolve_experts(setting: &RunSetting) -> Result<&Expert, RunError> {
    let target = setting
        .experts
        .get(&setting.expert_key)
        .ok_or_else(|| RunError::ExpertNotFound {
            key: setting.expert_key.clone(),
        })?;

    let mut visited: Vec<&str> = Vec::new();
    let mut queue: Vec<&Expert> = vec![target];
    while let Some(expert) = queue.pop() {
        if visited.contains(&expert.key.as_str()) {
            continue;
        }
        visited.push(&expert.key);
        for delegate in expert.delegate_keys() {
            match setting.experts.get(delegate) {
                Some(resolved) => queue.push(resolved),
                None => {
                    return Err(RunError::DelegateNotResolved {
                        expert: expert.key.clone(),
                        delegate: delegate.to_string(),
                    });
                }
            }
        }
    }

    Ok(target)
}
