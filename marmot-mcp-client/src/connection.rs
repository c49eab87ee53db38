//! MCP connection management

use crate::McpError;
use marmot_core::{ContentPart, HttpTransport, RemoteSkillConfig, ToolDef};
use rmcp::model::{CallToolRequestParam, RawContent, ResourceContents};
use rmcp::service::{RoleClient, RunningService, ServiceError, ServiceExt};
use rmcp::transport::sse_client::{SseClientConfig, SseClientTransport};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use tokio::process::Command;

/// Result of one tools/call round trip
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub parts: Vec<ContentPart>,
    pub is_error: bool,
}

/// Connection to one MCP tool server
pub struct McpConnection {
    name: String,
    service: RunningService<RoleClient, ()>,
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl McpConnection {
    /// Connect to an MCP server and perform the initialize handshake
    pub async fn connect(name: &str, config: &RemoteSkillConfig) -> Result<Self, McpError> {
        let service = match config {
            RemoteSkillConfig::Stdio { command, args, env } => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                for (key, value) in env {
                    cmd.env(key, value);
                }

                let transport =
                    TokioChildProcess::new(cmd).map_err(|e| McpError::ConnectionFailed {
                        reason: format!("failed to spawn process: {e}"),
                    })?;

                ().serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        reason: format!("failed to establish MCP connection: {e}"),
                    })?
            }
            RemoteSkillConfig::Http {
                url,
                headers,
                transport,
            } => {
                let client = http_client(headers)?;
                match transport.unwrap_or_default() {
                    HttpTransport::StreamableHttp => {
                        let transport = StreamableHttpClientTransport::with_client(
                            client,
                            StreamableHttpClientTransportConfig::with_uri(url.clone()),
                        );
                        ().serve(transport)
                            .await
                            .map_err(|e| McpError::ConnectionFailed {
                                reason: format!("failed to establish MCP connection: {e}"),
                            })?
                    }
                    HttpTransport::Sse => {
                        let transport = SseClientTransport::start_with_client(
                            client,
                            SseClientConfig {
                                sse_endpoint: url.clone().into(),
                                ..Default::default()
                            },
                        )
                        .await
                        .map_err(|e| McpError::ConnectionFailed {
                            reason: format!("failed to establish SSE connection: {e}"),
                        })?;
                        ().serve(transport)
                            .await
                            .map_err(|e| McpError::ConnectionFailed {
                                reason: format!("failed to establish MCP connection: {e}"),
                            })?
                    }
                }
            }
        };

        tracing::debug!(skill = name, "MCP connection established");
        Ok(Self {
            name: name.to_string(),
            service,
        })
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<ToolDef>, McpError> {
        let response =
            self.service
                .list_tools(None)
                .await
                .map_err(|e| McpError::ProtocolError {
                    message: format!("failed to list tools: {e}"),
                })?;

        let tools = response
            .tools
            .into_iter()
            .map(|t| {
                let inner_map = std::sync::Arc::unwrap_or_clone(t.input_schema);
                ToolDef {
                    name: t.name.to_string(),
                    description: t.description.unwrap_or_default().to_string(),
                    input_schema: Value::Object(inner_map),
                }
            })
            .collect();

        Ok(tools)
    }

    /// Call a tool and convert the wire result into typed content parts.
    ///
    /// A result the server flags as an error still comes back `Ok` with
    /// `is_error` set — the provider answered, it just answered "no".
    pub async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolCallOutcome, McpError> {
        let arguments = args.as_object().cloned();

        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| match e {
                ServiceError::McpError(data) => McpError::ToolCallFailed {
                    tool: name.to_string(),
                    reason: data.to_string(),
                },
                other => McpError::TransportFailed {
                    reason: format!("{other}"),
                },
            })?;

        let parts = result.content.into_iter().filter_map(convert_content).collect();

        Ok(ToolCallOutcome {
            parts,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    /// Close the connection
    pub async fn close(self) -> Result<(), McpError> {
        self.service
            .cancel()
            .await
            .map_err(|e| McpError::TransportFailed {
                reason: format!("failed to close connection: {e:?}"),
            })?;
        tracing::debug!(skill = %self.name, "MCP connection closed");
        Ok(())
    }
}

fn convert_content(content: rmcp::model::Content) -> Option<ContentPart> {
    match content.raw {
        RawContent::Text(text) => Some(ContentPart::Text { text: text.text }),
        RawContent::Image(image) => Some(ContentPart::Image {
            data: image.data,
            mime_type: image.mime_type,
        }),
        RawContent::Resource(embedded) => match embedded.resource {
            ResourceContents::TextResourceContents { text, .. } => {
                Some(ContentPart::Text { text })
            }
            ResourceContents::BlobResourceContents {
                blob,
                mime_type,
                uri,
                ..
            } => Some(ContentPart::File {
                data: blob,
                mime_type: mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                name: Some(uri),
            }),
        },
        other => {
            tracing::debug!(kind = ?other, "skipping unsupported MCP content kind");
            None
        }
    }
}

fn http_client(headers: &HashMap<String, String>) -> Result<reqwest::Client, McpError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| McpError::InvalidHeader {
            reason: format!("{key}: {e}"),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| McpError::InvalidHeader {
            reason: format!("{key}: {e}"),
        })?;
        map.insert(name, value);
    }
    reqwest::Client::builder()
        .default_headers(map)
        .build()
        .map_err(|e| McpError::ConnectionFailed {
            reason: format!("failed to build HTTP client: {e}"),
        })
}
