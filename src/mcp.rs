//! Line-delimited JSON request handler.
//!
//! Reads one request object per line from stdin and writes exactly one
//! response object per line to stdout. Lines that are not a request object
//! (including blank lines and invalid UTF-8) are answered with
//! `InvalidRequest` and the loop keeps going.
//!
//! ## Request
//!
//! ```json
//! {"type": "request", "method": "call_tool", "params": {"name": "get_state", "arguments": {"entity_id": "light.kitchen"}}}
//! ```
//!
//! `type` is accepted and ignored. A missing or `null` `method` is the empty
//! method name, as is a missing or `null` tool `name` in `params`.
//!
//! ## Supported methods
//!
//! | Method       | Description                              |
//! |--------------|------------------------------------------|
//! | `list_tools` | Return the tool catalog                  |
//! | `call_tool`  | Execute a tool and return its content    |
//!
//! ## Response
//!
//! ```json
//! {"type": "response", "content": {...}}
//! {"type": "error", "error": {"code": "InvalidParams", "message": "..."}}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::client::HassClient;
use crate::tools;

/// Error codes carried in an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    InvalidRequest,
    InvalidParams,
    MethodNotFound,
    InternalError,
    #[serde(rename = "HomeAssistantAPIError")]
    HomeAssistantApiError,
}

/// The `error` object of an error response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// An incoming request line.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// `params` of a `call_tool` request.
#[derive(Debug, Default, Deserialize)]
struct CallToolParams {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Response,
    Error,
}

/// An outgoing response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl Response {
    pub fn success(content: Value) -> Self {
        Self {
            kind: ResponseKind::Response,
            content: Some(content),
            error: None,
        }
    }

    pub fn error(error: McpError) -> Self {
        Self {
            kind: ResponseKind::Error,
            content: None,
            error: Some(error),
        }
    }
}

/// Dispatches requests against one Home Assistant instance.
pub struct Server {
    client: HassClient,
    tools: Vec<Value>,
}

impl Server {
    pub fn new(client: HassClient) -> Self {
        Self {
            client,
            tools: tools::tool_definitions(),
        }
    }

    /// Handle one input line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line.trim()) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                warn!(error = %e, "unparseable request line");
                Response::error(McpError::new(
                    ErrorCode::InvalidRequest,
                    format!("failed to parse request: {e}"),
                ))
            }
        }
    }

    /// Route a parsed request to `list_tools` or `call_tool`.
    pub async fn dispatch(&self, request: Request) -> Response {
        debug!(method = %request.method, "dispatching request");
        match request.method.as_str() {
            "list_tools" => Response::success(json!({ "tools": self.tools })),
            "call_tool" => self.handle_call_tool(request.params).await,
            other => Response::error(McpError::new(
                ErrorCode::MethodNotFound,
                format!("unknown method: {other}"),
            )),
        }
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Response {
        let params = match params {
            None | Some(Value::Null) => CallToolParams::default(),
            Some(v) => match serde_json::from_value::<CallToolParams>(v) {
                Ok(p) => p,
                Err(e) => {
                    debug!(error = %e, "bad call_tool params");
                    return Response::error(McpError::invalid_params(
                        "failed to parse call_tool params",
                    ));
                }
            },
        };

        let args = params.arguments.unwrap_or_default();
        match tools::handle_tool_call(&params.name, &args, &self.client).await {
            Ok(content) => Response::success(content),
            Err(e) => Response::error(e),
        }
    }
}

/// Process requests from `reader` until EOF, writing one response line per
/// input line to `writer`. Only I/O errors on `reader` end the loop early.
pub async fn run<R, W>(server: &Server, mut reader: R, writer: &mut W)
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "stdin read error");
                break;
            }
        }

        // Invalid UTF-8 becomes U+FFFD and is left to the JSON parser.
        let line = String::from_utf8_lossy(&buf);
        let response = server.handle_line(&line).await;
        write_response(writer, &response).await;
    }
}

/// Write a response as one line, flushed immediately.
async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) {
    let mut output = serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, "response serialization failed");
        r#"{"type":"error","error":{"code":"InternalError","message":"response serialization failed"}}"#
            .to_string()
    });
    output.push('\n');
    if let Err(e) = writer.write_all(output.as_bytes()).await {
        error!(error = %e, "stdout write error");
    }
    if let Err(e) = writer.flush().await {
        error!(error = %e, "stdout flush error");
    }
}
