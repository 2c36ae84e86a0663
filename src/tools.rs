//! Tool definitions and handlers.
//!
//! Each tool is defined as a JSON schema (returned by [`tool_definitions`])
//! and handled by an async function dispatched from [`handle_tool_call`].
//! Every handler makes exactly one request through
//! [`HassClient`](crate::client::HassClient):
//!
//! - `get_state` - `GET /api/states/{entity_id}`
//! - `toggle_entity` - `POST /api/services/homeassistant/turn_{on,off}`
//! - `trigger_automation` - `POST /api/services/automation/trigger`
//! - `list_entities` - `GET /api/states`, optionally filtered by domain

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::client::{ClientError, EntityState, HassClient};
use crate::mcp::{ErrorCode, McpError};

/// Returns the tool catalog in a fixed order.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_state",
            "description": "Get the current state of a Home Assistant entity.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "entity_id": {
                        "type": "string",
                        "description": "Entity ID to read (e.g. light.living_room)."
                    }
                },
                "required": ["entity_id"]
            }
        }),
        json!({
            "name": "toggle_entity",
            "description": "Turn a Home Assistant entity on or off.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "entity_id": {
                        "type": "string",
                        "description": "Entity ID to switch (e.g. switch.bedroom)."
                    },
                    "state": {
                        "type": "string",
                        "description": "Desired state.",
                        "enum": ["on", "off"]
                    }
                },
                "required": ["entity_id", "state"]
            }
        }),
        json!({
            "name": "trigger_automation",
            "description": "Trigger a Home Assistant automation.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "automation_id": {
                        "type": "string",
                        "description": "Automation entity ID (e.g. automation.morning_routine)."
                    }
                },
                "required": ["automation_id"]
            }
        }),
        json!({
            "name": "list_entities",
            "description": "List the entities available in Home Assistant.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "domain": {
                        "type": "string",
                        "description": "Optional domain filter (e.g. light, switch, automation)."
                    }
                }
            }
        }),
    ]
}

/// Handle a tool call and return its content payload.
pub async fn handle_tool_call(
    name: &str,
    args: &Map<String, Value>,
    client: &HassClient,
) -> Result<Value, McpError> {
    debug!(tool = name, "handling tool call");
    match name {
        "get_state" => handle_get_state(args, client).await,
        "toggle_entity" => handle_toggle_entity(args, client).await,
        "trigger_automation" => handle_trigger_automation(args, client).await,
        "list_entities" => handle_list_entities(args, client).await,
        _ => Err(McpError::new(
            ErrorCode::MethodNotFound,
            format!("unknown tool: {name}"),
        )),
    }
}

/// A single text content block: `{"content": [{"type": "text", "text": ...}]}`.
fn text_content(text: impl Into<String>) -> Value {
    json!({
        "content": [
            { "type": "text", "text": text.into() }
        ]
    })
}

fn to_pretty_json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("JSON serialization error: {e}"))
}

/// A required, non-empty string argument.
fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, McpError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| McpError::invalid_params(format!("{key} is required")))
}

fn client_error(tool: &str, err: ClientError) -> McpError {
    warn!(tool, error = %err, "Home Assistant request failed");
    match err {
        ClientError::Api { status } => McpError::new(
            ErrorCode::HomeAssistantApiError,
            format!("status code: {status}"),
        ),
        ClientError::Request(e) => McpError::internal(e.to_string()),
        ClientError::Protocol(msg) => McpError::internal(msg),
    }
}

async fn handle_get_state(args: &Map<String, Value>, client: &HassClient) -> Result<Value, McpError> {
    let entity_id = required_str(args, "entity_id")?;
    let state = client
        .get_state(entity_id)
        .await
        .map_err(|e| client_error("get_state", e))?;
    Ok(text_content(to_pretty_json(&state)))
}

async fn handle_toggle_entity(
    args: &Map<String, Value>,
    client: &HassClient,
) -> Result<Value, McpError> {
    let entity_id = required_str(args, "entity_id")?;
    let state = match args.get("state").and_then(Value::as_str) {
        Some(s @ ("on" | "off")) => s,
        _ => return Err(McpError::invalid_params("state must be 'on' or 'off'")),
    };

    client
        .call_service(
            "homeassistant",
            &format!("turn_{state}"),
            &json!({ "entity_id": entity_id }),
        )
        .await
        .map_err(|e| client_error("toggle_entity", e))?;

    Ok(text_content(format!(
        "Successfully set {entity_id} to {state}"
    )))
}

async fn handle_trigger_automation(
    args: &Map<String, Value>,
    client: &HassClient,
) -> Result<Value, McpError> {
    let automation_id = required_str(args, "automation_id")?;

    client
        .call_service("automation", "trigger", &json!({ "entity_id": automation_id }))
        .await
        .map_err(|e| client_error("trigger_automation", e))?;

    Ok(text_content(format!(
        "Successfully triggered automation {automation_id}"
    )))
}

async fn handle_list_entities(
    args: &Map<String, Value>,
    client: &HassClient,
) -> Result<Value, McpError> {
    let domain = args
        .get("domain")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty());

    let entities = client
        .list_states()
        .await
        .map_err(|e| client_error("list_entities", e))?;

    Ok(text_content(to_pretty_json(&summarize_entities(
        &entities, domain,
    ))))
}

/// Keep entities in `domain` (all if `None`) and reduce each to
/// `entity_id`, `state` and `attributes`.
fn summarize_entities(entities: &[EntityState], domain: Option<&str>) -> Vec<Value> {
    entities
        .iter()
        .filter(|e| domain.map_or(true, |d| in_domain(e, d)))
        .map(|e| {
            json!({
                "entity_id": e.get("entity_id").cloned().unwrap_or(Value::Null),
                "state": e.get("state").cloned().unwrap_or(Value::Null),
                "attributes": e.get("attributes").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

/// `true` if the entity id is `{domain}.<something>`.
fn in_domain(entity: &EntityState, domain: &str) -> bool {
    entity
        .get("entity_id")
        .and_then(Value::as_str)
        .and_then(|id| id.strip_prefix(domain))
        .is_some_and(|rest| rest.starts_with('.'))
}
