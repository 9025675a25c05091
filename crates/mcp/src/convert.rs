//! Conversions between MCP payloads and the agent's tool types.

use rmcp::model::{
    CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    ProtocolVersion, RawContent, Tool,
};
use serde_json::Value;
use toolbridge_core::tool::{
    ContentPart, ParameterSchema, ToolCallOutput, ToolDescriptor,
};

use crate::config::McpConfig;

pub(crate) fn client_info(config: &McpConfig) -> ClientInfo {
    ClientInfo {
        protocol_version: ProtocolVersion::V_2024_11_05,
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: config.client_name.clone(),
            title: None,
            version: config.client_version.clone(),
            icons: None,
            website_url: None,
        },
    }
}

/// Keeps the parts of the input schema the model is shown. Anything but
/// `properties` and `required` is dropped.
pub(crate) fn tool_descriptor(tool: Tool) -> ToolDescriptor {
    let schema = &tool.input_schema;
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    ToolDescriptor {
        name: tool.name.to_string(),
        description: tool
            .description
            .map(|d| d.to_string())
            .unwrap_or_default(),
        parameter_schema: ParameterSchema {
            properties,
            required,
        },
    }
}

pub(crate) fn tool_output(result: CallToolResult) -> ToolCallOutput {
    let mut content: Vec<_> = result
        .content
        .into_iter()
        .map(|content| match content.raw {
            RawContent::Text(text) => ContentPart::Text(text.text),
            RawContent::Image(_) => ContentPart::Other("image".to_owned()),
            RawContent::Audio(_) => ContentPart::Other("audio".to_owned()),
            RawContent::Resource(_) => {
                ContentPart::Other("resource".to_owned())
            }
            RawContent::ResourceLink(_) => {
                ContentPart::Other("resource_link".to_owned())
            }
        })
        .collect();

    // Servers that only return structured output still get their result
    // relayed as text.
    if content.is_empty() {
        if let Some(value) = result.structured_content {
            content.push(ContentPart::Text(value.to_string()));
        }
    }

    ToolCallOutput {
        content,
        is_error: result.is_error.unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::McpConfigBuilder;

    #[test]
    fn test_tool_descriptor() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "roll_die",
            "description": "Rolls a die",
            "inputSchema": {
                "type": "object",
                "properties": { "sides": { "type": "number" } },
                "required": ["sides"]
            }
        }))
        .unwrap();
        let descriptor = tool_descriptor(tool);
        assert_eq!(descriptor.name, "roll_die");
        assert_eq!(descriptor.description, "Rolls a die");
        assert_eq!(
            descriptor.parameter_schema.properties["sides"],
            json!({ "type": "number" })
        );
        assert_eq!(descriptor.parameter_schema.required, ["sides"]);

        let tool: Tool = serde_json::from_value(json!({
            "name": "get_time",
            "inputSchema": { "type": "object" }
        }))
        .unwrap();
        let descriptor = tool_descriptor(tool);
        assert_eq!(descriptor.description, "");
        assert!(descriptor.parameter_schema.properties.is_empty());
        assert!(descriptor.parameter_schema.required.is_empty());
    }

    #[test]
    fn test_tool_output() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "image", "data": "AAAA", "mimeType": "image/png" },
                { "type": "text", "text": "5" }
            ]
        }))
        .unwrap();
        let output = tool_output(result);
        assert!(!output.is_error);
        assert_eq!(output.content[0], ContentPart::Other("image".to_owned()));
        assert_eq!(output.first_text(), Some("5"));

        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "no such file" }],
            "isError": true
        }))
        .unwrap();
        assert!(tool_output(result).is_error);

        let result: CallToolResult = serde_json::from_value(json!({
            "content": [],
            "structuredContent": { "rolled": 5 }
        }))
        .unwrap();
        assert_eq!(tool_output(result).first_text(), Some(r#"{"rolled":5}"#));
    }

    #[test]
    fn test_client_info() {
        let config = McpConfigBuilder::new()
            .with_client_info("toolbridge", "0.0.0")
            .build()
            .unwrap();
        let info = serde_json::to_value(client_info(&config)).unwrap();
        assert_eq!(info["protocolVersion"], "2024-11-05");
        assert_eq!(info["clientInfo"]["name"], "toolbridge");
        assert_eq!(info["clientInfo"]["version"], "0.0.0");
    }
}
