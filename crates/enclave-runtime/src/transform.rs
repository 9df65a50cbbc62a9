//! Bus payload → client event transform.
//!
//! Pure: the same payload always yields the same event body. Only the
//! timestamp differs between calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::payload::BusPayload;

/// Event delivered to a session's transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEvent {
    /// Client-facing event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Session the event belongs to.
    pub session_id: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Event fields.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ExternalEvent {
    /// Event stamped with the current time. Non-object `data` lands under a
    /// `data` key.
    pub fn new(event_type: impl Into<String>, session_id: &str, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                let _ = map.insert("data".into(), other);
                map
            }
        };
        Self {
            event_type: event_type.into(),
            session_id: session_id.to_owned(),
            timestamp: enclave_core::now_rfc3339(),
            data,
        }
    }

    /// Field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Map a bus payload onto the client event vocabulary.
pub fn transform_event(session_id: &str, payload: &BusPayload) -> ExternalEvent {
    let (event_type, data) = match payload {
        BusPayload::UserMessage { sequence, content } => (
            "user_message".to_owned(),
            json!({"sequence": sequence, "content": content}),
        ),
        BusPayload::AssistantText { text } => {
            ("assistant_message".to_owned(), json!({"content": text}))
        }
        BusPayload::ToolCall { call } => (
            "tool_call".to_owned(),
            json!({
                "toolCallId": call.id,
                "toolName": call.name,
                "arguments": call.arguments,
            }),
        ),
        BusPayload::ToolOutput { output } => {
            let mut data = json!({
                "toolCallId": output.tool_call_id,
                "toolName": output.tool_name,
                "content": output.result.content,
                "isError": output.result.is_error,
            });
            if let Some(details) = &output.result.details {
                data["details"] = details.clone();
            }
            ("tool_result".to_owned(), data)
        }
        BusPayload::Thinking { content } => {
            ("agent_thinking".to_owned(), json!({"content": content}))
        }
        BusPayload::WaitForInput { prompt } => {
            ("wait_for_input".to_owned(), json!({"prompt": prompt}))
        }
        BusPayload::Finished { summary } => {
            ("agent_finished".to_owned(), json!({"summary": summary}))
        }
        BusPayload::PromptRefined { prompt } => {
            ("prompt_refined".to_owned(), json!({"prompt": prompt}))
        }
        BusPayload::Error { message, category } => (
            "agent_error".to_owned(),
            json!({"message": message, "category": category}),
        ),
        BusPayload::Custom { tag, data } => (tag.clone(), data.clone()),
    };
    ExternalEvent::new(event_type, session_id, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ToolCall, ToolOutput};
    use enclave_core::tools::{error_result, text_result};

    fn kind(payload: &BusPayload) -> String {
        transform_event("s1", payload).event_type
    }

    #[test]
    fn type_mapping() {
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"file_path": "a"}),
        };
        let cases = [
            (BusPayload::AssistantText { text: "x".into() }, "assistant_message"),
            (BusPayload::ToolCall { call: call.clone() }, "tool_call"),
            (BusPayload::tool_output(&call, text_result("ok", false)), "tool_result"),
            (BusPayload::Thinking { content: "hm".into() }, "agent_thinking"),
            (BusPayload::WaitForInput { prompt: None }, "wait_for_input"),
            (BusPayload::Finished { summary: None }, "agent_finished"),
            (BusPayload::PromptRefined { prompt: "p".into() }, "prompt_refined"),
            (BusPayload::error("agent", "boom"), "agent_error"),
        ];
        for (payload, expected) in cases {
            assert_eq!(kind(&payload), expected);
        }
    }

    #[test]
    fn custom_passes_through() {
        let event = transform_event(
            "s1",
            &BusPayload::Custom {
                tag: "progress".into(),
                data: json!({"percent": 40}),
            },
        );
        assert_eq!(event.event_type, "progress");
        assert_eq!(event.get("percent"), Some(&json!(40)));

        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "progress");
        assert_eq!(v["sessionId"], "s1");
        assert_eq!(v["percent"], 40);
    }

    #[test]
    fn tool_result_fields() {
        let payload = BusPayload::ToolOutput {
            output: ToolOutput {
                tool_call_id: "c2".into(),
                tool_name: "save_file".into(),
                result: error_result("nope").with_details(json!({"code": 1})),
            },
        };
        let event = transform_event("s1", &payload);
        assert_eq!(event.get("toolCallId"), Some(&json!("c2")));
        assert_eq!(event.get("isError"), Some(&json!(true)));
        assert_eq!(event.get("content"), Some(&json!("nope")));
        assert_eq!(event.get("details"), Some(&json!({"code": 1})));
    }

    #[test]
    fn scalar_data_wrapped() {
        let event = ExternalEvent::new("note", "s1", json!("text"));
        assert_eq!(event.get("data"), Some(&json!("text")));
    }

    #[test]
    fn transform_is_deterministic_apart_from_time() {
        let p = BusPayload::AssistantText { text: "same".into() };
        let (a, b) = (transform_event("s", &p), transform_event("s", &p));
        assert_eq!(a.event_type, b.event_type);
        assert_eq!(a.data, b.data);
    }
}
