//! OpenAI Realtime API WebSocket message types.
//!
//! Only the events the relay sends or reacts to are modelled. Any other server
//! event deserializes to [`ServerEvent::Unknown`] and is ignored.
//!
//! Client events sent:
//! - session.update
//! - input_audio_buffer.append
//! - conversation.item.create (function_call_output)
//! - response.create
//!
//! Server events handled:
//! - error
//! - session.created / session.updated
//! - input_audio_buffer.speech_started / speech_stopped
//! - conversation.item.created
//! - conversation.item.input_audio_transcription.completed
//! - response.output_item.added
//! - response.audio.delta
//! - response.audio_transcript.delta
//! - response.text.delta
//! - response.function_call_arguments.done
//! - response.done

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::realtime::base::{ModelSessionConfig, ToolDefinition, TurnDetectionConfig};

use super::config::OPENAI_AUDIO_FORMAT;

// =============================================================================
// Session Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl From<&ModelSessionConfig> for SessionConfig {
    fn from(config: &ModelSessionConfig) -> Self {
        let tools: Vec<ToolDef> = config.tools.iter().map(ToolDef::from).collect();
        let has_tools = !tools.is_empty();

        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: config.instructions.clone(),
            voice: Some(config.voice.clone()),
            input_audio_format: Some(OPENAI_AUDIO_FORMAT.to_string()),
            output_audio_format: Some(OPENAI_AUDIO_FORMAT.to_string()),
            input_audio_transcription: config
                .input_transcription_model
                .clone()
                .map(|model| InputAudioTranscription { model }),
            turn_detection: match &config.turn_detection {
                TurnDetectionConfig::ServerVad {
                    threshold,
                    prefix_padding_ms,
                    silence_duration_ms,
                } => Some(TurnDetection::ServerVad {
                    threshold: Some(*threshold),
                    prefix_padding_ms: Some(*prefix_padding_ms),
                    silence_duration_ms: Some(*silence_duration_ms),
                }),
                TurnDetectionConfig::None => None,
            },
            tools: has_tools.then_some(tools),
            tool_choice: has_tools.then(|| "auto".to_string()),
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad {
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
}

/// Tool definition in the flattened shape the Realtime API expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl From<&ToolDefinition> for ToolDef {
    fn from(tool: &ToolDefinition) -> Self {
        ToolDef {
            tool_type: tool.tool_type.clone(),
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.clone(),
        }
    }
}

// =============================================================================
// Conversation Items
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item type (message, function_call, function_call_output)
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    /// Output item answering a function call.
    pub fn function_call_output(call_id: &str, output: &str) -> Self {
        ConversationItem {
            item_type: "function_call_output".to_string(),
            call_id: Some(call_id.to_string()),
            output: Some(output.to_string()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    #[serde(rename = "session.updated")]
    SessionUpdated { session: SessionInfo },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: u64,
    },

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated { item: ConversationItem },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: ConversationItem },

    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded audio delta
        delta: String,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },

    #[serde(rename = "response.text.delta")]
    TextDelta { delta: String },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        /// Arguments as a JSON string
        arguments: String,
        /// Present on newer API revisions
        #[serde(default)]
        name: Option<String>,
    },

    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseInfo },

    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode base64 audio from an AudioDelta event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInfo {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::base::FunctionDefinition;

    #[test]
    fn test_audio_append() {
        let data = vec![0u8, 1, 2, 3];
        match ClientEvent::audio_append(&data) {
            ClientEvent::InputAudioBufferAppend { audio } => {
                assert_eq!(BASE64_STANDARD.decode(&audio).unwrap(), data);
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_session_update_carries_tools() {
        let config = ModelSessionConfig {
            instructions: Some("Be brief.".to_string()),
            tools: vec![ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: "knowledge_base_search".to_string(),
                    description: Some("Search".to_string()),
                    parameters: Some(serde_json::json!({"type": "object"})),
                },
            }],
            ..Default::default()
        };
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig::from(&config),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["voice"], "alloy");
        assert_eq!(json["session"]["input_audio_format"], "pcm16");
        assert_eq!(json["session"]["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["tools"][0]["type"], "function");
        assert_eq!(json["session"]["tools"][0]["name"], "knowledge_base_search");
        assert_eq!(json["session"]["tool_choice"], "auto");
    }

    #[test]
    fn test_session_update_without_tools_omits_tool_fields() {
        let config = ModelSessionConfig::default();
        let json = serde_json::to_value(SessionConfig::from(&config)).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    #[test]
    fn test_function_call_output_serialization() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output("c1", "Result 1:\nok"),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conversation.item.create");
        assert_eq!(json["item"]["type"], "function_call_output");
        assert_eq!(json["item"]["call_id"], "c1");
        assert_eq!(json["item"]["output"], "Result 1:\nok");
        assert!(json["item"].get("name").is_none());
    }

    #[test]
    fn test_response_create_serialization() {
        let json = serde_json::to_string(&ClientEvent::ResponseCreate).unwrap();
        assert_eq!(json, r#"{"type":"response.create"}"#);
    }

    #[test]
    fn test_error_event_deserialization() {
        let json = r#"{
            "type": "error",
            "event_id": "evt_1",
            "error": {"type": "invalid_request_error", "message": "Test error"}
        }"#;
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::Error { error } => {
                assert_eq!(error.error_type, "invalid_request_error");
                assert_eq!(error.message, "Test error");
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_is_tolerated() {
        let json = r#"{"type": "rate_limits.updated", "rate_limits": []}"#;
        assert!(matches!(
            serde_json::from_str::<ServerEvent>(json).unwrap(),
            ServerEvent::Unknown
        ));
    }

    #[test]
    fn test_function_call_arguments_done() {
        let json = r#"{
            "type": "response.function_call_arguments.done",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "call_id": "c1",
            "arguments": "{\"query\":\"refund policy\"}"
        }"#;
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                arguments,
                name,
            } => {
                assert_eq!(call_id, "c1");
                assert_eq!(arguments, r#"{"query":"refund policy"}"#);
                assert!(name.is_none());
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_audio_delta_decode() {
        let original = vec![0u8, 1, 2, 3, 4, 5];
        let encoded = BASE64_STANDARD.encode(&original);
        assert_eq!(ServerEvent::decode_audio_delta(&encoded).unwrap(), original);
    }
}
