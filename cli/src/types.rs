use crate::{
    plan::Section,
    selections::{DeliveryAndControl, ProjectBlueprint, Selections, SoundProfile},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptRequest {
    pub project_blueprint: Option<ProjectBlueprint>,
    pub sound_profile: Option<SoundProfile>,
    pub delivery_and_control: Option<DeliveryAndControl>,
    pub instrumental_only: bool,
    pub user_narrative: String,
}

impl PromptRequest {
    pub fn new(selections: &Selections, narrative: &str) -> Self {
        Self {
            project_blueprint: selections.project_blueprint,
            sound_profile: selections.sound_profile,
            delivery_and_control: selections.delivery_and_control,
            instrumental_only: selections.instrumental_only,
            user_narrative: narrative.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptResult {
    pub prompt: String,
    pub title: String,
    pub description: String,
}

impl From<PromptResponse> for PromptResult {
    fn from(response: PromptResponse) -> Self {
        Self { prompt: response.prompt, title: response.title, description: response.description }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResponse {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub file_size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Payload of a `result` frame on the render socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderResultData {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub file_size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

fn default_content_type() -> String {
    "audio/mpeg".to_string()
}

/// A rendered track. Replaced wholesale by the next render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioResult {
    pub audio_url: String,
    pub download_url: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size_bytes: u64,
}

impl AudioResult {
    pub fn size_label(&self) -> String {
        const KIB: f64 = 1024.0;
        let bytes = self.file_size_bytes as f64;
        if bytes >= KIB * KIB {
            format!("{:.1} MB", bytes / (KIB * KIB))
        } else if bytes >= KIB {
            format!("{:.1} KB", bytes / KIB)
        } else {
            format!("{} B", self.file_size_bytes)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderProgress {
    pub stage: String,
    pub percent: f32,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationError,
    ServerError,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frames sent by the backend on `/render/ws`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Progress {
        stage: String,
        #[serde(default)]
        progress_percent: f32,
        #[serde(default)]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    Result {
        data: RenderResultData,
    },
    Error {
        error_code: ErrorCode,
        #[serde(default)]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
}

impl ServerMessage {
    pub const KNOWN_TYPES: [&'static str; 3] = ["progress", "result", "error"];
}

/// Frames sent by this client on `/render/ws`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Render { composition_plan: RenderPlanPayload },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderPlanPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub positive_global_styles: Vec<String>,
    pub negative_global_styles: Vec<String>,
    pub sections: Vec<Section>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_request_uses_wire_ids() {
        let selections = Selections {
            project_blueprint: Some(ProjectBlueprint::AdBrandFastHook),
            sound_profile: Some(SoundProfile::BrightPopElectro),
            delivery_and_control: None,
            instrumental_only: true,
        };
        let body = serde_json::to_value(PromptRequest::new(&selections, "Birthday for Sam")).unwrap();
        assert_eq!(
            body,
            json!({
                "project_blueprint": "ad_brand_fast_hook",
                "sound_profile": "bright_pop_electro",
                "delivery_and_control": null,
                "instrumental_only": true,
                "user_narrative": "Birthday for Sam"
            })
        );
    }

    #[test]
    fn decodes_server_frames() {
        let progress: ServerMessage = serde_json::from_value(json!({
            "type": "progress",
            "stage": "connected",
            "progress_percent": 0,
            "message": "Connected",
            "timestamp": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(matches!(progress, ServerMessage::Progress { ref stage, .. } if stage == "connected"));

        let error: ServerMessage = serde_json::from_value(json!({
            "type": "error",
            "error_code": "VALIDATION_ERROR",
            "message": "bad plan"
        }))
        .unwrap();
        assert_eq!(
            error,
            ServerMessage::Error {
                error_code: ErrorCode::ValidationError,
                message: "bad plan".into(),
                timestamp: None
            }
        );

        let odd: ServerMessage = serde_json::from_value(json!({
            "type": "error",
            "error_code": "RATE_LIMITED",
            "message": "slow down"
        }))
        .unwrap();
        assert!(matches!(odd, ServerMessage::Error { error_code: ErrorCode::Unknown, .. }));
    }

    #[test]
    fn render_frame_omits_missing_title() {
        let frame = ClientMessage::Render {
            composition_plan: RenderPlanPayload {
                title: None,
                positive_global_styles: vec!["warm".into()],
                negative_global_styles: Vec::new(),
                sections: Vec::new(),
            },
        };
        let encoded = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "render",
                "composition_plan": {
                    "positive_global_styles": ["warm"],
                    "negative_global_styles": [],
                    "sections": []
                }
            })
        );
    }

    #[test]
    fn size_label_scales_units() {
        let mut audio = AudioResult {
            audio_url: String::new(),
            download_url: String::new(),
            filename: "a.mp3".into(),
            mime_type: "audio/mpeg".into(),
            file_size_bytes: 512,
        };
        assert_eq!(audio.size_label(), "512 B");
        audio.file_size_bytes = 2048;
        assert_eq!(audio.size_label(), "2.0 KB");
        audio.file_size_bytes = 3 * 1024 * 1024;
        assert_eq!(audio.size_label(), "3.0 MB");
    }
}
