use serde::Serialize;

use likeness_plugins::{BatchProgress, FaceAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Processing,
    Complete,
    /// The step finished early; the message says why.
    Warning,
}

/// A photo found in the posts feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedPhoto {
    pub url: String,
    pub thumbnail: Option<String>,
    pub id: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedPhoto {
    #[serde(flatten)]
    pub photo: CollectedPhoto,
    pub gemini_result: FaceAnalysis,
}

/// A reel with a playable video URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedReel {
    pub url: String,
    pub thumbnail: Option<String>,
    pub id: String,
    pub caption: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortcode: Option<String>,
}

/// Payload of the final `complete` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IntakeSummary {
    #[serde(rename_all = "camelCase")]
    Photos {
        photos: Vec<AnalyzedPhoto>,
        total_analyzed: usize,
        total_passed: usize,
    },
    #[serde(rename_all = "camelCase")]
    Reels {
        reels: Vec<CollectedReel>,
        total_reels: usize,
    },
}

/// One line of an intake stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IntakeEvent {
    #[serde(rename_all = "camelCase")]
    Log {
        step: u8,
        message: String,
        status: LogStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        photo_count: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_photos: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reel_count: Option<usize>,
    },
    Progress(BatchProgress),
    Complete(IntakeSummary),
    Error {
        error: String,
    },
}

impl IntakeEvent {
    pub fn log(step: u8, message: impl Into<String>, status: LogStatus) -> Self {
        IntakeEvent::Log {
            step,
            message: message.into(),
            status,
            photo_count: None,
            total_photos: None,
            reel_count: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        IntakeEvent::Error {
            error: message.into(),
        }
    }

    /// Serialized event followed by a newline.
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "error": e.to_string() }).to_string()
        });
        line.push('\n');
        line
    }
}
