use serde::{Deserialize, Serialize};

/// Media category attached to an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Music,
    Video,
    Audiobook,
    Audio,
    /// Anything the server does not classify; unknown server values land here.
    #[default]
    #[serde(other)]
    Other,
}

impl MediaType {
    /// Returns the wire name (`"VIDEO"`, `"MUSIC"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Other => "OTHER",
            MediaType::Music => "MUSIC",
            MediaType::Video => "VIDEO",
            MediaType::Audiobook => "AUDIOBOOK",
            MediaType::Audio => "AUDIO",
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OTHER" => Ok(MediaType::Other),
            "MUSIC" => Ok(MediaType::Music),
            "VIDEO" => Ok(MediaType::Video),
            "AUDIOBOOK" => Ok(MediaType::Audiobook),
            "AUDIO" => Ok(MediaType::Audio),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a resumable upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Uninitialized,
    Initializing,
    Transferring,
    Paused,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl UploadState {
    /// Returns `true` for states no operation can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Cancelled)
    }

    /// Returns `true` while a run owns the session (a request may be in flight).
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            UploadState::Initializing | UploadState::Transferring | UploadState::Finalizing
        )
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UploadState::Uninitialized => "uninitialized",
            UploadState::Initializing => "initializing",
            UploadState::Transferring => "transferring",
            UploadState::Paused => "paused",
            UploadState::Finalizing => "finalizing",
            UploadState::Completed => "completed",
            UploadState::Cancelled => "cancelled",
            UploadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time progress of an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    pub state: UploadState,
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub speed_bytes_per_sec: f64,
    /// Estimated seconds remaining; `None` while the rate is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
}

impl UploadProgress {
    /// Fraction of chunks confirmed by the server (0.0–1.0).
    pub fn fraction(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        f64::from(self.uploaded_chunks) / f64::from(self.total_chunks)
    }

    /// Returns the upload progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        self.fraction() * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_progress(uploaded: u32, total: u32) -> UploadProgress {
        UploadProgress {
            upload_id: Some("u1".into()),
            state: UploadState::Transferring,
            uploaded_chunks: uploaded,
            total_chunks: total,
            bytes_transferred: 0,
            total_bytes: 0,
            speed_bytes_per_sec: 0.0,
            eta_seconds: None,
        }
    }

    #[test]
    fn media_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&MediaType::Audiobook).unwrap(),
            "\"AUDIOBOOK\""
        );
        let parsed: MediaType = serde_json::from_str("\"VIDEO\"").unwrap();
        assert_eq!(parsed, MediaType::Video);
    }

    #[test]
    fn media_type_unknown_falls_back_to_other() {
        let parsed: MediaType = serde_json::from_str("\"PODCAST\"").unwrap();
        assert_eq!(parsed, MediaType::Other);
    }

    #[test]
    fn media_type_from_str_is_case_insensitive() {
        assert_eq!("music".parse::<MediaType>().unwrap(), MediaType::Music);
        assert_eq!("Audio".parse::<MediaType>().unwrap(), MediaType::Audio);
        assert!("podcast".parse::<MediaType>().is_err());
    }

    #[test]
    fn upload_state_serialization() {
        assert_eq!(
            serde_json::to_string(&UploadState::Transferring).unwrap(),
            "\"transferring\""
        );
        assert_eq!(UploadState::Finalizing.to_string(), "finalizing");
    }

    #[test]
    fn terminal_and_running_states() {
        assert!(UploadState::Completed.is_terminal());
        assert!(UploadState::Cancelled.is_terminal());
        assert!(!UploadState::Failed.is_terminal());
        assert!(!UploadState::Paused.is_terminal());

        assert!(UploadState::Transferring.is_running());
        assert!(UploadState::Finalizing.is_running());
        assert!(!UploadState::Paused.is_running());
    }

    #[test]
    fn upload_progress_percentage() {
        let p = sample_progress(1, 4);
        assert!((p.percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn upload_progress_percentage_zero_total() {
        let p = sample_progress(0, 0);
        assert!((p.percentage() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn upload_progress_omits_unknown_eta() {
        let json = serde_json::to_string(&sample_progress(0, 3)).unwrap();
        assert!(!json.contains("etaSeconds"));
        assert!(json.contains("\"uploadedChunks\":0"));
    }
}
