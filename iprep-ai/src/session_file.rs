//! Session input file: `{"session_id": "...", "responses": [...]}`

use crate::models::AnalysisRequest;
use iprep_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SessionFile {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub responses: Vec<AnalysisRequest>,
}

impl SessionFile {
    /// Parse session JSON; a missing session id gets a fresh one
    ///
    /// Question order is the array order, so `question_index` is rewritten
    /// from each response's position.
    pub fn from_json(json: &str) -> Result<(Uuid, Vec<AnalysisRequest>)> {
        let file: SessionFile = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Invalid session file: {}", e)))?;

        let session_id = file.session_id.unwrap_or_else(Uuid::new_v4);
        let responses = file
            .responses
            .into_iter()
            .enumerate()
            .map(|(index, mut request)| {
                request.question_index = index;
                request
            })
            .collect();
        Ok((session_id, responses))
    }

    pub fn load(path: &Path) -> Result<(Uuid, Vec<AnalysisRequest>)> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterviewType;

    #[test]
    fn test_indexes_follow_array_order() {
        let json = r#"{
            "session_id": "7f1c2a4e-0b7d-4c55-9a43-1f0e2d3c4b5a",
            "responses": [
                {"question_text": "Q1", "response_text": "A1", "duration_seconds": 30,
                 "interview_type": "behavioral", "question_index": 9},
                {"question_text": "Q2", "response_text": "A2", "interview_type": "technical"}
            ]
        }"#;
        let (session_id, responses) = SessionFile::from_json(json).unwrap();
        assert_eq!(
            session_id.to_string(),
            "7f1c2a4e-0b7d-4c55-9a43-1f0e2d3c4b5a"
        );
        assert_eq!(responses[0].question_index, 0);
        assert_eq!(responses[1].question_index, 1);
        assert_eq!(responses[1].interview_type, InterviewType::Technical);
        assert_eq!(responses[1].duration_seconds, 0.0);
        assert_ne!(responses[0].response_id, responses[1].response_id);
    }

    #[test]
    fn test_unknown_interview_type_rejected() {
        let json = r#"{"responses": [{"question_text": "Q", "response_text": "A",
                       "interview_type": "situational"}]}"#;
        assert!(matches!(
            SessionFile::from_json(json),
            Err(Error::InvalidInput(_))
        ));
    }
}
