//! Admin intake sequence for new content
//!
//! Collects artifact, title, description and code one step at a time and
//! hands back a [`NewContent`] at the end. Nothing is registered here; the
//! caller passes the result to `GateService::register_content`.

use crate::registry::{self, RegistryError};
use crate::types::{ArtifactRef, NewContent};
use std::fmt;
use thiserror::Error;

/// Where an intake session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStep {
    AwaitingArtifact,
    AwaitingTitle,
    AwaitingDescription,
    AwaitingCode,
    Complete,
}

impl fmt::Display for IntakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntakeStep::AwaitingArtifact => "artifact",
            IntakeStep::AwaitingTitle => "title",
            IntakeStep::AwaitingDescription => "description",
            IntakeStep::AwaitingCode => "code",
            IntakeStep::Complete => "complete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    /// Empty or malformed value; the session stays on the same step
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Expected {expected}, session is at {actual}")]
    UnexpectedStep { expected: IntakeStep, actual: IntakeStep },
}

/// One admin's in-progress registration
#[derive(Debug, Clone)]
pub struct IntakeSession {
    step: IntakeStep,
    artifact: Option<ArtifactRef>,
    title: Option<String>,
    description: Option<String>,
}

impl Default for IntakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeSession {
    pub fn new() -> Self {
        Self {
            step: IntakeStep::AwaitingArtifact,
            artifact: None,
            title: None,
            description: None,
        }
    }

    pub fn step(&self) -> IntakeStep {
        self.step
    }

    /// Text asking for the current step's input
    pub fn prompt(&self) -> &'static str {
        match self.step {
            IntakeStep::AwaitingArtifact => "Send the video to store.",
            IntakeStep::AwaitingTitle => "Video received. Send the title.",
            IntakeStep::AwaitingDescription => "Send the description.",
            IntakeStep::AwaitingCode => "Send the code.",
            IntakeStep::Complete => "Content collected.",
        }
    }

    fn require_step(&self, expected: IntakeStep) -> Result<(), IntakeError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(IntakeError::UnexpectedStep { expected, actual: self.step })
        }
    }

    fn required_text(value: &str, what: &str) -> Result<String, IntakeError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(IntakeError::InvalidInput(format!("{what} cannot be empty")));
        }
        Ok(value.to_string())
    }

    pub fn submit_artifact(&mut self, artifact: ArtifactRef) -> Result<(), IntakeError> {
        self.require_step(IntakeStep::AwaitingArtifact)?;
        if artifact.as_str().trim().is_empty() {
            return Err(IntakeError::InvalidInput("a video file is required".into()));
        }

        self.artifact = Some(artifact);
        self.step = IntakeStep::AwaitingTitle;
        Ok(())
    }

    pub fn submit_title(&mut self, title: &str) -> Result<(), IntakeError> {
        self.require_step(IntakeStep::AwaitingTitle)?;
        self.title = Some(Self::required_text(title, "title")?);
        self.step = IntakeStep::AwaitingDescription;
        Ok(())
    }

    pub fn submit_description(&mut self, description: &str) -> Result<(), IntakeError> {
        self.require_step(IntakeStep::AwaitingDescription)?;
        self.description = Some(Self::required_text(description, "description")?);
        self.step = IntakeStep::AwaitingCode;
        Ok(())
    }

    /// Take the code and produce the registration payload
    pub fn finish(&mut self, code: &str) -> Result<NewContent, IntakeError> {
        self.require_step(IntakeStep::AwaitingCode)?;
        // Same rules the registry applies, checked while the step can still be retried
        let code = registry::normalize_code(code).map_err(|e| match e {
            RegistryError::InvalidInput(msg) => IntakeError::InvalidInput(msg),
            other => IntakeError::InvalidInput(other.to_string()),
        })?;

        let Some(artifact) = self.artifact.take() else {
            return Err(IntakeError::UnexpectedStep {
                expected: IntakeStep::AwaitingArtifact,
                actual: self.step,
            });
        };

        self.step = IntakeStep::Complete;
        Ok(NewContent {
            code,
            artifact_ref: artifact,
            backing_locator: None,
            backing_group: None,
            title: self.title.take(),
            description: self.description.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_code_step() -> IntakeSession {
        let mut session = IntakeSession::new();
        session.submit_artifact(ArtifactRef::new("file-1")).unwrap();
        session.submit_title("Title").unwrap();
        session.submit_description("Desc").unwrap();
        session
    }

    #[test]
    fn test_full_sequence() {
        let mut session = at_code_step();
        assert_eq!(session.step(), IntakeStep::AwaitingCode);

        let content = session.finish(" A001 ").unwrap();
        assert_eq!(content.code, "A001");
        assert_eq!(content.artifact_ref, ArtifactRef::new("file-1"));
        assert_eq!(content.title.as_deref(), Some("Title"));
        assert_eq!(content.description.as_deref(), Some("Desc"));
        assert_eq!(session.step(), IntakeStep::Complete);
    }

    #[test]
    fn test_empty_input_keeps_step() {
        let mut session = IntakeSession::new();
        session.submit_artifact(ArtifactRef::new("file-1")).unwrap();

        let err = session.submit_title("   ").unwrap_err();
        assert!(matches!(err, IntakeError::InvalidInput(_)));
        assert_eq!(session.step(), IntakeStep::AwaitingTitle);
        assert_eq!(session.prompt(), "Video received. Send the title.");

        session.submit_title("Title").unwrap();
        assert_eq!(session.step(), IntakeStep::AwaitingDescription);
    }

    #[test]
    fn test_empty_code_keeps_step() {
        let mut session = at_code_step();
        assert!(matches!(session.finish(""), Err(IntakeError::InvalidInput(_))));
        assert_eq!(session.step(), IntakeStep::AwaitingCode);
        assert!(session.finish("B2").is_ok());
    }

    #[test]
    fn test_malformed_code_keeps_step() {
        let mut session = at_code_step();

        assert!(matches!(session.finish("two words"), Err(IntakeError::InvalidInput(_))));
        assert_eq!(session.step(), IntakeStep::AwaitingCode);

        let too_long = "x".repeat(registry::MAX_CODE_LEN + 1);
        assert!(matches!(session.finish(&too_long), Err(IntakeError::InvalidInput(_))));
        assert_eq!(session.prompt(), "Send the code.");

        let content = session.finish("GOOD").unwrap();
        assert_eq!(content.code, "GOOD");
        assert_eq!(content.artifact_ref, ArtifactRef::new("file-1"));
    }

    #[test]
    fn test_out_of_order_submission() {
        let mut session = IntakeSession::new();

        let err = session.submit_title("Title").unwrap_err();
        assert_eq!(
            err,
            IntakeError::UnexpectedStep {
                expected: IntakeStep::AwaitingTitle,
                actual: IntakeStep::AwaitingArtifact,
            }
        );

        assert!(session.finish("A001").is_err());
    }

    #[test]
    fn test_complete_session_cannot_finish_twice() {
        let mut session = at_code_step();
        session.finish("A001").unwrap();

        let err = session.finish("A002").unwrap_err();
        assert!(matches!(err, IntakeError::UnexpectedStep { actual: IntakeStep::Complete, .. }));
    }

    #[test]
    fn test_empty_artifact_rejected() {
        let mut session = IntakeSession::new();
        assert!(matches!(
            session.submit_artifact(ArtifactRef::new("")),
            Err(IntakeError::InvalidInput(_))
        ));
        assert_eq!(session.prompt(), "Send the video to store.");
    }
}
