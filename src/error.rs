use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Network,
    Schema,
    Alignment,
    InsufficientData,
    Io,
    InvalidInput,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Network => "NetworkError",
            ErrorCode::Schema => "SchemaError",
            ErrorCode::Alignment => "AlignmentError",
            ErrorCode::InsufficientData => "InsufficientDataError",
            ErrorCode::Io => "IOError",
            ErrorCode::InvalidInput => "InvalidInput",
        }
    }
}

/// Every pipeline failure is fatal; `stage` is filled in by the pipeline
/// runner so the message names where the run stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineError {
    pub code: ErrorCode,
    pub stage: Option<String>,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            stage: None,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Schema, message)
    }

    pub fn alignment(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Alignment, message)
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientData, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Io, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn in_stage(mut self, stage: &str) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage.to_string());
        }
        self
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            Some(stage) => write!(
                f,
                "{} in stage '{stage}': {}",
                self.code.as_str(),
                self.message
            ),
            None => write!(f, "{}: {}", self.code.as_str(), self.message),
        }
    }
}

impl Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::io(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            PipelineError::io(err.to_string())
        } else {
            PipelineError::schema(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::invalid_input(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_code_and_stage() {
        let err = PipelineError::alignment("instance 'x' missing").in_stage("process-expression");
        assert_eq!(
            err.to_string(),
            "AlignmentError in stage 'process-expression': instance 'x' missing"
        );
    }

    #[test]
    fn in_stage_keeps_innermost_stage() {
        let err = PipelineError::io("disk full")
            .in_stage("persist")
            .in_stage("run");
        assert_eq!(err.stage.as_deref(), Some("persist"));
    }

    #[test]
    fn io_errors_convert_to_io_code() {
        let err: PipelineError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
