pub mod corpus;
pub mod fetch;
pub mod sampler;
pub mod study;
pub mod test_config;
pub mod utils;

pub use corpus::{Corpus, SampleRecord};
pub use fetch::TestItem;
pub use sampler::{SentencePool, SpeakerQuotas, SpeakerWeights};
pub use study::{StudyConfig, SystemInfo, TestKind, TestPlan};

/// Error types for listening test preparation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Corpus error at line {line}: {message}")]
    Corpus { line: usize, message: String },
    #[error("Speaker {speaker} needs {requested} sentences but only {available} remain")]
    InsufficientSentences {
        speaker: String,
        requested: usize,
        available: usize,
    },
    #[error("Sampling error: {0}")]
    Sampling(String),
    #[error("Unknown test type: {0}")]
    UnknownTestKind(String),
    #[error("Unknown system: {0}")]
    UnknownSystem(String),
    #[error("System {0} has no BWS label")]
    MissingBwsLabel(String),
    #[error("BWS label {0} is used by more than one system")]
    DuplicateBwsLabel(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing source audio: {}", .0.display())]
    MissingAudio(std::path::PathBuf),
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for listening test preparation
pub type Result<T> = std::result::Result<T, Error>;
