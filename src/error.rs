/// Shown for every pipeline failure that the user cannot act on.
pub const GENERIC_FAILURE: &str = "Analysis failed. Please try again later.";

/// Shown when no API key was configured at startup.
pub const MISSING_CREDENTIAL: &str = "No API key configured. Set GEMINI_API_KEY and restart.";

/// Shown when the selected file is not an image.
pub const NOT_AN_IMAGE: &str = "Please upload a valid image file.";

/// Rejections raised while ingesting a selected file.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("not an image: declared media type {media_type:?}")]
  NotAnImage { media_type: String },

  #[error("could not read file: {0}")]
  ReadFailed(String),
}

impl ValidationError {
  pub fn user_message(&self) -> String {
    match self {
      Self::NotAnImage { .. } => NOT_AN_IMAGE.to_string(),
      Self::ReadFailed(_) => "Could not read the selected file.".to_string(),
    }
  }
}

/// Failure of a single `send` on a transport.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
  #[error("network error: {0}")]
  Network(String),

  #[error("failed to read response body: {0}")]
  Body(String),
}

impl From<reqwest::Error> for TransportError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_body() || err.is_decode() {
      Self::Body(err.to_string())
    } else {
      Self::Network(err.to_string())
    }
  }
}

/// Failures of the analysis request pipeline.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
  #[error("missing API credential")]
  MissingCredential,

  #[error("upstream returned non-retryable status {0}")]
  HttpError(u16),

  #[error("gave up after {attempts} attempts: {last_cause}")]
  TransientFailure { attempts: u32, last_cause: String },

  #[error("could not decode analysis response: {0}")]
  DecodeFailure(String),
}

impl AnalysisError {
  /// Only a missing credential is actionable; every other cause collapses into one message.
  pub fn user_message(&self) -> String {
    match self {
      Self::MissingCredential => MISSING_CREDENTIAL.to_string(),
      _ => GENERIC_FAILURE.to_string(),
    }
  }
}
