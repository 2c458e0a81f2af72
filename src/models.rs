use serde::{Deserialize, Serialize};

/// The ten keys the model must return, in display order.
pub const RESULT_FIELDS: [&str; 10] = [
  "subject",
  "location",
  "action",
  "mood",
  "style",
  "composition",
  "lighting",
  "quality",
  "negative",
  "master_prompt",
];

/// A file as handed over by the file picker, before validation.
#[derive(Debug, Clone)]
pub struct SelectedFile {
  pub name: Option<String>,
  pub media_type: String,
  pub bytes: Vec<u8>,
}

/// An accepted image. The raw bytes are consumed by encoding; only the derived forms are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAsset {
  pub name: Option<String>,
  pub media_type: String,
  /// Base64 payload, i.e. the data URL after its first comma.
  #[serde(skip)]
  pub payload: String,
  /// Full `data:` URL usable directly as an `<img src>`.
  pub preview: String,
  pub byte_len: usize,
}

/// Decoded structured description. Every field is required and string typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
  pub subject: String,
  pub location: String,
  pub action: String,
  pub mood: String,
  pub style: String,
  pub composition: String,
  pub lighting: String,
  pub quality: String,
  pub negative: String,
  pub master_prompt: String,
}

// Outbound wire format of the generateContent endpoint.

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
  pub contents: Vec<Content>,
  pub system_instruction: SystemInstruction,
  pub generation_config: GenerationConfig,
}

#[derive(Serialize, Clone, Debug)]
pub struct Content {
  pub role: String,
  pub parts: Vec<Part>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(untagged)]
pub enum Part {
  Text { text: String },
  Inline {
    #[serde(rename = "inlineData")]
    inline_data: InlineData,
  },
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
  pub mime_type: String,
  pub data: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct SystemInstruction {
  pub parts: Vec<Part>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
  pub response_mime_type: String,
  pub response_schema: serde_json::Value,
}
