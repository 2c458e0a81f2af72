use base64::Engine;

use crate::error::ValidationError;
use crate::models::{ImageAsset, SelectedFile};

/// Validates and encodes a selected file. Encoding runs on the blocking pool so the
/// caller sees a single suspension point and either a complete asset or an error.
pub async fn ingest(file: SelectedFile) -> Result<ImageAsset, ValidationError> {
  check_media_type(&file.media_type)?;
  tokio::task::spawn_blocking(move || encode(file))
    .await
    .map_err(|e| ValidationError::ReadFailed(e.to_string()))
}

fn check_media_type(media_type: &str) -> Result<(), ValidationError> {
  if media_type.trim().to_ascii_lowercase().starts_with("image/") {
    Ok(())
  } else {
    Err(ValidationError::NotAnImage {
      media_type: media_type.to_string(),
    })
  }
}

fn encode(file: SelectedFile) -> ImageAsset {
  let media_type = file.media_type.trim().to_string();
  let byte_len = file.bytes.len();
  let encoded = base64::engine::general_purpose::STANDARD.encode(file.bytes);
  let preview = format!("data:{media_type};base64,{encoded}");
  let payload = preview
    .split_once(',')
    .map(|(_, data)| data.to_string())
    .unwrap_or_default();

  ImageAsset {
    name: file.name,
    media_type,
    payload,
    preview,
    byte_len,
  }
}
