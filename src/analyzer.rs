use std::sync::Arc;

use uuid::Uuid;

use crate::error::AnalysisError;
use crate::logger::Logger;
use crate::models::{
  AnalysisResult, Content, GenerateRequest, GenerationConfig, ImageAsset, InlineData, Part,
  SystemInstruction, RESULT_FIELDS,
};
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::transport::{HttpRequest, Transport};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

const SYSTEM_INSTRUCTION: &str = "You are an expert visual analyst and prompt engineer. \
Study the supplied image and describe it as a JSON object with exactly these string fields:\n\
- subject: the main subject(s), their appearance, clothing and notable details.\n\
- location: the setting or environment, indoor or outdoor, era and surroundings.\n\
- action: what the subject is doing, pose, gesture and any motion.\n\
- mood: the emotional tone and atmosphere.\n\
- style: the artistic or photographic style, medium and any references.\n\
- composition: framing, camera angle, shot type, lens and depth of field.\n\
- lighting: light sources, direction, quality, color temperature and contrast.\n\
- quality: technical quality descriptors such as resolution, sharpness and detail.\n\
- negative: things to avoid when recreating the image (artifacts, unwanted elements).\n\
- master_prompt: a single cohesive generation prompt that combines all of the above.\n\
Be specific and concrete. Return only the JSON object.";

const USER_INSTRUCTION: &str =
  "Analyze this image and break it down into the structured prompt fields.";

#[derive(Clone)]
pub struct AnalyzerConfig {
  pub endpoint: String,
  pub model: String,
  pub api_key: String,
  pub retry: RetryPolicy,
}

impl AnalyzerConfig {
  pub fn url(&self) -> String {
    format!(
      "{}/models/{}:generateContent",
      self.endpoint.trim_end_matches('/'),
      self.model
    )
  }
}

/// One analysis attempt. Never reused; each call to [`Analyzer::analyze`] builds a new one.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
  pub id: Uuid,
  pub body: GenerateRequest,
}

impl AnalysisRequest {
  pub fn new(asset: &ImageAsset) -> Self {
    Self {
      id: Uuid::new_v4(),
      body: GenerateRequest {
        contents: vec![Content {
          role: "user".to_string(),
          parts: vec![
            Part::Text {
              text: USER_INSTRUCTION.to_string(),
            },
            Part::Inline {
              inline_data: InlineData {
                mime_type: asset.media_type.clone(),
                data: asset.payload.clone(),
              },
            },
          ],
        }],
        system_instruction: SystemInstruction {
          parts: vec![Part::Text {
            text: SYSTEM_INSTRUCTION.to_string(),
          }],
        },
        generation_config: GenerationConfig {
          response_mime_type: "application/json".to_string(),
          response_schema: response_schema(),
        },
      },
    }
  }
}

fn response_schema() -> serde_json::Value {
  let properties: serde_json::Map<String, serde_json::Value> = RESULT_FIELDS
    .iter()
    .map(|field| (field.to_string(), serde_json::json!({ "type": "STRING" })))
    .collect();
  serde_json::json!({
    "type": "OBJECT",
    "properties": properties,
    "required": RESULT_FIELDS,
  })
}

/// Pulls the generated text out of a generateContent response and checks it against the
/// ten-field schema.
pub fn decode_result(body: &serde_json::Value) -> Result<AnalysisResult, AnalysisError> {
  let text = body["candidates"][0]["content"]["parts"][0]["text"]
    .as_str()
    .ok_or_else(|| AnalysisError::DecodeFailure("response has no generated text".to_string()))?;

  let value: serde_json::Value = serde_json::from_str(text)
    .map_err(|err| AnalysisError::DecodeFailure(format!("generated text is not JSON: {err}")))?;
  let object = value
    .as_object()
    .ok_or_else(|| AnalysisError::DecodeFailure("generated JSON is not an object".to_string()))?;

  for field in RESULT_FIELDS {
    match object.get(field) {
      Some(serde_json::Value::String(_)) => {}
      Some(_) => {
        return Err(AnalysisError::DecodeFailure(format!("field {field} is not a string")))
      }
      None => return Err(AnalysisError::DecodeFailure(format!("missing field {field}"))),
    }
  }

  serde_json::from_value(value).map_err(|err| AnalysisError::DecodeFailure(err.to_string()))
}

pub struct Analyzer {
  transport: Arc<dyn Transport>,
  config: AnalyzerConfig,
  logger: Arc<Logger>,
}

impl Analyzer {
  pub fn new(transport: Arc<dyn Transport>, config: AnalyzerConfig, logger: Arc<Logger>) -> Self {
    Self {
      transport,
      config,
      logger,
    }
  }

  pub fn has_credential(&self) -> bool {
    !self.config.api_key.trim().is_empty()
  }

  pub async fn analyze(&self, asset: &ImageAsset) -> Result<AnalysisResult, AnalysisError> {
    let request = AnalysisRequest::new(asset);
    let outcome = self.run(&request).await;
    match &outcome {
      Ok(_) => self.logger.info(&format!("analysis {} succeeded", request.id)),
      Err(err) => self.logger.error(&format!("analysis {} failed: {err}", request.id)),
    }
    outcome
  }

  async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
    if !self.has_credential() {
      return Err(AnalysisError::MissingCredential);
    }

    let body = serde_json::to_value(&request.body)
      .map_err(|err| AnalysisError::DecodeFailure(err.to_string()))?;
    let http = HttpRequest::post_json(self.config.url(), body).with_query("key", &self.config.api_key);

    self.logger.info(&format!(
      "analysis {} sending to {}",
      request.id, self.config.model
    ));
    let response =
      fetch_with_retry(self.transport.as_ref(), &http, &self.config.retry, &self.logger).await?;
    decode_result(&response)
  }
}
