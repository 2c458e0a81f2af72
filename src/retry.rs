use std::time::Duration;

use crate::error::AnalysisError;
use crate::logger::Logger;
use crate::transport::{HttpRequest, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 5,
      base_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  /// Total attempts made; never less than one.
  pub fn attempts(&self) -> u32 {
    self.max_retries.max(1)
  }

  /// Unjittered `base_delay * 2^attempt`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    self.base_delay.saturating_mul(factor)
  }
}

fn is_retryable_status(status: u16) -> bool {
  status == 429 || status >= 500
}

/// Sends `request` until it succeeds, hits a terminal status, or the attempt budget runs out.
///
/// 2xx bodies are decoded as JSON and returned. 429 and 5xx back off and retry, as do
/// transport errors and undecodable 2xx bodies. Any other status fails immediately with
/// [`AnalysisError::HttpError`]. Running out of attempts is always an explicit
/// [`AnalysisError::TransientFailure`], except that a bad body on the final attempt
/// reports [`AnalysisError::DecodeFailure`].
pub async fn fetch_with_retry(
  transport: &dyn Transport,
  request: &HttpRequest,
  policy: &RetryPolicy,
  logger: &Logger,
) -> Result<serde_json::Value, AnalysisError> {
  let attempts = policy.attempts();
  let mut last_cause = String::new();

  for attempt in 0..attempts {
    let is_last = attempt + 1 == attempts;

    match transport.send(request).await {
      Ok(resp) if resp.is_success() => match serde_json::from_slice(&resp.body) {
        Ok(value) => return Ok(value),
        Err(err) if is_last => return Err(AnalysisError::DecodeFailure(err.to_string())),
        Err(err) => {
          last_cause = format!("undecodable body on status {}: {err}", resp.status);
        }
      },
      Ok(resp) if is_retryable_status(resp.status) => {
        last_cause = format!("status {}", resp.status);
      }
      Ok(resp) => {
        logger.warn(&format!(
          "POST {} attempt {} returned terminal status {}",
          request.url,
          attempt + 1,
          resp.status
        ));
        return Err(AnalysisError::HttpError(resp.status));
      }
      Err(err) => {
        last_cause = err.to_string();
      }
    }

    if !is_last {
      let delay = policy.delay_for(attempt);
      logger.warn(&format!(
        "POST {} attempt {}/{attempts} failed ({last_cause}); retrying in {}ms",
        request.url,
        attempt + 1,
        delay.as_millis()
      ));
      tokio::time::sleep(delay).await;
    }
  }

  Err(AnalysisError::TransientFailure {
    attempts,
    last_cause,
  })
}
