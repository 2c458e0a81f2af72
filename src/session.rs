use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::analyzer::Analyzer;
use crate::error::{AnalysisError, ValidationError, GENERIC_FAILURE};
use crate::ingest::ingest;
use crate::logger::Logger;
use crate::models::{AnalysisResult, ImageAsset, SelectedFile};

/// Where the single logical analysis attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
  Idle,
  HasImage,
  InFlight,
  Succeeded(AnalysisResult),
  Failed(String),
}

impl RequestState {
  pub fn name(&self) -> &'static str {
    match self {
      RequestState::Idle => "idle",
      RequestState::HasImage => "has_image",
      RequestState::InFlight => "in_flight",
      RequestState::Succeeded(_) => "succeeded",
      RequestState::Failed(_) => "failed",
    }
  }
}

/// A user action refused because an analysis is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("an analysis is already in flight")]
pub struct Busy;

/// Pure state machine. Every method applies its whole transition or none of it.
#[derive(Debug, Clone)]
pub struct Session {
  state: RequestState,
  asset: Option<ImageAsset>,
  notice: Option<String>,
}

impl Default for Session {
  fn default() -> Self {
    Self {
      state: RequestState::Idle,
      asset: None,
      notice: None,
    }
  }
}

impl Session {
  pub fn state(&self) -> &RequestState {
    &self.state
  }

  pub fn asset(&self) -> Option<&ImageAsset> {
    self.asset.as_ref()
  }

  pub fn is_busy(&self) -> bool {
    self.state == RequestState::InFlight
  }

  /// A new valid image replaces the old one and drops any result or error.
  pub fn accept_image(&mut self, asset: ImageAsset) -> Result<(), Busy> {
    if self.is_busy() {
      return Err(Busy);
    }
    self.asset = Some(asset);
    self.state = RequestState::HasImage;
    self.notice = None;
    Ok(())
  }

  /// A rejected file only surfaces its message; image and result are kept.
  pub fn reject_image(&mut self, err: &ValidationError) -> Result<(), Busy> {
    if self.is_busy() {
      return Err(Busy);
    }
    self.notice = Some(err.user_message());
    Ok(())
  }

  /// Moves to `InFlight` and hands back the asset to send, or `None` when there is nothing
  /// to analyze or an analysis is already running.
  pub fn begin_analysis(&mut self) -> Option<ImageAsset> {
    if self.is_busy() {
      return None;
    }
    let asset = self.asset.clone()?;
    self.state = RequestState::InFlight;
    self.notice = None;
    Some(asset)
  }

  pub fn finish_analysis(&mut self, outcome: Result<AnalysisResult, AnalysisError>) {
    if !self.is_busy() {
      return;
    }
    self.state = match outcome {
      Ok(result) => RequestState::Succeeded(result),
      Err(err) => RequestState::Failed(err.user_message()),
    };
  }

  /// Leaves `InFlight` when the pipeline task died without reporting an outcome.
  pub fn abandon_analysis(&mut self) {
    if self.is_busy() {
      self.state = RequestState::Failed(GENERIC_FAILURE.to_string());
    }
  }

  pub fn reset(&mut self) -> Result<(), Busy> {
    if self.is_busy() {
      return Err(Busy);
    }
    *self = Session::default();
    Ok(())
  }

  pub fn view(&self) -> SessionView {
    let (result, error) = match &self.state {
      RequestState::Succeeded(result) => (Some(result.clone()), self.notice.clone()),
      RequestState::Failed(message) => {
        (None, self.notice.clone().or_else(|| Some(message.clone())))
      }
      _ => (None, self.notice.clone()),
    };
    SessionView {
      state: self.state.name(),
      image: self.asset.clone(),
      result,
      error,
      can_analyze: self.asset.is_some() && !self.is_busy(),
    }
  }
}

/// What the dashboard renders.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
  pub state: &'static str,
  pub image: Option<ImageAsset>,
  pub result: Option<AnalysisResult>,
  pub error: Option<String>,
  pub can_analyze: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
  Completed,
  NoImage,
  Busy,
}

/// Drives a [`Session`] from user actions and pipeline outcomes.
pub struct Dashboard {
  session: Arc<Mutex<Session>>,
  analyzer: Arc<Analyzer>,
  logger: Arc<Logger>,
}

impl Dashboard {
  pub fn new(analyzer: Analyzer, logger: Arc<Logger>) -> Self {
    Self {
      session: Arc::new(Mutex::new(Session::default())),
      analyzer: Arc::new(analyzer),
      logger,
    }
  }

  pub fn has_credential(&self) -> bool {
    self.analyzer.has_credential()
  }

  pub async fn snapshot(&self) -> SessionView {
    self.session.lock().await.view()
  }

  pub async fn select_image(&self, file: SelectedFile) -> Result<Result<(), ValidationError>, Busy> {
    if self.session.lock().await.is_busy() {
      return Err(Busy);
    }

    let name = file.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
    let ingested = ingest(file).await;

    let mut session = self.session.lock().await;
    match ingested {
      Ok(asset) => {
        self.logger.info(&format!(
          "ingested {name} ({}, {} bytes)",
          asset.media_type, asset.byte_len
        ));
        session.accept_image(asset)?;
        Ok(Ok(()))
      }
      Err(err) => {
        self.logger.warn(&format!("rejected {name}: {err}"));
        session.reject_image(&err)?;
        Ok(Err(err))
      }
    }
  }

  /// Runs one analysis. The session lock is not held across the network call, so a
  /// concurrent caller observes `InFlight` and is turned away. The pipeline runs on its
  /// own task that owns the outcome, so dropping this future (a client hanging up) does
  /// not leave the session stuck in `InFlight`.
  pub async fn analyze(&self) -> AnalyzeOutcome {
    let asset = {
      let mut session = self.session.lock().await;
      if session.is_busy() {
        return AnalyzeOutcome::Busy;
      }
      match session.begin_analysis() {
        Some(asset) => asset,
        None => return AnalyzeOutcome::NoImage,
      }
    };

    let session = self.session.clone();
    let analyzer = self.analyzer.clone();
    let task = tokio::spawn(async move {
      let outcome = analyzer.analyze(&asset).await;
      session.lock().await.finish_analysis(outcome);
    });

    if let Err(err) = task.await {
      self.logger.error(&format!("analysis task ended abnormally: {err}"));
      self.session.lock().await.abandon_analysis();
    }
    AnalyzeOutcome::Completed
  }

  pub async fn reset(&self) -> Result<(), Busy> {
    self.session.lock().await.reset()?;
    self.logger.info("session reset");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analyzer::tests::{asset, config, full_result_text, generated};
  use crate::error::{MISSING_CREDENTIAL, NOT_AN_IMAGE};
  use crate::error::TransportError;
  use crate::transport::tests::{json, status, ScriptedTransport};
  use crate::transport::{HttpRequest, HttpResponse, Transport};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::sync::Notify;

  fn result() -> AnalysisResult {
    crate::analyzer::decode_result(&generated(&full_result_text())).expect("valid")
  }

  fn png(bytes: &[u8]) -> SelectedFile {
    SelectedFile {
      name: Some("a.png".to_string()),
      media_type: "image/png".to_string(),
      bytes: bytes.to_vec(),
    }
  }

  fn text_file() -> SelectedFile {
    SelectedFile {
      name: Some("notes.txt".to_string()),
      media_type: "text/plain".to_string(),
      bytes: b"hi".to_vec(),
    }
  }

  fn dashboard(transport: Arc<dyn Transport>, api_key: &str) -> Dashboard {
    let logger = Arc::new(Logger::sink());
    Dashboard::new(Analyzer::new(transport, config(api_key), logger.clone()), logger)
  }

  #[test]
  fn full_happy_path() {
    let mut session = Session::default();
    assert_eq!(session.state(), &RequestState::Idle);
    assert!(!session.view().can_analyze);

    session.accept_image(asset()).unwrap();
    assert_eq!(session.state(), &RequestState::HasImage);
    assert!(session.view().can_analyze);

    assert_eq!(session.begin_analysis(), Some(asset()));
    assert_eq!(session.state(), &RequestState::InFlight);
    assert!(!session.view().can_analyze);

    session.finish_analysis(Ok(result()));
    assert_eq!(session.state(), &RequestState::Succeeded(result()));
    assert_eq!(session.view().result, Some(result()));

    session.reset().unwrap();
    assert_eq!(session.state(), &RequestState::Idle);
    assert!(session.asset().is_none());
    assert!(session.view().error.is_none());
  }

  #[test]
  fn failure_keeps_image_for_retry() {
    let mut session = Session::default();
    session.accept_image(asset()).unwrap();
    session.begin_analysis().unwrap();
    session.finish_analysis(Err(AnalysisError::HttpError(500)));

    assert_eq!(session.state(), &RequestState::Failed(GENERIC_FAILURE.to_string()));
    assert_eq!(session.asset(), Some(&asset()));
    assert_eq!(session.view().error.as_deref(), Some(GENERIC_FAILURE));
    assert!(session.begin_analysis().is_some());
  }

  #[test]
  fn no_analysis_without_image() {
    let mut session = Session::default();
    assert!(session.begin_analysis().is_none());
    assert_eq!(session.state(), &RequestState::Idle);
  }

  #[test]
  fn in_flight_suppresses_every_action() {
    let mut session = Session::default();
    session.accept_image(asset()).unwrap();
    session.begin_analysis().unwrap();

    assert!(session.begin_analysis().is_none());
    assert_eq!(session.accept_image(asset()), Err(Busy));
    assert_eq!(session.reset(), Err(Busy));
    assert_eq!(
      session.reject_image(&ValidationError::NotAnImage {
        media_type: "text/plain".to_string()
      }),
      Err(Busy)
    );
    assert_eq!(session.state(), &RequestState::InFlight);
  }

  #[test]
  fn rejected_file_keeps_image_and_result() {
    let mut session = Session::default();
    session.accept_image(asset()).unwrap();
    session.begin_analysis().unwrap();
    session.finish_analysis(Ok(result()));

    let err = ValidationError::NotAnImage {
      media_type: "text/plain".to_string(),
    };
    session.reject_image(&err).unwrap();

    assert_eq!(session.state(), &RequestState::Succeeded(result()));
    assert_eq!(session.asset(), Some(&asset()));
    let view = session.view();
    assert_eq!(view.result, Some(result()));
    assert_eq!(view.error.as_deref(), Some(NOT_AN_IMAGE));
  }

  #[test]
  fn rejected_file_after_failure_shows_ingestion_error() {
    let mut session = Session::default();
    session.accept_image(asset()).unwrap();
    session.begin_analysis().unwrap();
    session.finish_analysis(Err(AnalysisError::HttpError(500)));
    assert_eq!(session.view().error.as_deref(), Some(GENERIC_FAILURE));

    session
      .reject_image(&ValidationError::NotAnImage {
        media_type: "text/plain".to_string(),
      })
      .unwrap();

    assert_eq!(session.state(), &RequestState::Failed(GENERIC_FAILURE.to_string()));
    assert_eq!(session.asset(), Some(&asset()));
    assert_eq!(session.view().error.as_deref(), Some(NOT_AN_IMAGE));
  }

  #[test]
  fn abandoned_analysis_becomes_retryable_failure() {
    let mut session = Session::default();
    session.accept_image(asset()).unwrap();
    session.begin_analysis().unwrap();
    session.abandon_analysis();

    assert_eq!(session.state(), &RequestState::Failed(GENERIC_FAILURE.to_string()));
    assert!(session.view().can_analyze);

    session.reset().unwrap();
    session.abandon_analysis();
    assert_eq!(session.state(), &RequestState::Idle);
  }

  #[test]
  fn new_image_clears_stale_error_and_result() {
    let mut session = Session::default();
    session.accept_image(asset()).unwrap();
    session
      .reject_image(&ValidationError::NotAnImage {
        media_type: String::new(),
      })
      .unwrap();
    assert!(session.view().error.is_some());

    let mut replacement = asset();
    replacement.payload = "WFla".to_string();
    session.accept_image(replacement.clone()).unwrap();
    assert_eq!(session.state(), &RequestState::HasImage);
    assert_eq!(session.asset(), Some(&replacement));
    assert!(session.view().error.is_none());

    session.begin_analysis().unwrap();
    session.finish_analysis(Ok(result()));
    session.accept_image(asset()).unwrap();
    assert_eq!(session.state(), &RequestState::HasImage);
    assert!(session.view().result.is_none());
  }

  #[test]
  fn view_serializes_state_name_without_payload() {
    let mut session = Session::default();
    session.accept_image(asset()).unwrap();
    let value = serde_json::to_value(session.view()).unwrap();
    assert_eq!(value["state"], "has_image");
    assert_eq!(value["image"]["preview"], "data:image/jpeg;base64,QUJD");
    assert!(value["image"].get("payload").is_none());
    assert_eq!(value["can_analyze"], true);
  }

  #[tokio::test]
  async fn dashboard_round_trip() {
    let transport = Arc::new(ScriptedTransport::always(json(200, generated(&full_result_text()))));
    let dash = dashboard(transport.clone(), "k");

    assert_eq!(dash.select_image(png(b"img")).await, Ok(Ok(())));
    assert_eq!(dash.snapshot().await.state, "has_image");

    assert_eq!(dash.analyze().await, AnalyzeOutcome::Completed);
    let view = dash.snapshot().await;
    assert_eq!(view.state, "succeeded");
    assert_eq!(view.result, Some(result()));
    assert_eq!(transport.calls(), 1);

    dash.reset().await.unwrap();
    assert_eq!(dash.snapshot().await.state, "idle");
  }

  #[tokio::test]
  async fn dashboard_rejects_non_image_without_touching_state() {
    let transport = Arc::new(ScriptedTransport::always(status(500)));
    let dash = dashboard(transport, "k");
    dash.select_image(png(b"img")).await.unwrap().unwrap();
    let before = dash.snapshot().await.image;

    let outcome = dash.select_image(text_file()).await.unwrap();
    assert!(matches!(outcome, Err(ValidationError::NotAnImage { .. })));

    let view = dash.snapshot().await;
    assert_eq!(view.state, "has_image");
    assert_eq!(view.image, before);
    assert_eq!(view.error.as_deref(), Some(NOT_AN_IMAGE));
  }

  #[tokio::test]
  async fn dashboard_analyze_without_image() {
    let transport = Arc::new(ScriptedTransport::always(status(200)));
    let dash = dashboard(transport.clone(), "k");
    assert_eq!(dash.analyze().await, AnalyzeOutcome::NoImage);
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn missing_credential_fails_without_network() {
    let transport = Arc::new(ScriptedTransport::always(json(200, generated(&full_result_text()))));
    let dash = dashboard(transport.clone(), "");
    assert!(!dash.has_credential());
    dash.select_image(png(b"img")).await.unwrap().unwrap();

    assert_eq!(dash.analyze().await, AnalyzeOutcome::Completed);
    let view = dash.snapshot().await;
    assert_eq!(view.state, "failed");
    assert_eq!(view.error.as_deref(), Some(MISSING_CREDENTIAL));
    assert!(view.image.is_some());
    assert_eq!(transport.calls(), 0);
  }

  /// Holds every request until released, counting calls.
  struct GatedTransport {
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
  }

  #[async_trait::async_trait]
  impl Transport for GatedTransport {
    async fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.entered.notify_one();
      self.release.notified().await;
      Ok(HttpResponse {
        status: 200,
        body: generated(&full_result_text()).to_string().into_bytes(),
      })
    }
  }

  #[tokio::test]
  async fn second_analyze_while_in_flight_is_a_no_op() {
    let transport = Arc::new(GatedTransport {
      calls: AtomicUsize::new(0),
      entered: Notify::new(),
      release: Notify::new(),
    });
    let dash = Arc::new(dashboard(transport.clone(), "k"));
    dash.select_image(png(b"img")).await.unwrap().unwrap();

    let first = tokio::spawn({
      let dash = dash.clone();
      async move { dash.analyze().await }
    });
    transport.entered.notified().await;

    assert_eq!(dash.snapshot().await.state, "in_flight");
    assert_eq!(dash.analyze().await, AnalyzeOutcome::Busy);
    assert_eq!(dash.reset().await, Err(Busy));
    assert_eq!(dash.select_image(png(b"other")).await, Err(Busy));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

    transport.release.notify_one();
    assert_eq!(first.await.unwrap(), AnalyzeOutcome::Completed);
    assert_eq!(dash.snapshot().await.state, "succeeded");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn dropped_analyze_call_still_settles_session() {
    let transport = Arc::new(GatedTransport {
      calls: AtomicUsize::new(0),
      entered: Notify::new(),
      release: Notify::new(),
    });
    let dash = Arc::new(dashboard(transport.clone(), "k"));
    dash.select_image(png(b"img")).await.unwrap().unwrap();

    let caller = tokio::spawn({
      let dash = dash.clone();
      async move { dash.analyze().await }
    });
    transport.entered.notified().await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    transport.release.notify_one();
    for _ in 0..100 {
      if dash.snapshot().await.state != "in_flight" {
        break;
      }
      tokio::task::yield_now().await;
    }

    let view = dash.snapshot().await;
    assert_eq!(view.state, "succeeded");
    assert_eq!(view.result, Some(result()));
    assert_eq!(dash.reset().await, Ok(()));
    assert_eq!(dash.snapshot().await.state, "idle");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
  }
}
