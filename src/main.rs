use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use prompt_lens::analyzer::Analyzer;
use prompt_lens::config::{api_key_from_env, data_dir, load_or_init, API_KEY_ENV};
use prompt_lens::logger::Logger;
use prompt_lens::router::{loopback_origins, run_router, RouterState};
use prompt_lens::session::Dashboard;
use prompt_lens::transport::ReqwestTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let data_dir = data_dir()?;
  std::fs::create_dir_all(&data_dir)
    .with_context(|| format!("cannot create {}", data_dir.display()))?;

  let config_path = data_dir.join("config.json");
  let log_path = data_dir.join("prompt-lens.log");

  let logger = Arc::new(Logger::new(&log_path)?);
  logger.info("PromptLens starting up");

  let config = load_or_init(&config_path)?;
  logger.info(&format!("config loaded from {}", config_path.display()));

  let api_key = api_key_from_env();
  if api_key.is_empty() {
    logger.warn(&format!("{API_KEY_ENV} is not set; analysis will be unavailable"));
    eprintln!("warning: {API_KEY_ENV} is not set; analysis will be unavailable");
  }

  let analyzer = Analyzer::new(
    Arc::new(ReqwestTransport::new()),
    config.analyzer_config(api_key),
    logger.clone(),
  );

  let listener = std::net::TcpListener::bind(("127.0.0.1", config.port))
    .with_context(|| format!("cannot bind 127.0.0.1:{}", config.port))?;
  let addr = listener.local_addr()?;
  logger.info(&format!("dashboard listening on http://{addr}"));
  println!("PromptLens dashboard: http://{addr}");
  println!("log file: {}", log_path.display());

  let state = RouterState {
    started_at: Instant::now(),
    dashboard: Dashboard::new(analyzer, logger.clone()),
    logger: logger.clone(),
    allowed_origins: loopback_origins(addr.port()),
  };

  if let Err(err) = run_router(listener, state).await {
    logger.error(&format!("router error: {err}"));
    return Err(err);
  }
  Ok(())
}
