use crate::api::error::{ApiError, DEMO_ACCOUNT_HEADER};
use crate::api::sse::{parse_chat_event, ChatEvent, SseDecoder};
use crate::api::types::{ActionItem, ChatOutcome, ChatRequest, Control, Risk};
use crate::api::TamioApi;
use crate::config::Settings;
use crate::domain::forecast::Forecast;
use crate::domain::scenario::{NewScenario, Scenario, ScenarioComparison, ScenarioSuggestion};
use anyhow::{Context, Result};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct HttpTamioApi {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    chat_timeout: Duration,
}

impl HttpTamioApi {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_api_base_url()?.to_string();

        let timeout_secs = std::env::var("TAMIO_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("TAMIO_API_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let chat_timeout_secs = std::env::var("TAMIO_CHAT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CHAT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build tamio api http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
            chat_timeout: Duration::from_secs(chat_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|err| transport_error(path, &err))?;
        read_json(path, res).await
    }

    /// GETs are idempotent and retried with exponential backoff. Client
    /// errors (4xx, demo account, decode) fail immediately.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(path, query).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.retries || !is_retryable(&err) {
                        return Err(err);
                    }
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        path,
                        error = %err,
                        "tamio api GET failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let res = self.send(method, path, body).await?;
        read_json(path, res).await
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut req = self.http.request(method, self.url(path));
        if let Some(body) = body {
            req = req.json(body);
        }
        let res = req.send().await.map_err(|err| transport_error(path, &err))?;
        if res.status().is_success() {
            return Ok(res);
        }
        Err(error_from_response(res).await.into())
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(6))
}

fn is_retryable(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Transport { .. }) => true,
        Some(ApiError::Http { status, .. }) => *status >= 500 || *status == 429,
        _ => false,
    }
}

fn transport_error(path: &str, err: &reqwest::Error) -> anyhow::Error {
    ApiError::Transport {
        endpoint: path.to_string(),
        detail: err.to_string(),
    }
    .into()
}

async fn error_from_response(res: Response) -> ApiError {
    let status = res.status().as_u16();
    let demo_header = res
        .headers()
        .get(DEMO_ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let body = res.text().await.unwrap_or_default();
    ApiError::from_response(status, demo_header, &body)
}

async fn read_json<T: DeserializeOwned>(path: &str, res: Response) -> Result<T> {
    if !res.status().is_success() {
        return Err(error_from_response(res).await.into());
    }
    let text = res
        .text()
        .await
        .map_err(|err| transport_error(path, &err))?;
    decode_json(path, &text)
}

fn decode_json<T: DeserializeOwned>(path: &str, text: &str) -> Result<T> {
    serde_json::from_str::<T>(text).map_err(|err| {
        ApiError::Decode {
            endpoint: path.to_string(),
            detail: err.to_string(),
        }
        .into()
    })
}

/// Folds chat events into the reply text until the terminal event.
#[derive(Debug, Default)]
struct ChatAccumulator {
    text: String,
    session_id: Option<String>,
}

impl ChatAccumulator {
    /// Returns true once the stream is complete.
    fn accept(&mut self, event: &ChatEvent) -> Result<bool> {
        match event {
            ChatEvent::Chunk { content } => {
                self.text.push_str(content);
                Ok(false)
            }
            ChatEvent::Done { session_id } => {
                self.session_id = Some(session_id.clone());
                Ok(true)
            }
            ChatEvent::Error { message } => anyhow::bail!("chat stream error: {message}"),
        }
    }

    fn into_outcome(self) -> Result<ChatOutcome> {
        let session_id = self
            .session_id
            .context("chat stream ended without a done event")?;
        Ok(ChatOutcome {
            session_id,
            text: self.text,
        })
    }
}

#[async_trait::async_trait]
impl TamioApi for HttpTamioApi {
    async fn fetch_forecast(&self, user_id: &str, weeks: u32) -> Result<Forecast> {
        self.get_json(
            "/api/forecast",
            &[("user_id", user_id.to_string()), ("weeks", weeks.to_string())],
        )
        .await
    }

    async fn list_scenarios(&self, user_id: &str) -> Result<Vec<Scenario>> {
        self.get_json("/api/scenarios", &[("user_id", user_id.to_string())])
            .await
    }

    async fn create_scenario(&self, user_id: &str, input: &NewScenario) -> Result<Scenario> {
        let body = json!({
            "user_id": user_id,
            "name": input.name,
            "params": input.params,
        });
        self.send_json(Method::POST, "/api/scenarios", Some(&body))
            .await
    }

    async fn update_scenario(&self, scenario: &Scenario) -> Result<Scenario> {
        let path = format!("/api/scenarios/{}", scenario.id);
        self.send_json(Method::PUT, &path, Some(scenario)).await
    }

    async fn delete_scenario(&self, scenario_id: &str) -> Result<()> {
        let path = format!("/api/scenarios/{scenario_id}");
        self.send::<()>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn fetch_scenario_comparison(
        &self,
        scenario_id: &str,
        weeks: u32,
    ) -> Result<ScenarioComparison> {
        let path = format!("/api/scenarios/{scenario_id}/comparison");
        self.get_json(&path, &[("weeks", weeks.to_string())]).await
    }

    async fn fetch_scenario_suggestions(&self, user_id: &str) -> Result<Vec<ScenarioSuggestion>> {
        self.get_json(
            "/api/scenarios/suggestions",
            &[("user_id", user_id.to_string())],
        )
        .await
    }

    async fn list_actions(&self, user_id: &str) -> Result<Vec<ActionItem>> {
        self.get_json("/api/actions", &[("user_id", user_id.to_string())])
            .await
    }

    async fn approve_action(&self, action_id: &str) -> Result<ActionItem> {
        let path = format!("/api/actions/{action_id}/approve");
        self.send_json::<(), _>(Method::POST, &path, None).await
    }

    async fn skip_action(&self, action_id: &str) -> Result<ActionItem> {
        let path = format!("/api/actions/{action_id}/skip");
        self.send_json::<(), _>(Method::POST, &path, None).await
    }

    async fn override_action(&self, action_id: &str, note: &str) -> Result<ActionItem> {
        let path = format!("/api/actions/{action_id}/override");
        self.send_json(Method::POST, &path, Some(&json!({ "note": note })))
            .await
    }

    async fn fetch_risks(&self, user_id: &str) -> Result<Vec<Risk>> {
        self.get_json("/api/risks", &[("user_id", user_id.to_string())])
            .await
    }

    async fn fetch_controls(&self, user_id: &str) -> Result<Vec<Control>> {
        self.get_json("/api/controls", &[("user_id", user_id.to_string())])
            .await
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_event: &mut (dyn for<'e> FnMut(&'e ChatEvent) + Send),
    ) -> Result<ChatOutcome> {
        let path = "/api/chat/stream";
        let res = self
            .http
            .post(self.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(self.chat_timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| transport_error(path, &err))?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await.into());
        }

        let mut res = res;
        let mut decoder = SseDecoder::default();
        let mut acc = ChatAccumulator::default();
        loop {
            let chunk = res
                .chunk()
                .await
                .map_err(|err| transport_error(path, &err))?;
            let frames = match &chunk {
                Some(bytes) => decoder.push(bytes),
                None => decoder.finish().into_iter().collect(),
            };
            if dispatch_frames(frames, on_event, &mut acc)? {
                return acc.into_outcome();
            }
            if chunk.is_none() {
                break;
            }
        }
        acc.into_outcome()
    }
}

/// Hands each decoded frame to `on_event` before folding it into `acc`.
/// Returns true once the terminal event has been seen.
fn dispatch_frames(
    frames: Vec<String>,
    on_event: &mut (dyn for<'e> FnMut(&'e ChatEvent) + Send),
    acc: &mut ChatAccumulator,
) -> Result<bool> {
    for frame in frames {
        let event = parse_chat_event(&frame)?;
        on_event(&event);
        if acc.accept(&event)? {
            return Ok(true);
        }
    }
    Ok(false)
}
