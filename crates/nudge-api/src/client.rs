use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use nudge_core::datekey::DateKey;
use nudge_core::task::{Task, UserSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::token::TokenCache;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_ARCHIVE_LIMIT: usize = 200;

/// Partial task update. An omitted field leaves the stored value alone;
/// `deadline_iso: Some(None)` serializes as an explicit `null` and clears
/// the deadline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_iso: Option<Option<String>>,
}

impl TaskPatch {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn deadline(deadline_iso: Option<String>) -> Self {
        Self {
            deadline_iso: Some(deadline_iso),
            ..Self::default()
        }
    }
}

/// Payload for creating a task. `deadline_iso` is the already-normalized
/// wire string; omit it for a deadline-less task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCreate {
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_iso: Option<String>,
}

/// Result of completing a task. `new_task_id` is set when the store rolled
/// a recurring task forward into a fresh occurrence.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteOutcome {
    pub ok: bool,
    #[serde(default)]
    pub new_task_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Acknowledgement {
    #[allow(dead_code)]
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Typed client for the task store's HTTP surface. All timestamps cross
/// this boundary as ISO-8601 strings; the engine's wire serde applies the
/// fixed default offset to any string lacking one.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    cache: TokenCache,
    token_persisted: AtomicBool,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: String,
        cache: TokenCache,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed building HTTP client for task API")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            token,
            cache,
            token_persisted: AtomicBool::new(false),
        })
    }

    #[instrument(skip(self))]
    pub async fn active_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let response = self
            .get("/api/tasks")
            .send()
            .await
            .context("failed requesting active tasks")?;
        self.read_json(response, "list tasks").await
    }

    #[instrument(skip(self))]
    pub async fn completed_tasks_since(&self, since: DateKey) -> anyhow::Result<Vec<Task>> {
        let response = self
            .get("/api/tasks/completed")
            .query(&[("since", since.to_string())])
            .send()
            .await
            .context("failed requesting completed tasks")?;
        self.read_json(response, "list completed tasks").await
    }

    #[instrument(skip(self))]
    pub async fn archived_tasks(&self, limit: usize) -> anyhow::Result<Vec<Task>> {
        let limit = limit.clamp(1, MAX_ARCHIVE_LIMIT);
        let response = self
            .get("/api/tasks/archive")
            .query(&[("limit", limit)])
            .send()
            .await
            .context("failed requesting archived tasks")?;
        self.read_json(response, "list archive").await
    }

    #[instrument(skip(self, create))]
    pub async fn create_task(&self, create: &TaskCreate) -> anyhow::Result<Task> {
        let response = self
            .post("/api/tasks")
            .json(create)
            .send()
            .await
            .context("failed creating task")?;
        self.read_json(response, "create task").await
    }

    #[instrument(skip(self))]
    pub async fn complete_task(&self, id: i64) -> anyhow::Result<CompleteOutcome> {
        let response = self
            .post(&format!("/api/tasks/{id}/complete"))
            .send()
            .await
            .with_context(|| format!("failed completing task {id}"))?;
        self.read_json(response, "complete task").await
    }

    #[instrument(skip(self))]
    pub async fn reopen_task(&self, id: i64) -> anyhow::Result<()> {
        let response = self
            .post(&format!("/api/tasks/{id}/reopen"))
            .send()
            .await
            .with_context(|| format!("failed reopening task {id}"))?;
        self.read_json::<Acknowledgement>(response, "reopen task")
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn archive_task(&self, id: i64) -> anyhow::Result<()> {
        let response = self
            .post(&format!("/api/tasks/{id}/archive"))
            .send()
            .await
            .with_context(|| format!("failed archiving task {id}"))?;
        self.read_json::<Acknowledgement>(response, "archive task")
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&self, id: i64, patch: &TaskPatch) -> anyhow::Result<Task> {
        let response = self
            .http
            .patch(format!("{}/api/tasks/{id}", self.base_url))
            .bearer_auth(&self.token)
            .json(patch)
            .send()
            .await
            .with_context(|| format!("failed updating task {id}"))?;
        self.read_json(response, "update task").await
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: i64) -> anyhow::Result<()> {
        let response = self
            .http
            .delete(format!("{}/api/tasks/{id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("failed deleting task {id}"))?;
        self.read_json::<Acknowledgement>(response, "delete task")
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn clear_archive(&self) -> anyhow::Result<()> {
        let response = self
            .http
            .delete(format!("{}/api/tasks/archive", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed clearing archive")?;
        self.read_json::<Acknowledgement>(response, "clear archive")
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn me(&self) -> anyhow::Result<UserSettings> {
        let response = self
            .get("/api/users/me")
            .send()
            .await
            .context("failed requesting user settings")?;
        self.read_json(response, "fetch user settings").await
    }

    #[instrument(skip(self))]
    pub async fn set_timezone(&self, timezone: &str) -> anyhow::Result<UserSettings> {
        let response = self
            .http
            .patch(format!("{}/api/users/me", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "timezone": timezone }))
            .send()
            .await
            .context("failed updating user settings")?;
        self.read_json(response, "update user settings").await
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    async fn read_json<T>(&self, response: reqwest::Response, context: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.check(response, context).await?;
        response
            .json()
            .await
            .with_context(|| format!("failed decoding response: {context}"))
    }

    /// Success remembers the token as last-known-good; a 401 discards the
    /// cached copy so later attempts do not reuse a rejected value.
    async fn check(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> anyhow::Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            self.remember_good_token();
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|err| err.detail)
            .unwrap_or(body);

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.cache.discard();
            return Err(anyhow!("session token rejected ({context}): {message}"));
        }

        Err(anyhow!("{context} failed with HTTP {status}: {message}"))
    }

    fn remember_good_token(&self) {
        if self.token_persisted.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Err(err) = self.cache.store(&self.token) {
            warn!(error = %err, "failed caching session token");
        } else {
            debug!("session token cached as last-known-good");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TaskPatch;

    #[test]
    fn omitted_patch_fields_are_not_serialized() {
        let patch = TaskPatch::text("new text");
        let json = serde_json::to_string(&patch).expect("serialize");
        assert_eq!(json, r#"{"text":"new text"}"#);
    }

    #[test]
    fn explicit_null_deadline_clears() {
        let patch = TaskPatch::deadline(None);
        let json = serde_json::to_string(&patch).expect("serialize");
        assert_eq!(json, r#"{"deadline_iso":null}"#);
    }

    #[test]
    fn set_deadline_carries_the_wire_string() {
        let patch = TaskPatch::deadline(Some("2025-03-10T09:30:00+05:00".to_string()));
        let json = serde_json::to_string(&patch).expect("serialize");
        assert_eq!(json, r#"{"deadline_iso":"2025-03-10T09:30:00+05:00"}"#);
    }
}
