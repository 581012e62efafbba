//! Download Station Web API client.
//!
//! Holds the single NAS session. All session mutation happens under one
//! async mutex, so at most one login is in flight; callers that queued
//! behind a login reuse its result, success or failure.

use super::error::SynologyError;
use super::models::{
    auth_error_message, task_error_message, ApiResponse, CreateTaskData, LoginData, TaskList,
    AUTH_PATH, SESSION_EXPIRED_CODES, SESSION_NAME, TASK_PATH,
};
use super::{DownloadStation, SubmissionResult};
use crate::config::SynologySettings;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const AUTH_API: &str = "SYNO.API.Auth";
const TASK_API: &str = "SYNO.DownloadStation.Task";

struct Session {
    sid: String,
    obtained_at: Instant,
}

#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    last_failure: Option<SynologyError>,
}

/// Client for the Synology Download Station API
pub struct SynologyClient {
    http: HttpClient,
    settings: SynologySettings,
    base_url: String,
    state: Mutex<SessionState>,
    /// Completed login attempts; only changed while `state` is locked
    login_attempts: AtomicU64,
}

impl SynologyClient {
    /// Create a client. No network traffic happens until the first call.
    ///
    /// # Errors
    ///
    /// Returns `SynologyError::Client` if the HTTP client cannot be built.
    pub fn new(settings: SynologySettings) -> Result<Self, SynologyError> {
        let http = HttpClient::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| SynologyError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.api_base_url(),
            settings,
            state: Mutex::new(SessionState::default()),
            login_attempts: AtomicU64::new(0),
        })
    }

    /// Connection settings in use
    #[must_use]
    pub const fn settings(&self) -> &SynologySettings {
        &self.settings
    }

    /// Log in and store a fresh session, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns `SynologyError::Auth` on rejected credentials or an unreachable host.
    pub async fn authenticate(&self) -> Result<(), SynologyError> {
        let mut state = self.state.lock().await;
        self.login_locked(&mut state).await.map(|_| ())
    }

    /// Log out and forget the session. Does nothing without a session.
    ///
    /// # Errors
    ///
    /// Returns the transport or API error of the logout call. The local
    /// session is dropped either way.
    pub async fn logout(&self) -> Result<(), SynologyError> {
        let Some(session) = self.state.lock().await.session.take() else {
            return Ok(());
        };

        let response: ApiResponse<serde_json::Value> = self
            .call(
                AUTH_PATH,
                &[
                    ("api", AUTH_API),
                    ("version", "3"),
                    ("method", "logout"),
                    ("session", SESSION_NAME),
                    ("_sid", session.sid.as_str()),
                ],
            )
            .await?;
        check(response, auth_error_message)?;
        info!(host = %self.settings.host, "Logged out from Synology NAS");
        Ok(())
    }

    /// List Download Station tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or the listing call fails.
    pub async fn list_tasks(&self) -> Result<TaskList, SynologyError> {
        self.with_session(|sid| async move {
            let response: ApiResponse<TaskList> = self
                .call(
                    TASK_PATH,
                    &[
                        ("api", TASK_API),
                        ("version", "1"),
                        ("method", "list"),
                        ("_sid", sid.as_str()),
                    ],
                )
                .await?;
            Ok(check(response, task_error_message)?.unwrap_or_default())
        })
        .await
    }

    /// Run `operation` with a valid session id, re-authenticating and
    /// retrying once if the NAS reports the session as expired.
    async fn with_session<T, F, Fut>(&self, operation: F) -> Result<T, SynologyError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, SynologyError>>,
    {
        let sid = self.session_id(None).await?;
        match operation(sid.clone()).await {
            Err(e) if e.is_session_expired() => {
                warn!(error = %e, "Synology session rejected, re-authenticating once");
                let sid = self.session_id(Some(&sid)).await?;
                operation(sid).await
            }
            other => other,
        }
    }

    /// Current session id, logging in when the session is absent, older than
    /// the configured TTL, or equal to `rejected`.
    async fn session_id(&self, rejected: Option<&str>) -> Result<String, SynologyError> {
        let observed_attempts = self.login_attempts.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        if let Some(session) = &state.session {
            let is_rejected = rejected.is_some_and(|sid| sid == session.sid);
            if !is_rejected && session.obtained_at.elapsed() < self.settings.session_ttl {
                return Ok(session.sid.clone());
            }
        }

        // A login finished while we waited for the lock and it failed: share that result.
        if self.login_attempts.load(Ordering::Acquire) != observed_attempts {
            if let Some(failure) = &state.last_failure {
                return Err(failure.clone());
            }
        }

        self.login_locked(&mut state).await
    }

    async fn login_locked(&self, state: &mut SessionState) -> Result<String, SynologyError> {
        state.session = None;
        let result = self.login().await;
        self.login_attempts.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(sid) => {
                info!(
                    host = %self.settings.host,
                    port = self.settings.port,
                    "Logged in to Synology NAS"
                );
                state.session = Some(Session {
                    sid: sid.clone(),
                    obtained_at: Instant::now(),
                });
                state.last_failure = None;
                Ok(sid)
            }
            Err(e) => {
                error!(
                    host = %self.settings.host,
                    port = self.settings.port,
                    error = %e,
                    "Synology login failed"
                );
                state.last_failure = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn login(&self) -> Result<String, SynologyError> {
        let auth_error = |reason: String| SynologyError::Auth {
            host: self.settings.host.clone(),
            port: self.settings.port,
            reason,
        };

        let response: ApiResponse<LoginData> = self
            .call(
                AUTH_PATH,
                &[
                    ("api", AUTH_API),
                    ("version", "3"),
                    ("method", "login"),
                    ("account", self.settings.username.as_str()),
                    ("passwd", self.settings.password.expose_secret().as_str()),
                    ("session", SESSION_NAME),
                    ("format", "sid"),
                ],
            )
            .await
            .map_err(|e| auth_error(e.to_string()))?;

        if !response.success {
            let code = response.error.map_or(100, |e| e.code);
            return Err(auth_error(format!(
                "{} (code {code})",
                auth_error_message(code)
            )));
        }

        response
            .data
            .map(|data| data.sid)
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| auth_error("login response carried no session id".to_string()))
    }

    async fn create_task(
        &self,
        sid: String,
        url: &str,
        destination: &str,
    ) -> Result<Option<String>, SynologyError> {
        let mut form = vec![
            ("api", TASK_API),
            ("version", "1"),
            ("method", "create"),
            ("uri", url),
        ];
        if !destination.is_empty() {
            form.push(("destination", destination));
        }
        form.push(("_sid", sid.as_str()));

        let response: ApiResponse<CreateTaskData> = self.call(TASK_PATH, &form).await?;
        let data = check(response, task_error_message)?;
        Ok(data.and_then(|d| d.task_id.into_iter().next()))
    }

    /// POST a form to a Web API endpoint and decode the JSON envelope.
    /// Credentials travel in the body, never in the URL.
    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, SynologyError> {
        let timeout_secs = self.settings.timeout.as_secs();
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .form(form)
            .send()
            .await
            .map_err(|e| SynologyError::from_transport(&e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynologyError::HttpStatus(status.as_u16()));
        }

        response.json::<ApiResponse<T>>().await.map_err(|e| {
            if e.is_timeout() {
                SynologyError::Timeout(timeout_secs)
            } else {
                SynologyError::Decode(e.to_string())
            }
        })
    }
}

/// Turn an API envelope into its payload or a typed error
fn check<T>(
    response: ApiResponse<T>,
    describe: fn(i64) -> &'static str,
) -> Result<Option<T>, SynologyError> {
    if response.success {
        return Ok(response.data);
    }
    let code = response.error.map_or(100, |e| e.code);
    if SESSION_EXPIRED_CODES.contains(&code) {
        Err(SynologyError::SessionExpired(code))
    } else {
        Err(SynologyError::Api {
            code,
            message: describe(code).to_string(),
        })
    }
}

#[async_trait]
impl DownloadStation for SynologyClient {
    async fn submit_download(
        &self,
        url: &str,
        destination: &str,
        filename: &str,
    ) -> SubmissionResult {
        debug!(url, destination, filename, "Submitting download task");
        match self
            .with_session(|sid| self.create_task(sid, url, destination))
            .await
        {
            Ok(task_id) => SubmissionResult::Queued { task_id },
            Err(e) => SubmissionResult::Failed(e),
        }
    }
}
