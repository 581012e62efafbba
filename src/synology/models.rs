//! Wire types for the Synology Web API.

use serde::Deserialize;

/// Auth endpoint, relative to `/webapi/`
pub const AUTH_PATH: &str = "auth.cgi";
/// Download Station task endpoint, relative to `/webapi/`
pub const TASK_PATH: &str = "DownloadStation/task.cgi";
/// Session name used for login and logout
pub const SESSION_NAME: &str = "DownloadStation";

/// Error codes signalling an invalid or expired session
pub const SESSION_EXPIRED_CODES: &[i64] = &[106, 107, 119];

/// Common response envelope: `{"success": bool, "data": ..., "error": {"code": n}}`
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub success: bool,
    /// Payload on success
    pub data: Option<T>,
    /// Error detail on failure
    pub error: Option<ApiErrorBody>,
}

/// Error object of a failed call
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Synology error code
    pub code: i64,
}

/// Payload of a successful login
#[derive(Debug, Deserialize)]
pub struct LoginData {
    /// Session id
    pub sid: String,
}

/// Payload of a successful task creation, when the NAS returns one
#[derive(Debug, Default, Deserialize)]
pub struct CreateTaskData {
    /// Identifiers of the created tasks
    #[serde(default)]
    pub task_id: Vec<String>,
}

/// Payload of a task listing
#[derive(Debug, Default, Deserialize)]
pub struct TaskList {
    /// Total number of tasks
    #[serde(default)]
    pub total: u64,
    /// Tasks in this page
    #[serde(default)]
    pub tasks: Vec<TaskInfo>,
}

/// One Download Station task
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    /// Task identifier
    pub id: String,
    /// Task title, usually the file name
    #[serde(default)]
    pub title: String,
    /// Task status, e.g. `waiting`, `downloading`, `finished`
    #[serde(default)]
    pub status: String,
}

/// Description of a login error code
#[must_use]
pub fn auth_error_message(code: i64) -> &'static str {
    match code {
        400 => "no such account or incorrect password",
        401 => "account disabled",
        402 => "permission denied",
        403 => "2-step verification code required",
        404 => "failed to authenticate 2-step verification code",
        _ => common_error_message(code),
    }
}

/// Description of a task API error code
#[must_use]
pub fn task_error_message(code: i64) -> &'static str {
    match code {
        400 => "file upload failed",
        401 => "max number of tasks reached",
        402 => "destination denied",
        403 => "destination does not exist",
        404 => "invalid task id",
        405 => "invalid task action",
        406 => "no default destination",
        407 => "set destination failed",
        408 => "file does not exist",
        _ => common_error_message(code),
    }
}

fn common_error_message(code: i64) -> &'static str {
    match code {
        100 => "unknown error",
        101 => "invalid parameter",
        102 => "the requested API does not exist",
        103 => "the requested method does not exist",
        104 => "the requested version does not support the functionality",
        105 => "the logged in session does not have permission",
        106 => "session timeout",
        107 => "session interrupted by duplicate login",
        119 => "session id not found",
        _ => "unrecognised error code",
    }
}
