use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const DEMO_ACCOUNT_HEADER: &str = "x-demo-account";

const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";
const DEMO_UPGRADE_MESSAGE: &str =
    "This is a read-only demo account. Create your own account to make changes.";

#[derive(Debug, Clone)]
pub enum ApiError {
    /// The backend refused a write because the session belongs to the shared
    /// read-only demo account.
    DemoAccount { message: Option<String> },
    Http { status: u16, body: String },
    Decode { endpoint: String, detail: String },
    Transport { endpoint: String, detail: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::DemoAccount { message } => write!(
                f,
                "API error (demo account): {}",
                message.as_deref().unwrap_or("read-only")
            ),
            ApiError::Http { status, body } => write!(f, "API error (status={status}): {body}"),
            ApiError::Decode { endpoint, detail } => {
                write!(f, "API error (decode {endpoint}): {detail}")
            }
            ApiError::Transport { endpoint, detail } => {
                write!(f, "API error (transport {endpoint}): {detail}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Classifies a non-success response. The demo flag may arrive as a header
    /// or as `demo_account: true` in the JSON body.
    pub fn from_response(status: u16, demo_header: bool, body: &str) -> Self {
        let json = serde_json::from_str::<Value>(body).ok();
        let body_flag = json
            .as_ref()
            .and_then(|v| v.get("demo_account"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if demo_header || body_flag {
            let message = json
                .as_ref()
                .and_then(|v| v.get("detail").or_else(|| v.get("message")))
                .and_then(Value::as_str)
                .map(str::to_string);
            return ApiError::DemoAccount { message };
        }

        ApiError::Http {
            status,
            body: body.to_string(),
        }
    }

    pub fn notice(&self) -> Notice {
        match self {
            ApiError::DemoAccount { .. } => Notice {
                kind: NoticeKind::UpgradePrompt,
                message: DEMO_UPGRADE_MESSAGE.to_string(),
            },
            ApiError::Http { status, .. } if *status == 404 => Notice {
                kind: NoticeKind::Error,
                message: "The requested item no longer exists.".to_string(),
            },
            _ => Notice::generic(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Error,
    UpgradePrompt,
}

/// Transient user-facing notification derived from a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn generic() -> Self {
        Self {
            kind: NoticeKind::Error,
            message: GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

pub fn notice_for(err: &anyhow::Error) -> Notice {
    err.downcast_ref::<ApiError>()
        .map(ApiError::notice)
        .unwrap_or_else(Notice::generic)
}
