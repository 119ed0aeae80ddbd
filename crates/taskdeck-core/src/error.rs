use serde_json::Value;
use thiserror::Error;

const DETAIL_FIELDS: [&str; 3] = ["detail", "message", "error"];
const RAW_BODY_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{detail}")]
    Client { status: u16, detail: String },

    #[error("{detail}")]
    Server { status: u16, detail: String },

    #[error("failed to decode response body: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = extract_detail(status, body);
        if status >= 500 {
            Self::Server { status, detail }
        } else {
            Self::Client { status, detail }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network(err) => err.status().map(|code| code.as_u16()),
            Self::Decode { .. } => None,
        }
    }
}

pub fn extract_detail(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in DETAIL_FIELDS {
            if let Some(text) = value.get(field).and_then(Value::as_str)
                && !text.is_empty()
            {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.chars().take(RAW_BODY_LIMIT).collect();
    }

    format!("HTTP {status} error")
}
