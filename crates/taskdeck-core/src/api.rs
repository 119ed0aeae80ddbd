use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::session::{Credentials, Session, TokenResponse, UserProfile};
use crate::task::{Task, TaskCreate, TaskUpdate};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const TASKS_PATH: &str = "/api/tasks";

#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: impl Into<String>, session: Option<&Session>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base: base.into(),
            token: session.map(|s| s.token.clone()),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base, path);
        let mut builder = self
            .http
            .request(method, &url)
            .header("Content-Type", "application/json");

        if let Some(token) = self.token.as_deref() {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        builder
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET request");
        let response = self.request(Method::GET, path).send().await?;
        handle_response(response).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(path, "POST request");
        let response = self.request(Method::POST, path).json(body).send().await?;
        handle_response(response).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(path, "PUT request");
        let response = self.request(Method::PUT, path).json(body).send().await?;
        handle_response(response).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(path, "PATCH request");
        let response = self.request(Method::PATCH, path).json(body).send().await?;
        handle_response(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        debug!(path, "DELETE request");
        let response = self.request(Method::DELETE, path).send().await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(json!({ "success": true }));
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &text));
        }

        if text.trim().is_empty() {
            return Ok(json!({ "success": true }));
        }

        serde_json::from_str(&text).map_err(|source| {
            warn!(error = %source, body = %text, "failed to parse delete response");
            ApiError::Decode { source }
        })
    }

    pub async fn list_tasks(&self, completed: Option<bool>) -> Result<Vec<Task>, ApiError> {
        let path = match completed {
            Some(value) => format!("{TASKS_PATH}?completed={value}"),
            None => TASKS_PATH.to_string(),
        };
        self.get(&path).await
    }

    pub async fn create_task(&self, create: &TaskCreate) -> Result<Task, ApiError> {
        let task: Task = self.post(TASKS_PATH, create).await?;
        info!(id = task.id, "task created");
        Ok(task)
    }

    pub async fn update_task(&self, id: i64, update: &TaskUpdate) -> Result<Task, ApiError> {
        self.put(&format!("{TASKS_PATH}/{id}"), update).await
    }

    pub async fn delete_task(&self, id: i64) -> Result<Value, ApiError> {
        self.delete(&format!("{TASKS_PATH}/{id}")).await
    }

    pub async fn toggle_task(&self, id: i64) -> Result<Task, ApiError> {
        self.patch(&format!("{TASKS_PATH}/{id}/complete"), &json!({}))
            .await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ApiError> {
        self.post("/api/auth/login", credentials).await
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<UserProfile, ApiError> {
        self.post("/api/auth/register", credentials).await
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.get("/api/health").await
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::from_status(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|source| {
        warn!(error = %source, body = %text, "failed to parse response body");
        ApiError::Decode { source }
    })
}
