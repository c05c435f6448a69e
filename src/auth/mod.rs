//! Read-only view of the authentication collaborator. The checkout never
//! issues or refreshes tokens; it only asks "who is this request" and gates
//! step progression on the answer.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// What the authentication collaborator supplies per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(token: impl Into<String>, user: AuthUser) -> Self {
        Self {
            is_authenticated: true,
            token: Some(token.into()),
            user: Some(user),
        }
    }
}

/// Authentication collaborator contract.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Resolves the context for a bearer token; `None` or an unknown token
    /// resolves to the anonymous context, not an error.
    async fn current_context(&self, bearer: Option<&str>) -> Result<AuthContext, ServiceError>;
}

/// Extracts the bearer token from request headers, if any.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    #[instrument(skip(self, bearer))]
    async fn current_context(&self, bearer: Option<&str>) -> Result<AuthContext, ServiceError> {
        let Some(token) = bearer else {
            return Ok(AuthContext::anonymous());
        };

        let url = format!("{}/v1/me", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(AuthContext::anonymous());
        }
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "auth service returned {}",
                response.status()
            )));
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        Ok(AuthContext::authenticated(token, user))
    }
}
