//! HTTP client for the analysis trigger/status endpoints.
//!
//! The backend computes everything; this client only starts runs and polls
//! for their results. Network errors are the caller's to catch; the one
//! classification done here is "the credential is no longer valid", which
//! embedders must answer by clearing session state.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::VisibilityReport;

/// Server messages that mean the bearer credential is no longer valid,
/// matched case-insensitively alongside HTTP 401.
const UNAUTHORIZED_MARKERS: &[&str] = &[
    "unauthorized",
    "invalid token",
    "token expired",
    "session expired",
];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("credential rejected by backend")]
    Unauthorized,

    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// True for an HTTP-401-equivalent status or a known credential-failure
/// message substring.
pub fn is_unauthorized_response(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    let lower = body.to_lowercase();
    UNAUTHORIZED_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest<'a> {
    resource_id: &'a str,
}

/// Status-poll result: `report` is present once `ready` is true.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPoll {
    pub ready: bool,
    #[serde(default)]
    pub report: Option<VisibilityReport>,
}

#[derive(Clone)]
pub struct AnalysisApi {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Starts an analysis run for `resource_id`.
    pub async fn trigger_analysis(
        &self,
        access_token: &str,
        resource_id: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/analysis/trigger", self.base_url))
            .bearer_auth(access_token)
            .json(&TriggerRequest { resource_id })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Polls the status endpoint. Drives the pipeline readiness signal and,
    /// once ready, carries the analytics payload.
    pub async fn poll_status(
        &self,
        access_token: &str,
        resource_id: &str,
    ) -> Result<StatusPoll, ApiError> {
        let response = self
            .http
            .get(format!("{}/analysis/status", self.base_url))
            .query(&[("resourceId", resource_id)])
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<StatusPoll>().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if is_unauthorized_response(status, &body) {
            return Err(ApiError::Unauthorized);
        }
        Err(ApiError::Backend {
            status: status.as_u16(),
            message: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_401_is_unauthorized() {
        assert!(is_unauthorized_response(StatusCode::UNAUTHORIZED, ""));
    }

    #[test]
    fn test_known_messages_classify_case_insensitively() {
        assert!(is_unauthorized_response(
            StatusCode::FORBIDDEN,
            "Session EXPIRED, please log in again"
        ));
        assert!(is_unauthorized_response(
            StatusCode::BAD_REQUEST,
            "{\"error\":\"Invalid Token\"}"
        ));
    }

    #[test]
    fn test_other_errors_are_not_unauthorized() {
        assert!(!is_unauthorized_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "database connection lost"
        ));
        assert!(!is_unauthorized_response(StatusCode::NOT_FOUND, ""));
    }

    #[test]
    fn test_status_poll_report_is_optional() {
        let poll: StatusPoll = serde_json::from_str("{\"ready\":false}").unwrap();
        assert!(!poll.ready);
        assert!(poll.report.is_none());
    }
}
