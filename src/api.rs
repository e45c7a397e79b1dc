use crate::auth::{token_is_current, FileTokenStore};
use crate::config::ApiConfig;
use crate::error::{FResult, FallDetectionError};
use crate::types::{Coordinates, FallEvent, FallStatus};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backend calls the fall detector originates
pub trait FallEventApi: Send + Sync {
    /// `POST /fall-events`
    fn create_fall_event(&self, location: Coordinates) -> BoxFuture<'_, FResult<FallEvent>>;

    /// `PATCH /fall-events/{id}/status`
    fn update_status<'a>(&'a self, event_id: &'a str, status: FallStatus)
        -> BoxFuture<'a, FResult<()>>;
}

#[derive(Serialize)]
struct CreateFallEventBody {
    location: Coordinates,
}

#[derive(Serialize)]
struct UpdateStatusBody {
    status: FallStatus,
}

/// Response wrapper used by every backend route
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
}

/// reqwest-backed client for the caregiving backend
pub struct HttpFallEventApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Option<FileTokenStore>,
}

impl HttpFallEventApi {
    pub fn new(config: &ApiConfig) -> FResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HttpFallEventApi {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens: config.token_file.clone().map(FileTokenStore::new),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the stored bearer token when it has not expired
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let store = match self.tokens.as_ref() {
            Some(store) => store,
            None => return request,
        };

        match store.load() {
            Ok(Some(token)) => {
                if token_is_current(&token, chrono::Utc::now().timestamp()) {
                    request.bearer_auth(token)
                } else {
                    log::warn!("Stored token has expired, sending request without it");
                    request
                }
            }
            Ok(None) => request,
            Err(e) => {
                log::error!("Could not read token: {}", e);
                request
            }
        }
    }

    /// Turn a non-2xx response into an error, logging what the server said
    async fn check(response: reqwest::Response) -> FResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::error!("Response error status: {}", status.as_u16());
        log::error!("Response error data: {}", body);
        Err(FallDetectionError::ApiStatus {
            status: status.as_u16(),
            body,
        })
    }

    async fn post_fall_event(&self, location: Coordinates) -> FResult<FallEvent> {
        let request = self
            .client
            .post(self.url("/fall-events"))
            .json(&CreateFallEventBody { location });

        let response = Self::check(self.authorize(request).send().await?).await?;
        let envelope: Envelope<FallEvent> = response.json().await?;

        if envelope.status != "ok" {
            return Err(FallDetectionError::Rejected(format!(
                "fall event not created (status {:?})",
                envelope.status
            )));
        }
        envelope.data.ok_or_else(|| {
            FallDetectionError::Rejected("fall event response has no data".to_string())
        })
    }

    async fn patch_status(&self, event_id: &str, status: FallStatus) -> FResult<()> {
        let request = self
            .client
            .patch(self.url(&format!("/fall-events/{}/status", event_id)))
            .json(&UpdateStatusBody { status });

        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

impl FallEventApi for HttpFallEventApi {
    fn create_fall_event(&self, location: Coordinates) -> BoxFuture<'_, FResult<FallEvent>> {
        Box::pin(self.post_fall_event(location))
    }

    fn update_status<'a>(
        &'a self,
        event_id: &'a str,
        status: FallStatus,
    ) -> BoxFuture<'a, FResult<()>> {
        Box::pin(self.patch_status(event_id, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = ApiConfig {
            base_url: "https://care.example.org/api/".to_string(),
            ..ApiConfig::default()
        };
        let api = HttpFallEventApi::new(&config).unwrap();
        assert_eq!(
            api.url("/fall-events"),
            "https://care.example.org/api/fall-events"
        );
    }

    #[test]
    fn test_request_bodies() {
        let body = serde_json::to_value(CreateFallEventBody {
            location: Coordinates::new(6.9, 79.8),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"location": {"latitude": 6.9, "longitude": 79.8}})
        );

        let body = serde_json::to_value(UpdateStatusBody {
            status: FallStatus::Resolved,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"status": "resolved"}));
    }

    #[test]
    fn test_envelope_without_data() {
        let env: Envelope<FallEvent> =
            serde_json::from_str(r#"{"status": "error"}"#).unwrap();
        assert_eq!(env.status, "error");
        assert!(env.data.is_none());
    }
}
