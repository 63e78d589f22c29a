// backend.rs
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{EntrigError, Result};
use crate::metrics::BACKEND_REQUEST_TIME;
use crate::models::{
    DeliveryStatus, DeliveryStatusRequest, FcmParams, FcmParamsRequest, FcmParamsResponse,
    RegisterRequest, RegisterResponse, UnregisterRequest,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives delivered/read transitions. Implemented by the backend client and
/// by test doubles.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report_delivery_status(&self, delivery_id: &str, status: DeliveryStatus)
        -> Result<()>;
}

/// HTTP client for the Entrig backend. Every call is an authenticated JSON POST.
#[derive(Clone)]
pub struct BackendClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl BackendClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http_client = HttpClient::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn fcm_params(&self, app_id: &str) -> Result<FcmParams> {
        let (_, response): (u16, FcmParamsResponse) = self
            .post_json("fcm-params", &FcmParamsRequest { app_id })
            .await?;
        Ok(response.data)
    }

    /// Registers a token for a user and returns the backend-issued registration id.
    pub async fn register(&self, user_id: &str, token: &str, sdk: &str) -> Result<String> {
        let request = RegisterRequest {
            user_id,
            fcm_token: token,
            sdk,
        };
        let (status, response): (u16, RegisterResponse) =
            self.post_json("register", &request).await?;

        // Ids may come back as numbers or strings
        match response.id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(EntrigError::malformed(status, "registration id missing")),
        }
    }

    pub async fn unregister(&self, registration_id: &str) -> Result<()> {
        self.post("unregister", &UnregisterRequest { id: registration_id })
            .await
            .map(|_| ())
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<(u16, T)>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (status, text) = self.post(endpoint, body).await?;
        let decoded =
            serde_json::from_str(&text).map_err(|e| EntrigError::malformed(status, e.to_string()))?;
        Ok((status, decoded))
    }

    // Status and body of a 2xx response
    async fn post<B>(&self, endpoint: &str, body: &B) -> Result<(u16, String)>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let timer = BACKEND_REQUEST_TIME
            .with_label_values(&[endpoint])
            .start_timer();

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await;
        timer.observe_duration();

        let response = response?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            info!(endpoint = %endpoint, status = status.as_u16(), "Backend rejected request");
            return Err(EntrigError::BackendRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(endpoint = %endpoint, status = status.as_u16(), "Backend response received");
        Ok((status.as_u16(), text))
    }
}

#[async_trait]
impl StatusReporter for BackendClient {
    async fn report_delivery_status(
        &self,
        delivery_id: &str,
        status: DeliveryStatus,
    ) -> Result<()> {
        self.post(
            "delivery-status",
            &DeliveryStatusRequest {
                delivery_id,
                status,
            },
        )
        .await
        .map(|_| ())
    }
}
