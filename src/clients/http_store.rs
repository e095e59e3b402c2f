// src/clients/http_store.rs
// Card store reached over the server's REST surface.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::api_handlers::{ConditionalUpdateRequest, ErrorResponse, UnclaimedResponse};
use crate::card::Card;
use crate::config::ClientConfig;
use crate::defs::CardId;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{CardPatch, CardStore, OwnerInfo, OwnerPredicate, StoreError};

#[derive(Debug, Clone)]
pub struct HttpCardStore {
    server_url: String,
    http_client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpCardStore {
    pub fn new(server_url: &str, timeout: Duration, policy: RetryPolicy) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            http_client,
            policy,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, StoreError> {
        Self::new(
            &config.server_url(),
            Duration::from_secs(config.timeout),
            RetryPolicy::new(config.retry_attempts, config.retry_base_delay()),
        )
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn card_url(&self, card_id: CardId) -> String {
        format!("{}/cards/{card_id}", self.server_url)
    }

    /// One request, its status mapped onto the store's error vocabulary.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&ConditionalUpdateRequest>,
        card_id: Option<CardId>,
    ) -> Result<T, StoreError> {
        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| StoreError::Unavailable(format!("invalid response from {url}: {e}")));
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(error_response) => error_response.error,
            Err(_) => status.to_string(),
        };
        Err(status_to_error(status, message, card_id))
    }
}

/// `card_id` is `None` on routes that do not address a single card; a 404 there
/// means the server is not the card store.
fn status_to_error(status: StatusCode, message: String, card_id: Option<CardId>) -> StoreError {
    match (status, card_id) {
        (StatusCode::NOT_FOUND, Some(card_id)) => StoreError::NotFound(card_id),
        (StatusCode::NOT_FOUND, None) => StoreError::Unavailable(format!("card store endpoint not found: {message}")),
        (status, _) => status_to_error_any(status, message),
    }
}

fn status_to_error_any(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::CONFLICT => StoreError::NoRowsAffected,
        s if s.is_client_error() => StoreError::Client { status: s.as_u16(), message },
        s => StoreError::Unavailable(format!("{s}: {message}")),
    }
}

impl CardStore for HttpCardStore {
    async fn read(&self, card_id: CardId) -> Result<Card, StoreError> {
        let url = self.card_url(card_id);
        let url = url.as_str();
        with_retry(self.policy, move || self.send(Method::GET, url, None, Some(card_id))).await
    }

    async fn read_owner(&self, card_id: CardId) -> Result<OwnerInfo, StoreError> {
        let url = format!("{}/owner", self.card_url(card_id));
        let url = url.as_str();
        with_retry(self.policy, move || self.send(Method::GET, url, None, Some(card_id))).await
    }

    // Retrying a write is safe: a claim that landed before a timeout comes
    // back as NoRowsAffected and the owner check recovers it.
    async fn conditional_update(
        &self,
        card_id: CardId,
        predicate: OwnerPredicate,
        patch: CardPatch,
    ) -> Result<Card, StoreError> {
        let url = self.card_url(card_id);
        let url = url.as_str();
        let body = ConditionalUpdateRequest { predicate, patch };
        let body = &body;
        with_retry(self.policy, move || self.send(Method::PATCH, url, Some(body), Some(card_id))).await
    }

    async fn query_unclaimed(&self, limit: usize) -> Result<Vec<CardId>, StoreError> {
        let url = format!("{}/cards/unclaimed?limit={limit}", self.server_url);
        let url = url.as_str();
        let response: UnclaimedResponse =
            with_retry(self.policy, move || self.send(Method::GET, url, None, None)).await?;
        Ok(response.card_ids)
    }
}
