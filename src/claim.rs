// src/claim.rs
// Resolves which card a device owns, explicitly by id or by random
// assignment, keeping a single owner per card under concurrent claims.

use rand::seq::IndexedRandom;
use thiserror::Error;
use tokio::time::sleep;

use crate::card::Card;
use crate::defs::{CardId, RANDOM_BATCH_SIZE};
use crate::logging::{log_debug, log_info, log_warning};
use crate::retry::RetryPolicy;
use crate::store::{CardPatch, CardStore, OwnerPredicate, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("invalid card request: {0}")]
    InvalidRequest(String),
    #[error("card {0} not found")]
    NotFound(CardId),
    #[error("card {0} is already claimed by another device")]
    AlreadyClaimedByOther(CardId),
    #[error("no unclaimed cards left")]
    PoolExhausted,
    #[error("card store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ClaimError {
    fn from_store(card_id: CardId, error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ClaimError::NotFound(id),
            StoreError::NoRowsAffected => ClaimError::AlreadyClaimedByOther(card_id),
            StoreError::Client { message, .. } => ClaimError::InvalidRequest(message),
            StoreError::Unavailable(message) => ClaimError::StoreUnavailable(message),
        }
    }
}

/// What the device asked for, as carried by the `card_id` / `random` request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRequest {
    Explicit(String),
    Random,
}

impl ClaimRequest {
    /// `random=true` wins over `card_id` when both are present.
    pub fn from_params(card_id: Option<&str>, random: Option<&str>) -> Result<Self, ClaimError> {
        if random.is_some_and(|r| r.trim() == "true") {
            return Ok(ClaimRequest::Random);
        }
        match card_id {
            Some(raw) => Ok(ClaimRequest::Explicit(raw.to_string())),
            None => Err(ClaimError::InvalidRequest("no card_id specified".to_string())),
        }
    }
}

/// Parse a card id, accepting only positive integers.
pub fn parse_card_id(raw: &str) -> Result<CardId, ClaimError> {
    match raw.trim().parse::<CardId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ClaimError::InvalidRequest(format!("'{raw}' is not a valid card id"))),
    }
}

pub struct ClaimNegotiator<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S: CardStore> ClaimNegotiator<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::new(5, std::time::Duration::from_millis(300)))
    }

    /// `policy` bounds the random-assignment loop: attempts and backoff between lost races.
    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn resolve(&self, request: &ClaimRequest, device_id: &str) -> Result<Card, ClaimError> {
        match request {
            ClaimRequest::Explicit(raw) => self.resolve_explicit(raw, device_id).await,
            ClaimRequest::Random => self.resolve_random(device_id).await,
        }
    }

    pub async fn resolve_explicit(&self, card_id: &str, device_id: &str) -> Result<Card, ClaimError> {
        let card_id = parse_card_id(card_id)?;

        let card = self
            .store
            .read(card_id)
            .await
            .map_err(|e| ClaimError::from_store(card_id, e))?;

        match card.owner_id.as_deref() {
            None => self.claim(card_id, device_id).await,
            Some(owner) if owner == device_id => {
                log_debug(&format!("Card {card_id} already owned by {device_id}"));
                Ok(card)
            }
            Some(_) => Err(ClaimError::AlreadyClaimedByOther(card_id)),
        }
    }

    pub async fn resolve_random(&self, device_id: &str) -> Result<Card, ClaimError> {
        for attempt in 0..self.policy.max_attempts {
            let available = self
                .store
                .query_unclaimed(RANDOM_BATCH_SIZE)
                .await
                .map_err(|e| ClaimError::from_store(0, e))?;

            let Some(&card_id) = available.choose(&mut rand::rng()) else {
                return Err(ClaimError::PoolExhausted);
            };
            log_info(&format!("Assigning random card {card_id} (selected from {} available)", available.len()));

            match self.claim(card_id, device_id).await {
                Ok(card) => return Ok(card),
                Err(ClaimError::AlreadyClaimedByOther(_)) if attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    log_warning(&format!(
                        "Card {card_id} claimed by someone else, retrying in {}ms ({}/{})",
                        delay.as_millis(),
                        attempt + 1,
                        self.policy.max_attempts
                    ));
                    sleep(delay).await;
                }
                Err(ClaimError::AlreadyClaimedByOther(_)) => break,
                Err(e) => return Err(e),
            }
        }

        log_warning(&format!("Gave up random assignment after {} lost races", self.policy.max_attempts));
        Err(ClaimError::PoolExhausted)
    }

    /// Take an unowned card. A lost conditional write is checked against the
    /// current owner: if it is this device, an earlier duplicate request won.
    async fn claim(&self, card_id: CardId, device_id: &str) -> Result<Card, ClaimError> {
        match self
            .store
            .conditional_update(card_id, OwnerPredicate::OwnerIsNull, CardPatch::claim(device_id))
            .await
        {
            Ok(card) => {
                log_info(&format!("Card {card_id} claimed by {device_id}"));
                Ok(card)
            }
            Err(StoreError::NoRowsAffected) => {
                let owner = self
                    .store
                    .read_owner(card_id)
                    .await
                    .map_err(|e| ClaimError::from_store(card_id, e))?;

                if owner.owner_id.as_deref() == Some(device_id) {
                    log_info(&format!("Card {card_id} was already claimed by {device_id} in an earlier request"));
                    self.store.read(card_id).await.map_err(|e| ClaimError::from_store(card_id, e))
                } else {
                    Err(ClaimError::AlreadyClaimedByOther(card_id))
                }
            }
            Err(e) => Err(ClaimError::from_store(card_id, e)),
        }
    }
}
