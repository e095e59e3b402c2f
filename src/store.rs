// src/store.rs
// The shared card table and the operations every store backend offers.
//
// A write is always scoped by an ownership predicate and applied atomically
// with respect to other writes on the same card; that is the only
// concurrency control the claim and mark logic relies on.

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::{validate_grid, Card, CardGenerator};
use crate::defs::{CardId, DeviceId, Number};
use crate::logging::{log_debug, log_info};
use crate::win::is_winner;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("card {0} not found")]
    NotFound(CardId),
    #[error("no rows affected")]
    NoRowsAffected,
    /// The request itself was wrong; repeating it cannot help.
    #[error("request rejected ({status}): {message}")]
    Client { status: u16, message: String },
    #[error("card store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        StoreError::Client { status: 400, message: message.into() }
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Condition on the stored owner that must hold at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerPredicate {
    OwnerIsNull,
    OwnerIs(DeviceId),
}

impl OwnerPredicate {
    pub fn holds_for(&self, card: &Card) -> bool {
        match self {
            OwnerPredicate::OwnerIsNull => card.owner_id.is_none(),
            OwnerPredicate::OwnerIs(device_id) => card.is_owned_by(device_id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_numbers: Option<Vec<Number>>,
}

impl CardPatch {
    pub fn claim(device_id: &str) -> Self {
        Self {
            owner_id: Some(device_id.to_string()),
            marked_numbers: None,
        }
    }

    pub fn marks(marked_numbers: Vec<Number>) -> Self {
        Self {
            owner_id: None,
            marked_numbers: Some(marked_numbers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.owner_id.is_none() && self.marked_numbers.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub owner_id: Option<DeviceId>,
}

pub trait CardStore: Send + Sync {
    fn read(&self, card_id: CardId) -> impl Future<Output = Result<Card, StoreError>> + Send;

    fn read_owner(&self, card_id: CardId) -> impl Future<Output = Result<OwnerInfo, StoreError>> + Send;

    /// Apply `patch` only if `predicate` holds; `NoRowsAffected` otherwise.
    fn conditional_update(
        &self,
        card_id: CardId,
        predicate: OwnerPredicate,
        patch: CardPatch,
    ) -> impl Future<Output = Result<Card, StoreError>> + Send;

    /// Ids of unclaimed cards, at most `limit` of them.
    fn query_unclaimed(&self, limit: usize) -> impl Future<Output = Result<Vec<CardId>, StoreError>> + Send;
}

impl<S: CardStore> CardStore for Arc<S> {
    fn read(&self, card_id: CardId) -> impl Future<Output = Result<Card, StoreError>> + Send {
        (**self).read(card_id)
    }

    fn read_owner(&self, card_id: CardId) -> impl Future<Output = Result<OwnerInfo, StoreError>> + Send {
        (**self).read_owner(card_id)
    }

    fn conditional_update(
        &self,
        card_id: CardId,
        predicate: OwnerPredicate,
        patch: CardPatch,
    ) -> impl Future<Output = Result<Card, StoreError>> + Send {
        (**self).conditional_update(card_id, predicate, patch)
    }

    fn query_unclaimed(&self, limit: usize) -> impl Future<Output = Result<Vec<CardId>, StoreError>> + Send {
        (**self).query_unclaimed(limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub claimed: usize,
    pub unclaimed: usize,
    pub winners: usize,
}

#[derive(Debug, Error)]
pub enum PoolFileError {
    #[error("pool file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pool file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("card {id} is invalid: {reason}")]
    InvalidCard { id: CardId, reason: String },
    #[error("card id {0} appears more than once")]
    DuplicateId(CardId),
}

/// On-disk layout of a card pool.
#[derive(Debug, Serialize, Deserialize)]
pub struct PoolDump {
    pub total_cards: usize,
    pub cards: Vec<Card>,
}

/// Authoritative card table kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCardStore {
    cards: Mutex<BTreeMap<CardId, Card>>,
}

impl InMemoryCardStore {
    pub fn new(cards: Vec<Card>) -> Self {
        let cards = cards.into_iter().map(|card| (card.id, card)).collect();
        Self { cards: Mutex::new(cards) }
    }

    /// Fresh pool of `pool_size` generated cards.
    pub fn generate(pool_size: usize) -> Self {
        Self::new(CardGenerator::new().generate_cards(pool_size))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PoolFileError> {
        let content = fs::read_to_string(path)?;
        let dump: PoolDump = serde_json::from_str(&content)?;

        let mut cards = BTreeMap::new();
        for card in dump.cards {
            validate_grid(&card.numbers)
                .map_err(|reason| PoolFileError::InvalidCard { id: card.id, reason })?;
            if let Some(bad) = card.marked_numbers.iter().find(|n| !card.contains(**n)) {
                return Err(PoolFileError::InvalidCard {
                    id: card.id,
                    reason: format!("marked number {bad} is not on the card"),
                });
            }
            let id = card.id;
            if cards.insert(id, card).is_some() {
                return Err(PoolFileError::DuplicateId(id));
            }
        }

        Ok(Self { cards: Mutex::new(cards) })
    }

    pub fn dump_to_file<P: AsRef<Path>>(&self, path: P) -> Result<String, PoolFileError> {
        let path = path.as_ref();
        let cards = self.snapshot().map_err(|e| std::io::Error::other(e.to_string()))?;
        let dump = PoolDump { total_cards: cards.len(), cards };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&dump)?)?;

        Ok(format!("Pool of {} cards dumped to: {}", dump.total_cards, path.display()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<CardId, Card>>, StoreError> {
        self.cards
            .lock()
            .map_err(|_| StoreError::Unavailable("card table lock poisoned".to_string()))
    }

    pub fn snapshot(&self) -> Result<Vec<Card>, StoreError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    pub fn stats(&self) -> Result<PoolStats, StoreError> {
        let cards = self.lock()?;
        let total = cards.len();
        let claimed = cards.values().filter(|card| card.is_claimed()).count();
        let winners = cards.values().filter(|card| is_winner(&card.marked_numbers)).count();
        Ok(PoolStats { total, claimed, unclaimed: total - claimed, winners })
    }

    /// Return every card to the unclaimed state with no marks. Returns how many cards were touched.
    pub fn reset_all(&self) -> Result<usize, StoreError> {
        let mut cards = self.lock()?;
        let mut touched = 0;
        for card in cards.values_mut() {
            if card.owner_id.is_some() || !card.marked_numbers.is_empty() {
                card.owner_id = None;
                card.marked_numbers.clear();
                touched += 1;
            }
        }
        log_info(&format!("Reset ownership of {touched} cards"));
        Ok(touched)
    }

    fn check_patch(card: &Card, predicate: &OwnerPredicate, patch: &CardPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Err(StoreError::bad_request("empty patch"));
        }
        // Ownership is set once: only a write guarded by "owner is null" may carry an owner.
        if patch.owner_id.is_some() && *predicate != OwnerPredicate::OwnerIsNull {
            return Err(StoreError::bad_request("owner_id can only be set on an unclaimed card"));
        }
        // Marks alone are written by the owner only.
        if patch.owner_id.is_none()
            && patch.marked_numbers.is_some()
            && !matches!(predicate, OwnerPredicate::OwnerIs(_))
        {
            return Err(StoreError::bad_request("marked_numbers can only be changed by the card owner"));
        }
        if let Some(marked) = &patch.marked_numbers {
            if let Some(bad) = marked.iter().find(|n| !card.contains(**n)) {
                return Err(StoreError::bad_request(format!("number {bad} is not on card {}", card.id)));
            }
            let mut seen = marked.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != marked.len() {
                return Err(StoreError::bad_request("marked numbers contain duplicates"));
            }
        }
        Ok(())
    }
}

impl CardStore for InMemoryCardStore {
    async fn read(&self, card_id: CardId) -> Result<Card, StoreError> {
        self.lock()?.get(&card_id).cloned().ok_or(StoreError::NotFound(card_id))
    }

    async fn read_owner(&self, card_id: CardId) -> Result<OwnerInfo, StoreError> {
        let cards = self.lock()?;
        let card = cards.get(&card_id).ok_or(StoreError::NotFound(card_id))?;
        Ok(OwnerInfo { owner_id: card.owner_id.clone() })
    }

    async fn conditional_update(
        &self,
        card_id: CardId,
        predicate: OwnerPredicate,
        patch: CardPatch,
    ) -> Result<Card, StoreError> {
        let mut cards = self.lock()?;
        let card = cards.get_mut(&card_id).ok_or(StoreError::NotFound(card_id))?;

        Self::check_patch(card, &predicate, &patch)?;

        if !predicate.holds_for(card) {
            log_debug(&format!("Conditional update on card {card_id} skipped: {predicate:?} does not hold"));
            return Err(StoreError::NoRowsAffected);
        }

        if let Some(owner_id) = patch.owner_id {
            card.owner_id = Some(owner_id);
        }
        if let Some(marked_numbers) = patch.marked_numbers {
            card.marked_numbers = marked_numbers;
        }

        Ok(card.clone())
    }

    async fn query_unclaimed(&self, limit: usize) -> Result<Vec<CardId>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .filter(|card| !card.is_claimed())
            .map(|card| card.id)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::tests::sample_grid;

    fn store_with_card_7() -> InMemoryCardStore {
        InMemoryCardStore::new(vec![Card::new(7, sample_grid())])
    }

    #[tokio::test]
    async fn test_read_and_read_owner() {
        let store = store_with_card_7();
        let card = store.read(7).await.unwrap();
        assert_eq!(card.id, 7);
        assert_eq!(store.read_owner(7).await.unwrap(), OwnerInfo { owner_id: None });
        assert_eq!(store.read(8).await, Err(StoreError::NotFound(8)));
        assert_eq!(store.read_owner(8).await, Err(StoreError::NotFound(8)));
    }

    #[tokio::test]
    async fn test_claim_only_when_unowned() {
        let store = store_with_card_7();

        let card = store
            .conditional_update(7, OwnerPredicate::OwnerIsNull, CardPatch::claim("abc"))
            .await
            .unwrap();
        assert_eq!(card.owner_id.as_deref(), Some("abc"));

        let second = store
            .conditional_update(7, OwnerPredicate::OwnerIsNull, CardPatch::claim("xyz"))
            .await;
        assert_eq!(second, Err(StoreError::NoRowsAffected));
        assert_eq!(store.read_owner(7).await.unwrap().owner_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_marks_require_matching_owner() {
        let store = store_with_card_7();
        store
            .conditional_update(7, OwnerPredicate::OwnerIsNull, CardPatch::claim("abc"))
            .await
            .unwrap();

        let denied = store
            .conditional_update(7, OwnerPredicate::OwnerIs("xyz".to_string()), CardPatch::marks(vec![5]))
            .await;
        assert_eq!(denied, Err(StoreError::NoRowsAffected));

        let card = store
            .conditional_update(7, OwnerPredicate::OwnerIs("abc".to_string()), CardPatch::marks(vec![5, 12]))
            .await
            .unwrap();
        assert_eq!(card.marked_numbers, vec![5, 12]);
    }

    #[tokio::test]
    async fn test_rejects_bad_patches() {
        let store = store_with_card_7();
        let owner = OwnerPredicate::OwnerIs("abc".to_string());

        let empty = store.conditional_update(7, OwnerPredicate::OwnerIsNull, CardPatch::default()).await;
        assert!(matches!(empty, Err(StoreError::Client { status: 400, .. })));

        let reassign = store.conditional_update(7, owner.clone(), CardPatch::claim("xyz")).await;
        assert!(matches!(reassign, Err(StoreError::Client { status: 400, .. })));

        let off_card = store.conditional_update(7, owner.clone(), CardPatch::marks(vec![6])).await;
        assert!(matches!(off_card, Err(StoreError::Client { status: 400, .. })));

        let duplicate = store.conditional_update(7, owner, CardPatch::marks(vec![5, 5])).await;
        assert!(matches!(duplicate, Err(StoreError::Client { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_marks_rejected_on_unclaimed_card() {
        let store = store_with_card_7();

        let result = store
            .conditional_update(7, OwnerPredicate::OwnerIsNull, CardPatch::marks(vec![5, 12]))
            .await;
        assert!(matches!(result, Err(StoreError::Client { status: 400, .. })));

        let card = store.read(7).await.unwrap();
        assert_eq!(card.owner_id, None);
        assert!(card.marked_numbers.is_empty());
        assert_eq!(store.stats().unwrap().winners, 0);
    }

    #[tokio::test]
    async fn test_query_unclaimed_respects_limit() {
        let store = InMemoryCardStore::generate(10);
        store
            .conditional_update(1, OwnerPredicate::OwnerIsNull, CardPatch::claim("abc"))
            .await
            .unwrap();

        let ids = store.query_unclaimed(50).await.unwrap();
        assert_eq!(ids.len(), 9);
        assert!(!ids.contains(&1));
        assert_eq!(store.query_unclaimed(3).await.unwrap(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_stats_and_reset() {
        let store = InMemoryCardStore::generate(4);
        store
            .conditional_update(2, OwnerPredicate::OwnerIsNull, CardPatch::claim("abc"))
            .await
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats, PoolStats { total: 4, claimed: 1, unclaimed: 3, winners: 0 });

        assert_eq!(store.reset_all().unwrap(), 1);
        assert_eq!(store.stats().unwrap().claimed, 0);
        assert_eq!(store.reset_all().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pool_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pools").join("pool.json");

        let store = InMemoryCardStore::generate(5);
        store
            .conditional_update(3, OwnerPredicate::OwnerIsNull, CardPatch::claim("abc"))
            .await
            .unwrap();
        let message = store.dump_to_file(&path).unwrap();
        assert!(message.contains("5 cards"));

        let reloaded = InMemoryCardStore::load_from_file(&path).unwrap();
        assert_eq!(reloaded.snapshot().unwrap(), store.snapshot().unwrap());
        assert_eq!(reloaded.read_owner(3).await.unwrap().owner_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_pool_file_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let dump = PoolDump {
            total_cards: 2,
            cards: vec![Card::new(1, sample_grid()), Card::new(1, sample_grid())],
        };
        fs::write(&path, serde_json::to_string(&dump).unwrap()).unwrap();

        assert!(matches!(InMemoryCardStore::load_from_file(&path), Err(PoolFileError::DuplicateId(1))));
    }

    #[test]
    fn test_predicate_json_shape() {
        assert_eq!(serde_json::to_string(&OwnerPredicate::OwnerIsNull).unwrap(), r#""owner_is_null""#);
        assert_eq!(
            serde_json::to_string(&OwnerPredicate::OwnerIs("abc".to_string())).unwrap(),
            r#"{"owner_is":"abc"}"#
        );
        assert_eq!(serde_json::to_string(&CardPatch::marks(vec![5])).unwrap(), r#"{"marked_numbers":[5]}"#);
    }
}
