// src/tracker.rs
// Local view of the marked numbers on the device's card, written through to
// the store optimistically and rolled back when the write fails.

use crate::card::Card;
use crate::defs::{DeviceId, Number};
use crate::logging::{log_debug, log_warning};
use crate::store::{CardPatch, CardStore, OwnerPredicate, StoreError};
use crate::win::is_winner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// No owned card is loaded, or the number is not on it.
    Ignored,
    Applied,
    /// The store refused or failed the write; local state was reverted.
    WriteFailed(StoreError),
}

pub struct MarkTracker<S> {
    store: S,
    device_id: DeviceId,
    card: Option<Card>,
    marked: Vec<Number>,
}

impl<S: CardStore> MarkTracker<S> {
    pub fn new(store: S, device_id: impl Into<DeviceId>) -> Self {
        Self {
            store,
            device_id: device_id.into(),
            card: None,
            marked: Vec::new(),
        }
    }

    pub fn with_card(store: S, device_id: impl Into<DeviceId>, card: Card) -> Self {
        let mut tracker = Self::new(store, device_id);
        tracker.load(card);
        tracker
    }

    pub fn load(&mut self, card: Card) {
        self.marked = card.marked_numbers.clone();
        self.card = Some(card);
    }

    pub fn card(&self) -> Option<&Card> {
        self.card.as_ref()
    }

    pub fn marked_numbers(&self) -> &[Number] {
        &self.marked
    }

    pub fn is_marked(&self, number: Number) -> bool {
        self.marked.contains(&number)
    }

    pub fn is_winner(&self) -> bool {
        is_winner(&self.marked)
    }

    pub async fn toggle(&mut self, number: Number) -> ToggleOutcome {
        let card_id = match &self.card {
            Some(card) if card.is_owned_by(&self.device_id) && card.contains(number) => card.id,
            _ => return ToggleOutcome::Ignored,
        };

        let previous = self.marked.clone();
        let next: Vec<Number> = if previous.contains(&number) {
            previous.iter().copied().filter(|&n| n != number).collect()
        } else {
            previous.iter().copied().chain(std::iter::once(number)).collect()
        };

        self.marked = next.clone();

        let result = self
            .store
            .conditional_update(card_id, OwnerPredicate::OwnerIs(self.device_id.clone()), CardPatch::marks(next))
            .await;

        match result {
            Ok(updated) => {
                log_debug(&format!("Card {card_id}: marked {:?}", self.marked));
                self.card = Some(updated);
                ToggleOutcome::Applied
            }
            Err(e) => {
                log_warning(&format!("Could not save number {number} on card {card_id}, reverting: {e}"));
                self.marked = previous;
                ToggleOutcome::WriteFailed(e)
            }
        }
    }
}
