// src/defs.rs
// Shared constants and primitive types for the card pool.

pub type Number = u8;
pub type CardId = u32;
pub type DeviceId = String;

pub struct CardLayout {
    pub rows: u8,        // rows in a card
    pub columns: u8,     // decade columns in a card
    pub per_row: u8,     // numbers in each row
    pub max_per_col: u8, // numbers a single column may hold
}

pub const CARDLAYOUT: CardLayout = CardLayout {
    rows: 3,
    columns: 9,
    per_row: 5,
    max_per_col: 3,
};

pub const FIRSTNUMBER: Number = 1;
pub const LASTNUMBER: Number = 90;
pub const NUMBERSPERCARD: u8 = CARDLAYOUT.rows * CARDLAYOUT.per_row;

/// Marked count at which a card wins: every non-blank cell.
pub const WINNING_THRESHOLD: usize = NUMBERSPERCARD as usize;

/// Upper bound of card ids fetched per random-assignment attempt.
pub const RANDOM_BATCH_SIZE: usize = 50;

/// Header carrying the caller's device id on privileged requests.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Key the device identity is stored under.
pub const DEVICE_ID_KEY: &str = "device_uuid";
