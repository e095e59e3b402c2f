// src/card.rs
// Card data model and the generator used to provision a card pool.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use rand::rng;
use rand::seq::IndexedRandom;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

use crate::defs::{CardId, DeviceId, Number, CARDLAYOUT, FIRSTNUMBER, LASTNUMBER, NUMBERSPERCARD};
use crate::logging::{log_info, log_warning};

/// CARDLAYOUT.rows rows × CARDLAYOUT.columns columns, `None` marks a blank cell.
pub type Grid = Vec<Vec<Option<Number>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub numbers: Grid,
    #[serde(default)]
    pub owner_id: Option<DeviceId>,
    #[serde(default)]
    pub marked_numbers: Vec<Number>,
}

impl Card {
    pub fn new(id: CardId, numbers: Grid) -> Self {
        Self {
            id,
            numbers,
            owner_id: None,
            marked_numbers: Vec::new(),
        }
    }

    /// Non-blank cells, row by row.
    pub fn cells(&self) -> impl Iterator<Item = Number> + '_ {
        self.numbers.iter().flat_map(|row| row.iter().flatten().copied())
    }

    pub fn contains(&self, number: Number) -> bool {
        self.cells().any(|n| n == number)
    }

    pub fn is_claimed(&self) -> bool {
        self.owner_id.is_some()
    }

    pub fn is_owned_by(&self, device_id: &str) -> bool {
        self.owner_id.as_deref() == Some(device_id)
    }
}

/// Numbers allowed in a decade column: 1-9, 10-19, ..., 80-90.
pub fn column_range(col: usize) -> RangeInclusive<Number> {
    let last_col = CARDLAYOUT.columns as usize - 1;
    let start = if col == 0 { FIRSTNUMBER } else { (col * 10) as Number };
    let end = if col == last_col { LASTNUMBER } else { (col * 10 + 9) as Number };
    start..=end
}

/// Check a grid against the layout rules, returning the first violation found.
pub fn validate_grid(grid: &Grid) -> Result<(), String> {
    if grid.len() != CARDLAYOUT.rows as usize {
        return Err(format!("Invalid card structure: {} rows (expected {})", grid.len(), CARDLAYOUT.rows));
    }

    for (row_idx, row) in grid.iter().enumerate() {
        if row.len() != CARDLAYOUT.columns as usize {
            return Err(format!("Row {row_idx} has {} columns (expected {})", row.len(), CARDLAYOUT.columns));
        }
        let filled = row.iter().filter(|cell| cell.is_some()).count();
        if filled != CARDLAYOUT.per_row as usize {
            return Err(format!("Row {row_idx} has {filled} numbers (expected {})", CARDLAYOUT.per_row));
        }
    }

    let all_numbers: Vec<Number> = grid.iter().flat_map(|row| row.iter().flatten().copied()).collect();
    if all_numbers.len() != NUMBERSPERCARD as usize {
        return Err(format!("Card has {} numbers (expected {NUMBERSPERCARD})", all_numbers.len()));
    }

    let unique: HashSet<Number> = all_numbers.iter().copied().collect();
    if unique.len() != all_numbers.len() {
        return Err("Duplicate numbers found on card".to_string());
    }

    for col in 0..CARDLAYOUT.columns as usize {
        let range = column_range(col);
        let column: Vec<Number> = grid.iter().filter_map(|row| row[col]).collect();

        if let Some(bad) = column.iter().find(|n| !range.contains(n)) {
            return Err(format!("Number {bad} in column {col} outside range [{}-{}]", range.start(), range.end()));
        }
        if column.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(format!("Column {col} not sorted: {column:?}"));
        }
        if column.len() > CARDLAYOUT.max_per_col as usize {
            return Err(format!("Column {col} has {} numbers (max {})", column.len(), CARDLAYOUT.max_per_col));
        }
    }

    Ok(())
}

/// Sorted numbers of a grid, used to tell cards apart regardless of layout.
pub fn fingerprint(grid: &Grid) -> String {
    let mut numbers: Vec<Number> = grid.iter().flat_map(|row| row.iter().flatten().copied()).collect();
    numbers.sort_unstable();
    numbers.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
}

#[derive(Debug, Clone, Default)]
pub struct CardGenerator;

impl CardGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_grid(&self) -> Grid {
        let rows = CARDLAYOUT.rows as usize;
        let columns = CARDLAYOUT.columns as usize;
        let mut rng = rng();

        // Step 1: choose which columns each row fills
        let mut structure = vec![vec![false; columns]; rows];
        for row in structure.iter_mut() {
            for col in sample(&mut rng, columns, CARDLAYOUT.per_row as usize) {
                row[col] = true;
            }
        }

        // Step 2: draw numbers per column and place them top to bottom in ascending order
        let mut grid: Grid = vec![vec![None; columns]; rows];
        for col in 0..columns {
            let needed = structure.iter().filter(|row| row[col]).count();
            if needed == 0 {
                continue;
            }
            let pool: Vec<Number> = column_range(col).collect();
            let mut picked: Vec<Number> = pool.choose_multiple(&mut rng, needed).copied().collect();
            picked.sort_unstable();

            let mut picked = picked.into_iter();
            for (row_idx, row) in structure.iter().enumerate() {
                if row[col] {
                    grid[row_idx][col] = picked.next();
                }
            }
        }

        grid
    }

    /// Generate up to `requested` valid, pairwise distinct cards with ids starting at 1.
    pub fn generate_cards(&self, requested: usize) -> Vec<Card> {
        let max_attempts = requested.saturating_mul(100);
        let mut cards = Vec::with_capacity(requested);
        let mut fingerprints = HashSet::new();
        let mut attempts = 0;
        let mut rejected = 0;

        while cards.len() < requested && attempts < max_attempts {
            attempts += 1;
            let grid = self.generate_grid();

            if validate_grid(&grid).is_err() {
                rejected += 1;
                continue;
            }
            if !fingerprints.insert(fingerprint(&grid)) {
                continue;
            }

            let id = cards.len() as CardId + 1;
            cards.push(Card::new(id, grid));
        }

        if cards.len() < requested {
            log_warning(&format!("Could only generate {} unique cards after {attempts} attempts", cards.len()));
        } else {
            log_info(&format!("Generated {requested} unique cards in {attempts} attempts ({rejected} rejected)"));
        }

        cards
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A fixed valid grid; card 7 of the sample pool.
    pub(crate) fn sample_grid() -> Grid {
        vec![
            vec![Some(5), None, Some(21), None, Some(43), None, Some(60), None, Some(85)],
            vec![None, Some(12), Some(24), None, None, Some(55), None, Some(71), Some(88)],
            vec![Some(8), Some(17), None, Some(36), None, Some(58), None, Some(79), None],
        ]
    }

    #[test]
    fn test_column_ranges() {
        assert_eq!(column_range(0), 1..=9);
        assert_eq!(column_range(4), 40..=49);
        assert_eq!(column_range(8), 80..=90);
    }

    #[test]
    fn test_sample_grid_is_valid() {
        assert_eq!(validate_grid(&sample_grid()), Ok(()));
    }

    #[test]
    fn test_validate_rejects_short_row() {
        let mut grid = sample_grid();
        grid[0][0] = None;
        let err = validate_grid(&grid).unwrap_err();
        assert!(err.contains("Row 0 has 4 numbers"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_and_unsorted() {
        let mut grid = sample_grid();
        grid[0][1] = Some(50);
        grid[0][2] = None;
        assert!(validate_grid(&grid).unwrap_err().contains("outside range"));

        let mut grid = sample_grid();
        grid[0][0] = Some(9);
        assert!(validate_grid(&grid).unwrap_err().contains("not sorted"));
    }

    #[test]
    fn test_generated_grids_follow_layout() {
        let generator = CardGenerator::new();
        for _ in 0..200 {
            let grid = generator.generate_grid();
            assert_eq!(validate_grid(&grid), Ok(()), "invalid grid: {grid:?}");
        }
    }

    #[test]
    fn test_generate_cards_unique_with_sequential_ids() {
        let cards = CardGenerator::new().generate_cards(60);
        assert_eq!(cards.len(), 60);

        let prints: HashSet<String> = cards.iter().map(|c| fingerprint(&c.numbers)).collect();
        assert_eq!(prints.len(), 60);

        for (idx, card) in cards.iter().enumerate() {
            assert_eq!(card.id, idx as CardId + 1);
            assert!(card.owner_id.is_none());
            assert!(card.marked_numbers.is_empty());
            assert_eq!(card.cells().count(), NUMBERSPERCARD as usize);
        }
    }

    #[test]
    fn test_card_helpers() {
        let mut card = Card::new(7, sample_grid());
        assert!(card.contains(5));
        assert!(!card.contains(6));
        assert!(!card.is_claimed());

        card.owner_id = Some("abc".to_string());
        assert!(card.is_claimed());
        assert!(card.is_owned_by("abc"));
        assert!(!card.is_owned_by("xyz"));
    }

    #[test]
    fn test_card_json_defaults() {
        let json = r#"{"id": 3, "numbers": [[1, null]]}"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.owner_id, None);
        assert!(card.marked_numbers.is_empty());
        assert_eq!(card.numbers, vec![vec![Some(1), None]]);
    }
}
