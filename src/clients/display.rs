// src/clients/display.rs
// Terminal rendering of the player's card.

use crate::card::Card;
use crate::defs::{CardId, CARDLAYOUT};
use crate::win::remaining;

pub const YELLOW: &str = "\x1b[1;33m";
pub const GREEN: &str = "\x1b[1;32m";
pub const RESET: &str = "\x1b[0m";

const CELL_WIDTH: usize = 8;

fn horizontal(left: &str, joint: &str, right: &str) -> String {
    let segment = "─".repeat(CELL_WIDTH);
    let inner = vec![segment; CARDLAYOUT.columns as usize].join(joint);
    format!("{left}{inner}{right}")
}

/// Card as a boxed table, marked numbers in yellow.
pub fn render_card(card: &Card, marked: &[u8]) -> String {
    let inner_width = CARDLAYOUT.columns as usize * (CELL_WIDTH + 1) - 1;
    let mut out = String::new();

    out.push_str(&format!("┌{}┐\n", "─".repeat(inner_width)));
    let title = format!(" Card ID: {}", card.id);
    let padding = inner_width.saturating_sub(title.chars().count());
    out.push_str(&format!("│{title}{}│\n", " ".repeat(padding)));
    out.push_str(&horizontal("├", "┬", "┤"));
    out.push('\n');

    for row in &card.numbers {
        out.push('│');
        for cell in row {
            match cell {
                Some(number) if marked.contains(number) => {
                    out.push_str(&format!("{YELLOW}   {number:2}   {RESET}│"));
                }
                Some(number) => out.push_str(&format!("   {number:2}   │")),
                None => out.push_str(&format!("{}│", " ".repeat(CELL_WIDTH))),
            }
        }
        out.push('\n');
    }

    out.push_str(&horizontal("└", "┴", "┘"));
    out.push('\n');

    let left = remaining(marked);
    if left == 0 {
        out.push_str(&format!("\n🎉 {GREEN}TOMBOLA! Card {} is complete!{RESET} 🎉\n", card.id));
    } else {
        out.push_str(&format!("\nMarked {} - {left} to go\n", marked.len()));
    }
    out
}

pub fn render_claimed(card_id: CardId, random: bool) -> String {
    if random {
        format!("🎴 You were assigned card {card_id}. Rejoin it later with --card-id {card_id}")
    } else {
        format!("🎴 Playing card {card_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::tests::sample_grid;

    #[test]
    fn test_render_highlights_marked_numbers() {
        let card = Card::new(3, sample_grid());
        let rendered = render_card(&card, &[21, 88]);

        assert!(rendered.contains("Card ID: 3"));
        assert!(rendered.contains(&format!("{YELLOW}   21   {RESET}")));
        assert!(rendered.contains(&format!("{YELLOW}   88   {RESET}")));
        assert!(rendered.contains("    5   │"));
        assert!(rendered.contains("Marked 2 - 13 to go"));
        assert!(!rendered.contains("TOMBOLA"));
    }

    #[test]
    fn test_render_rows_have_equal_width() {
        let card = Card::new(3, sample_grid());
        let rendered = render_card(&card, &[]);
        let widths: Vec<usize> = rendered
            .lines()
            .take(CARDLAYOUT.rows as usize + 4)
            .map(|line| line.chars().count())
            .collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{widths:?}");
    }

    #[test]
    fn test_render_win_banner() {
        let card = Card::new(3, sample_grid());
        let marked: Vec<u8> = card.cells().collect();
        let rendered = render_card(&card, &marked);
        assert!(rendered.contains("TOMBOLA! Card 3 is complete!"));
    }

    #[test]
    fn test_render_claimed_message() {
        assert!(render_claimed(42, true).contains("--card-id 42"));
        assert_eq!(render_claimed(42, false), "🎴 Playing card 42");
    }
}
