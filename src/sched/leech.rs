// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::types::card::Card;
use crate::types::queue::Queue;

/// The tag added to the note of a leech.
pub const LEECH_TAG: &str = "leech";

/// Whether a card that has just lapsed for the `lapses`-th time is a leech.
/// A card becomes one at `threshold` lapses, and again every half threshold
/// after that. A threshold of zero disables detection.
pub fn is_leech(lapses: u32, threshold: u32) -> bool {
    if threshold == 0 || lapses < threshold {
        return false;
    }
    (lapses - threshold) % (threshold / 2).max(1) == 0
}

/// Suspend a leech. Relearning is abandoned and the card keeps the review due
/// it was given on lapsing.
pub fn suspend_leech(card: &mut Card) {
    if card.is_relearning() {
        card.due = card.stashed_due;
        card.stashed_due = 0;
        card.left = 0;
    }
    card.queue = Queue::Suspended;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::card_type::CardType;
    use crate::types::ids::CardId;
    use crate::types::ids::DeckId;
    use crate::types::ids::NoteId;

    #[test]
    fn test_threshold_of_four() {
        let fired: Vec<u32> = (0..=12).filter(|n| is_leech(*n, 4)).collect();
        assert_eq!(fired, vec![4, 6, 8, 10, 12]);
    }

    #[test]
    fn test_threshold_of_eight() {
        let fired: Vec<u32> = (0..=20).filter(|n| is_leech(*n, 8)).collect();
        assert_eq!(fired, vec![8, 12, 16, 20]);
    }

    #[test]
    fn test_threshold_of_one() {
        assert!(is_leech(1, 1));
        assert!(is_leech(2, 1));
    }

    #[test]
    fn test_disabled() {
        assert!(!is_leech(0, 0));
        assert!(!is_leech(10, 0));
    }

    #[test]
    fn test_suspend_cancels_relearning() {
        let mut card = Card {
            queue: Queue::Learning,
            card_type: CardType::Review,
            due: 1_700_000_600,
            stashed_due: 42,
            left: 1,
            interval: 3,
            ..Card::new(CardId::new(1), NoteId::new(1), DeckId::new(1), 0)
        };
        suspend_leech(&mut card);
        assert_eq!(card.queue, Queue::Suspended);
        assert_eq!(card.due, 42);
        assert_eq!(card.left, 0);
        assert_eq!(card.card_type, CardType::Review);
    }
}
