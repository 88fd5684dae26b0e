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

//! Daily limits that cascade down the deck hierarchy.

use std::collections::HashMap;

use crate::error::Fallible;
use crate::sched::Scheduler;
use crate::sched::clock::Clock;
use crate::store::CardOrder;
use crate::store::CardQuery;
use crate::store::Store;
use crate::types::deck::CounterKind;
use crate::types::deck::Deck;
use crate::types::deck_config::DeckConfig;
use crate::types::ids::DeckId;
use crate::types::queue::Queue;

/// Which daily limit is being counted against.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LimitKind {
    New,
    Review,
}

impl LimitKind {
    fn per_day(self, conf: &DeckConfig) -> i64 {
        match self {
            LimitKind::New => conf.new.per_day,
            LimitKind::Review => conf.rev.per_day,
        }
    }

    fn counter(self) -> CounterKind {
        match self {
            LimitKind::New => CounterKind::New,
            LimitKind::Review => CounterKind::Review,
        }
    }
}

/// Count the cards that can still be studied today across `decks`, where
/// each deck's quota is capped by the remaining quota of every ancestor.
///
/// `decks` is walked in order, and an ancestor's quota is shared: whatever a
/// deck takes is no longer available to its siblings. `parents` returns a
/// deck's ancestors, `limit` a deck's own remaining quota, and `count` how
/// many cards a deck actually has, up to the given cap.
pub fn walking_count<P, L, N>(
    decks: &[Deck],
    mut parents: P,
    mut limit: L,
    mut count: N,
) -> Fallible<i64>
where
    P: FnMut(&Deck) -> Fallible<Vec<Deck>>,
    L: FnMut(&Deck) -> Fallible<i64>,
    N: FnMut(&Deck, i64) -> Fallible<i64>,
{
    let mut pool: HashMap<DeckId, i64> = HashMap::new();
    let mut total = 0;
    for deck in decks {
        let mut cap = limit(deck)?;
        if cap == 0 {
            continue;
        }
        let ancestors = parents(deck)?;
        for ancestor in &ancestors {
            let remaining = match pool.get(&ancestor.id) {
                Some(remaining) => *remaining,
                None => {
                    let remaining = limit(ancestor)?;
                    pool.insert(ancestor.id, remaining);
                    remaining
                }
            };
            cap = cap.min(remaining);
        }
        let found = count(deck, cap)?;
        for ancestor in &ancestors {
            if let Some(remaining) = pool.get_mut(&ancestor.id) {
                *remaining -= found;
            }
        }
        // A deck may be the ancestor of a later one.
        pool.insert(deck.id, cap - found);
        total += found;
    }
    Ok(total)
}

impl<S: Store, C: Clock> Scheduler<'_, S, C> {
    /// What is left of the deck's own daily quota.
    pub(crate) fn own_limit(&self, deck: &Deck, kind: LimitKind, today: i64) -> Fallible<i64> {
        let conf = self.config_for(deck)?;
        let done = deck.counters.get(kind.counter()).on(today);
        Ok((kind.per_day(&conf) - done).max(0))
    }

    /// The deck's quota capped by each of its ancestors' quotas.
    pub(crate) fn path_limit(&self, deck: &Deck, kind: LimitKind, today: i64) -> Fallible<i64> {
        let mut limit = self.own_limit(deck, kind, today)?;
        for parent in self.store.parents(deck)? {
            limit = limit.min(self.own_limit(&parent, kind, today)?);
        }
        Ok(limit)
    }

    /// How many cards of the given kind are waiting in `deck`, up to `cap`.
    pub(crate) fn available(
        &self,
        deck: DeckId,
        kind: LimitKind,
        today: i64,
        cap: i64,
    ) -> Fallible<i64> {
        let decks = [deck];
        let query = match kind {
            LimitKind::New => CardQuery {
                decks: &decks,
                queue: Queue::New,
                due_before: None,
                order: CardOrder::Unordered,
                limit: cap,
            },
            LimitKind::Review => CardQuery {
                decks: &decks,
                queue: Queue::Review,
                due_before: Some(today + 1),
                order: CardOrder::Unordered,
                limit: cap,
            },
        };
        self.store.count_cards(&query)
    }

    pub(crate) fn count_within_limits(
        &self,
        decks: &[Deck],
        kind: LimitKind,
        today: i64,
    ) -> Fallible<i64> {
        walking_count(
            decks,
            |deck| self.store.parents(deck),
            |deck| self.own_limit(deck, kind, today),
            |deck, cap| self.available(deck.id, kind, today, cap),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::deck::DeckCounters;
    use crate::types::ids::ConfigId;

    fn deck(id: i64, name: &str) -> Deck {
        Deck {
            id: DeckId::new(id),
            name: name.to_string(),
            config_id: ConfigId::new(1),
            counters: DeckCounters::default(),
        }
    }

    /// Run the walking count over a fixed tree with per-deck limits and
    /// card counts.
    fn walk(decks: &[Deck], limits: &[(i64, i64)], cards: &[(i64, i64)]) -> Fallible<i64> {
        let lookup = |table: &[(i64, i64)], id: DeckId| {
            table
                .iter()
                .find(|(deck, _)| *deck == id.get())
                .map(|(_, value)| *value)
                .unwrap_or(0)
        };
        walking_count(
            decks,
            |d| {
                Ok(decks
                    .iter()
                    .filter(|other| other.is_ancestor_of(d))
                    .cloned()
                    .collect())
            },
            |d| Ok(lookup(limits, d.id)),
            |d, cap| Ok(lookup(cards, d.id).min(cap)),
        )
    }

    #[test]
    fn test_single_deck() -> Fallible<()> {
        let decks = [deck(1, "A")];
        assert_eq!(walk(&decks, &[(1, 20)], &[(1, 5)])?, 5);
        assert_eq!(walk(&decks, &[(1, 3)], &[(1, 5)])?, 3);
        Ok(())
    }

    #[test]
    fn test_parent_quota_is_shared_by_children() -> Fallible<()> {
        let decks = [deck(1, "A"), deck(2, "A::B"), deck(3, "A::C")];
        // A has no cards of its own; its quota of 10 caps both children.
        let total = walk(&decks, &[(1, 10), (2, 8), (3, 8)], &[(2, 8), (3, 8)])?;
        assert_eq!(total, 10);
        Ok(())
    }

    #[test]
    fn test_parent_cards_use_up_quota() -> Fallible<()> {
        let decks = [deck(1, "A"), deck(2, "A::B")];
        let total = walk(&decks, &[(1, 10), (2, 10)], &[(1, 7), (2, 7)])?;
        assert_eq!(total, 10);
        Ok(())
    }

    #[test]
    fn test_exhausted_deck_is_skipped() -> Fallible<()> {
        let decks = [deck(1, "A"), deck(2, "A::B"), deck(3, "C")];
        let total = walk(&decks, &[(1, 0), (2, 5), (3, 4)], &[(1, 9), (2, 9), (3, 9)])?;
        // B's cap comes from A's exhausted quota.
        assert_eq!(total, 4);
        Ok(())
    }

    #[test]
    fn test_grandchild_capped_by_every_ancestor() -> Fallible<()> {
        let decks = [deck(1, "A"), deck(2, "A::B"), deck(3, "A::B::C")];
        let total = walk(&decks, &[(1, 50), (2, 2), (3, 30)], &[(3, 30)])?;
        assert_eq!(total, 2);
        Ok(())
    }
}
