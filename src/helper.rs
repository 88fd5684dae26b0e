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

//! Fixtures for tests that need a real collection.

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tempfile::tempdir;

use crate::db::Database;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::types::card::Card;
use crate::types::card_type::CardType;
use crate::types::ids::CardId;
use crate::types::ids::ConfigId;
use crate::types::ids::DeckId;
use crate::types::ids::NoteId;
use crate::types::queue::Queue;
use crate::types::timestamp::Timestamp;

/// Midnight UTC, the creation instant of every test collection.
pub const CREATED_AT: i64 = 1_699_920_000;

/// A collection database in a temporary directory. The directory is removed
/// when this is dropped.
pub struct TestCollection {
    pub db: Database,
    _dir: TempDir,
}

pub fn create_test_collection() -> Fallible<TestCollection> {
    let dir = tempdir()?;
    let path = dir.path().join("collection.db");
    let path = path
        .to_str()
        .ok_or_else(|| ErrorReport::new("invalid path"))?;
    let db = Database::new(path, Timestamp::from_secs(CREATED_AT)?)?;
    Ok(TestCollection { db, _dir: dir })
}

/// A complete deck configuration document, to be tweaked by tests.
pub fn config_json() -> Value {
    json!({
        "new": {
            "delays": [1, 10],
            "ints": [1, 4],
            "initialFactor": 2500,
            "perDay": 20,
            "separate": true
        },
        "lapse": {
            "delays": [10],
            "mult": 0.5,
            "leechFails": 8,
            "leechAction": 0
        },
        "rev": {
            "perDay": 100,
            "ease4": 1.3,
            "fi": [10, 10],
            "minSpace": 1,
            "fuzz": 0.05,
            "order": 0
        },
        "maxTaken": 60
    })
}

impl TestCollection {
    pub fn put_config(&self, id: i64, body: &Value) -> Fallible<ConfigId> {
        let id = ConfigId::new(id);
        self.db.put_deck_config(id, &body.to_string())?;
        Ok(id)
    }

    /// Create a deck with its own configuration, and select it.
    pub fn deck_with_config(&self, name: &str, config_id: i64, body: &Value) -> Fallible<DeckId> {
        let config = self.put_config(config_id, body)?;
        let deck = self.db.add_deck(name, config)?;
        self.db.select_deck(deck)?;
        Ok(deck)
    }

    /// Add a note with a single new card at the given position.
    pub fn new_card(&self, deck: DeckId, position: i64) -> Fallible<Card> {
        let note = self.db.add_note()?;
        self.card_of_note(note, deck, position)
    }

    /// Add another new card to an existing note.
    pub fn card_of_note(&self, note: NoteId, deck: DeckId, position: i64) -> Fallible<Card> {
        let id = CardId::new(self.db.card_ids()?.len() as i64 + 1);
        let card = Card::new(id, note, deck, position);
        self.db.add_card(&card)?;
        Ok(card)
    }

    /// Add a graduated card due on the given day.
    pub fn review_card(&self, deck: DeckId, due: i64, interval: i64) -> Fallible<Card> {
        let note = self.db.add_note()?;
        self.review_card_of_note(note, deck, due, interval)
    }

    pub fn review_card_of_note(
        &self,
        note: NoteId,
        deck: DeckId,
        due: i64,
        interval: i64,
    ) -> Fallible<Card> {
        let id = CardId::new(self.db.card_ids()?.len() as i64 + 1);
        let card = Card {
            queue: Queue::Review,
            card_type: CardType::Review,
            due,
            interval,
            reps: 3,
            ..Card::new(id, note, deck, 0)
        };
        self.db.add_card(&card)?;
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeckStore;
    use crate::store::Store;

    #[test]
    fn test_create_test_collection() -> Fallible<()> {
        let col = create_test_collection()?;
        assert_eq!(col.db.collection_created()?, CREATED_AT);
        assert_eq!(col.db.selected_deck()?, DeckId::new(1));
        Ok(())
    }
}
