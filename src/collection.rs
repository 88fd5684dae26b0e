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

use std::env::current_dir;
use std::path::PathBuf;

use crate::db::Database;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::settings::SETTINGS_FILE;
use crate::settings::Settings;
use crate::store::DeckStore;
use crate::types::deck_config::DeckConfig;
use crate::types::timestamp::Timestamp;

/// The name of the database file in a collection directory.
pub const DATABASE_FILE: &str = "collection.db";

/// A collection directory: the database, and the settings next to it.
pub struct Collection {
    pub directory: PathBuf,
    pub db: Database,
    pub settings: Settings,
}

impl Collection {
    /// Open the collection in `directory`, or the current directory. The
    /// database is created on first use, with days starting at midnight UTC.
    pub fn open(directory: Option<String>) -> Fallible<Self> {
        let directory: PathBuf = match directory {
            Some(dir) => PathBuf::from(dir),
            None => current_dir()?,
        };
        let directory = if directory.exists() {
            directory.canonicalize()?
        } else {
            return fail("directory does not exist.");
        };

        let settings = Settings::load(&directory.join(SETTINGS_FILE))?;

        let db_path: PathBuf = directory.join(DATABASE_FILE);
        let db_path: &str = db_path
            .to_str()
            .ok_or_else(|| ErrorReport::new("invalid path"))?;
        let db: Database = Database::new(db_path, Timestamp::now().day_start()?)?;
        log::debug!("Opened collection at {db_path}.");

        Ok(Self {
            directory,
            db,
            settings,
        })
    }

    /// Select the deck with the given name for study.
    pub fn select(&self, name: &str) -> Fallible<()> {
        match self.db.deck_by_name(name)? {
            Some(deck) => self.db.select_deck(deck.id),
            None => fail(format!("no deck named `{name}`.")),
        }
    }

    /// Parse the configuration of every deck. Returns how many decks were
    /// checked.
    pub fn check_configs(&self) -> Fallible<usize> {
        let decks = self.db.all_decks()?;
        for deck in &decks {
            let body = self.db.deck_config(deck.config_id)?;
            DeckConfig::parse(deck.config_id, deck.id, &body)?;
        }
        Ok(decks.len())
    }
}
