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

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::config::DbConfig;
use rusqlite::ffi;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::store::CardOrder;
use crate::store::CardQuery;
use crate::store::CardStore;
use crate::store::DeckStore;
use crate::store::NoteStore;
use crate::store::QueuedCard;
use crate::store::ReviewLogStore;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::deck::DayCount;
use crate::types::deck::Deck;
use crate::types::deck::DeckCounters;
use crate::types::ids::CardId;
use crate::types::ids::ConfigId;
use crate::types::ids::DeckId;
use crate::types::ids::NoteId;
use crate::types::queue::Queue;
use crate::types::review_log::ReviewLogEntry;
use crate::types::timestamp::Timestamp;

const CARD_COLUMNS: &str = "card_id, note_id, deck_id, queue, card_type, due, interval, factor, lapses, steps_left, last_interval, stashed_due, reps, modified, usn";

const DECK_COLUMNS: &str = "deck_id, name, config_id, new_day, new_count, review_day, review_count, learning_day, learning_count, time_day, time_count";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at the given path, creating it if needed. A new
    /// collection is stamped with `created_at`, which anchors its day indices.
    pub fn new(database_path: &str, created_at: Timestamp) -> Fallible<Self> {
        let mut conn = Connection::open(database_path)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
        {
            let tx = conn.transaction()?;
            if !probe_schema_exists(&tx)? {
                log::debug!("Creating collection schema.");
                tx.execute_batch(include_str!("schema.sql"))?;
                tx.execute(
                    "insert into collection (id, created_at, usn, selected_deck) values (1, ?, 0, 1);",
                    [created_at.as_secs()],
                )?;
                tx.commit()?;
            }
        }
        Ok(Self { conn })
    }

    /// Create a deck and return its id.
    pub fn add_deck(&self, name: &str, config_id: ConfigId) -> Fallible<DeckId> {
        let sql = "insert into decks (name, config_id) values (?, ?) returning deck_id;";
        let id: DeckId = self
            .conn
            .query_row(sql, (name, config_id), |row| row.get(0))?;
        Ok(id)
    }

    /// Create or replace a deck configuration document.
    pub fn put_deck_config(&self, id: ConfigId, body: &str) -> Fallible<()> {
        let sql = "insert into deck_configs (config_id, body) values (?, ?) on conflict (config_id) do update set body = excluded.body;";
        self.conn.execute(sql, (id, body))?;
        Ok(())
    }

    pub fn add_note(&self) -> Fallible<NoteId> {
        let sql = "insert into notes default values returning note_id;";
        let id: NoteId = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(id)
    }

    /// Insert a card with the id it carries.
    pub fn add_card(&self, card: &Card) -> Fallible<()> {
        let sql = format!(
            "insert into cards ({CARD_COLUMNS}) values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);"
        );
        self.conn.execute(
            &sql,
            (
                card.id,
                card.note_id,
                card.deck_id,
                card.queue,
                card.card_type,
                card.due,
                card.interval,
                card.factor,
                card.lapses,
                card.left,
                card.last_interval,
                card.stashed_due,
                card.reps,
                card.modified,
                card.usn,
            ),
        )?;
        Ok(())
    }

    /// The ids of every card, in id order.
    pub fn card_ids(&self) -> Fallible<Vec<CardId>> {
        let mut stmt = self
            .conn
            .prepare("select card_id from cards order by card_id;")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<CardId>, _>>()?;
        Ok(ids)
    }

    pub fn select_deck(&self, id: DeckId) -> Fallible<()> {
        self.conn
            .execute("update collection set selected_deck = ? where id = 1;", [id])?;
        Ok(())
    }

    pub fn deck_by_name(&self, name: &str) -> Fallible<Option<Deck>> {
        let sql = format!("select {DECK_COLUMNS} from decks where name = ?;");
        let deck = self
            .conn
            .query_row(&sql, [name], deck_from_row)
            .optional()?;
        Ok(deck)
    }

    /// The review log entries of a card, oldest first.
    pub fn review_log(&self, card: CardId) -> Fallible<Vec<ReviewLogEntry>> {
        let sql = "select review_id, card_id, usn, ease, interval, last_interval, factor, time_taken, kind from review_log where card_id = ? order by review_id;";
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map([card], |row| {
                Ok(ReviewLogEntry {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    usn: row.get(2)?,
                    ease: row.get(3)?,
                    interval: row.get(4)?,
                    last_interval: row.get(5)?,
                    factor: row.get(6)?,
                    time_taken: row.get(7)?,
                    kind: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn note_tags(&self, note: NoteId) -> Fallible<Vec<String>> {
        let tags: String = self.conn.query_row(
            "select tags from notes where note_id = ?;",
            [note],
            |row| row.get(0),
        )?;
        Ok(tags.split_whitespace().map(str::to_string).collect())
    }

    /// Run an update over the cards whose ids are in `ids`. `sql` holds a
    /// single `{ids}` marker, which is replaced by the placeholder list.
    fn update_cards(&self, sql: &str, mut values: Vec<Value>, ids: &[CardId]) -> Fallible<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let sql = sql.replace("{ids}", &placeholders(ids.len()));
        values.extend(ids.iter().map(|id| Value::Integer(id.get())));
        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }
}

impl CardStore for Database {
    fn card(&self, id: CardId) -> Fallible<Card> {
        let sql = format!("select {CARD_COLUMNS} from cards where card_id = ?;");
        let card = self
            .conn
            .query_row(&sql, [id], card_from_row)
            .optional()?;
        match card {
            Some(card) => Ok(card),
            None => fail(format!("no card with id {id}")),
        }
    }

    fn queued_cards(&self, query: &CardQuery) -> Fallible<Vec<QueuedCard>> {
        let (filter, mut values) = card_filter(query);
        let order = match query.order {
            CardOrder::Unordered => "",
            CardOrder::DueAscending => "order by due, card_id",
            CardOrder::IntervalDescending => "order by interval desc, card_id",
            CardOrder::IntervalAscending => "order by interval, card_id",
        };
        let sql = format!("select card_id, note_id, due from cards where {filter} {order} limit ?;");
        values.push(Value::Integer(query.limit));
        let mut stmt = self.conn.prepare(&sql)?;
        let cards = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(QueuedCard {
                    id: row.get(0)?,
                    note_id: row.get(1)?,
                    due: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    fn count_cards(&self, query: &CardQuery) -> Fallible<i64> {
        let (filter, mut values) = card_filter(query);
        let sql = format!("select count() from (select 1 from cards where {filter} limit ?);");
        values.push(Value::Integer(query.limit));
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count)
    }

    fn learning_steps_left(&self, decks: &[DeckId], cutoff: i64, limit: i64) -> Fallible<i64> {
        let sql = format!(
            "select coalesce(sum(steps_left), 0) from (select steps_left from cards where deck_id in ({}) and queue = ? and due < ? limit ?);",
            placeholders(decks.len())
        );
        let mut values: Vec<Value> = decks.iter().map(|d| Value::Integer(d.get())).collect();
        values.push(Value::Integer(Queue::Learning.as_i64()));
        values.push(Value::Integer(cutoff));
        values.push(Value::Integer(limit));
        let sum: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(sum)
    }

    fn sibling_review_dues(&self, card: &Card) -> Fallible<Vec<i64>> {
        let sql = "select due from cards where note_id = ? and card_id != ? and queue = ?;";
        let mut stmt = self.conn.prepare(sql)?;
        let dues = stmt
            .query_map((card.note_id, card.id, Queue::Review), |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(dues)
    }

    fn note_cards(&self, note: NoteId) -> Fallible<Vec<CardId>> {
        let sql = "select card_id from cards where note_id = ? order by card_id;";
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map([note], |row| row.get(0))?
            .collect::<Result<Vec<CardId>, _>>()?;
        Ok(ids)
    }

    fn update_card(&self, card: &Card) -> Fallible<()> {
        let sql = "update cards set note_id = ?, deck_id = ?, queue = ?, card_type = ?, due = ?, interval = ?, factor = ?, lapses = ?, steps_left = ?, last_interval = ?, stashed_due = ?, reps = ?, modified = ?, usn = ? where card_id = ?;";
        let changed = self.conn.execute(
            sql,
            (
                card.note_id,
                card.deck_id,
                card.queue,
                card.card_type,
                card.due,
                card.interval,
                card.factor,
                card.lapses,
                card.left,
                card.last_interval,
                card.stashed_due,
                card.reps,
                card.modified,
                card.usn,
                card.id,
            ),
        )?;
        if changed != 1 {
            return fail(format!("no card with id {}", card.id));
        }
        Ok(())
    }

    fn cancel_relearning(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()> {
        self.update_cards(
            "update cards set due = stashed_due, stashed_due = 0, steps_left = 0, queue = ?, modified = ?, usn = ? where queue = ? and card_type = ? and card_id in ({ids});",
            vec![
                Value::Integer(Queue::Review.as_i64()),
                Value::Integer(modified),
                Value::Integer(usn),
                Value::Integer(Queue::Learning.as_i64()),
                Value::Integer(Queue::Review.as_i64()),
            ],
            ids,
        )
    }

    fn suspend_cards(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()> {
        self.update_cards(
            "update cards set queue = ?, modified = ?, usn = ? where card_id in ({ids});",
            vec![
                Value::Integer(Queue::Suspended.as_i64()),
                Value::Integer(modified),
                Value::Integer(usn),
            ],
            ids,
        )
    }

    fn unsuspend_cards(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()> {
        self.update_cards(
            "update cards set queue = card_type, modified = ?, usn = ? where queue = ? and card_id in ({ids});",
            vec![
                Value::Integer(modified),
                Value::Integer(usn),
                Value::Integer(Queue::Suspended.as_i64()),
            ],
            ids,
        )
    }

    fn bury_note(&self, note: NoteId, modified: i64, usn: i64) -> Fallible<()> {
        self.conn.execute(
            "update cards set queue = ?, modified = ?, usn = ? where note_id = ? and queue >= 0;",
            (Queue::BuriedByUser, modified, usn, note),
        )?;
        Ok(())
    }

    fn bury_cards(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()> {
        self.update_cards(
            "update cards set queue = ?, modified = ?, usn = ? where queue >= 0 and card_id in ({ids});",
            vec![
                Value::Integer(Queue::BuriedBySchedule.as_i64()),
                Value::Integer(modified),
                Value::Integer(usn),
            ],
            ids,
        )
    }

    fn unbury_all(&self, modified: i64, usn: i64) -> Fallible<()> {
        self.conn.execute(
            "update cards set queue = card_type, modified = ?, usn = ? where queue in (?, ?);",
            (
                modified,
                usn,
                Queue::BuriedByUser,
                Queue::BuriedBySchedule,
            ),
        )?;
        Ok(())
    }
}

impl DeckStore for Database {
    fn deck(&self, id: DeckId) -> Fallible<Deck> {
        let sql = format!("select {DECK_COLUMNS} from decks where deck_id = ?;");
        let deck = self
            .conn
            .query_row(&sql, [id], deck_from_row)
            .optional()?;
        match deck {
            Some(deck) => Ok(deck),
            None => fail(format!("no deck with id {id}")),
        }
    }

    fn parents(&self, deck: &Deck) -> Fallible<Vec<Deck>> {
        let mut parents = Vec::new();
        for name in deck.ancestor_names() {
            if let Some(parent) = self.deck_by_name(&name)? {
                parents.push(parent);
            }
        }
        Ok(parents)
    }

    fn children(&self, deck: &Deck) -> Fallible<Vec<Deck>> {
        let children = self
            .all_decks()?
            .into_iter()
            .filter(|other| deck.is_ancestor_of(other))
            .collect();
        Ok(children)
    }

    fn all_decks(&self) -> Fallible<Vec<Deck>> {
        let sql = format!("select {DECK_COLUMNS} from decks order by name;");
        let mut stmt = self.conn.prepare(&sql)?;
        let decks = stmt
            .query_map([], deck_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(decks)
    }

    fn selected_deck(&self) -> Fallible<DeckId> {
        let id: DeckId = self.conn.query_row(
            "select selected_deck from collection where id = 1;",
            [],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn deck_config(&self, id: ConfigId) -> Fallible<String> {
        let body: Option<String> = self
            .conn
            .query_row(
                "select body from deck_configs where config_id = ?;",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(body),
            None => fail(format!("no deck configuration with id {id}")),
        }
    }

    fn save_deck(&self, deck: &Deck) -> Fallible<()> {
        let c = &deck.counters;
        let sql = "update decks set name = ?, config_id = ?, new_day = ?, new_count = ?, review_day = ?, review_count = ?, learning_day = ?, learning_count = ?, time_day = ?, time_count = ? where deck_id = ?;";
        self.conn.execute(
            sql,
            (
                &deck.name,
                deck.config_id,
                c.new.day,
                c.new.count,
                c.review.day,
                c.review.count,
                c.learning.day,
                c.learning.count,
                c.time.day,
                c.time.count,
                deck.id,
            ),
        )?;
        Ok(())
    }
}

impl NoteStore for Database {
    fn add_tag(&self, note: NoteId, tag: &str, modified: i64, usn: i64) -> Fallible<()> {
        let mut tags = self.note_tags(note)?;
        if tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return Ok(());
        }
        tags.push(tag.to_string());
        self.conn.execute(
            "update notes set tags = ?, modified = ?, usn = ? where note_id = ?;",
            (tags.join(" "), modified, usn, note),
        )?;
        Ok(())
    }
}

impl ReviewLogStore for Database {
    fn append_review(&self, entry: &ReviewLogEntry) -> Fallible<()> {
        let sql = "insert into review_log (review_id, card_id, usn, ease, interval, last_interval, factor, time_taken, kind) values (?, ?, ?, ?, ?, ?, ?, ?, ?);";
        let result = self.conn.execute(
            sql,
            (
                entry.id,
                entry.card_id,
                entry.usn,
                entry.ease,
                entry.interval,
                entry.last_interval,
                entry.factor,
                entry.time_taken,
                entry.kind,
            ),
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Err(ErrorReport::LogIdConflict { id: entry.id })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Store for Database {
    fn collection_created(&self) -> Fallible<i64> {
        let created: i64 = self.conn.query_row(
            "select created_at from collection where id = 1;",
            [],
            |row| row.get(0),
        )?;
        Ok(created)
    }

    fn usn(&self) -> Fallible<i64> {
        let usn: i64 =
            self.conn
                .query_row("select usn from collection where id = 1;", [], |row| {
                    row.get(0)
                })?;
        Ok(usn)
    }

    fn atomically<T>(&self, f: impl FnOnce() -> Fallible<T>) -> Fallible<T> {
        // Dropping the transaction without committing rolls it back.
        let tx = self.conn.unchecked_transaction()?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }
}

fn card_filter(query: &CardQuery) -> (String, Vec<Value>) {
    let mut sql = format!(
        "deck_id in ({}) and queue = ?",
        placeholders(query.decks.len())
    );
    let mut values: Vec<Value> = query
        .decks
        .iter()
        .map(|d| Value::Integer(d.get()))
        .collect();
    values.push(Value::Integer(query.queue.as_i64()));
    if let Some(bound) = query.due_before {
        sql.push_str(" and due < ?");
        values.push(Value::Integer(bound));
    }
    (sql, values)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        note_id: row.get(1)?,
        deck_id: row.get(2)?,
        queue: row.get(3)?,
        card_type: row.get(4)?,
        due: row.get(5)?,
        interval: row.get(6)?,
        factor: row.get(7)?,
        lapses: row.get(8)?,
        left: row.get(9)?,
        last_interval: row.get(10)?,
        stashed_due: row.get(11)?,
        reps: row.get(12)?,
        modified: row.get(13)?,
        usn: row.get(14)?,
    })
}

fn deck_from_row(row: &Row) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: row.get(0)?,
        name: row.get(1)?,
        config_id: row.get(2)?,
        counters: DeckCounters {
            new: DayCount {
                day: row.get(3)?,
                count: row.get(4)?,
            },
            review: DayCount {
                day: row.get(5)?,
                count: row.get(6)?,
            },
            learning: DayCount {
                day: row.get(7)?,
                count: row.get(8)?,
            },
            time: DayCount {
                day: row.get(9)?,
                count: row.get(10)?,
            },
        },
    })
}

fn probe_schema_exists(tx: &Transaction) -> Fallible<bool> {
    let sql = "select count(*) from sqlite_master where type='table' AND name=?;";
    let count: i64 = tx.query_row(sql, ["cards"], |row| row.get(0))?;
    Ok(count > 0)
}
