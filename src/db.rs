// 🗄️ SQLite store - entities, references, collections and the event log
//
// Entities get their identity from the `entities` rowid. Single-valued
// references are written with the entity. Collections are written once per
// (owner, relationship) by a finalization patch, in member order.

use crate::entities::{Attributes, Identity, Kind, References};
use crate::error::PersistenceError;
use crate::persister::Persister;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const ACTOR: &str = "pombe-loader";

/// Event for the audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Entities
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            attributes TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entity_refs (
            entity_id INTEGER NOT NULL REFERENCES entities(id),
            name TEXT NOT NULL,
            target_id INTEGER NOT NULL REFERENCES entities(id),
            PRIMARY KEY (entity_id, name)
        )",
        [],
    )?;

    // ==========================================================================
    // Collections (multi-valued relationships)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS collections (
            owner_id INTEGER NOT NULL REFERENCES entities(id),
            name TEXT NOT NULL,
            position INTEGER NOT NULL,
            member_id INTEGER NOT NULL REFERENCES entities(id),
            UNIQUE (owner_id, name, position)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner_id, name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// PERSISTER
// ============================================================================

pub struct SqlitePersister {
    conn: Connection,
}

impl SqlitePersister {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        setup_database(&conn).context("Failed to set up database schema")?;
        Ok(SqlitePersister { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqlitePersister { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Persister for SqlitePersister {
    fn create(
        &mut self,
        kind: Kind,
        attributes: &Attributes,
        refs: &References,
    ) -> Result<Identity, PersistenceError> {
        let attributes_json = serde_json::to_string(attributes)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO entities (kind, attributes) VALUES (?1, ?2)",
            params![kind.name(), attributes_json],
        )
        .map_err(|e| PersistenceError::create(format!("{}: {}", kind, e)))?;
        let id = tx.last_insert_rowid();

        for (name, target) in refs {
            tx.execute(
                "INSERT INTO entity_refs (entity_id, name, target_id) VALUES (?1, ?2, ?3)",
                params![id, name, target.id.0],
            )
            .map_err(|e| PersistenceError::create(format!("{}.{}: {}", kind, name, e)))?;
        }
        tx.commit()?;

        Ok(Identity(id))
    }

    fn patch_collection(
        &mut self,
        owner: Identity,
        relationship: &str,
        members: &[Identity],
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM collections WHERE owner_id = ?1 AND name = ?2",
            params![owner.0, relationship],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(PersistenceError::patch(format!(
                "{}.{} was already written",
                owner, relationship
            )));
        }

        let found: Option<i64> = tx
            .query_row(
                "SELECT id FROM entities WHERE id = ?1",
                params![owner.0],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(PersistenceError::patch(format!("unknown owner {}", owner)));
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO collections (owner_id, name, position, member_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, member) in members.iter().enumerate() {
                stmt.execute(params![owner.0, relationship, position as i64, member.0])
                    .map_err(|e| {
                        PersistenceError::patch(format!("{}.{} member {}: {}", owner, relationship, member, e))
                    })?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn record_event(
        &mut self,
        event_type: &str,
        subject: &str,
        data: &serde_json::Value,
    ) -> Result<(), PersistenceError> {
        let event = Event::new(event_type, "run", subject, data.clone(), ACTOR);
        insert_event(&self.conn, &event).map_err(|e| PersistenceError {
            operation: "event",
            message: e.to_string(),
        })
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Every event, oldest first
pub fn get_events(conn: &Connection) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
            Ok(Event {
                event_id,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .with_context(|| format!("Bad event timestamp: {}", timestamp))?
                    .with_timezone(&Utc),
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data).context("Bad event payload")?,
                actor,
            })
        })
        .collect()
}

// ============================================================================
// QUERIES
// ============================================================================

/// Entity count per kind name
pub fn count_by_kind(conn: &Connection) -> Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM entities GROUP BY kind")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(counts)
}

/// Collection count and total membership per relationship name
pub fn collection_stats(conn: &Connection) -> Result<BTreeMap<String, (i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT name, COUNT(DISTINCT owner_id), COUNT(*)
         FROM collections
         GROUP BY name",
    )?;
    let stats = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, (row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(stats)
}

pub fn get_kind(conn: &Connection, id: Identity) -> Result<Option<Kind>> {
    let name: Option<String> = conn
        .query_row(
            "SELECT kind FROM entities WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()?;

    match name {
        Some(name) => Ok(Some(name.parse().map_err(anyhow::Error::msg)?)),
        None => Ok(None),
    }
}

pub fn get_attributes(conn: &Connection, id: Identity) -> Result<Option<Attributes>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT attributes FROM entities WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()?;

    json.map(|j| serde_json::from_str(&j).context("Bad attributes JSON"))
        .transpose()
}

/// Single-valued references of an entity: name -> target
pub fn get_refs(conn: &Connection, id: Identity) -> Result<BTreeMap<String, Identity>> {
    let mut stmt = conn.prepare("SELECT name, target_id FROM entity_refs WHERE entity_id = ?1")?;
    let refs = stmt
        .query_map(params![id.0], |row| {
            Ok((row.get::<_, String>(0)?, Identity(row.get(1)?)))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(refs)
}

/// Members of one collection, in patch order
pub fn get_collection(conn: &Connection, owner: Identity, name: &str) -> Result<Vec<Identity>> {
    let mut stmt = conn.prepare(
        "SELECT member_id FROM collections
         WHERE owner_id = ?1 AND name = ?2
         ORDER BY position",
    )?;
    let members = stmt
        .query_map(params![owner.0, name], |row| Ok(Identity(row.get(0)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

/// Ids of every entity of `kind` whose attribute `field` equals `value`
pub fn find_by_attribute(conn: &Connection, kind: Kind, field: &str, value: &str) -> Result<Vec<Identity>> {
    let path = format!("$.{}", field);
    let mut stmt = conn.prepare(
        "SELECT id FROM entities
         WHERE kind = ?1 AND json_extract(attributes, ?2) = ?3
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![kind.name(), path, value], |row| Ok(Identity(row.get(0)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
