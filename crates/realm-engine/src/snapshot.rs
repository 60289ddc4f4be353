//! Save records with BLAKE3 integrity hashing.
//!
//! A [`SaveRecord`] captures every entity plus the loop counters. Its
//! `hash` is a BLAKE3 hex digest over the canonical JSON of all other fields,
//! so a record altered after saving fails [`SaveRecord::verify`] and is
//! refused on load.
//!
//! Entities are stored sorted by id; component maps are `BTreeMap`s. Two
//! records with the same contents therefore always hash the same.

use realm_ecs::entity::Entity;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SaveRecord
// ---------------------------------------------------------------------------

/// A complete, hashed save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub id: String,
    /// Human-readable name chosen by the player.
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    pub tick_count: u64,
    pub total_time_ms: u64,
    /// Every entity at save time, sorted by id.
    pub entities: Vec<Entity>,
    /// BLAKE3 hex digest (64 lowercase hex chars) of the fields above.
    pub hash: String,
}

impl SaveRecord {
    /// Build a record and compute its hash. Entities are sorted by id.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        created_at_ms: u64,
        tick_count: u64,
        total_time_ms: u64,
        mut entities: Vec<Entity>,
    ) -> Result<Self, serde_json::Error> {
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        let mut record = Self {
            id: id.into(),
            name: name.into(),
            created_at_ms,
            tick_count,
            total_time_ms,
            entities,
            hash: String::new(),
        };
        record.hash = compute_hash(&record)?;
        Ok(record)
    }

    /// Whether the stored hash matches the record's contents.
    pub fn verify(&self) -> bool {
        compute_hash(self).is_ok_and(|hash| hash == self.hash)
    }

    pub fn summary(&self) -> SaveSummary {
        SaveSummary::from(self)
    }
}

/// Listing entry for a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub id: String,
    pub name: String,
    pub created_at_ms: u64,
    pub entity_count: usize,
    pub tick_count: u64,
}

impl From<&SaveRecord> for SaveSummary {
    fn from(record: &SaveRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            created_at_ms: record.created_at_ms,
            entity_count: record.entities.len(),
            tick_count: record.tick_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

/// BLAKE3 hex digest of everything in the record except `hash`.
fn compute_hash(record: &SaveRecord) -> Result<String, serde_json::Error> {
    #[derive(Serialize)]
    struct HashableSave<'a> {
        id: &'a str,
        name: &'a str,
        created_at_ms: u64,
        tick_count: u64,
        total_time_ms: u64,
        entities: &'a [Entity],
    }

    let hashable = HashableSave {
        id: &record.id,
        name: &record.name,
        created_at_ms: record.created_at_ms,
        tick_count: record.tick_count,
        total_time_ms: record.total_time_ms,
        entities: &record.entities,
    };
    let json_bytes = serde_json::to_vec(&hashable)?;
    Ok(blake3::hash(&json_bytes).to_hex().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
