//! Bridge store: chunk-to-graph-node mappings over SQLite
//!
//! Every chunk carries exactly one PRIMARY mapping (the node the chunk was
//! cut from) and any number of HIERARCHIC mappings pointing at its structural
//! ancestors, with confidence decreasing by distance from the article.

use crate::error::Result;
use crate::model::{ChunkId, LinkedNode, NodeUrn};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Kind of chunk-to-node mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingType {
    Primary,
    Hierarchic,
}

impl MappingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Hierarchic => "HIERARCHIC",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "PRIMARY" => Self::Primary,
            _ => Self::Hierarchic,
        }
    }
}

/// Confidence assigned to a hierarchic mapping by structural level.
///
/// Closer to the article means higher confidence; the article itself (the
/// primary mapping) is 1.0.
pub fn confidence_for_level(level: &str) -> f64 {
    match level {
        "libro" => 0.90,
        "titolo" => 0.92,
        "capo" => 0.94,
        "sezione" => 0.96,
        _ => 1.0,
    }
}

/// One chunk-to-node mapping row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeMapping {
    pub chunk_id: ChunkId,
    pub node_urn: NodeUrn,
    pub node_type: String,
    pub mapping_type: MappingType,
    pub confidence: f64,
    pub relation_type: Option<String>,
}

impl From<&BridgeMapping> for LinkedNode {
    fn from(m: &BridgeMapping) -> Self {
        LinkedNode {
            graph_node_urn: m.node_urn.clone(),
            node_type: m.node_type.clone(),
            relation_type: m.relation_type.clone(),
            direction: None,
            confidence: Some(m.confidence),
        }
    }
}

/// SQLite-backed bridge table
pub struct BridgeStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bridge_mappings (
    chunk_id      TEXT NOT NULL,
    node_urn      TEXT NOT NULL,
    node_type     TEXT NOT NULL DEFAULT '',
    mapping_type  TEXT NOT NULL CHECK (mapping_type IN ('PRIMARY', 'HIERARCHIC')),
    confidence    REAL NOT NULL,
    relation_type TEXT,
    PRIMARY KEY (chunk_id, node_urn)
);
CREATE INDEX IF NOT EXISTS idx_bridge_chunk ON bridge_mappings (chunk_id);
";

impl BridgeStore {
    /// Open (or create) a bridge store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used in tests and ephemeral setups
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a mapping.
    ///
    /// A PRIMARY insert displaces any existing PRIMARY for the same chunk, so
    /// the one-primary-per-chunk invariant holds regardless of call order.
    pub fn add_mapping(&self, mapping: &BridgeMapping) -> Result<()> {
        let conn = self.conn.lock().expect("bridge store lock poisoned");

        if mapping.mapping_type == MappingType::Primary {
            conn.execute(
                "DELETE FROM bridge_mappings WHERE chunk_id = ?1 AND mapping_type = 'PRIMARY'",
                params![mapping.chunk_id.to_string()],
            )?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO bridge_mappings
                (chunk_id, node_urn, node_type, mapping_type, confidence, relation_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                mapping.chunk_id.to_string(),
                mapping.node_urn.as_str(),
                mapping.node_type,
                mapping.mapping_type.as_str(),
                mapping.confidence,
                mapping.relation_type,
            ],
        )?;
        Ok(())
    }

    /// All mappings for a chunk, PRIMARY first, then by confidence descending
    pub fn get_nodes_for_chunk(&self, chunk_id: &ChunkId) -> Result<Vec<BridgeMapping>> {
        let conn = self.conn.lock().expect("bridge store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT chunk_id, node_urn, node_type, mapping_type, confidence, relation_type
             FROM bridge_mappings
             WHERE chunk_id = ?1
             ORDER BY mapping_type = 'PRIMARY' DESC, confidence DESC",
        )?;

        let rows = stmt.query_map(params![chunk_id.to_string()], |row| {
            let chunk: String = row.get(0)?;
            let urn: String = row.get(1)?;
            let mapping_type: String = row.get(3)?;
            Ok(BridgeMapping {
                chunk_id: chunk.parse().unwrap_or_default(),
                node_urn: NodeUrn(urn),
                node_type: row.get(2)?,
                mapping_type: MappingType::from_str(&mapping_type),
                confidence: row.get(4)?,
                relation_type: row.get(5)?,
            })
        })?;

        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Total mapping count
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().expect("bridge store lock poisoned");
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM bridge_mappings", [], |row| row.get(0))?;
        Ok(count)
    }
}
