//! External storage contracts
//!
//! The vector store, graph store and bridge store are external collaborators;
//! the core consumes them through the narrow capabilities defined here and
//! never mutates graph nodes or chunks.

pub mod bridge;
pub mod graph;
pub mod vector;

pub use bridge::{confidence_for_level, BridgeMapping, BridgeStore, MappingType};
pub use graph::{
    node_degree, related_nodes_for_article, shared_neighbour_count, shortest_path, GraphEdge,
    GraphPath, GraphStore, HttpGraphStore, RelatedNode,
};
pub use vector::{PointId, QdrantHttpStore, ScoredPoint, VectorStore};
