pub mod content;
pub mod graph;

pub use content::{ContentCatalog, InMemoryContentCatalog};
pub use graph::{InMemoryKnowledgeGraph, KnowledgeGraphGateway, SurrealKnowledgeGraph};
