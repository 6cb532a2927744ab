pub mod memory;
pub mod neo4j;
pub mod notify;
pub mod postgres;
pub mod qdrant;

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;
pub use notify::{BroadcastNotifier, WebhookNotifier};
pub use postgres::PgStore;
pub use qdrant::QdrantStore;
