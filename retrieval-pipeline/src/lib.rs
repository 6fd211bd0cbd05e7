pub mod payload;
pub mod retriever;
pub mod vector_index;

pub use payload::{partition_payloads, PartitionedPayloads};
pub use retriever::MultiVectorRetriever;
pub use vector_index::{SurrealVectorIndex, VectorIndex};
