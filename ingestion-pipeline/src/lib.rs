pub mod chunker;
pub mod descriptions;
pub mod loaders;
pub mod pipeline;
pub mod utils;

pub use chunker::TextChunker;
pub use loaders::{load_batch, BatchOutcome, LoaderContext, Source};
pub use pipeline::IngestionPipeline;
