pub mod bm25;
pub mod local_vector;

pub use bm25::Bm25Index;
pub use local_vector::{LocalVectorStore, RebuildPolicy};
