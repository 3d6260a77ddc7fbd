pub mod db;
pub mod embed;
pub mod http;
pub mod index;
pub mod query;
pub mod schema;
pub mod write;

pub use db::{IndexStatus, Store};
pub use embed::{Embedder, HttpEmbedder};
pub use index::{SemanticIndex, VectorIndex};
