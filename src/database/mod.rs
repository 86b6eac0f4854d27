// Persistence: SQLite for index/chunk metadata, binary files for vectors.

pub mod sqlite;
pub mod vectors;

pub use sqlite::*;
pub use vectors::{VectorFile, VectorFileError};
