mod repository;
mod schema;

pub use repository::{MirrorTransaction, Repository};
