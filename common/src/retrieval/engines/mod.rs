pub mod graph;
pub mod surreal;
pub mod tantivy_fts;
