pub mod fragment_store;
pub mod retention;
