pub mod chunk_store;
pub mod file_name;
pub mod staging;
