pub mod blob;
pub mod cache;
pub mod storage;
