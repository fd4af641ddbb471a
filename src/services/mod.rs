pub mod bounded;
pub mod keys;
pub mod probe;
pub mod staging;
pub mod storage;
pub mod upload_service;
pub mod videos;
