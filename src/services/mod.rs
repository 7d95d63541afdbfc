pub mod bucket_service;
pub mod chunk_upload;
pub mod error;
pub mod object_service;
pub mod policy_template;
pub mod storage;
