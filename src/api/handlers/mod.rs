pub mod buckets;
pub mod chunk_upload;
pub mod health;
pub mod objects;
pub mod policy_templates;
