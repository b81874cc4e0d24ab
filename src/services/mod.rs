pub mod scan_policy;
pub mod scanner;
pub mod upload_pipeline;
