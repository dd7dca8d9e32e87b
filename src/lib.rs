pub mod config;
pub mod types;
pub mod wallet;
pub mod instruction_filter;
pub mod tip_cache;
pub mod relay;
pub mod rpc;
pub mod bundle_assembler;
pub mod submitter;
pub mod confirmation;
pub mod engine;
