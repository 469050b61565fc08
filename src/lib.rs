pub mod analysis;
pub mod error;
pub mod importer;
pub mod indexer;
pub mod models;
pub mod parser;
pub mod query;
pub mod scanner;
pub mod storage;

pub use error::{CoreError, CoreResult};
