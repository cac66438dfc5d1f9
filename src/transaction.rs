//! Transaction module split into record types and the staged builder

pub mod builder;
pub mod types;

pub use builder::TransactionBuilder;
pub use types::*;
