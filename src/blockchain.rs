// Thin re-export module: implementation lives under `blockchain/core/`,
// split into block structure, genesis, chain management and validation.

pub mod core;
pub use core::*;
