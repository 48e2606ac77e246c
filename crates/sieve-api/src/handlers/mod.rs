//! HTTP handlers for sieve-api.

pub mod generations;
pub mod master;
pub mod profiles;
pub mod saved;
pub mod sources;
pub mod system;
