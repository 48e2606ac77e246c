//! Shared handler state.

use sieve_jobs::Sieve;

#[derive(Clone)]
pub struct AppState {
    pub sieve: Sieve,
}

impl AppState {
    pub fn new(sieve: Sieve) -> Self {
        Self { sieve }
    }
}
