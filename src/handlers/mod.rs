// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (bearer token verified by middleware::auth)
pub mod public;    // Liveness, health and catalog reads
pub mod protected; // Catalog mutations and per-user watchlists
pub mod utils;
