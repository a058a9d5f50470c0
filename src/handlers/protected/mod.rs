// handlers/protected/mod.rs - Protected handlers (bearer token required)
//
// Every route here runs behind `middleware::require_identity`, which puts the
// verified `Identity` into request extensions before the handler executes.
pub mod movies;
pub mod watchlist;

pub use movies::create as movie_create;
pub use movies::delete as movie_delete;
pub use movies::update as movie_update;

pub use watchlist::check as watchlist_check;
pub use watchlist::delete as watchlist_delete;
pub use watchlist::insert as watchlist_insert;
pub use watchlist::list as watchlist_list;
