// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Route Prefix: / and GET /api/movies[/:id]
// Middleware: CORS and request tracing only
pub mod movies;
pub mod root;

pub use movies::get as movie_get;
pub use movies::list as movie_list;
pub use root::{health, root};
