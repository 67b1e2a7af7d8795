pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

pub use routes::create_routes;
pub use state::AppState;
