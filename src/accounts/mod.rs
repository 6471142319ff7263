use axum::Router;

use crate::state::AppState;

pub mod deletion;
pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use repo::PgProfileStore;
pub use services::AccountService;

pub fn router(max_avatar_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::profile_routes(max_avatar_bytes))
        .merge(handlers::admin_routes())
}
