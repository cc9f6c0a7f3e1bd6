pub mod admin;
pub mod forum;
pub mod rewards;
pub mod users;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(users::router())
        .merge(forum::router())
        .merge(rewards::router())
        .merge(admin::router())
}
