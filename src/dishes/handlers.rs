use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{DishBody, DishListQuery, DishesBody};
use super::services;
use crate::{
    auth::AuthUser,
    error::{Envelope, ServiceResult},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/dishes/mine", get(list_my_dishes))
        .route("/dishes/:id", get(get_dish))
}

#[instrument(skip(state))]
pub async fn list_my_dishes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DishListQuery>,
) -> ServiceResult<Envelope<DishesBody>> {
    let dishes =
        services::list_my_dishes(&state.db, user_id, q.status.as_deref(), q.search.as_deref())
            .await?;
    Ok(Envelope::ok(DishesBody { dishes }))
}

#[instrument(skip(state))]
pub async fn get_dish(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ServiceResult<Envelope<DishBody>> {
    let dish = services::dish_details(&state.db, user_id, id).await?;
    Ok(Envelope::ok(DishBody { dish }))
}
