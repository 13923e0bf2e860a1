use axum::{
    extract::{Path, Query, State},
    routing, Json, Router,
};

use crate::{
    db::{self, CompanyBatchOutput, CompanyOutput},
    state::{AppState, DbConn},
    utils::Pagination,
    Error,
};

#[derive(serde::Deserialize)]
struct CompanyIds {
    ids: Vec<i32>,
}

async fn list_companies(
    Query(pagination): Query<Pagination>,
    DbConn { mut conn }: DbConn,
) -> Result<Json<CompanyBatchOutput>, Error> {
    Ok(Json(db::company::list(pagination, &mut conn).await?))
}

async fn toggle_company_like(
    Path(company_id): Path<i32>,
    DbConn { mut conn }: DbConn,
) -> Result<Json<CompanyOutput>, Error> {
    Ok(Json(db::company::toggle_like(company_id, &mut conn).await?))
}

// The body is extracted first so a malformed one never holds a pooled
// connection
async fn add_companies_to_liked(
    State(state): State<AppState>,
    Json(req): Json<CompanyIds>,
) -> Result<Json<Vec<CompanyOutput>>, Error> {
    let mut conn = state.get_conn().await?;

    Ok(Json(db::company::add_to_liked(&req.ids, &mut conn).await?))
}

async fn remove_companies_from_liked(
    State(state): State<AppState>,
    Json(req): Json<CompanyIds>,
) -> Result<Json<Vec<CompanyOutput>>, Error> {
    let mut conn = state.get_conn().await?;

    Ok(Json(
        db::company::remove_from_liked(&req.ids, &mut conn).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", routing::get(list_companies))
        .route("/:company_id/toggle-like", routing::post(toggle_company_like))
        .route("/add-to-liked", routing::post(add_companies_to_liked))
        .route("/remove-from-liked", routing::post(remove_companies_from_liked))
}
