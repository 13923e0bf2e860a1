use axum::{
    extract::{Path, Query, State},
    routing, Json, Router,
};

use crate::{
    db::{self, CollectionRef, CompanyCollectionMetadata, CompanyCollectionOutput},
    state::{AppState, DbConn},
    utils::Pagination,
    Error,
};

async fn list_collection_metadata(
    DbConn { mut conn }: DbConn,
) -> Result<Json<Vec<CompanyCollectionMetadata>>, Error> {
    Ok(Json(db::collection::list_metadata(&mut conn).await?))
}

async fn get_company_collection(
    Path(collection_id): Path<String>,
    Query(pagination): Query<Pagination>,
    State(state): State<AppState>,
) -> Result<Json<CompanyCollectionOutput>, Error> {
    // Malformed ids are rejected before a connection is checked out
    let collection_ref = collection_id.parse::<CollectionRef>()?;

    let mut conn = state.get_conn().await?;

    Ok(Json(
        db::collection::get_companies(collection_ref, pagination, &mut conn).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", routing::get(list_collection_metadata))
        .route("/:collection_id", routing::get(get_company_collection))
}
