mod collection;
mod company;
pub mod db;
pub mod state;
pub mod utils;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::PoolError;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::state::{AppState, Config};

pub async fn run() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::from_config(&config)?;

    {
        let mut conn = state.get_conn().await?;

        db::create_schema(&mut conn).await?;
        if db::seed::seed_if_needed(db::seed::DEFAULT_COMPANY_COUNT, &mut conn).await? {
            tracing::info!("Seeded a fresh database");
        }
    }

    let app = app(state, config.cors_origin.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    tracing::info!("Started server on http://{}", config.bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the full HTTP surface. Only `cors_origin` may make credentialed
/// cross-origin requests.
pub fn app(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    Router::new()
        .nest("/companies", company::router())
        .nest("/collections", collection::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Invalid collection ID format")]
    InvalidCollectionId,
    #[error("The request conflicted with a concurrent update, retry it: {0:?}")]
    Conflict(DieselError),
    #[error("Failed to read config value {name}: {source:?}")]
    Config {
        name: &'static str,
        source: dotenvy::Error,
    },
    #[error("Invalid value for config value {name}: {error}")]
    InvalidConfig { name: &'static str, error: String },
    #[error("Failed to build the connection pool: {0:?}")]
    BuildPoolError(#[from] diesel_async::pooled_connection::deadpool::BuildError),
    #[error("Failed to get connection from pool: {0:?}")]
    PoolError(PoolError),
    #[error("Timed out waiting for a connection from the pool")]
    PoolTimeout,
    #[error("Failed to query the DB: {0:?}")]
    QueryError(DieselError),
    #[error("Encountered an IO error: {0:?}")]
    IoError(#[from] std::io::Error),
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Timeout(_) => Error::PoolTimeout,
            err => Error::PoolError(err),
        }
    }
}

impl From<DieselError> for Error {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::SerializationFailure,
                _,
            ) => Error::Conflict(err),
            err => Error::QueryError(err),
        }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidCollectionId => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let detail = match self {
            Error::NotFound(_) | Error::InvalidCollectionId => self.to_string(),
            Error::Conflict(_) => {
                tracing::warn!("{self}");
                "The request conflicted with a concurrent update, retry it".into()
            }
            _ => {
                tracing::error!("{self}");
                "Internal server error".into()
            }
        };

        (status_code, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use deadpool::managed::TimeoutType;
    use diesel::result::DatabaseErrorInformation;
    use rstest::rstest;
    use tower::ServiceExt;

    use super::*;
    use crate::state::PoolConfig;

    struct Info;

    impl DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            None
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            Some("uq_company_collection")
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn database_error(kind: DatabaseErrorKind) -> Error {
        DieselError::DatabaseError(kind, Box::new(Info)).into()
    }

    #[rstest]
    #[case(Error::NotFound("Company"), StatusCode::NOT_FOUND)]
    #[case(Error::InvalidCollectionId, StatusCode::BAD_REQUEST)]
    #[case(database_error(DatabaseErrorKind::UniqueViolation), StatusCode::CONFLICT)]
    #[case(database_error(DatabaseErrorKind::SerializationFailure), StatusCode::CONFLICT)]
    #[case(
        database_error(DatabaseErrorKind::ForeignKeyViolation),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    #[case(DieselError::NotFound.into(), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(Error::PoolTimeout, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(PoolError::Closed.into(), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_errors_to_status_codes(#[case] error: Error, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[rstest]
    #[case(TimeoutType::Wait)]
    #[case(TimeoutType::Create)]
    fn pool_timeouts_are_reported_as_checkout_timeouts(#[case] timeout: TimeoutType) {
        assert!(matches!(
            Error::from(PoolError::Timeout(timeout)),
            Error::PoolTimeout
        ));
    }

    #[tokio::test]
    async fn error_bodies_carry_a_detail_message() {
        let response = Error::NotFound("Collection").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["detail"], "Collection not found");
    }

    // Nothing below reaches the database, so a pool pointing nowhere is enough
    fn offline_app() -> Router {
        let state =
            AppState::new(PoolConfig::new("postgres://localhost:1/unreachable").with_max_size(1))
                .unwrap();
        app(state, HeaderValue::from_static("http://localhost:5173"))
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        status_with_body(method, uri, "").await
    }

    async fn status_with_body(method: &str, uri: &str, body: &'static str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        offline_app().oneshot(request).await.unwrap().status()
    }

    #[rstest]
    #[case("GET", "/collections/not-a-uuid")]
    #[case("GET", "/collections/1234")]
    #[case("GET", "/companies?offset=-1")]
    #[case("GET", "/companies?limit=abc")]
    #[case("GET", "/collections/liked-companies-id?limit=-3")]
    #[case("POST", "/companies/abc/toggle-like")]
    #[tokio::test]
    async fn rejects_malformed_requests_before_touching_the_store(
        #[case] method: &str,
        #[case] uri: &str,
    ) {
        assert_eq!(status_of(method, uri).await, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[case("/companies/add-to-liked", "", StatusCode::BAD_REQUEST)]
    #[case("/companies/add-to-liked", "{\"ids\": [1, 2", StatusCode::BAD_REQUEST)]
    #[case("/companies/add-to-liked", "{\"ids\": \"x\"}", StatusCode::UNPROCESSABLE_ENTITY)]
    #[case("/companies/remove-from-liked", "", StatusCode::BAD_REQUEST)]
    #[case("/companies/remove-from-liked", "{}", StatusCode::UNPROCESSABLE_ENTITY)]
    #[tokio::test]
    async fn rejects_malformed_batch_bodies_without_a_connection(
        #[case] uri: &str,
        #[case] body: &'static str,
        #[case] expected: StatusCode,
    ) {
        assert_eq!(status_with_body("POST", uri, body).await, expected);
    }

    #[tokio::test]
    async fn malformed_collection_id_has_a_detail_message() {
        let request = Request::builder()
            .uri("/collections/not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let response = offline_app().oneshot(request).await.unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["detail"], "Invalid collection ID format");
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        assert_eq!(status_of("GET", "/nowhere").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_preflight_allows_the_configured_origin() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/companies")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = offline_app().oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
        assert_eq!(
            response.headers()["access-control-allow-credentials"],
            "true"
        );
    }
}
