use diesel::{pg::Pg, prelude::Insertable};
use diesel_async::{
    scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl,
    SimpleAsyncConnection,
};

use crate::Error;

use super::{schema, CompanyCollection, Settings};

/// Number of synthetic companies a fresh database is populated with.
pub const DEFAULT_COMPANY_COUNT: usize = 100_000;

// One bind parameter per row, PostgreSQL allows at most 65535 per statement
const INSERT_CHUNK_SIZE: usize = 10_000;

const TRUNCATE_DATA: &str = "TRUNCATE TABLE company_collection_associations, company_collections, companies RESTART IDENTITY CASCADE;";

#[derive(Insertable)]
#[diesel(table_name = schema::companies)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct NewCompany {
    company_name: String,
}

/// Seeds the database unless the `seeded` marker says it already happened.
/// Returns whether seeding ran.
pub async fn seed_if_needed(
    company_count: usize,
    conn: &mut AsyncPgConnection,
) -> Result<bool, Error> {
    if Settings::exists(Settings::SEEDED, conn).await? {
        tracing::debug!("Database already seeded");
        return Ok(false);
    }

    reset(company_count, conn).await?;
    Settings::set(Settings::SEEDED, conn).await?;

    Ok(true)
}

/// Wipes every company, collection and association and repopulates the
/// database with `company_count` companies named `Company 0`, `Company 1`, ...
/// plus an empty "Liked Companies" collection. Company ids restart at 1.
pub async fn reset(company_count: usize, conn: &mut AsyncPgConnection) -> Result<(), Error> {
    tracing::info!(company_count, "Seeding database");

    conn.transaction(|conn| {
        async move {
            conn.batch_execute(TRUNCATE_DATA).await?;
            insert_companies(company_count, conn).await?;
            CompanyCollection::find_or_create_liked(conn).await?;

            Ok::<_, Error>(())
        }
        .scope_boxed()
    })
    .await?;

    tracing::info!(company_count, "Seeded database");

    Ok(())
}

async fn insert_companies(
    company_count: usize,
    conn: &mut impl AsyncConnection<Backend = Pg>,
) -> Result<(), Error> {
    use schema::companies::dsl as c_dsl;

    let mut start = 0;
    while start < company_count {
        let end = (start + INSERT_CHUNK_SIZE).min(company_count);
        let companies = (start..end)
            .map(|i| NewCompany {
                company_name: format!("Company {i}"),
            })
            .collect::<Vec<_>>();

        diesel::insert_into(c_dsl::companies)
            .values(&companies)
            .execute(conn)
            .await?;

        start = end;
    }

    Ok(())
}
