use diesel::{
    deserialize::Queryable, pg::Pg, prelude::Insertable, ExpressionMethods, OptionalExtension,
    QueryDsl, Selectable, SelectableHelper,
};
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::Error;

pub mod collection;
pub mod company;
pub mod schema;
pub mod seed;

pub use collection::{CollectionRef, CompanyCollectionMetadata, CompanyCollectionOutput};
pub use company::{CompanyBatchOutput, CompanyOutput};

pub const LIKED_COMPANIES_NAME: &str = "Liked Companies";

const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS harmonic_settings (
    setting_name TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS companies (
    id SERIAL PRIMARY KEY,
    company_name TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS ix_companies_company_name ON companies (company_name);

CREATE TABLE IF NOT EXISTS company_collections (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    collection_name TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS ix_company_collections_collection_name
    ON company_collections (collection_name);
CREATE UNIQUE INDEX IF NOT EXISTS uq_liked_companies_collection
    ON company_collections (collection_name)
    WHERE collection_name = 'Liked Companies';

CREATE TABLE IF NOT EXISTS company_collection_associations (
    id SERIAL PRIMARY KEY,
    company_id INTEGER NOT NULL REFERENCES companies (id),
    collection_id UUID NOT NULL REFERENCES company_collections (id),
    created_at TIMESTAMP NOT NULL DEFAULT now(),
    CONSTRAINT uq_company_collection UNIQUE (company_id, collection_id)
);
CREATE INDEX IF NOT EXISTS ix_company_collection_associations_collection_id
    ON company_collection_associations (collection_id);
"#;

/// Creates every table and index the service needs if they are not there yet.
pub async fn create_schema(conn: &mut impl SimpleAsyncConnection) -> Result<(), Error> {
    conn.batch_execute(CREATE_SCHEMA).await?;

    Ok(())
}

#[derive(Clone, Debug, Queryable, Selectable)]
#[diesel(table_name = schema::companies)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Company {
    pub id: i32,
    pub company_name: String,
    pub created_at: PrimitiveDateTime,
}

impl Company {
    pub async fn find(
        company_id: i32,
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<Option<Self>, Error> {
        use schema::companies::dsl as c_dsl;

        let company = c_dsl::companies
            .find(company_id)
            .select(Company::as_select())
            .first(conn)
            .await
            .optional()?;

        Ok(company)
    }

    /// Loads the companies whose id is in `ids`, in ascending id order.
    /// Unknown ids are skipped.
    pub async fn find_many(
        ids: &[i32],
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<Vec<Self>, Error> {
        use schema::companies::dsl as c_dsl;

        let companies = c_dsl::companies
            .filter(c_dsl::id.eq_any(ids))
            .order(c_dsl::id.asc())
            .select(Company::as_select())
            .load(conn)
            .await?;

        Ok(companies)
    }

    pub async fn count(conn: &mut impl AsyncConnection<Backend = Pg>) -> Result<i64, Error> {
        use schema::companies::dsl as c_dsl;

        Ok(c_dsl::companies.count().get_result(conn).await?)
    }
}

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::company_collections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CompanyCollection {
    pub id: Uuid,
    pub collection_name: String,
}

impl CompanyCollection {
    pub fn is_liked(&self) -> bool {
        self.collection_name == LIKED_COMPANIES_NAME
    }

    pub async fn find(
        collection_id: Uuid,
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<Option<Self>, Error> {
        use schema::company_collections::dsl as cc_dsl;

        let collection = cc_dsl::company_collections
            .find(collection_id)
            .select(CompanyCollection::as_select())
            .first(conn)
            .await
            .optional()?;

        Ok(collection)
    }

    /// Looks up the "Liked Companies" collection without creating it.
    pub async fn find_liked(
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<Option<Self>, Error> {
        use schema::company_collections::dsl as cc_dsl;

        let collection = cc_dsl::company_collections
            .filter(cc_dsl::collection_name.eq(LIKED_COMPANIES_NAME))
            .order(cc_dsl::created_at.asc())
            .select(CompanyCollection::as_select())
            .first(conn)
            .await
            .optional()?;

        Ok(collection)
    }

    /// Returns the "Liked Companies" collection, creating it on first use.
    ///
    /// The insert is a no-op when a concurrent request created the row first
    /// (`uq_liked_companies_collection`), so every caller converges on the
    /// same collection.
    pub async fn find_or_create_liked(
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<Self, Error> {
        if let Some(collection) = Self::find_liked(conn).await? {
            return Ok(collection);
        }

        use schema::company_collections::dsl as cc_dsl;

        let inserted = diesel::insert_into(cc_dsl::company_collections)
            .values(&CompanyCollection {
                id: Uuid::new_v4(),
                collection_name: LIKED_COMPANIES_NAME.into(),
            })
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;

        if inserted > 0 {
            tracing::info!("Created the {LIKED_COMPANIES_NAME:?} collection");
        }

        Self::find_liked(conn)
            .await?
            .ok_or_else(|| Error::from(diesel::result::Error::NotFound))
    }

    pub async fn list(conn: &mut impl AsyncConnection<Backend = Pg>) -> Result<Vec<Self>, Error> {
        use schema::company_collections::dsl as cc_dsl;

        let collections = cc_dsl::company_collections
            .order((cc_dsl::created_at.asc(), cc_dsl::id.asc()))
            .select(CompanyCollection::as_select())
            .load(conn)
            .await?;

        Ok(collections)
    }
}

#[derive(Clone, Copy, Insertable)]
#[diesel(table_name = schema::company_collection_associations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CompanyCollectionAssociation {
    pub company_id: i32,
    pub collection_id: Uuid,
}

#[derive(Clone, Queryable, Selectable)]
#[diesel(table_name = schema::harmonic_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Settings {
    pub setting_name: String,
}

impl Settings {
    pub const SEEDED: &'static str = "seeded";

    pub async fn exists(
        setting_name: &str,
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<bool, Error> {
        use schema::harmonic_settings::dsl as hs_dsl;

        let setting = hs_dsl::harmonic_settings
            .find(setting_name)
            .select(Settings::as_select())
            .first(conn)
            .await
            .optional()?;

        Ok(setting.is_some())
    }

    pub async fn set(
        setting_name: &str,
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<(), Error> {
        use schema::harmonic_settings::dsl as hs_dsl;

        diesel::insert_into(hs_dsl::harmonic_settings)
            .values(hs_dsl::setting_name.eq(setting_name))
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;

        Ok(())
    }
}
