use diesel::{
    pg::Pg, BoolExpressionMethods, ExpressionMethods, JoinOnDsl, NullableExpressionMethods,
    QueryDsl,
};
use diesel_async::{
    scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};

use crate::{utils::Pagination, Error};

use super::{
    schema, Company, CompanyCollection, CompanyCollectionAssociation, LIKED_COMPANIES_NAME,
};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompanyOutput {
    pub id: i32,
    pub company_name: String,
    pub liked: bool,
}

impl CompanyOutput {
    pub fn new(company: Company, liked: bool) -> Self {
        CompanyOutput {
            id: company.id,
            company_name: company.company_name,
            liked,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompanyBatchOutput {
    pub companies: Vec<CompanyOutput>,
    pub total: i64,
}

/// Lists one page of companies ordered by id, each flagged with whether it is
/// a member of the "Liked Companies" collection.
pub async fn list(
    pagination: Pagination,
    conn: &mut impl AsyncConnection<Backend = Pg>,
) -> Result<CompanyBatchOutput, Error> {
    use schema::companies::dsl as c_dsl;
    use schema::company_collection_associations::dsl as cca_dsl;
    use schema::company_collections::dsl as cc_dsl;

    tracing::info!(
        offset = pagination.offset,
        limit = pagination.limit,
        "Fetching companies"
    );

    // Companies can only be liked once the collection exists, before that the
    // subselect is empty and every flag comes out false
    let rows = c_dsl::companies
        .left_join(
            cca_dsl::company_collection_associations.on(cca_dsl::company_id.eq(c_dsl::id).and(
                cca_dsl::collection_id.eq_any(
                    cc_dsl::company_collections
                        .filter(cc_dsl::collection_name.eq(LIKED_COMPANIES_NAME))
                        .select(cc_dsl::id),
                ),
            )),
        )
        .order(c_dsl::id.asc())
        .offset(pagination.offset())
        .limit(pagination.limit())
        .select((
            c_dsl::id,
            c_dsl::company_name,
            cca_dsl::id.nullable().is_not_null(),
        ))
        .load::<(i32, String, bool)>(conn)
        .await?;

    let total = Company::count(conn).await?;

    tracing::info!(found = rows.len(), total, "Fetched companies");

    Ok(CompanyBatchOutput {
        companies: rows
            .into_iter()
            .map(|(id, company_name, liked)| CompanyOutput {
                id,
                company_name,
                liked,
            })
            .collect(),
        total,
    })
}

/// Flips the liked state of a company.
///
/// Two concurrent toggles that both find no association will both try to
/// insert one; `uq_company_collection` rejects the second and the caller gets
/// [`Error::Conflict`].
pub async fn toggle_like(
    company_id: i32,
    conn: &mut AsyncPgConnection,
) -> Result<CompanyOutput, Error> {
    conn.transaction(|conn| {
        async move {
            use schema::company_collection_associations::dsl as cca_dsl;

            let company = Company::find(company_id, conn)
                .await?
                .ok_or(Error::NotFound("Company"))?;
            let liked_collection = CompanyCollection::find_or_create_liked(conn).await?;

            let removed = diesel::delete(cca_dsl::company_collection_associations)
                .filter(cca_dsl::company_id.eq(company.id))
                .filter(cca_dsl::collection_id.eq(liked_collection.id))
                .execute(conn)
                .await?;

            let liked = if removed == 0 {
                diesel::insert_into(cca_dsl::company_collection_associations)
                    .values(&CompanyCollectionAssociation {
                        company_id: company.id,
                        collection_id: liked_collection.id,
                    })
                    .execute(conn)
                    .await?;

                true
            } else {
                false
            };

            tracing::debug!(company_id, liked, "Toggled company like");

            Ok(CompanyOutput::new(company, liked))
        }
        .scope_boxed()
    })
    .await
}

/// Adds every existing company in `ids` to the liked collection. Ids without a
/// company are skipped and ids that are already liked are left as they are.
pub async fn add_to_liked(
    ids: &[i32],
    conn: &mut AsyncPgConnection,
) -> Result<Vec<CompanyOutput>, Error> {
    conn.transaction(|conn| {
        async move {
            use schema::company_collection_associations::dsl as cca_dsl;

            let liked_collection = CompanyCollection::find_or_create_liked(conn).await?;
            let companies = Company::find_many(ids, conn).await?;

            if !companies.is_empty() {
                let associations = companies
                    .iter()
                    .map(|company| CompanyCollectionAssociation {
                        company_id: company.id,
                        collection_id: liked_collection.id,
                    })
                    .collect::<Vec<_>>();

                let added = diesel::insert_into(cca_dsl::company_collection_associations)
                    .values(&associations)
                    .on_conflict((cca_dsl::company_id, cca_dsl::collection_id))
                    .do_nothing()
                    .execute(conn)
                    .await?;

                tracing::debug!(
                    requested = ids.len(),
                    matched = companies.len(),
                    added,
                    "Added companies to liked"
                );
            }

            Ok(companies
                .into_iter()
                .map(|company| CompanyOutput::new(company, true))
                .collect())
        }
        .scope_boxed()
    })
    .await
}

/// Removes every existing company in `ids` from the liked collection.
///
/// Fails with [`Error::NotFound`] if the liked collection was never created.
pub async fn remove_from_liked(
    ids: &[i32],
    conn: &mut AsyncPgConnection,
) -> Result<Vec<CompanyOutput>, Error> {
    conn.transaction(|conn| {
        async move {
            use schema::company_collection_associations::dsl as cca_dsl;

            let liked_collection = CompanyCollection::find_liked(conn)
                .await?
                .ok_or(Error::NotFound("Liked Companies collection"))?;
            let companies = Company::find_many(ids, conn).await?;

            if !companies.is_empty() {
                let company_ids = companies.iter().map(|c| c.id).collect::<Vec<_>>();

                let removed = diesel::delete(cca_dsl::company_collection_associations)
                    .filter(cca_dsl::collection_id.eq(liked_collection.id))
                    .filter(cca_dsl::company_id.eq_any(&company_ids))
                    .execute(conn)
                    .await?;

                tracing::debug!(
                    requested = ids.len(),
                    matched = companies.len(),
                    removed,
                    "Removed companies from liked"
                );
            }

            Ok(companies
                .into_iter()
                .map(|company| CompanyOutput::new(company, false))
                .collect())
        }
        .scope_boxed()
    })
    .await
}
