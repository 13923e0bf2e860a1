use std::{collections::HashSet, str::FromStr};

use diesel::{pg::Pg, ExpressionMethods, JoinOnDsl, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::{utils::Pagination, Error};

use super::{schema, Company, CompanyCollection, CompanyOutput};

/// Path token that stands in for the id of the "Liked Companies" collection.
pub const LIKED_COMPANIES_ALIAS: &str = "liked-companies-id";

/// A collection as addressed by a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionRef {
    Liked,
    Id(Uuid),
}

impl FromStr for CollectionRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == LIKED_COMPANIES_ALIAS {
            Ok(CollectionRef::Liked)
        } else {
            Uuid::parse_str(s)
                .map(CollectionRef::Id)
                .map_err(|_| Error::InvalidCollectionId)
        }
    }
}

impl CollectionRef {
    /// Resolves the reference to a stored collection. The liked alias creates
    /// its collection on first use, a plain id has to exist already.
    pub async fn resolve(
        self,
        conn: &mut impl AsyncConnection<Backend = Pg>,
    ) -> Result<CompanyCollection, Error> {
        match self {
            CollectionRef::Liked => CompanyCollection::find_or_create_liked(conn).await,
            CollectionRef::Id(id) => CompanyCollection::find(id, conn)
                .await?
                .ok_or(Error::NotFound("Collection")),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompanyCollectionMetadata {
    pub id: Uuid,
    pub collection_name: String,
}

impl From<CompanyCollection> for CompanyCollectionMetadata {
    fn from(collection: CompanyCollection) -> Self {
        CompanyCollectionMetadata {
            id: collection.id,
            collection_name: collection.collection_name,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompanyCollectionOutput {
    pub id: Uuid,
    pub collection_name: String,
    pub companies: Vec<CompanyOutput>,
    pub total: i64,
}

pub async fn list_metadata(
    conn: &mut impl AsyncConnection<Backend = Pg>,
) -> Result<Vec<CompanyCollectionMetadata>, Error> {
    Ok(CompanyCollection::list(conn)
        .await?
        .into_iter()
        .map(CompanyCollectionMetadata::from)
        .collect())
}

/// Lists one page of the companies in a collection, ordered by company id.
pub async fn get_companies(
    collection_ref: CollectionRef,
    pagination: Pagination,
    conn: &mut impl AsyncConnection<Backend = Pg>,
) -> Result<CompanyCollectionOutput, Error> {
    use schema::companies::dsl as c_dsl;
    use schema::company_collection_associations::dsl as cca_dsl;

    let collection = collection_ref.resolve(conn).await?;

    let companies = c_dsl::companies
        .inner_join(cca_dsl::company_collection_associations.on(cca_dsl::company_id.eq(c_dsl::id)))
        .filter(cca_dsl::collection_id.eq(collection.id))
        .order(c_dsl::id.asc())
        .offset(pagination.offset())
        .limit(pagination.limit())
        .select(Company::as_select())
        .load(conn)
        .await?;

    let total = cca_dsl::company_collection_associations
        .filter(cca_dsl::collection_id.eq(collection.id))
        .count()
        .get_result::<i64>(conn)
        .await?;

    let liked = liked_among(&collection, &companies, conn).await?;

    Ok(CompanyCollectionOutput {
        id: collection.id,
        collection_name: collection.collection_name,
        companies: companies
            .into_iter()
            .map(|company| {
                let is_liked = liked.contains(&company.id);
                CompanyOutput::new(company, is_liked)
            })
            .collect(),
        total,
    })
}

/// Ids of the `companies` that belong to the "Liked Companies" collection.
async fn liked_among(
    collection: &CompanyCollection,
    companies: &[Company],
    conn: &mut impl AsyncConnection<Backend = Pg>,
) -> Result<HashSet<i32>, Error> {
    if collection.is_liked() {
        return Ok(companies.iter().map(|company| company.id).collect());
    }

    let Some(liked_collection) = CompanyCollection::find_liked(conn).await? else {
        return Ok(HashSet::new());
    };

    use schema::company_collection_associations::dsl as cca_dsl;

    let company_ids = companies.iter().map(|company| company.id).collect::<Vec<_>>();

    Ok(cca_dsl::company_collection_associations
        .filter(cca_dsl::collection_id.eq(liked_collection.id))
        .filter(cca_dsl::company_id.eq_any(&company_ids))
        .select(cca_dsl::company_id)
        .load::<i32>(conn)
        .await?
        .into_iter()
        .collect())
}
