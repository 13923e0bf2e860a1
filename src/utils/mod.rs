const DEFAULT_LIMIT: u64 = 10;

/// `offset`/`limit` query parameters shared by the paginated endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    pub fn new(offset: u64, limit: u64) -> Self {
        Pagination { offset, limit }
    }

    /// Postgres takes `OFFSET` as a bigint, larger values are clamped since
    /// they skip past every row either way.
    pub fn offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }

    pub fn limit(&self) -> i64 {
        i64::try_from(self.limit).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::Query, http::Uri};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/companies", Pagination::new(0, 10))]
    #[case("/companies?offset=20", Pagination::new(20, 10))]
    #[case("/companies?limit=0", Pagination::new(0, 0))]
    #[case("/companies?offset=5&limit=250", Pagination::new(5, 250))]
    #[case("/companies?offset=5000000000&limit=1", Pagination::new(5_000_000_000, 1))]
    fn reads_pagination_from_query(#[case] uri: &str, #[case] expected: Pagination) {
        let uri: Uri = uri.parse().unwrap();
        let Query(pagination) = Query::<Pagination>::try_from_uri(&uri).unwrap();

        assert_eq!(pagination, expected);
    }

    #[rstest]
    #[case("/companies?offset=-1")]
    #[case("/companies?limit=-5")]
    #[case("/companies?limit=ten")]
    #[case("/companies?offset=18446744073709551616")]
    fn rejects_negative_or_non_numeric_values(#[case] uri: &str) {
        let uri: Uri = uri.parse().unwrap();

        assert!(Query::<Pagination>::try_from_uri(&uri).is_err());
    }

    #[rstest]
    #[case(Pagination::new(5_000_000_000, 1), 5_000_000_000, 1)]
    #[case(Pagination::new(u64::MAX, u64::MAX), i64::MAX, i64::MAX)]
    #[case(Pagination::new(i64::MAX as u64 + 1, 0), i64::MAX, 0)]
    fn large_values_clamp_to_bigint(
        #[case] pagination: Pagination,
        #[case] offset: i64,
        #[case] limit: i64,
    ) {
        assert_eq!(pagination.offset(), offset);
        assert_eq!(pagination.limit(), limit);
    }
}
