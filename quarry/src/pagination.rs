//! # Pagination Module
//!
//! A serde-friendly `Pagination` value that web handlers can extract straight
//! from query parameters and apply to a [`QueryBuilder`].
//!
//! ## Example with Axum
//!
//! ```rust,ignore
//! use axum::{extract::Query, Json};
//! use quarry::{Paginated, Pagination, Row};
//!
//! async fn list_users(Query(pagination): Query<Pagination>) -> Json<Paginated<Row>> {
//!     let mut conn = open_connection().await;
//!     Json(pagination.paginate(conn.table("users").latest()).await.unwrap())
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{Error, FromRow, QueryBuilder, Row};

/// Page request. Pages are 1-based.
///
/// Deserializes from `?page=2&per_page=20`; both fields are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// The page number. Default: 1.
    #[serde(default = "default_page")]
    pub page: u64,

    /// Items per page. Default: 15.
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    15
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: default_page(), per_page: default_per_page() }
    }
}

impl Pagination {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    /// Sets the builder's limit and offset for this page.
    pub fn apply<'c>(self, query: QueryBuilder<'c>) -> QueryBuilder<'c> {
        query.for_page(self.page, self.per_page)
    }

    /// Counts the matching rows, then fetches this page.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let result = Pagination::new(2, 10).paginate(conn.table("users")).await?;
    /// println!("{} of {} users, page {}/{}", result.data.len(), result.total, result.page, result.last_page);
    /// ```
    pub async fn paginate(self, query: QueryBuilder<'_>) -> Result<Paginated<Row>, Error> {
        query.paginate(self.page, self.per_page).await
    }
}

/// One page of results plus metadata. Serialized as-is for API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    /// Matching rows across all pages.
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    /// At least 1, even for an empty result.
    pub last_page: u64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        let last_page = if per_page == 0 { 1 } else { total.div_ceil(per_page).max(1) };
        Self { data, total, page, per_page, last_page }
    }

    pub fn has_more_pages(&self) -> bool {
        self.page < self.last_page
    }

    /// Transforms every item, keeping the metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            last_page: self.last_page,
        }
    }
}

impl Paginated<Row> {
    /// Hydrates every row as `T`.
    pub fn hydrate<T: FromRow>(self) -> Result<Paginated<T>, Error> {
        let data = self.data.iter().map(T::from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated { data, total: self.total, page: self.page, per_page: self.per_page, last_page: self.last_page })
    }
}
