//! Upstream data service
//!
//! The origin is queried by table name, column projection, ordering and row
//! limit, and answers with the matching rows as a JSON array. The cache does
//! not interpret the rows.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_str(self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Ordering applied to a table query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub field: &'static str,
    pub direction: SortDirection,
}

/// "Named table -> ordered rows" request against the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableQuery {
    pub table: &'static str,
    /// Column projection, e.g. `"id, titulo, capa"` or `"*"`
    pub columns: &'static str,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl TableQuery {
    pub const fn new(table: &'static str, columns: &'static str) -> Self {
        Self {
            table,
            columns,
            order: None,
            limit: None,
        }
    }

    pub const fn order_by(mut self, field: &'static str, direction: SortDirection) -> Self {
        self.order = Some(Order { field, direction });
        self
    }

    pub const fn limit(mut self, rows: usize) -> Self {
        self.limit = Some(rows);
        self
    }
}

impl fmt::Display for TableQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table, self.columns)?;
        if let Some(order) = self.order {
            write!(f, " order by {} {}", order.field, order.direction.as_str())?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {limit}")?;
        }
        Ok(())
    }
}

/// Trait for fetching datasets from the origin.
///
/// Implementations can use HTTP, a database driver, or anything else that
/// answers table queries.
#[async_trait]
pub trait Origin: Send + Sync + 'static {
    async fn fetch(&self, query: &TableQuery) -> Result<Value, BoxError>;
}

/// Origin speaking the PostgREST dialect used by hosted Postgres services.
#[derive(Debug, Clone)]
pub struct RestOrigin {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestOrigin {
    /// * `base_url` - Project URL, e.g. `https://xyz.example.co`
    /// * `api_key` - Anonymous key sent as `apikey` and bearer token
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }
}

/// Query-string parameters for a table query.
fn query_params(query: &TableQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", query.columns.replace(' ', ""))];
    if let Some(order) = query.order {
        params.push((
            "order",
            format!("{}.{}", order.field, order.direction.as_str()),
        ));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

#[async_trait]
impl Origin for RestOrigin {
    async fn fetch(&self, query: &TableQuery) -> Result<Value, BoxError> {
        let rows = self
            .client
            .get(self.table_url(query.table))
            .query(&query_params(query))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(rows)
    }
}
