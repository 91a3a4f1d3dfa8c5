use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Sort direction for one ordering field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One `(field, direction)` ordering term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Pagination parameters. `page` is zero-based.
///
/// Unordered paging is disallowed: offset semantics are undefined without a
/// stable order, so `order_by` must be non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub size: u64,
    pub order_by: Vec<SortSpec>,
}

impl PageRequest {
    pub fn new(page: u64, size: u64) -> Self {
        Self {
            page,
            size,
            order_by: Vec::new(),
        }
    }

    pub fn order_asc(mut self, field: impl Into<String>) -> Self {
        self.order_by.push(SortSpec::asc(field));
        self
    }

    pub fn order_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by.push(SortSpec::desc(field));
        self
    }

    /// Number of rows skipped before the window starts.
    pub fn offset(&self) -> u64 {
        self.page * self.size
    }

    /// Reject requests the paging engine cannot compile.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.size == 0 {
            return Err(DataError::InvalidPageSize { size: self.size });
        }
        if self.order_by.is_empty() {
            return Err(DataError::MissingOrderBy);
        }
        Ok(())
    }
}

/// A page of results with pagination metadata.
///
/// `total` reflects the same predicate as `items`. Both queries run on the
/// scope's single connection; see the backend's paging documentation for
/// the consistency caveat under weak isolation levels.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: &PageRequest, total: u64) -> Self {
        let total_pages = if request.size == 0 {
            0
        } else {
            total.div_ceil(request.size)
        };
        Self {
            items,
            page: request.page,
            size: request.size,
            total,
            total_pages,
        }
    }
}
