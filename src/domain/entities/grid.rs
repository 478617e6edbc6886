#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub term: String,
}

/// Which rows a grid view shows, by validation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFilter {
    #[default]
    All,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridQuery {
    pub page: usize,
    pub page_size: usize,
    pub status: RowFilter,
    pub global_search: String,
    pub column_filter: Option<ColumnFilter>,
    pub sort: Option<SortSpec>,
}

impl Default for GridQuery {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 50,
            status: RowFilter::All,
            global_search: String::new(),
            column_filter: None,
            sort: None,
        }
    }
}

/// A page of the staging grid expressed as original row indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageView {
    pub row_indices: Vec<usize>,
    pub total_matching: usize,
    /// Page actually returned, clamped to the last page.
    pub page: usize,
    pub page_count: usize,
}
