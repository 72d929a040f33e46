//! Data table component types.
//!
//! A [`DataTableConfig`] describes a table's columns and filter controls;
//! [`TableState`] carries the current sort and page so templates can build
//! header and pager links that keep the active filters.

use pharmacy_core::{OrderStatus, Page, UserRole};

use crate::db::SortDirection;
use crate::models::catalog::StockState;

/// Column definition for a data table.
#[derive(Debug, Clone)]
pub struct TableColumn {
    /// Sort key sent as `?sort=`.
    pub key: &'static str,
    /// Display label for the column header.
    pub label: &'static str,
    pub sortable: bool,
    /// Right-align numeric columns.
    pub numeric: bool,
}

impl TableColumn {
    /// Create a new sortable column.
    #[must_use]
    pub const fn sortable(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            sortable: true,
            numeric: false,
        }
    }

    /// Create a new non-sortable column.
    #[must_use]
    pub const fn new(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            sortable: false,
            numeric: false,
        }
    }

    #[must_use]
    pub const fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }
}

/// Filter type for data tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Single-select dropdown.
    Select,
    /// Multi-select checkboxes (repeated query key).
    MultiSelect,
    /// `from`/`to` date inputs.
    DateRange,
}

/// Option for select/multiselect filters.
#[derive(Debug, Clone)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl FilterOption {
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected: false,
        }
    }
}

/// Filter definition for a data table.
#[derive(Debug, Clone)]
pub struct TableFilter {
    /// Query parameter key.
    pub key: &'static str,
    pub label: &'static str,
    pub filter_type: FilterType,
    pub options: Vec<FilterOption>,
    /// Current `from` value (date range only).
    pub from: Option<String>,
    /// Current `to` value (date range only).
    pub to: Option<String>,
}

impl TableFilter {
    #[must_use]
    pub const fn select(key: &'static str, label: &'static str, options: Vec<FilterOption>) -> Self {
        Self {
            key,
            label,
            filter_type: FilterType::Select,
            options,
            from: None,
            to: None,
        }
    }

    #[must_use]
    pub const fn multi_select(
        key: &'static str,
        label: &'static str,
        options: Vec<FilterOption>,
    ) -> Self {
        Self {
            key,
            label,
            filter_type: FilterType::MultiSelect,
            options,
            from: None,
            to: None,
        }
    }

    #[must_use]
    pub const fn date_range(label: &'static str) -> Self {
        Self {
            key: "date",
            label,
            filter_type: FilterType::DateRange,
            options: vec![],
            from: None,
            to: None,
        }
    }

    #[must_use]
    pub const fn is_select(&self) -> bool {
        matches!(self.filter_type, FilterType::Select)
    }

    #[must_use]
    pub const fn is_multi_select(&self) -> bool {
        matches!(self.filter_type, FilterType::MultiSelect)
    }

    #[must_use]
    pub const fn is_date_range(&self) -> bool {
        matches!(self.filter_type, FilterType::DateRange)
    }
}

/// Configuration for a data table.
#[derive(Debug, Clone)]
pub struct DataTableConfig {
    pub table_id: &'static str,
    pub columns: Vec<TableColumn>,
    pub filters: Vec<TableFilter>,
    /// Value of the `q` search box.
    pub search_value: String,
    pub search_placeholder: &'static str,
    pub empty_title: &'static str,
    pub empty_description: &'static str,
}

impl DataTableConfig {
    #[must_use]
    pub const fn new(table_id: &'static str) -> Self {
        Self {
            table_id,
            columns: vec![],
            filters: vec![],
            search_value: String::new(),
            search_placeholder: "Search...",
            empty_title: "Nothing here yet",
            empty_description: "Try adjusting your search or filters.",
        }
    }

    #[must_use]
    pub fn column(mut self, column: TableColumn) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: TableFilter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub const fn search_placeholder(mut self, placeholder: &'static str) -> Self {
        self.search_placeholder = placeholder;
        self
    }

    #[must_use]
    pub const fn empty_state(mut self, title: &'static str, description: &'static str) -> Self {
        self.empty_title = title;
        self.empty_description = description;
        self
    }

    /// Mark the options, dates and search text present in the query string.
    #[must_use]
    pub fn with_values(mut self, pairs: &[(String, String)]) -> Self {
        for (key, value) in pairs {
            if key == "q" {
                value.trim().clone_into(&mut self.search_value);
                continue;
            }
            for filter in &mut self.filters {
                match filter.filter_type {
                    FilterType::DateRange if key == "from" => filter.from = Some(value.clone()),
                    FilterType::DateRange if key == "to" => filter.to = Some(value.clone()),
                    FilterType::Select | FilterType::MultiSelect if key == filter.key => {
                        for option in &mut filter.options {
                            if option.value == *value {
                                option.selected = true;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        self
    }

    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }
}

/// Current sort and page of a rendered table.
#[derive(Debug, Clone)]
pub struct TableState {
    /// Page path, e.g. `/orders`.
    pub base_path: &'static str,
    /// Active filters as a query string, without sort or page.
    pub filter_query: String,
    pub sort: &'static str,
    pub direction: SortDirection,
    pub page: u32,
    pub page_count: u32,
    pub total: i64,
    pub first_row: i64,
    pub last_row: i64,
}

impl TableState {
    #[must_use]
    pub fn new<T>(
        base_path: &'static str,
        filter_query: String,
        sort: &'static str,
        direction: SortDirection,
        page: &Page<T>,
    ) -> Self {
        Self {
            base_path,
            filter_query,
            sort,
            direction,
            page: page.page(),
            page_count: page.page_count(),
            total: page.total,
            first_row: page.first_row(),
            last_row: page.last_row(),
        }
    }

    fn href(&self, sort: &str, direction: SortDirection, page: u32) -> String {
        let mut query = self.filter_query.clone();
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("sort={sort}&dir={}", direction.as_str()));
        if page > 1 {
            query.push_str(&format!("&page={page}"));
        }
        format!("{}?{query}", self.base_path)
    }

    /// Header link: flips direction on the active column, else starts
    /// descending. Always returns to page 1.
    #[must_use]
    pub fn sort_href(&self, key: &str) -> String {
        let direction = if key == self.sort {
            self.direction.flipped()
        } else {
            SortDirection::Desc
        };
        self.href(key, direction, 1)
    }

    /// Arrow shown next to the active column.
    #[must_use]
    pub fn sort_indicator(&self, key: &str) -> &'static str {
        match (key == self.sort, self.direction) {
            (false, _) => "",
            (true, SortDirection::Asc) => "↑",
            (true, SortDirection::Desc) => "↓",
        }
    }

    #[must_use]
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }

    #[must_use]
    pub fn prev_href(&self) -> String {
        self.href(self.sort, self.direction, self.page.saturating_sub(1).max(1))
    }

    #[must_use]
    pub fn next_href(&self) -> String {
        self.href(self.sort, self.direction, self.page.saturating_add(1))
    }
}

/// Build the orders table configuration.
#[must_use]
pub fn orders_table_config() -> DataTableConfig {
    DataTableConfig::new("orders")
        .column(TableColumn::new("id", "Order"))
        .column(TableColumn::sortable("customer", "Customer"))
        .column(TableColumn::sortable("status", "Status"))
        .column(TableColumn::new("items", "Items").numeric())
        .column(TableColumn::sortable("total", "Total").numeric())
        .column(TableColumn::sortable("created_at", "Placed"))
        .filter(TableFilter::multi_select(
            "status",
            "Status",
            OrderStatus::ALL
                .iter()
                .map(|s| FilterOption::new(s.as_str(), s.label()))
                .collect(),
        ))
        .filter(TableFilter::date_range("Placed"))
        .search_placeholder("Search by order #, customer or email...")
        .empty_state("No orders found", "Try adjusting your search or filters.")
}

/// Build the products table configuration.
#[must_use]
pub fn products_table_config(
    categories: Vec<FilterOption>,
    manufacturers: Vec<FilterOption>,
) -> DataTableConfig {
    DataTableConfig::new("products")
        .column(TableColumn::sortable("name", "Product"))
        .column(TableColumn::new("category", "Category"))
        .column(TableColumn::new("manufacturer", "Manufacturer"))
        .column(TableColumn::sortable("price", "Price").numeric())
        .column(TableColumn::sortable("stock", "Stock").numeric())
        .column(TableColumn::sortable("created_at", "Created"))
        .filter(TableFilter::select("category", "Category", categories))
        .filter(TableFilter::select("manufacturer", "Manufacturer", manufacturers))
        .filter(TableFilter::select(
            "stock",
            "Stock",
            [StockState::InStock, StockState::LowStock, StockState::OutOfStock]
                .iter()
                .map(|s| FilterOption::new(s.as_str(), s.label()))
                .collect(),
        ))
        .filter(TableFilter::select(
            "archived",
            "Visibility",
            vec![
                FilterOption::new("false", "Active"),
                FilterOption::new("true", "Archived"),
            ],
        ))
        .search_placeholder("Search by name or SKU...")
        .empty_state("No products found", "Try adjusting your search or filters.")
}

/// Build the users table configuration.
#[must_use]
pub fn users_table_config() -> DataTableConfig {
    DataTableConfig::new("users")
        .column(TableColumn::new("name", "Name"))
        .column(TableColumn::new("role", "Role"))
        .column(TableColumn::new("orders", "Orders").numeric())
        .column(TableColumn::new("created_at", "Joined"))
        .filter(TableFilter::select(
            "role",
            "Role",
            [UserRole::Admin, UserRole::User]
                .iter()
                .map(|r| FilterOption::new(r.as_str(), r.label()))
                .collect(),
        ))
        .search_placeholder("Search by name or email...")
        .empty_state("No users found", "Try a different search.")
}

/// Build the discounts table configuration.
#[must_use]
pub fn discounts_table_config() -> DataTableConfig {
    DataTableConfig::new("discounts")
        .column(TableColumn::new("code", "Code"))
        .column(TableColumn::new("value", "Value"))
        .column(TableColumn::new("usage", "Usage").numeric())
        .column(TableColumn::new("window", "Active window"))
        .column(TableColumn::new("status", "Status"))
        .filter(TableFilter::select(
            "active",
            "Status",
            vec![
                FilterOption::new("true", "Active"),
                FilterOption::new("false", "Inactive"),
            ],
        ))
        .search_placeholder("Search codes...")
        .empty_state("No discount codes", "Create one to get started.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmacy_core::PageRequest;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_with_values_marks_selected_options() {
        let config = orders_table_config().with_values(&pairs(&[
            ("q", " jane "),
            ("status", "pending"),
            ("status", "shipped"),
            ("from", "2026-03-01"),
        ]));

        assert_eq!(config.search_value, "jane");
        let status = &config.filters[0];
        let selected: Vec<_> = status
            .options
            .iter()
            .filter(|o| o.selected)
            .map(|o| o.value.as_str())
            .collect();
        assert_eq!(selected, ["pending", "shipped"]);
        assert_eq!(config.filters[1].from.as_deref(), Some("2026-03-01"));
        assert_eq!(config.filters[1].to, None);
    }

    #[test]
    fn test_sort_href_flips_active_column() {
        let page: Page<()> = Page::new(vec![], 45, PageRequest::new(Some(2), Some(20)));
        let state = TableState::new(
            "/orders",
            "status=pending".to_string(),
            "total",
            SortDirection::Desc,
            &page,
        );

        assert_eq!(state.sort_href("total"), "/orders?status=pending&sort=total&dir=asc");
        assert_eq!(
            state.sort_href("customer"),
            "/orders?status=pending&sort=customer&dir=desc"
        );
        assert_eq!(state.sort_indicator("total"), "↓");
        assert_eq!(state.sort_indicator("status"), "");
    }

    #[test]
    fn test_pager_links_keep_filters_and_sort() {
        let page: Page<()> = Page::new(vec![], 45, PageRequest::new(Some(2), Some(20)));
        let state = TableState::new("/orders", String::new(), "created_at", SortDirection::Asc, &page);

        assert!(state.has_prev());
        assert!(state.has_next());
        assert_eq!(state.prev_href(), "/orders?sort=created_at&dir=asc");
        assert_eq!(state.next_href(), "/orders?sort=created_at&dir=asc&page=3");
    }
}
