// src/paging.rs
//! In-memory sorting and pagination of response rows.
use crate::error::{AppError, UnknownSortProperty};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Page index meaning "everything in one page".
pub const ALL_PAGES: i64 = -1;

pub const DEFAULT_PAGE: i64 = 0;
pub const DEFAULT_SIZE: usize = 5;

/// Comparator allow-list for one response type, keyed by wire field name.
pub type SortFields<T> = &'static [(&'static str, fn(&T, &T) -> Ordering)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sort(pub Vec<SortOrder>);

impl Sort {
    /// Single key sort.
    pub fn by(property: &str, descending: bool) -> Self {
        Sort(vec![SortOrder {
            property: property.to_string(),
            direction: if descending {
                Direction::Desc
            } else {
                Direction::Asc
            },
        }])
    }

    /// Parses `sortBy` values such as `latestPrice,stockSymbol:asc`. Keys
    /// without a suffix take the `descending` flag.
    pub fn parse(sort_by: &str, descending: bool) -> Self {
        let default = if descending {
            Direction::Desc
        } else {
            Direction::Asc
        };
        let orders = sort_by
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| match key.rsplit_once(':') {
                Some((property, dir)) if dir.eq_ignore_ascii_case("asc") => SortOrder {
                    property: property.to_string(),
                    direction: Direction::Asc,
                },
                Some((property, dir)) if dir.eq_ignore_ascii_case("desc") => SortOrder {
                    property: property.to_string(),
                    direction: Direction::Desc,
                },
                _ => SortOrder {
                    property: key.to_string(),
                    direction: default,
                },
            })
            .collect();
        Sort(orders)
    }

    pub fn is_unsorted(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: i64,
    pub size: usize,
    pub sort: Sort,
}

impl PageRequest {
    pub fn new(page: i64, size: usize, sort: Sort) -> Self {
        PageRequest { page, size, sort }
    }

    pub fn is_all(&self) -> bool {
        self.page < 0
    }
}

/// `page`, `size`, `sortBy`, `descending` query parameters. Missing values
/// fall back to the endpoint's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<usize>,
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
}

impl PageParams {
    pub fn into_request(
        self,
        default_sort: &str,
        default_descending: bool,
    ) -> Result<PageRequest, AppError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        let size = self.size.unwrap_or(DEFAULT_SIZE);
        if page >= 0 && size == 0 {
            return Err(AppError::BadRequest(
                "Page size must not be less than one".to_string(),
            ));
        }
        let sort_by = self.sort_by.as_deref().unwrap_or(default_sort);
        let sort = Sort::parse(sort_by, self.descending.unwrap_or(default_descending));
        Ok(PageRequest::new(page, size, sort))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
    pub sort: Sort,
}

/// Stable multi-key sort. Every property is checked against the allow-list
/// before the slice is touched.
pub fn sort_items<T>(
    items: &mut [T],
    sort: &Sort,
    fields: SortFields<T>,
) -> Result<(), UnknownSortProperty> {
    let comparators = sort
        .0
        .iter()
        .map(|order| {
            fields
                .iter()
                .find(|(name, _)| *name == order.property)
                .map(|(_, cmp)| (*cmp, order.direction))
                .ok_or_else(|| UnknownSortProperty(order.property.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if comparators.is_empty() {
        return Ok(());
    }
    items.sort_by(|a, b| {
        for (cmp, direction) in &comparators {
            let ordering = match direction {
                Direction::Asc => cmp(a, b),
                Direction::Desc => cmp(b, a),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Slices an already sorted list. A start past the end yields an empty page.
pub fn paginate<T>(items: Vec<T>, request: &PageRequest) -> Page<T> {
    let total = items.len();
    if request.is_all() {
        return Page {
            content: items,
            page: ALL_PAGES,
            size: total.max(1),
            total_elements: total,
            total_pages: 1,
            sort: request.sort.clone(),
        };
    }

    let size = request.size.max(1);
    let total_pages = (total + size - 1) / size;
    let start = usize::try_from(request.page)
        .ok()
        .and_then(|page| page.checked_mul(size))
        .unwrap_or(usize::MAX);
    let content = if start > total {
        Vec::new()
    } else {
        let end = start.saturating_add(size).min(total);
        items.into_iter().skip(start).take(end - start).collect()
    };
    Page {
        content,
        page: request.page,
        size,
        total_elements: total,
        total_pages,
        sort: request.sort.clone(),
    }
}

/// Sorts then paginates.
pub fn sort_and_page<T>(
    mut items: Vec<T>,
    request: &PageRequest,
    fields: SortFields<T>,
) -> Result<Page<T>, UnknownSortProperty> {
    sort_items(&mut items, &request.sort, fields)?;
    Ok(paginate(items, request))
}
