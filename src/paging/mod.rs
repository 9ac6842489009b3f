//! Pagination over status-grouped listings.
//!
//! Groups keep their order; a page is a window over the concatenation of all
//! groups, re-split by status so callers can render section headers.

use serde::Serialize;

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount<K> {
    pub status: K,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Group<K, T> {
    pub status: K,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupedPage<K, T> {
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
    pub counts: Vec<StatusCount<K>>,
    pub groups: Vec<Group<K, T>>,
}

impl<K, T> GroupedPage<K, T> {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Clamp raw query values to a valid (page, per_page) pair.
pub fn normalize(page: Option<usize>, per_page: Option<usize>) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    (page, per_page)
}

/// Cut `groups` to the requested page. Pages past the end are empty.
pub fn paginate_groups<K: Copy + PartialEq, T>(
    groups: Vec<(K, Vec<T>)>,
    page: Option<usize>,
    per_page: Option<usize>,
) -> GroupedPage<K, T> {
    let (page, per_page) = normalize(page, per_page);

    let counts: Vec<StatusCount<K>> = groups
        .iter()
        .map(|(status, items)| StatusCount {
            status: *status,
            count: items.len(),
        })
        .collect();
    let total: usize = counts.iter().map(|c| c.count).sum();
    let total_pages = total.div_ceil(per_page);

    let skip = (page - 1).saturating_mul(per_page);
    let mut out: Vec<Group<K, T>> = Vec::new();
    let flattened = groups
        .into_iter()
        .flat_map(|(status, items)| items.into_iter().map(move |item| (status, item)))
        .skip(skip)
        .take(per_page);

    for (status, item) in flattened {
        match out.last_mut() {
            Some(group) if group.status == status => group.items.push(item),
            _ => out.push(Group {
                status,
                items: vec![item],
            }),
        }
    }

    GroupedPage {
        page,
        per_page,
        total,
        total_pages,
        counts,
        groups: out,
    }
}
