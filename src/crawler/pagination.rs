//! Pagination planner
//!
//! Decides, from the counts a listing page reports, which further pages of the
//! same listing to request. Two page-count arithmetics are supported and the
//! active one is chosen by site configuration:
//!
//! | Policy | Next pages |
//! |--------|------------|
//! | Counted total | page + 1 while `total > page_size` and the page came back full |
//! | Derived page count | pages 2..=ceil(total / observed), all planned from page 1 |

use crate::config::PaginationConfig;
use crate::crawler::extract::PageCounts;
use crate::crawler::request::{Label, Request, UserData};
use crate::url::with_query_param;

/// Highest page number planned for one derived listing
pub const MAX_DERIVED_PAGES: u32 = 10_000;

/// Page-count arithmetic for one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationPolicy {
    /// Each API response reports the listing `total` and this page's `count`
    CountedTotal { page_size: u32, page_param: String },

    /// The first HTML page reports a listing-wide total; page URLs are synthesized
    DerivedPageCount { page_url_template: String },
}

impl From<&PaginationConfig> for PaginationPolicy {
    fn from(config: &PaginationConfig) -> Self {
        match config {
            PaginationConfig::CountedTotal {
                page_size,
                page_param,
            } => Self::CountedTotal {
                page_size: *page_size,
                page_param: page_param.clone(),
            },
            PaginationConfig::DerivedPageCount { page_url_template } => Self::DerivedPageCount {
                page_url_template: page_url_template.clone(),
            },
        }
    }
}

impl PaginationPolicy {
    /// Label the follow-up pages are dispatched under, given the current request
    pub fn follow_up_label(&self, current: Label) -> Label {
        match self {
            Self::CountedTotal { .. } => current,
            Self::DerivedPageCount { .. } => Label::Page,
        }
    }

    /// Plans the follow-up page requests for a processed listing page
    ///
    /// # Arguments
    ///
    /// * `counts` - Observed and reported item counts from the page
    /// * `current` - The request that fetched the page
    ///
    /// # Returns
    ///
    /// The requests to enqueue, possibly empty. Degenerate counts never fail:
    /// they produce no pages and a warning.
    pub fn plan_next_pages(&self, counts: &PageCounts, current: &Request) -> Vec<Request> {
        match self {
            Self::CountedTotal {
                page_size,
                page_param,
            } => plan_counted_total(counts, current, *page_size, page_param),
            Self::DerivedPageCount { page_url_template } => {
                plan_derived_page_count(counts, current, page_url_template)
            }
        }
    }
}

fn plan_counted_total(
    counts: &PageCounts,
    current: &Request,
    default_page_size: u32,
    page_param: &str,
) -> Vec<Request> {
    let data = current.user_data();
    let page = data.page.unwrap_or(0);
    let page_size = u64::from(data.page_size.unwrap_or(default_page_size));

    if !(counts.reported_total > page_size && counts.observed == page_size) {
        return Vec::new();
    }

    let next_page = page + 1;
    let url = match with_query_param(current.url(), page_param, &next_page.to_string()) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Cannot build next page URL from {}: {}", current.url(), e);
            return Vec::new();
        }
    };

    let mut next = Request::new(url.as_str(), current.label()).with_user_data(UserData {
        page: Some(next_page),
        page_size: Some(page_size as u32),
        category_path: data.category_path.clone(),
    });
    for (name, value) in current.headers() {
        next = next.with_header(name.as_str(), value.as_str());
    }

    vec![next]
}

fn plan_derived_page_count(counts: &PageCounts, current: &Request, template: &str) -> Vec<Request> {
    // Later pages were already planned from page 1
    if current.user_data().page.is_some_and(|page| page > 1) {
        return Vec::new();
    }

    if counts.observed == 0 {
        tracing::warn!(
            "{} - listing reports {} items but page shows none, not paginating",
            current.url(),
            counts.reported_total
        );
        return Vec::new();
    }

    if counts.reported_total <= counts.observed {
        return Vec::new();
    }

    let Some(category_id) = counts.category_id.as_deref() else {
        tracing::warn!(
            "{} - no category id found, cannot build page URLs",
            current.url()
        );
        return Vec::new();
    };

    let pages_needed = counts.reported_total.div_ceil(counts.observed);
    tracing::debug!(
        "{} - {} items at {} per page, {} pages",
        current.url(),
        counts.reported_total,
        counts.observed,
        pages_needed
    );

    let last_page = match u32::try_from(pages_needed) {
        Ok(pages) if pages <= MAX_DERIVED_PAGES => pages,
        _ => {
            tracing::warn!(
                "{} - listing needs {} pages, planning only the first {}",
                current.url(),
                pages_needed,
                MAX_DERIVED_PAGES
            );
            MAX_DERIVED_PAGES
        }
    };

    (2..=last_page)
        .map(|page| {
            let url = template
                .replace("{category}", category_id)
                .replace("{page}", &page.to_string());
            Request::new(url, Label::Page).with_user_data(UserData {
                page: Some(page),
                page_size: None,
                category_path: current.user_data().category_path.clone(),
            })
        })
        .collect()
}
