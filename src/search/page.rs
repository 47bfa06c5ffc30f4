//! Splits listings into pages.

use crate::models::asset::Asset;

/// What to do with a page that doesn't exist (or isn't a number).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnInvalidPage {
    /// Serve the first page instead.
    ClampToFirst,
    /// Serve nothing.
    Empty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Pagination {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub on_invalid_page: OnInvalidPage,
}

/// The page a caller asked for, as they asked for it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PageRequest {
    #[default]
    Unspecified,
    Number(i64),
    Invalid(String),
}

impl PageRequest {
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => PageRequest::Unspecified,
            Some(s) => s
                .parse::<i64>()
                .map(PageRequest::Number)
                .unwrap_or_else(|_| PageRequest::Invalid(s.to_string())),
        }
    }
}

/// Where one page sits in a listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub meta: PageMeta,
    /// `None` when there's nothing to serve.
    pub offset: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PageMeta {
    /// 1-indexed. Whatever was asked for when the page is invalid and
    /// nothing is served (0 if it wasn't a number).
    pub page: i64,
    pub page_size: u32,
    pub total_pages: u64,
    pub total_items: u64,
}

/// One page of assets.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AssetPage {
    pub assets: Vec<Asset>,
    pub meta: PageMeta,
}

impl Pagination {
    /// The page size to use, given what was asked for. Zero means default.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(n) if n > 0 => n.min(self.max_page_size),
            _ => self.default_page_size,
        }
        .max(1)
    }

    /// Works out which slice of `total` items to serve.
    pub fn window(&self, total: u64, request: &PageRequest, requested_size: Option<u32>) -> PageWindow {
        let page_size = self.page_size(requested_size);
        let total_pages = total.div_ceil(u64::from(page_size)).max(1);

        let meta = |page: i64| PageMeta {
            page,
            page_size,
            total_pages,
            total_items: total,
        };
        let serve = |page: i64| PageWindow {
            meta: meta(page),
            offset: Some((page as u64 - 1) * u64::from(page_size)),
        };

        match request {
            PageRequest::Unspecified => serve(1),
            PageRequest::Number(n) if *n >= 1 && (*n as u64) <= total_pages => serve(*n),
            invalid => match self.on_invalid_page {
                OnInvalidPage::ClampToFirst => serve(1),
                OnInvalidPage::Empty => {
                    let page = match invalid {
                        PageRequest::Number(n) => *n,
                        _ => 0,
                    };
                    tracing::debug!("page {page} is out of range; serving nothing");
                    PageWindow {
                        meta: meta(page),
                        offset: None,
                    }
                }
            },
        }
    }
}
