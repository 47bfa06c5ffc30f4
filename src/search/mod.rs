//! Search utilities: turning raw filter parameters into listings.
//!
//! Parsing ([`modifiers::FilterParams::parse`]) and running
//! ([`query::AssetFilter`]) are separate steps, so bad input is reported
//! before anything touches the database.

pub mod details;
pub mod facets;
pub mod modifiers;
pub mod page;
pub mod query;
pub mod sort;

pub use details::{ExtensionList, OrderBy, OrderField, SortBy, Source};
pub use modifiers::{FilterParams, FilterSpec, Modifier, ToQuery};
pub use page::{AssetPage, OnInvalidPage, PageMeta, PageRequest, Pagination};
pub use query::AssetFilter;
pub use sort::Ordering;
