use sea_query::Condition;

use crate::{
    error::{FieldErrors, LibraryError},
    models::{asset::AssetKind, tags::TagId, user::UserId},
};

use super::{
    details::{ExtensionList, OrderBy, SortBy, Source},
    page::PageRequest,
};

/// Filter parameters exactly as they came in, usually from a query string.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub asset_type: Option<String>,
    pub source: Option<String>,
    pub tag: Option<String>,
    pub untagged: Option<String>,
    pub without_tags: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub order_by: Option<String>,
    pub extension: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub paginate_by: Option<String>,
}

/// A checked filter, ready to run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// `None` means every enabled kind.
    pub kind: Option<AssetKind>,
    /// `None` means the default view: the user's own assets plus global ones.
    pub source: Option<Source>,
    pub tag: Option<TagId>,
    /// Beats `tag`.
    pub untagged: bool,
    pub search: Option<String>,
    pub extensions: ExtensionList,
    pub sort_by: SortBy,
    pub order_by: Option<OrderBy>,
    pub page: PageRequest,
    /// `None` means the default size.
    pub page_size: Option<u32>,
}

impl FilterParams {
    /// Checks every field, reporting all the bad ones together.
    pub fn parse(&self) -> Result<FilterSpec, LibraryError> {
        let mut errors = FieldErrors::default();

        let kind = parse_field(&mut errors, "asset_type", &self.asset_type, |s| {
            s.parse::<AssetKind>().ok()
        });
        let source = parse_field(&mut errors, "source", &self.source, |s| {
            s.parse::<Source>().ok()
        });
        let tag = parse_field(&mut errors, "tag", &self.tag, |s| s.parse::<i64>().ok().map(TagId));

        let untagged = parse_field(&mut errors, "untagged", &self.untagged, parse_bool);
        let without_tags = parse_field(&mut errors, "without_tags", &self.without_tags, parse_bool);

        let sort_by = parse_field(&mut errors, "sort_by", &self.sort_by, |s| {
            s.parse::<SortBy>().ok()
        });
        let order_by = parse_field(&mut errors, "order_by", &self.order_by, |s| {
            s.parse::<OrderBy>().ok()
        });

        let limit = parse_field(&mut errors, "limit", &self.limit, |s| s.parse::<u32>().ok());
        let paginate_by = parse_field(&mut errors, "paginate_by", &self.paginate_by, |s| {
            s.parse::<u32>().ok()
        });

        let spec = FilterSpec {
            kind,
            source,
            tag,
            untagged: untagged.unwrap_or(false) || without_tags.unwrap_or(false),
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            extensions: self
                .extension
                .as_deref()
                .map(ExtensionList::parse)
                .unwrap_or_default(),
            sort_by: sort_by.unwrap_or_default(),
            order_by,
            page: PageRequest::from_raw(self.page.as_deref()),
            page_size: limit.or(paginate_by).filter(|n| *n > 0),
        };

        errors.finish(spec)
    }
}

/// Parses one optional field. Blank counts as absent. A bad value is noted
/// in `errors`.
fn parse_field<T>(
    errors: &mut FieldErrors,
    field: &str,
    raw: &Option<String>,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Option<T> {
    let raw = raw.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

    let parsed = parse(raw);
    if parsed.is_none() {
        errors.push(field, format!("`{raw}` isn't a valid choice."));
    }
    parsed
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A single restriction on which assets a listing includes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modifier {
    /// Only these kinds.
    Kinds(Vec<AssetKind>),
    /// A listing source for a user. `None` is the default view.
    Source(Option<Source>, UserId),
    /// Global, or made by the user.
    VisibleTo(UserId),
    Tag(TagId),
    Untagged,
    /// Case-insensitive substring of the name.
    Literal(String),
    /// Any of these extensions. Snippets never match.
    Extension(ExtensionList),
}

/// A modifier must become a query to be used.
///
/// All modifiers must implement this trait!
pub trait ToQuery {
    /// Converts the modifier into a condition for use in querying the
    /// database.
    fn to_query(self) -> Condition;
}
