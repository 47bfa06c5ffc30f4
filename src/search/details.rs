//! The small typed pieces a filter is made of.

use core::str::FromStr;

/// Which part of the library a listing shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// The user's own assets, not counting the inbox.
    Personal,
    /// Assets everyone can see.
    Global,
    /// Assets shared with the user that they haven't accepted yet.
    Inbox,
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "personal" => Ok(Source::Personal),
            "global" => Ok(Source::Global),
            "inbox" => Ok(Source::Inbox),
            other => Err(other.to_string()),
        }
    }
}

/// The preset orderings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortBy {
    /// Case-insensitive, A first.
    #[default]
    Name,
    NewestFirst,
    OldestFirst,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortBy::Name),
            "newest_first" | "new_first" => Ok(SortBy::NewestFirst),
            "oldest_first" | "old_first" => Ok(SortBy::OldestFirst),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderField {
    /// Case-insensitive.
    Name,
    /// The modification date.
    Edited,
}

/// An explicit ordering, like `-edited`. Beats [`SortBy`] when given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: OrderField,
    pub descending: bool,
}

impl FromStr for OrderBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, field) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let field = match field.to_lowercase().as_str() {
            "name" | "asset_name" => OrderField::Name,
            "edited" => OrderField::Edited,
            _ => return Err(s.to_string()),
        };

        Ok(OrderBy { field, descending })
    }
}

/// Extensions to filter by, uppercased. Empty means "don't filter".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ExtensionList(Vec<String>);

impl ExtensionList {
    /// Reads `"jpeg, PNG,,"` as `[JPEG, PNG]`.
    pub fn parse(input: &str) -> Self {
        let mut list: Vec<String> = Vec::new();
        for ext in input
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_uppercase())
            .filter(|e| !e.is_empty())
        {
            if !list.contains(&ext) {
                list.push(ext);
            }
        }
        Self(list)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_aliases() {
        assert_eq!("new_first".parse::<SortBy>(), Ok(SortBy::NewestFirst));
        assert_eq!("OLDEST_FIRST".parse::<SortBy>(), Ok(SortBy::OldestFirst));
        assert!("random".parse::<SortBy>().is_err());
    }

    #[test]
    fn order_by_prefix() {
        assert_eq!(
            "-edited".parse::<OrderBy>(),
            Ok(OrderBy {
                field: OrderField::Edited,
                descending: true
            })
        );
        assert_eq!(
            "asset_name".parse::<OrderBy>(),
            Ok(OrderBy {
                field: OrderField::Name,
                descending: false
            })
        );
        assert!("-size".parse::<OrderBy>().is_err());
    }

    #[test]
    fn extension_lists() {
        assert_eq!(
            ExtensionList::parse(" xxx, jpeg ,,.png,JPEG").as_slice(),
            ["XXX", "JPEG", "PNG"]
        );
        assert!(ExtensionList::parse(" , ").is_empty());
    }
}
