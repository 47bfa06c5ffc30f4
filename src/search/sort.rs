//! Helps to sort assets.

use sea_query::*;

use crate::database::Assets;

use super::details::{OrderBy, OrderField, SortBy};

/// The ordering a listing ends up with.
///
/// Every ordering ends with the id, so pages never overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ordering {
    field: SortField,
    descending: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SortField {
    FoldedName,
    Created,
    Modified,
}

impl Ordering {
    /// `order_by` wins over `sort_by` when it's given.
    pub fn new(sort_by: SortBy, order_by: Option<OrderBy>) -> Self {
        if let Some(order) = order_by {
            let field = match order.field {
                OrderField::Name => SortField::FoldedName,
                OrderField::Edited => SortField::Modified,
            };
            return Self {
                field,
                descending: order.descending,
            };
        }

        match sort_by {
            SortBy::Name => Self {
                field: SortField::FoldedName,
                descending: false,
            },
            SortBy::NewestFirst => Self {
                field: SortField::Created,
                descending: true,
            },
            SortBy::OldestFirst => Self {
                field: SortField::Created,
                descending: false,
            },
        }
    }

    pub fn apply(&self, select: &mut SelectStatement) {
        let order = if self.descending {
            Order::Desc
        } else {
            Order::Asc
        };

        let primary: SimpleExpr = match self.field {
            SortField::FoldedName => Expr::col((Assets::Table, Assets::NameFolded)).into(),
            SortField::Created => Expr::col((Assets::Table, Assets::DateCreated)).into(),
            SortField::Modified => Expr::col((Assets::Table, Assets::DateModified)).into(),
        };

        select
            .order_by_expr(primary, order.clone())
            .order_by((Assets::Table, Assets::Id), order);
    }
}
