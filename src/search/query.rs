use std::collections::BTreeSet;

use sea_query::*;
use sea_query_binder::SqlxBinder as _;
use sqlx::SqliteConnection;

use crate::{
    database::{AssetTags, Assets},
    error::LibraryError,
    models::{
        asset::{AssetKind, AssetRow},
        fold_case,
        user::{escape_like, UserId},
    },
};

use super::{
    details::Source,
    modifiers::{FilterSpec, Modifier, ToQuery},
    sort::Ordering,
};

fn col(column: Assets) -> Expr {
    Expr::col((Assets::Table, column))
}

impl ToQuery for Modifier {
    #[tracing::instrument]
    fn to_query(self) -> Condition {
        match self {
            Modifier::Kinds(kinds) => {
                tracing::debug!("Narrowing to kinds: {kinds:?}");
                Cond::all().add(col(Assets::Kind).is_in(kinds.iter().map(|k| k.as_str())))
            }

            Modifier::Source(source, user) => {
                let mine = col(Assets::CreatorId).eq(user.0);
                match source {
                    Some(Source::Personal) => Cond::all()
                        .add(mine)
                        .add(col(Assets::IsGlobal).eq(false))
                        .add(col(Assets::SharedById).is_null()),
                    Some(Source::Global) => Cond::all().add(col(Assets::IsGlobal).eq(true)),
                    Some(Source::Inbox) => Cond::all()
                        .add(mine)
                        .add(col(Assets::IsGlobal).eq(false))
                        .add(col(Assets::SharedById).is_not_null()),
                    None => Cond::all()
                        .add(
                            Cond::any()
                                .add(col(Assets::IsGlobal).eq(true))
                                .add(mine),
                        )
                        .add(col(Assets::SharedById).is_null()),
                }
            }

            Modifier::VisibleTo(user) => Cond::any()
                .add(col(Assets::IsGlobal).eq(true))
                .add(col(Assets::CreatorId).eq(user.0)),

            Modifier::Tag(tag) => {
                tracing::debug!("Looking for assets tagged `{tag}`");
                Cond::all().add(
                    col(Assets::Id).in_subquery(
                        Query::select()
                            .column(AssetTags::AssetId)
                            .from(AssetTags::Table)
                            .and_where(Expr::col(AssetTags::TagId).eq(tag.0))
                            .to_owned(),
                    ),
                )
            }

            Modifier::Untagged => Cond::all().add(
                col(Assets::Id).not_in_subquery(
                    Query::select()
                        .column(AssetTags::AssetId)
                        .from(AssetTags::Table)
                        .to_owned(),
                ),
            ),

            Modifier::Literal(lit) => {
                tracing::debug!("Checking for literal: `{lit}`");
                let pattern = format!("%{}%", escape_like(&fold_case(&lit)));
                Cond::all()
                    .add(col(Assets::NameFolded).like(LikeExpr::new(pattern).escape('\\')))
            }

            Modifier::Extension(extensions) => {
                if extensions.is_empty() {
                    return Cond::all();
                }

                tracing::debug!("Checking extensions: {extensions:?}");
                let upper = SimpleExpr::FunctionCall(Func::upper(col(Assets::Extension)));
                Cond::all().add(
                    Expr::expr(upper).is_in(extensions.as_slice().iter().map(String::as_str)),
                )
            }
        }
    }
}

/// The conditions for one listing, ready to count, page or aggregate.
#[derive(Clone, Debug)]
pub struct AssetFilter {
    cond: Condition,
}

impl AssetFilter {
    pub fn new(modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        let cond = modifiers
            .into_iter()
            .fold(Cond::all(), |cond, modifier| cond.add(modifier.to_query()));
        Self { cond }
    }

    /// The filter a [`FilterSpec`] describes, over the given kinds.
    pub fn from_spec(spec: &FilterSpec, kinds: &[AssetKind], user: UserId) -> Self {
        let mut modifiers = vec![
            Modifier::Kinds(kinds.to_vec()),
            Modifier::Source(spec.source, user),
        ];

        if spec.untagged {
            modifiers.push(Modifier::Untagged);
        } else if let Some(tag) = spec.tag {
            modifiers.push(Modifier::Tag(tag));
        }

        if let Some(search) = &spec.search {
            modifiers.push(Modifier::Literal(search.clone()));
        }
        if !spec.extensions.is_empty() {
            modifiers.push(Modifier::Extension(spec.extensions.clone()));
        }

        Self::new(modifiers)
    }

    /// Adds another restriction.
    pub fn and(mut self, modifier: Modifier) -> Self {
        self.cond = self.cond.add(modifier.to_query());
        self
    }

    pub fn condition(&self) -> Condition {
        self.cond.clone()
    }

    /// `SELECT * FROM assets WHERE ...`, unordered.
    pub fn select(&self) -> SelectStatement {
        Query::select()
            .column(Asterisk)
            .from(Assets::Table)
            .cond_where(self.cond.clone())
            .to_owned()
    }

    pub async fn count(&self, conn: &mut SqliteConnection) -> Result<u64, LibraryError> {
        let (select, values) = Query::select()
            .expr(Func::count(col(Assets::Id)))
            .from(Assets::Table)
            .cond_where(self.cond.clone())
            .build_sqlx(SqliteQueryBuilder);

        let count = sqlx::query_scalar_with::<_, i64, _>(&select, values)
            .fetch_one(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("Failed to count assets. err: {e}"))?;

        Ok(count.max(0) as u64)
    }

    /// One ordered slice of the matching rows.
    pub async fn fetch(
        &self,
        conn: &mut SqliteConnection,
        ordering: &Ordering,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AssetRow>, LibraryError> {
        let mut select = self.select();
        ordering.apply(&mut select);
        let (select, values) = select.limit(limit).offset(offset).build_sqlx(SqliteQueryBuilder);

        tracing::debug!("fetching assets: {select}");
        let rows = sqlx::query_as_with::<_, AssetRow, _>(&select, values)
            .fetch_all(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("Failed to list assets. err: {e}"))?;

        Ok(rows)
    }

    /// Every distinct extension among the matching rows, sorted.
    pub async fn extensions(&self, conn: &mut SqliteConnection) -> Result<Vec<String>, LibraryError> {
        let (select, values) = Query::select()
            .distinct()
            .column((Assets::Table, Assets::Extension))
            .from(Assets::Table)
            .cond_where(self.cond.clone())
            .and_where(col(Assets::Extension).is_not_null())
            .build_sqlx(SqliteQueryBuilder);

        let found = sqlx::query_scalar_with::<_, String, _>(&select, values)
            .fetch_all(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("Failed to list extensions. err: {e}"))?;

        Ok(found
            .into_iter()
            .map(|e| e.to_uppercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }
}
