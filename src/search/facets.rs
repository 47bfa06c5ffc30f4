//! Counts that help a UI build its filter menus.

use sea_query::*;
use sea_query_binder::SqlxBinder as _;
use sqlx::SqliteConnection;

use crate::{
    database::{AssetTags, Assets, Tags},
    error::LibraryError,
    models::tags::{TagFacets, TagUsage},
};

use super::{modifiers::Modifier, query::AssetFilter};

/// Every tag carried by the filtered assets, with how many carry it.
///
/// Ordered by tag name.
pub async fn tag_usage(
    conn: &mut SqliteConnection,
    filter: &AssetFilter,
) -> Result<Vec<TagUsage>, LibraryError> {
    let (select, values) = Query::select()
        .column((Tags::Table, Tags::Id))
        .column((Tags::Table, Tags::Name))
        .expr_as(
            Func::count(Expr::col((Assets::Table, Assets::Id))),
            Alias::new("count"),
        )
        .from(Tags::Table)
        .inner_join(
            AssetTags::Table,
            Expr::col((AssetTags::Table, AssetTags::TagId)).equals((Tags::Table, Tags::Id)),
        )
        .inner_join(
            Assets::Table,
            Expr::col((Assets::Table, Assets::Id)).equals((AssetTags::Table, AssetTags::AssetId)),
        )
        .cond_where(filter.condition())
        .group_by_col((Tags::Table, Tags::Id))
        .group_by_col((Tags::Table, Tags::Name))
        .order_by((Tags::Table, Tags::Name), Order::Asc)
        .build_sqlx(SqliteQueryBuilder);

    let usage = sqlx::query_as_with::<_, TagUsage, _>(&select, values)
        .fetch_all(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Failed to count tag usage. err: {e}"))?;

    Ok(usage)
}

/// Per-tag counts plus the number of untagged assets.
pub async fn tag_facets(
    conn: &mut SqliteConnection,
    filter: AssetFilter,
) -> Result<TagFacets, LibraryError> {
    let tags = tag_usage(conn, &filter).await?;
    let untagged = filter.and(Modifier::Untagged).count(conn).await?;

    Ok(TagFacets {
        tags,
        untagged: untagged as i64,
    })
}
