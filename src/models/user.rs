//! Users, as mirrored from whatever handles authentication.

use sea_query::*;
use sea_query_binder::SqlxBinder as _;
use sqlx::SqliteConnection;

use crate::{database::Users, error::LibraryError, models::fold_case};

/// How many matches a user search returns at most.
pub const USER_SEARCH_LIMIT: usize = 10;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    /// `First Last (email)`, or just the email when there's no name.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();

        if full.is_empty() {
            self.email.clone()
        } else {
            format!("{full} ({})", self.email)
        }
    }

    /// Case-insensitive substring match against the display name.
    pub fn matches(&self, query: &str) -> bool {
        self.display_name()
            .to_lowercase()
            .contains(&query.trim().to_lowercase())
    }

    /// Every searchable field, folded. Query words never hold a newline, so
    /// one can't match across two fields.
    fn search_text(&self) -> String {
        [
            &self.username,
            &self.first_name,
            &self.last_name,
            &self.email,
        ]
        .map(|field| fold_case(field))
        .join("\n")
    }

    /// Inserts the user or refreshes their details.
    #[tracing::instrument(skip(conn))]
    pub(crate) async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), LibraryError> {
        sqlx::query(
            "INSERT INTO users (id, username, first_name, last_name, email, search_text) \
            VALUES ($1, $2, $3, $4, $5, $6) \
            ON CONFLICT(id) DO UPDATE SET \
            username = excluded.username, \
            first_name = excluded.first_name, \
            last_name = excluded.last_name, \
            email = excluded.email, \
            search_text = excluded.search_text",
        )
        .bind(self.id)
        .bind(&self.username)
        .bind(&self.first_name)
        .bind(&self.last_name)
        .bind(&self.email)
        .bind(self.search_text())
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Failed to save user `{}`. err: {e}", self.id))?;

        Ok(())
    }

    pub(crate) async fn exists(
        conn: &mut SqliteConnection,
        id: UserId,
    ) -> Result<bool, LibraryError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(found.is_some())
    }

    /// Finds users whose display name contains `query`.
    ///
    /// The first word narrows things down in SQL, then the whole query is
    /// checked here.
    #[tracing::instrument(skip(conn))]
    pub(crate) async fn search(
        conn: &mut SqliteConnection,
        query: &str,
        exclude: Option<UserId>,
    ) -> Result<Vec<UserMatch>, LibraryError> {
        let query = query.trim();

        let mut select = Query::select();
        select
            .columns([
                Users::Id,
                Users::Username,
                Users::FirstName,
                Users::LastName,
                Users::Email,
            ])
            .from(Users::Table);

        if let Some(first) = query.split_whitespace().next() {
            let pattern = format!("%{}%", escape_like(&fold_case(first)));
            select.and_where(
                Expr::col(Users::SearchText).like(LikeExpr::new(pattern).escape('\\')),
            );
        }

        let (sql, values) = select.build_sqlx(SqliteQueryBuilder);
        let candidates = sqlx::query_as_with::<_, User, _>(&sql, values)
            .fetch_all(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("User search failed. err: {e}"))?;

        let mut matches = candidates
            .into_iter()
            .filter(|u| Some(u.id) != exclude)
            .filter(|u| query.is_empty() || u.matches(query))
            .map(|u| UserMatch {
                id: u.id,
                name: u.display_name(),
            })
            .collect::<Vec<_>>();

        matches.sort_by_key(|m| (m.name.to_lowercase(), m.id));
        matches.truncate(USER_SEARCH_LIMIT);

        tracing::debug!("found {} users for `{query}`", matches.len());
        Ok(matches)
    }
}

/// One result from a user search.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct UserMatch {
    pub id: UserId,
    pub name: String,
}

/// Escapes `LIKE` wildcards so they match themselves.
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
