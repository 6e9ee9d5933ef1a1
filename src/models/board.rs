//! Types related to boards and their cached counters.
//!
//! The counters on a board are caches over live child rows, kept current
//! in two ways: incremental adjustment for the simple plus-or-minus-one
//! cases, and a full recount for everything structurally ambiguous. Both
//! live here so the decision between them stays in one place.

use diesel::insert_into;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Integer, Nullable};

use serde::Serialize;

use crate::models::post::PostId;
use crate::models::{Connection, InnerConnection};
use crate::schema::{board, category};
use crate::{Error, Result};

/// A board ID.
pub type BoardId = i32;
/// A category ID.
pub type CategoryId = i32;

/// A named group of boards. Categories only exist as the board's parent
/// key; they carry no counters of their own.
#[derive(Debug, Queryable, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub sort_order: i32,
}

/// A discussion venue holding threads.
#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = board)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Board {
    /// The ID of the board.
    pub id: BoardId,
    /// The category the board is listed under.
    pub category_id: CategoryId,
    /// The name of the board.
    pub name: String,
    /// The description of the board.
    pub description: String,
    /// Where the board sorts within its category.
    pub sort_order: i32,
    /// Cached count of non-deleted threads on the board.
    pub thread_count: i32,
    /// Cached count of non-deleted posts in non-deleted threads.
    pub post_count: i32,
    /// The most recent live post on the board. A weak reference: the post
    /// may have been soft-deleted since, in which case the id dangles
    /// until the next recount.
    pub last_post_id: Option<PostId>,
}

/// A new board to be inserted in the database.
#[derive(Debug, Insertable)]
#[diesel(table_name = board)]
pub struct NewBoard {
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub sort_order: i32,
}

/// A new category to be inserted in the database.
#[derive(Debug, Insertable)]
#[diesel(table_name = category)]
pub struct NewCategory {
    pub name: String,
    pub sort_order: i32,
}

/// Convenience function to convert from diesel's error type into our error
/// type, when we're querying for a board.
pub(crate) fn conv_board_error(
    board_id: BoardId,
) -> impl FnOnce(diesel::result::Error) -> Error {
    move |e: diesel::result::Error| match e {
        diesel::result::Error::NotFound => Error::BoardNotFound { board_id },
        _ => Error::from(e),
    }
}

/// Apply signed deltas to a board's cached counters.
///
/// Decrements are clamped to a floor of zero, so a double-submit or a
/// race can transiently under-count but never corrupt the cache into
/// negative territory. `new_last_post` overwrites `last_post_id` only
/// when given.
///
/// Runs against the caller's connection so it can take part in a larger
/// transaction.
pub fn adjust_counters(
    conn: &mut PgConnection,
    board_id: BoardId,
    thread_delta: i32,
    post_delta: i32,
    new_last_post: Option<PostId>,
) -> Result<()> {
    let query = "UPDATE board \
                    SET thread_count = GREATEST(0, thread_count + $1), \
                        post_count   = GREATEST(0, post_count + $2), \
                        last_post_id = COALESCE($3, last_post_id) \
                  WHERE id = $4";

    sql_query(query)
        .bind::<Integer, _>(thread_delta)
        .bind::<Integer, _>(post_delta)
        .bind::<Nullable<Integer>, _>(new_last_post)
        .bind::<Integer, _>(board_id)
        .execute(conn)?;

    Ok(())
}

/// Recalculate a board's cached counters from live rows.
///
/// This is the sole source-of-truth reconciliation: `thread_count` becomes
/// the count of non-deleted threads, `post_count` the count of non-deleted
/// posts in non-deleted threads, and `last_post_id` the most recently
/// created such post (NULL when none exist). A pure function of current
/// row state, safe to call redundantly or on a schedule.
pub fn recompute_counters(
    conn: &mut PgConnection,
    board_id: BoardId,
) -> Result<()> {
    let query = "UPDATE board \
                    SET thread_count = COALESCE(( \
                            SELECT COUNT(*) FROM thread t \
                             WHERE t.board_id = board.id \
                               AND NOT t.is_deleted), 0), \
                        post_count = COALESCE(( \
                            SELECT COUNT(*) FROM post p \
                              JOIN thread t ON t.id = p.thread_id \
                             WHERE t.board_id = board.id \
                               AND NOT t.is_deleted \
                               AND NOT p.is_deleted), 0), \
                        last_post_id = ( \
                            SELECT p.id FROM post p \
                              JOIN thread t ON t.id = p.thread_id \
                             WHERE t.board_id = board.id \
                               AND NOT t.is_deleted \
                               AND NOT p.is_deleted \
                          ORDER BY p.created_at DESC, p.id DESC \
                             LIMIT 1) \
                  WHERE board.id = $1";

    sql_query(query).bind::<Integer, _>(board_id).execute(conn)?;

    log::debug!("recounted cached counters for board {}", board_id);

    Ok(())
}

/// Check that a board exists, without loading it.
pub(crate) fn ensure_board_exists(
    conn: &mut PgConnection,
    target: BoardId,
) -> Result<()> {
    use crate::schema::board::columns::id;
    use crate::schema::board::dsl::board;

    board
        .filter(id.eq(target))
        .select(id)
        .first::<BoardId>(conn)
        .map_err(conv_board_error(target))?;

    Ok(())
}

impl<C> Connection<C>
where
    C: InnerConnection,
{
    /// Get a board.
    pub fn board(&mut self, board_id: BoardId) -> Result<Board> {
        use crate::schema::board::columns::id;
        use crate::schema::board::dsl::board;

        board
            .filter(id.eq(board_id))
            .limit(1)
            .first(self.conn())
            .map_err(conv_board_error(board_id))
    }

    /// Get all categories, in listing order.
    pub fn all_categories(&mut self) -> Result<Vec<Category>> {
        use crate::schema::category::columns::{id, sort_order};
        use crate::schema::category::dsl::category;

        Ok(category
            .order((sort_order.asc(), id.asc()))
            .load(self.conn())?)
    }

    /// Get all boards, in listing order (category first, then the board's
    /// own position).
    pub fn all_boards(&mut self) -> Result<Vec<Board>> {
        use crate::schema::board::columns::{category_id, id, sort_order};
        use crate::schema::board::dsl::board;

        Ok(board
            .order((category_id.asc(), sort_order.asc(), id.asc()))
            .load(self.conn())?)
    }

    /// Insert a new category into the database.
    pub fn insert_category(
        &mut self,
        new_category: NewCategory,
    ) -> Result<CategoryId> {
        use crate::schema::category::columns::id;
        use crate::schema::category::dsl::category;

        Ok(insert_into(category)
            .values(&new_category)
            .returning(id)
            .get_result(self.conn())?)
    }

    /// Insert a new board into the database.
    pub fn insert_board(&mut self, new_board: NewBoard) -> Result<BoardId> {
        use crate::schema::board::columns::id;
        use crate::schema::board::dsl::board;

        Ok(insert_into(board)
            .values(&new_board)
            .returning(id)
            .get_result(self.conn())?)
    }

    /// Apply signed deltas to a board's cached counters. See
    /// [`adjust_counters`].
    pub fn adjust_board_counters(
        &mut self,
        board_id: BoardId,
        thread_delta: i32,
        post_delta: i32,
        new_last_post: Option<PostId>,
    ) -> Result<()> {
        adjust_counters(
            self.conn(),
            board_id,
            thread_delta,
            post_delta,
            new_last_post,
        )
    }

    /// Recalculate a board's cached counters from live rows. See
    /// [`recompute_counters`].
    pub fn recompute_board(&mut self, board_id: BoardId) -> Result<()> {
        recompute_counters(self.conn(), board_id)
    }
}
