//! Types related to threads and the mutations that touch them.

use chrono::{DateTime, Utc};

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::{insert_into, sql_query, update, Connection as _};

use serde::Serialize;

use crate::models::board::{self, BoardId};
use crate::models::post::{validate_body, NewPost, PostId};
use crate::models::{Connection, InnerConnection, UserId, UserTally};
use crate::pagination::Page;
use crate::schema::thread;
use crate::{Error, Result};

/// A thread ID.
pub type ThreadId = i32;

/// The shortest allowed thread title, in bytes.
pub const TITLE_MIN: usize = 3;
/// The longest allowed thread title, in bytes.
pub const TITLE_MAX: usize = 200;
/// The shortest allowed opening post body, in bytes.
pub const OPENING_BODY_MIN: usize = 10;

/// A series of posts about a specific subject.
///
/// The opening post is not stored on the thread; it is simply the
/// earliest non-deleted post, and the total post count for pagination is
/// always `reply_count + 1`.
#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = thread)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Thread {
    /// The ID of the thread.
    pub id: ThreadId,
    /// The board that this thread lives on. Mutable: moderators can move
    /// threads between boards.
    pub board_id: BoardId,
    /// The user that started the thread.
    pub author_id: UserId,
    /// The title of the thread.
    pub title: String,
    /// Cached count of non-deleted replies, excluding the opening post.
    pub reply_count: i32,
    /// How many times the thread has been viewed.
    pub views: i32,
    /// Whether or not the thread is pinned to the top of its board.
    pub is_sticky: bool,
    /// Whether or not the thread is locked from new posts.
    pub is_locked: bool,
    /// Whether or not the thread has been soft-deleted. Terminal: deleted
    /// threads accept no further mutations.
    pub is_deleted: bool,
    /// When the thread was created.
    pub created_at: DateTime<Utc>,
    /// When the most recent reply was made.
    pub last_post_at: DateTime<Utc>,
}

/// A new thread to be inserted in the database.
#[derive(Debug, Insertable)]
#[diesel(table_name = thread)]
pub struct NewThread {
    pub board_id: BoardId,
    pub author_id: UserId,
    pub title: String,
}

/// Check that a thread title is within bounds.
pub fn validate_title(title: &str) -> Result<()> {
    let len = title.len();

    if len < TITLE_MIN || len > TITLE_MAX {
        return Err(Error::TitleOutOfBounds { len });
    }

    Ok(())
}

/// Convenience function to convert from diesel's error type into our error
/// type, when we're querying for a thread.
fn conv_thread_error(
    thread_id: ThreadId,
) -> impl FnOnce(diesel::result::Error) -> Error {
    move |e: diesel::result::Error| match e {
        diesel::result::Error::NotFound => Error::ThreadNotFound { thread_id },
        _ => Error::from(e),
    }
}

/// Get a live (non-deleted) thread, for use inside a transaction.
pub(crate) fn live_thread(
    conn: &mut PgConnection,
    thread_id: ThreadId,
) -> Result<Thread> {
    use crate::schema::thread::columns::{id, is_deleted};
    use crate::schema::thread::dsl::thread;

    thread
        .filter(id.eq(thread_id))
        .filter(is_deleted.eq(false))
        .limit(1)
        .first(conn)
        .map_err(conv_thread_error(thread_id))
}

/// Soft-delete a thread and bring the owning board's counters back in
/// line with a full recount.
///
/// Recounting is deliberate: the thread's exact live-post total may be
/// stale after earlier partial failures, so the decrement is not trusted
/// to be a simple subtraction. Runs inside the caller's transaction.
pub(crate) fn soft_delete(
    conn: &mut PgConnection,
    target: &Thread,
) -> Result<()> {
    use crate::schema::thread::columns::{id, is_deleted};
    use crate::schema::thread::dsl::thread;

    update(thread.filter(id.eq(target.id)))
        .set(is_deleted.eq(true))
        .execute(conn)?;

    board::recompute_counters(conn, target.board_id)?;

    Ok(())
}

impl<C> Connection<C>
where
    C: InnerConnection,
{
    /// Get a live thread.
    pub fn thread(&mut self, thread_id: ThreadId) -> Result<Thread> {
        live_thread(self.conn(), thread_id)
    }

    /// Get a single page of live threads on a board, stickies first and
    /// then most recently active.
    pub fn thread_page(
        &mut self,
        on_board: BoardId,
        page: Page,
    ) -> Result<Vec<Thread>> {
        use crate::schema::thread::columns::{
            board_id, is_deleted, is_sticky, last_post_at,
        };
        use crate::schema::thread::dsl::thread;

        Ok(thread
            .filter(board_id.eq(on_board))
            .filter(is_deleted.eq(false))
            .order((is_sticky.desc(), last_post_at.desc()))
            .limit(page.width as i64)
            .offset(page.offset() as i64)
            .load(self.conn())?)
    }

    /// Create a thread together with its opening post.
    ///
    /// The thread row, the opening post, the board counter bump, and the
    /// author tally all commit or roll back together; a thread without an
    /// opening post is never observable. Returns the new thread's id.
    pub fn create_thread(
        &mut self,
        new_thread: NewThread,
        opening_body: &str,
        tally: &mut dyn UserTally,
    ) -> Result<ThreadId> {
        validate_title(&new_thread.title)?;
        validate_body(opening_body, OPENING_BODY_MIN)?;

        self.conn().transaction::<_, Error, _>(|conn| {
            board::ensure_board_exists(conn, new_thread.board_id)?;

            let new_thread_id: ThreadId = {
                use crate::schema::thread::columns::id;
                use crate::schema::thread::dsl::thread;

                insert_into(thread)
                    .values(&new_thread)
                    .returning(id)
                    .get_result(conn)?
            };

            let opening_post_id: PostId = {
                use crate::schema::post::columns::id;
                use crate::schema::post::dsl::post;

                insert_into(post)
                    .values(&NewPost {
                        thread_id: new_thread_id,
                        author_id: new_thread.author_id,
                        body: opening_body.to_string(),
                    })
                    .returning(id)
                    .get_result(conn)?
            };

            board::adjust_counters(
                conn,
                new_thread.board_id,
                1,
                1,
                Some(opening_post_id),
            )?;

            tally.adjust_post_tally(conn, new_thread.author_id, 1)?;

            Ok(new_thread_id)
        })
    }

    /// Record that a thread was viewed.
    pub fn record_view(&mut self, thread_id: ThreadId) -> Result<()> {
        use crate::schema::thread::columns::{id, views};
        use crate::schema::thread::dsl::thread;

        update(thread.filter(id.eq(thread_id)))
            .set(views.eq(views + 1))
            .execute(self.conn())?;

        Ok(())
    }

    /// Flip a thread's sticky flag.
    ///
    /// Toggle semantics, not set semantics: calling twice restores the
    /// original state, which retrying callers must account for.
    pub fn toggle_sticky(&mut self, thread_id: ThreadId) -> Result<()> {
        let query = "UPDATE thread SET is_sticky = NOT is_sticky \
                      WHERE id = $1 AND NOT is_deleted";

        let touched = sql_query(query)
            .bind::<Integer, _>(thread_id)
            .execute(self.conn())?;

        if touched == 0 {
            return Err(Error::ThreadNotFound { thread_id });
        }

        Ok(())
    }

    /// Flip a thread's locked flag. Same toggle semantics as
    /// [`Connection::toggle_sticky`].
    pub fn toggle_lock(&mut self, thread_id: ThreadId) -> Result<()> {
        let query = "UPDATE thread SET is_locked = NOT is_locked \
                      WHERE id = $1 AND NOT is_deleted";

        let touched = sql_query(query)
            .bind::<Integer, _>(thread_id)
            .execute(self.conn())?;

        if touched == 0 {
            return Err(Error::ThreadNotFound { thread_id });
        }

        Ok(())
    }

    /// Soft-delete a thread and recount the owning board.
    ///
    /// Idempotent: deleting a thread that is already gone (or never
    /// existed) is a no-op, reported by returning `false`.
    pub fn delete_thread(&mut self, thread_id: ThreadId) -> Result<bool> {
        self.conn().transaction::<_, Error, _>(|conn| {
            use crate::schema::thread::columns::{id, is_deleted};
            use crate::schema::thread::dsl::thread;

            let target: Option<Thread> = thread
                .filter(id.eq(thread_id))
                .filter(is_deleted.eq(false))
                .limit(1)
                .first(conn)
                .optional()?;

            let target = match target {
                Some(target) => target,
                None => return Ok(false),
            };

            soft_delete(conn, &target)?;

            Ok(true)
        })
    }

    /// Move a thread to another board.
    ///
    /// The thread carries an unknown number of live posts with it, so
    /// both boards are recounted rather than adjusted. Moving a thread
    /// onto the board it is already on is a no-op, reported by returning
    /// `false`.
    pub fn move_thread(
        &mut self,
        thread_id: ThreadId,
        destination: BoardId,
    ) -> Result<bool> {
        self.conn().transaction::<_, Error, _>(|conn| {
            let target = live_thread(conn, thread_id)?;

            board::ensure_board_exists(conn, destination)?;

            if target.board_id == destination {
                return Ok(false);
            }

            {
                use crate::schema::thread::columns::{board_id, id};
                use crate::schema::thread::dsl::thread;

                update(thread.filter(id.eq(thread_id)))
                    .set(board_id.eq(destination))
                    .execute(conn)?;
            }

            board::recompute_counters(conn, target.board_id)?;
            board::recompute_counters(conn, destination)?;

            Ok(true)
        })
    }
}
