//! Types related to posts and the mutations that touch them.

use chrono::{DateTime, Utc};

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::{insert_into, sql_query, update, Connection as _};

use serde::Serialize;

use crate::models::board;
use crate::models::thread::{live_thread, soft_delete, ThreadId};
use crate::models::{Actor, Connection, InnerConnection, Role, UserId, UserTally};
use crate::pagination::{self, Page};
use crate::schema::post;
use crate::{Error, Result};

/// A post ID.
pub type PostId = i32;

/// The shortest allowed reply body, in bytes.
pub const REPLY_BODY_MIN: usize = 2;
/// The longest allowed post body, in bytes.
pub const BODY_MAX: usize = 50_000;

/// A user-made post.
#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = post)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Post {
    /// The ID of the post.
    pub id: PostId,
    /// The thread that this post was posted on.
    pub thread_id: ThreadId,
    /// The user that made the post.
    pub author_id: UserId,
    /// The contents of the post.
    pub body: String,
    /// When the post was created. The earliest live post in a thread by
    /// this timestamp is the thread's opening post.
    pub created_at: DateTime<Utc>,
    /// When the post was last edited, if ever.
    pub updated_at: Option<DateTime<Utc>>,
    /// Who last edited the post, if anyone.
    pub edited_by: Option<UserId>,
    /// Whether or not the post has been soft-deleted.
    pub is_deleted: bool,
}

/// A new post to be inserted in the database.
#[derive(Debug, Insertable)]
#[diesel(table_name = post)]
pub struct NewPost {
    pub thread_id: ThreadId,
    pub author_id: UserId,
    pub body: String,
}

/// What a post deletion actually removed.
#[derive(Debug, PartialEq, Eq)]
pub enum PostDeletion {
    /// An ordinary reply was soft-deleted.
    Reply { post_id: PostId },
    /// The target was the thread's opening post, so the entire thread was
    /// deleted with it.
    Thread { thread_id: ThreadId },
}

/// Check that a post body is within bounds. `min` differs by context:
/// opening posts require more than replies.
pub fn validate_body(body: &str, min: usize) -> Result<()> {
    let len = body.len();

    if len < min || len > BODY_MAX {
        return Err(Error::BodyOutOfBounds { len, min });
    }

    Ok(())
}

/// Convenience function to convert from diesel's error type into our error
/// type, when we're querying for a post.
fn conv_post_error(
    post_id: PostId,
) -> impl FnOnce(diesel::result::Error) -> Error {
    move |e: diesel::result::Error| match e {
        diesel::result::Error::NotFound => Error::PostNotFound { post_id },
        _ => Error::from(e),
    }
}

/// Get a live (non-deleted) post, for use inside a transaction.
fn live_post(conn: &mut PgConnection, post_id: PostId) -> Result<Post> {
    use crate::schema::post::columns::{id, is_deleted};
    use crate::schema::post::dsl::post;

    post.filter(id.eq(post_id))
        .filter(is_deleted.eq(false))
        .limit(1)
        .first(conn)
        .map_err(conv_post_error(post_id))
}

/// The id of a thread's opening post: the earliest live post by creation
/// time. `None` for a thread with no live posts.
pub(crate) fn opening_post_id(
    conn: &mut PgConnection,
    in_thread: ThreadId,
) -> Result<Option<PostId>> {
    use crate::schema::post::columns::{created_at, id, is_deleted, thread_id};
    use crate::schema::post::dsl::post;

    Ok(post
        .filter(thread_id.eq(in_thread))
        .filter(is_deleted.eq(false))
        .order((created_at.asc(), id.asc()))
        .select(id)
        .first(conn)
        .optional()?)
}

impl<C> Connection<C>
where
    C: InnerConnection,
{
    /// Get a live post.
    pub fn post(&mut self, post_id: PostId) -> Result<Post> {
        live_post(self.conn(), post_id)
    }

    /// Get a single page of live posts in a thread, oldest first.
    pub fn post_page(
        &mut self,
        in_thread: ThreadId,
        page: Page,
    ) -> Result<Vec<Post>> {
        use crate::schema::post::columns::{
            created_at, id, is_deleted, thread_id,
        };
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(thread_id.eq(in_thread))
            .filter(is_deleted.eq(false))
            .order((created_at.asc(), id.asc()))
            .limit(page.width as i64)
            .offset(page.offset() as i64)
            .load(self.conn())?)
    }

    /// The number of live posts in a thread, counted from rows rather
    /// than the cached `reply_count`.
    pub fn thread_post_count(&mut self, in_thread: ThreadId) -> Result<u32> {
        use crate::schema::post::columns::{is_deleted, thread_id};
        use crate::schema::post::dsl::post;

        let count: i64 = post
            .filter(thread_id.eq(in_thread))
            .filter(is_deleted.eq(false))
            .count()
            .first(self.conn())?;

        Ok(count as u32)
    }

    /// The 1-based position of a post among its thread's live posts, for
    /// "jump to post" redirects.
    pub fn post_position(&mut self, post_id: PostId) -> Result<u32> {
        self.conn().transaction::<_, Error, _>(|conn| {
            let target = live_post(conn, post_id)?;

            use crate::schema::post::columns::{
                created_at, is_deleted, thread_id,
            };
            use crate::schema::post::dsl::post;

            let position: i64 = post
                .filter(thread_id.eq(target.thread_id))
                .filter(is_deleted.eq(false))
                .filter(created_at.le(target.created_at))
                .count()
                .first(conn)?;

            Ok(position as u32)
        })
    }

    /// Get a single page of a user's live posts in live threads, newest
    /// first. The total for pagination is the user's cached post tally,
    /// owned by the host application.
    pub fn posts_by_user(
        &mut self,
        user: UserId,
        page: Page,
    ) -> Result<Vec<Post>> {
        use crate::schema::post::dsl::post;
        use crate::schema::thread::dsl::thread;
        use crate::schema::{post as post_schema, thread as thread_schema};

        Ok(post
            .inner_join(thread)
            .filter(post_schema::columns::author_id.eq(user))
            .filter(post_schema::columns::is_deleted.eq(false))
            .filter(thread_schema::columns::is_deleted.eq(false))
            .order(post_schema::columns::created_at.desc())
            .limit(page.width as i64)
            .offset(page.offset() as i64)
            .select(Post::as_select())
            .load(self.conn())?)
    }

    /// How many live posts in live threads match a body search. This is a
    /// live count: search pagination can't lean on a cached counter.
    pub fn search_post_count(&mut self, query: &str) -> Result<u32> {
        use crate::schema::post::dsl::post;
        use crate::schema::thread::dsl::thread;
        use crate::schema::{post as post_schema, thread as thread_schema};

        let pattern = format!("%{}%", query);

        let count: i64 = post
            .inner_join(thread)
            .filter(post_schema::columns::body.ilike(pattern))
            .filter(post_schema::columns::is_deleted.eq(false))
            .filter(thread_schema::columns::is_deleted.eq(false))
            .count()
            .first(self.conn())?;

        Ok(count as u32)
    }

    /// Get a single page of search results, newest first.
    pub fn search_posts(
        &mut self,
        query: &str,
        page: Page,
    ) -> Result<Vec<Post>> {
        use crate::schema::post::dsl::post;
        use crate::schema::thread::dsl::thread;
        use crate::schema::{post as post_schema, thread as thread_schema};

        let pattern = format!("%{}%", query);

        Ok(post
            .inner_join(thread)
            .filter(post_schema::columns::body.ilike(pattern))
            .filter(post_schema::columns::is_deleted.eq(false))
            .filter(thread_schema::columns::is_deleted.eq(false))
            .order(post_schema::columns::created_at.desc())
            .limit(page.width as i64)
            .offset(page.offset() as i64)
            .select(Post::as_select())
            .load(self.conn())?)
    }

    /// Add a reply to a thread.
    ///
    /// Rejects deleted or missing threads as not found and locked threads
    /// outright, before any row changes. On success the reply, the
    /// thread's `reply_count` and `last_post_at`, the board counters, and
    /// the author tally move together. Returns the new post's id and the
    /// page it lands on, which is always the new last page under
    /// `page_width`.
    pub fn create_reply(
        &mut self,
        new_post: NewPost,
        page_width: u32,
        tally: &mut dyn UserTally,
    ) -> Result<(PostId, u32)> {
        validate_body(&new_post.body, REPLY_BODY_MIN)?;

        self.conn().transaction::<_, Error, _>(|conn| {
            let parent = live_thread(conn, new_post.thread_id)?;

            if parent.is_locked {
                return Err(Error::ThreadLocked);
            }

            let new_post_id: PostId = {
                use crate::schema::post::columns::id;
                use crate::schema::post::dsl::post;

                insert_into(post)
                    .values(&new_post)
                    .returning(id)
                    .get_result(conn)?
            };

            {
                use crate::schema::thread::columns::{
                    id, last_post_at, reply_count,
                };
                use crate::schema::thread::dsl::thread;

                use diesel::dsl::now;

                update(thread.filter(id.eq(parent.id)))
                    .set((
                        reply_count.eq(reply_count + 1),
                        last_post_at.eq(now),
                    ))
                    .execute(conn)?;
            }

            board::adjust_counters(
                conn,
                parent.board_id,
                0,
                1,
                Some(new_post_id),
            )?;

            tally.adjust_post_tally(conn, new_post.author_id, 1)?;

            // Post-insert total: the old replies, the new one, and the
            // opening post.
            let landing_page = pagination::last_page(
                parent.reply_count as u32 + 2,
                page_width,
            );

            Ok((new_post_id, landing_page))
        })
    }

    /// Edit a post's body.
    ///
    /// Allowed for the post's author, or for moderators and up; a locked
    /// thread additionally restricts edits to moderators and up. No
    /// counter is affected.
    pub fn edit_post(
        &mut self,
        post_id: PostId,
        editor: &Actor,
        new_body: &str,
    ) -> Result<()> {
        validate_body(new_body, REPLY_BODY_MIN)?;

        self.conn().transaction::<_, Error, _>(|conn| {
            let target = live_post(conn, post_id)?;
            let parent = live_thread(conn, target.thread_id)?;

            if target.author_id != editor.id
                && !editor.has_role(Role::Moderator)
            {
                return Err(Error::NotPostAuthor { post_id });
            }

            if parent.is_locked && !editor.has_role(Role::Moderator) {
                return Err(Error::ThreadLocked);
            }

            use crate::schema::post::columns::{
                body, edited_by, id, updated_at,
            };
            use crate::schema::post::dsl::post;

            update(post.filter(id.eq(post_id)))
                .set((
                    body.eq(new_body),
                    updated_at.eq(Some(Utc::now())),
                    edited_by.eq(Some(editor.id)),
                ))
                .execute(conn)?;

            Ok(())
        })
    }

    /// Soft-delete a post.
    ///
    /// If the target turns out to be the thread's opening post, the whole
    /// thread is deleted instead, replies included; a forum cannot hold a
    /// reply-only thread. Otherwise the post is marked deleted, the
    /// thread's `reply_count` is decremented with a floor of zero, the
    /// author's tally drops by one, and the owning board is recounted.
    pub fn delete_post(
        &mut self,
        post_id: PostId,
        tally: &mut dyn UserTally,
    ) -> Result<PostDeletion> {
        self.conn().transaction::<_, Error, _>(|conn| {
            let target = live_post(conn, post_id)?;
            let parent = live_thread(conn, target.thread_id)?;

            if opening_post_id(conn, parent.id)? == Some(target.id) {
                soft_delete(conn, &parent)?;

                return Ok(PostDeletion::Thread {
                    thread_id: parent.id,
                });
            }

            {
                use crate::schema::post::columns::{id, is_deleted};
                use crate::schema::post::dsl::post;

                update(post.filter(id.eq(post_id)))
                    .set(is_deleted.eq(true))
                    .execute(conn)?;
            }

            let query = "UPDATE thread \
                            SET reply_count = GREATEST(0, reply_count - 1) \
                          WHERE id = $1";
            sql_query(query)
                .bind::<Integer, _>(parent.id)
                .execute(conn)?;

            tally.adjust_post_tally(conn, target.author_id, -1)?;

            board::recompute_counters(conn, parent.board_id)?;

            Ok(PostDeletion::Reply { post_id })
        })
    }
}
