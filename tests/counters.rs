//! Database-backed tests for counter consistency and moderation.
//!
//! These run against a real PostgreSQL database and are ignored by
//! default. Set `CONVERSE_TEST_DATABASE_URL` to a scratch database and
//! run with `cargo test -- --ignored`.

use std::env;

use diesel::pg::PgConnection;

use converse::models::{
    Actor, BoardId, NewBoard, NewCategory, NewThread, NoTally, NullAudit,
    PostDeletion, Role, SingleConnection, ThreadId, UserId, UserTally,
};
use converse::moderation::{self, ActionRequest, Dispatch, FORUM_HOME};
use converse::pagination::Page;
use converse::{Error, Result};

fn connect() -> SingleConnection {
    let url = env::var("CONVERSE_TEST_DATABASE_URL")
        .expect("set CONVERSE_TEST_DATABASE_URL to run database tests");

    SingleConnection::establish(&url).expect("couldn't open test database")
}

fn fixture_board(db: &mut SingleConnection, name: &str) -> BoardId {
    let category_id = db
        .insert_category(NewCategory {
            name: format!("{} category", name),
            sort_order: 0,
        })
        .unwrap();

    db.insert_board(NewBoard {
        category_id,
        name: name.to_owned(),
        description: String::new(),
        sort_order: 0,
    })
    .unwrap()
}

fn fixture_thread(
    db: &mut SingleConnection,
    board_id: BoardId,
    author_id: UserId,
    replies: usize,
) -> ThreadId {
    let thread_id = db
        .create_thread(
            NewThread {
                board_id,
                author_id,
                title: "a test subject".into(),
            },
            "an opening post body",
            &mut NoTally,
        )
        .unwrap();

    for n in 0..replies {
        db.create_reply(
            converse::models::NewPost {
                thread_id,
                author_id,
                body: format!("reply number {}", n),
            },
            15,
            &mut NoTally,
        )
        .unwrap();
    }

    thread_id
}

fn moderator() -> Actor {
    Actor {
        id: 1,
        role: Role::Moderator,
    }
}

/// A tally that records every adjustment it sees.
struct Recorder {
    deltas: Vec<(UserId, i32)>,
}

impl UserTally for Recorder {
    fn adjust_post_tally(
        &mut self,
        _conn: &mut PgConnection,
        user_id: UserId,
        delta: i32,
    ) -> Result<()> {
        self.deltas.push((user_id, delta));
        Ok(())
    }
}

#[test]
#[ignore]
fn recompute_matches_live_rows() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "recompute");

    let kept = fixture_thread(&mut db, board_id, 10, 3);
    let doomed = fixture_thread(&mut db, board_id, 11, 2);
    assert!(db.delete_thread(doomed).unwrap());

    // Skew the cache on purpose, then recount.
    db.adjust_board_counters(board_id, 5, 9, None).unwrap();
    db.recompute_board(board_id).unwrap();

    let board = db.board(board_id).unwrap();
    assert_eq!(board.thread_count, 1);
    assert_eq!(board.post_count, 4);

    let last = db.post(board.last_post_id.unwrap()).unwrap();
    assert_eq!(last.thread_id, kept);
}

#[test]
#[ignore]
fn counters_never_go_negative() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "clamp");

    let thread_id = fixture_thread(&mut db, board_id, 10, 0);
    assert!(db.delete_thread(thread_id).unwrap());

    // A stale decrement arriving after the recount must clamp at zero.
    db.adjust_board_counters(board_id, -1, -1, None).unwrap();

    let board = db.board(board_id).unwrap();
    assert_eq!(board.thread_count, 0);
    assert_eq!(board.post_count, 0);

    db.adjust_board_counters(board_id, -100, -100, None).unwrap();

    let board = db.board(board_id).unwrap();
    assert_eq!(board.thread_count, 0);
    assert_eq!(board.post_count, 0);
}

#[test]
#[ignore]
fn thread_deletion_is_idempotent() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "idempotent");

    let thread_id = fixture_thread(&mut db, board_id, 10, 1);

    assert!(db.delete_thread(thread_id).unwrap());
    let after_first = db.board(board_id).unwrap();

    assert!(!db.delete_thread(thread_id).unwrap());
    let after_second = db.board(board_id).unwrap();

    assert_eq!(after_first.thread_count, after_second.thread_count);
    assert_eq!(after_first.post_count, after_second.post_count);
    assert_eq!(after_first.thread_count, 0);

    assert!(!db.delete_thread(999_999).unwrap());
}

#[test]
#[ignore]
fn deleting_the_opening_post_deletes_the_thread() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "cascade");

    let thread_id = fixture_thread(&mut db, board_id, 10, 3);

    let opening = db
        .post_page(thread_id, Page { num: 1, width: 50 })
        .unwrap()
        .remove(0);

    let deleted = db.delete_post(opening.id, &mut NoTally).unwrap();
    assert_eq!(deleted, PostDeletion::Thread { thread_id });

    match db.thread(thread_id) {
        Err(Error::ThreadNotFound { .. }) => {}
        other => panic!("expected ThreadNotFound, got {:?}", other.map(|_| ())),
    }

    let board = db.board(board_id).unwrap();
    assert_eq!(board.thread_count, 0);
    assert_eq!(board.post_count, 0);
}

#[test]
#[ignore]
fn deleting_the_only_post_deletes_the_thread() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "cascade-single");

    let thread_id = fixture_thread(&mut db, board_id, 10, 0);

    let opening = db
        .post_page(thread_id, Page { num: 1, width: 50 })
        .unwrap()
        .remove(0);

    let deleted = db.delete_post(opening.id, &mut NoTally).unwrap();
    assert_eq!(deleted, PostDeletion::Thread { thread_id });
}

#[test]
#[ignore]
fn deleting_a_reply_keeps_the_thread() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "reply-delete");

    let thread_id = fixture_thread(&mut db, board_id, 10, 2);

    let reply = db
        .post_page(thread_id, Page { num: 1, width: 50 })
        .unwrap()
        .remove(2);

    let deleted = db.delete_post(reply.id, &mut NoTally).unwrap();
    assert_eq!(deleted, PostDeletion::Reply { post_id: reply.id });

    let thread = db.thread(thread_id).unwrap();
    assert_eq!(thread.reply_count, 1);

    let board = db.board(board_id).unwrap();
    assert_eq!(board.thread_count, 1);
    assert_eq!(board.post_count, 2);
}

#[test]
#[ignore]
fn locked_threads_reject_replies() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "locked");

    let thread_id = fixture_thread(&mut db, board_id, 10, 1);
    db.toggle_lock(thread_id).unwrap();

    let before = db.board(board_id).unwrap();

    let result = db.create_reply(
        converse::models::NewPost {
            thread_id,
            author_id: 10,
            body: "a reply that must not land".into(),
        },
        15,
        &mut NoTally,
    );

    match result {
        Err(Error::ThreadLocked) => {}
        other => panic!("expected ThreadLocked, got {:?}", other.map(|_| ())),
    }

    let after = db.board(board_id).unwrap();
    assert_eq!(before.post_count, after.post_count);
    assert_eq!(
        db.thread(thread_id).unwrap().reply_count,
        1,
    );

    // Unlocking restores the thread.
    db.toggle_lock(thread_id).unwrap();
    db.create_reply(
        converse::models::NewPost {
            thread_id,
            author_id: 10,
            body: "a reply that lands".into(),
        },
        15,
        &mut NoTally,
    )
    .unwrap();
}

#[test]
#[ignore]
fn moving_a_thread_conserves_totals() {
    let mut db = connect();
    let from = fixture_board(&mut db, "move-from");
    let to = fixture_board(&mut db, "move-to");

    let stays = fixture_thread(&mut db, from, 10, 1);
    let moves = fixture_thread(&mut db, from, 11, 4);

    assert!(db.move_thread(moves, to).unwrap());

    let from_board = db.board(from).unwrap();
    let to_board = db.board(to).unwrap();

    assert_eq!(from_board.thread_count, 1);
    assert_eq!(from_board.post_count, 2);
    assert_eq!(to_board.thread_count, 1);
    assert_eq!(to_board.post_count, 5);

    assert_eq!(db.thread(stays).unwrap().board_id, from);
    assert_eq!(db.thread(moves).unwrap().board_id, to);

    // Moving onto the current board is a no-op.
    assert!(!db.move_thread(moves, to).unwrap());
}

#[test]
#[ignore]
fn replies_land_on_the_last_page() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "landing");

    // 1 opening post plus 13 replies: 14 posts, page 1 still has room.
    let thread_id = fixture_thread(&mut db, board_id, 10, 13);

    let (_, page) = db
        .create_reply(
            converse::models::NewPost {
                thread_id,
                author_id: 10,
                body: "the fifteenth post".into(),
            },
            15,
            &mut NoTally,
        )
        .unwrap();
    assert_eq!(page, 1);

    let (_, page) = db
        .create_reply(
            converse::models::NewPost {
                thread_id,
                author_id: 10,
                body: "the sixteenth post".into(),
            },
            15,
            &mut NoTally,
        )
        .unwrap();
    assert_eq!(page, 2);
}

#[test]
#[ignore]
fn tallies_move_with_posts() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "tally");

    let mut tally = Recorder { deltas: Vec::new() };

    let thread_id = db
        .create_thread(
            NewThread {
                board_id,
                author_id: 20,
                title: "a test subject".into(),
            },
            "an opening post body",
            &mut tally,
        )
        .unwrap();

    let (reply_id, _) = db
        .create_reply(
            converse::models::NewPost {
                thread_id,
                author_id: 21,
                body: "a reply".into(),
            },
            15,
            &mut tally,
        )
        .unwrap();

    db.delete_post(reply_id, &mut tally).unwrap();

    assert_eq!(tally.deltas, vec![(20, 1), (21, 1), (21, -1)]);
}

#[test]
#[ignore]
fn dispatch_requires_a_moderator() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "dispatch-role");
    let thread_id = fixture_thread(&mut db, board_id, 10, 0);

    let request = ActionRequest {
        action: "delete_thread",
        thread_id: Some(thread_id),
        post_id: None,
        board_id: None,
        return_path: None,
    };

    let user = Actor {
        id: 10,
        role: Role::User,
    };

    let result = moderation::dispatch(
        &mut db,
        &user,
        &request,
        &mut NoTally,
        &mut NullAudit,
    );

    match result {
        Err(Error::InsufficientRole { .. }) => {}
        other => {
            panic!("expected InsufficientRole, got {:?}", other.map(|_| ()))
        }
    }

    // Nothing happened.
    assert!(db.thread(thread_id).is_ok());
}

#[test]
#[ignore]
fn dispatch_tolerates_garbage_requests() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "dispatch-garbage");
    let thread_id = fixture_thread(&mut db, board_id, 10, 0);

    let unknown = ActionRequest {
        action: "explode_thread",
        thread_id: Some(thread_id),
        post_id: None,
        board_id: None,
        return_path: Some("/forum/thread/7"),
    };

    let outcome = moderation::dispatch(
        &mut db,
        &moderator(),
        &unknown,
        &mut NoTally,
        &mut NullAudit,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Dispatch::NotApplicable {
            redirect: "/forum/thread/7".into(),
        },
    );

    let missing_target = ActionRequest {
        action: "delete_thread",
        thread_id: None,
        post_id: None,
        board_id: None,
        return_path: Some("//evil.example/"),
    };

    let outcome = moderation::dispatch(
        &mut db,
        &moderator(),
        &missing_target,
        &mut NoTally,
        &mut NullAudit,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Dispatch::NotApplicable {
            redirect: FORUM_HOME.into(),
        },
    );

    let gone = ActionRequest {
        action: "delete_thread",
        thread_id: Some(999_999),
        post_id: None,
        board_id: None,
        return_path: None,
    };

    let outcome = moderation::dispatch(
        &mut db,
        &moderator(),
        &gone,
        &mut NoTally,
        &mut NullAudit,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Dispatch::NotApplicable {
            redirect: FORUM_HOME.into(),
        },
    );
}

#[test]
#[ignore]
fn dispatch_applies_real_requests() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "dispatch-apply");
    let thread_id = fixture_thread(&mut db, board_id, 10, 1);

    let request = ActionRequest {
        action: "delete_thread",
        thread_id: Some(thread_id),
        post_id: None,
        board_id: None,
        return_path: Some("/forum/board/1"),
    };

    let outcome = moderation::dispatch(
        &mut db,
        &moderator(),
        &request,
        &mut NoTally,
        &mut NullAudit,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Dispatch::Applied {
            redirect: "/forum/board/1".into(),
        },
    );

    // Deleting the same thread again finds nothing to do.
    let outcome = moderation::dispatch(
        &mut db,
        &moderator(),
        &request,
        &mut NoTally,
        &mut NullAudit,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Dispatch::NotApplicable {
            redirect: "/forum/board/1".into(),
        },
    );

    let board = db.board(board_id).unwrap();
    assert_eq!(board.thread_count, 0);
    assert_eq!(board.post_count, 0);
}

#[test]
#[ignore]
fn sticky_toggle_flips_both_ways() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "sticky");
    let thread_id = fixture_thread(&mut db, board_id, 10, 0);

    db.toggle_sticky(thread_id).unwrap();
    assert!(db.thread(thread_id).unwrap().is_sticky);

    db.toggle_sticky(thread_id).unwrap();
    assert!(!db.thread(thread_id).unwrap().is_sticky);

    match db.toggle_sticky(999_999) {
        Err(Error::ThreadNotFound { .. }) => {}
        other => panic!("expected ThreadNotFound, got {:?}", other),
    }
}

#[test]
#[ignore]
fn edits_are_gated_by_author_and_lock() {
    let mut db = connect();
    let board_id = fixture_board(&mut db, "edit");
    let thread_id = fixture_thread(&mut db, board_id, 10, 1);

    let reply = db
        .post_page(thread_id, Page { num: 1, width: 50 })
        .unwrap()
        .remove(1);

    let author = Actor {
        id: 10,
        role: Role::User,
    };
    let stranger = Actor {
        id: 99,
        role: Role::User,
    };

    db.edit_post(reply.id, &author, "edited by the author").unwrap();

    let edited = db.post(reply.id).unwrap();
    assert_eq!(edited.body, "edited by the author");
    assert_eq!(edited.edited_by, Some(10));
    assert!(edited.updated_at.is_some());

    match db.edit_post(reply.id, &stranger, "vandalism") {
        Err(Error::NotPostAuthor { .. }) => {}
        other => panic!("expected NotPostAuthor, got {:?}", other),
    }

    db.toggle_lock(thread_id).unwrap();

    match db.edit_post(reply.id, &author, "too late") {
        Err(Error::ThreadLocked) => {}
        other => panic!("expected ThreadLocked, got {:?}", other),
    }

    // Moderators may still edit in a locked thread.
    db.edit_post(reply.id, &moderator(), "cleaned up").unwrap();
    assert_eq!(db.post(reply.id).unwrap().body, "cleaned up");
}
