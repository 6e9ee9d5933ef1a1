//! The moderation dispatcher.
//!
//! Moderation requests arrive as loosely structured form input: an action
//! name, whichever target ids the client chose to send, and an optional
//! return path. The dispatcher is deliberately tolerant of garbage in
//! that input. An unknown action, a missing target id, or a target that
//! no longer exists all resolve to [`Dispatch::NotApplicable`] and send
//! the client back where they came from; only real failures (bad
//! authority, database trouble) surface as errors.

use crate::models::post::PostDeletion;
use crate::models::{
    Actor, AuditSink, BoardId, Connection, InnerConnection, PostId, Role,
    ThreadId, UserTally,
};
use crate::{Error, Result};

/// Where a moderation request lands when it has no usable return path.
pub const FORUM_HOME: &str = "/forum/";

/// A moderation action with all of its targets resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    DeleteThread { thread_id: ThreadId },
    DeletePost { post_id: PostId },
    StickyToggle { thread_id: ThreadId },
    LockToggle { thread_id: ThreadId },
    MoveThread { thread_id: ThreadId, board_id: BoardId },
}

impl Action {
    /// Parse a raw request into an action. `None` for an unrecognized
    /// action name or a request missing the ids its action needs; neither
    /// is an error, the request is just not applicable.
    pub fn parse(request: &ActionRequest) -> Option<Action> {
        match request.action {
            "delete_thread" => {
                let thread_id = request.thread_id?;
                Some(Action::DeleteThread { thread_id })
            }
            "delete_post" => {
                let post_id = request.post_id?;
                Some(Action::DeletePost { post_id })
            }
            "sticky" => {
                let thread_id = request.thread_id?;
                Some(Action::StickyToggle { thread_id })
            }
            "lock" => {
                let thread_id = request.thread_id?;
                Some(Action::LockToggle { thread_id })
            }
            "move_thread" => {
                let thread_id = request.thread_id?;
                let board_id = request.board_id?;
                Some(Action::MoveThread {
                    thread_id,
                    board_id,
                })
            }
            _ => None,
        }
    }
}

/// A moderation request as it came off the wire, untrusted.
#[derive(Copy, Clone, Debug)]
pub struct ActionRequest<'a> {
    /// The raw action name.
    pub action: &'a str,
    pub thread_id: Option<ThreadId>,
    pub post_id: Option<PostId>,
    pub board_id: Option<BoardId>,
    /// Where the client asked to be sent afterwards.
    pub return_path: Option<&'a str>,
}

/// The outcome of a moderation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The action was carried out. `redirect` is where to send the
    /// client.
    Applied { redirect: String },
    /// The request named an unknown action, lacked a target, or targeted
    /// something that no longer exists. Nothing changed.
    NotApplicable { redirect: String },
}

/// Reduce an untrusted return path to something safe to redirect to:
/// local absolute paths only. Protocol-relative paths (`//evil.example`)
/// and everything else fall back to the forum home page.
pub fn sanitize_return_path(raw: Option<&str>) -> &str {
    match raw {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") =>
        {
            path
        }
        _ => FORUM_HOME,
    }
}

/// Carry out a moderation request.
///
/// The actor must hold at least [`Role::Moderator`]; that check comes
/// before any parsing so an unauthorized caller learns nothing about
/// which actions exist. Every applied action writes an audit tag.
pub fn dispatch<C>(
    conn: &mut Connection<C>,
    actor: &Actor,
    request: &ActionRequest,
    tally: &mut dyn UserTally,
    audit: &mut dyn AuditSink,
) -> Result<Dispatch>
where
    C: InnerConnection,
{
    if !actor.has_role(Role::Moderator) {
        return Err(Error::InsufficientRole {
            required: Role::Moderator,
        });
    }

    let redirect = sanitize_return_path(request.return_path).to_string();

    let action = match Action::parse(request) {
        Some(action) => action,
        None => {
            log::warn!(
                "user {}: unusable moderation request {:?}",
                actor.id,
                request.action,
            );
            return Ok(Dispatch::NotApplicable { redirect });
        }
    };

    let outcome = apply(conn, action, tally, audit, actor);

    match outcome {
        Ok(applied) if applied => Ok(Dispatch::Applied { redirect }),
        Ok(_) => Ok(Dispatch::NotApplicable { redirect }),
        Err(err) if err.is_not_found() => {
            Ok(Dispatch::NotApplicable { redirect })
        }
        Err(err) => Err(err),
    }
}

/// Run a parsed action against the database. `Ok(false)` means the action
/// found nothing to do.
fn apply<C>(
    conn: &mut Connection<C>,
    action: Action,
    tally: &mut dyn UserTally,
    audit: &mut dyn AuditSink,
    actor: &Actor,
) -> Result<bool>
where
    C: InnerConnection,
{
    match action {
        Action::DeleteThread { thread_id } => {
            if !conn.delete_thread(thread_id)? {
                return Ok(false);
            }

            audit.log_action(
                Some(actor.id),
                &format!("mod:delete_thread:{}", thread_id),
            );

            Ok(true)
        }
        Action::DeletePost { post_id } => {
            let tag = match conn.delete_post(post_id, tally)? {
                PostDeletion::Reply { post_id } => {
                    format!("mod:delete_post:{}", post_id)
                }
                PostDeletion::Thread { thread_id } => format!(
                    "mod:delete_thread_via_op:post:{}:thread:{}",
                    post_id, thread_id,
                ),
            };

            audit.log_action(Some(actor.id), &tag);

            Ok(true)
        }
        Action::StickyToggle { thread_id } => {
            conn.toggle_sticky(thread_id)?;

            audit.log_action(
                Some(actor.id),
                &format!("mod:sticky_toggle:thread:{}", thread_id),
            );

            Ok(true)
        }
        Action::LockToggle { thread_id } => {
            conn.toggle_lock(thread_id)?;

            audit.log_action(
                Some(actor.id),
                &format!("mod:lock_toggle:thread:{}", thread_id),
            );

            Ok(true)
        }
        Action::MoveThread {
            thread_id,
            board_id,
        } => {
            if !conn.move_thread(thread_id, board_id)? {
                return Ok(false);
            }

            audit.log_action(
                Some(actor.id),
                &format!(
                    "mod:move_thread:{}:board:{}",
                    thread_id, board_id,
                ),
            );

            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: &str) -> ActionRequest {
        ActionRequest {
            action,
            thread_id: Some(7),
            post_id: Some(21),
            board_id: Some(3),
            return_path: None,
        }
    }

    #[test]
    fn known_actions_parse() {
        assert_eq!(
            Action::parse(&request("delete_thread")),
            Some(Action::DeleteThread { thread_id: 7 }),
        );
        assert_eq!(
            Action::parse(&request("sticky")),
            Some(Action::StickyToggle { thread_id: 7 }),
        );
        assert_eq!(
            Action::parse(&request("lock")),
            Some(Action::LockToggle { thread_id: 7 }),
        );
        assert_eq!(
            Action::parse(&request("delete_post")),
            Some(Action::DeletePost { post_id: 21 }),
        );
        assert_eq!(
            Action::parse(&request("move_thread")),
            Some(Action::MoveThread {
                thread_id: 7,
                board_id: 3,
            }),
        );
    }

    #[test]
    fn unknown_action_is_not_applicable() {
        assert_eq!(Action::parse(&request("explode_thread")), None);
        assert_eq!(Action::parse(&request("")), None);
    }

    #[test]
    fn missing_target_is_not_applicable() {
        let mut req = request("delete_thread");
        req.thread_id = None;
        assert_eq!(Action::parse(&req), None);

        let mut req = request("move_thread");
        req.board_id = None;
        assert_eq!(Action::parse(&req), None);
    }

    #[test]
    fn return_paths_are_sanitized() {
        assert_eq!(sanitize_return_path(Some("/forum/board/3")), "/forum/board/3");
        assert_eq!(sanitize_return_path(Some("//evil.example/")), FORUM_HOME);
        assert_eq!(
            sanitize_return_path(Some("https://evil.example/")),
            FORUM_HOME,
        );
        assert_eq!(sanitize_return_path(Some("relative/path")), FORUM_HOME);
        assert_eq!(sanitize_return_path(Some("")), FORUM_HOME);
        assert_eq!(sanitize_return_path(None), FORUM_HOME);
    }
}
