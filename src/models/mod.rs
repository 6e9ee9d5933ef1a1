//! Models and types related to the database.

use std::fmt::Debug;

use derive_more::Display;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool as ConnectionPool, PooledConnection as ManagedConnection};
use diesel::Connection as _;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use serde::Serialize;

use crate::{Error, Result};

pub mod board;
pub mod post;
pub mod thread;

pub use board::*;
pub use post::*;
pub use thread::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// A user ID. Users themselves are owned by the host application; the
/// engine only ever records them as opaque author ids.
pub type UserId = i32;

/// The authority level of an acting user.
///
/// Ordered, so a role check is a simple comparison.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Serialize,
)]
pub enum Role {
    User,
    Moderator,
    Admin,
}

/// The user performing an operation, as established by the host
/// application's session layer.
#[derive(Copy, Clone, Debug)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    /// Whether or not the actor is authorized for a role.
    pub fn has_role(&self, min_role: Role) -> bool {
        self.role >= min_role
    }
}

/// A cached per-post-author tally, owned by the host application.
///
/// Called inside the engine's transaction so the external counter moves in
/// lockstep with post creation and deletion.
pub trait UserTally {
    fn adjust_post_tally(
        &mut self,
        conn: &mut PgConnection,
        user_id: UserId,
        delta: i32,
    ) -> Result<()>;
}

/// A tally for deployments that don't track per-user post counts.
pub struct NoTally;

impl UserTally for NoTally {
    fn adjust_post_tally(
        &mut self,
        _conn: &mut PgConnection,
        _user_id: UserId,
        _delta: i32,
    ) -> Result<()> {
        Ok(())
    }
}

/// Fire-and-forget sink for moderation audit records. Tags are only ever
/// read back by operators, never by the engine.
pub trait AuditSink {
    fn log_action(&mut self, actor: Option<UserId>, tag: &str);
}

/// An audit sink that writes through the `log` crate.
pub struct LogAudit;

impl AuditSink for LogAudit {
    fn log_action(&mut self, actor: Option<UserId>, tag: &str) {
        match actor {
            Some(id) => log::info!(target: "audit", "user {}: {}", id, tag),
            None => log::info!(target: "audit", "{}", tag),
        }
    }
}

/// An audit sink that discards everything.
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn log_action(&mut self, _actor: Option<UserId>, _tag: &str) {}
}

/// Types which can serve as the underlying diesel connection.
pub trait InnerConnection {
    fn conn(&mut self) -> &mut PgConnection;
}

impl InnerConnection for PgConnection {
    fn conn(&mut self) -> &mut PgConnection {
        self
    }
}

impl InnerConnection for ManagedConnection<ConnectionManager<PgConnection>> {
    fn conn(&mut self) -> &mut PgConnection {
        &mut **self
    }
}

/// A connection to the database. Used for creating and retrieving data.
pub struct Connection<C> {
    inner: C,
}

impl<C> Connection<C>
where
    C: InnerConnection,
{
    pub(crate) fn conn(&mut self) -> &mut PgConnection {
        self.inner.conn()
    }

    /// Run any pending migrations.
    pub fn run_migrations(&mut self) -> Result<()> {
        run_migrations(self.conn())
    }
}

/// A single connection, for command line tools.
pub type SingleConnection = Connection<PgConnection>;

impl SingleConnection {
    /// Open a connection to the database and run any pending migrations.
    pub fn establish(url: &str) -> Result<SingleConnection> {
        let mut inner = PgConnection::establish(url)?;
        run_migrations(&mut inner)?;

        Ok(Connection { inner })
    }
}

/// A connection from the request-serving pool.
pub type PooledConnection =
    Connection<ManagedConnection<ConnectionManager<PgConnection>>>;

/// A pool of connections to the database.
pub struct Pool {
    inner: ConnectionPool<ConnectionManager<PgConnection>>,
}

impl Debug for Pool {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = self.inner.state();

        write!(
            fmt,
            "<#Pool connections={} idle_connections={}>",
            state.connections, state.idle_connections,
        )?;

        Ok(())
    }
}

impl Pool {
    /// Open a connection pool and run any pending migrations.
    pub fn open<S>(url: S) -> Result<Pool>
    where
        S: AsRef<str>,
    {
        let inner = ConnectionPool::new(ConnectionManager::new(url.as_ref()))?;
        run_migrations(&mut *inner.get()?)?;

        Ok(Pool { inner })
    }

    /// Get a connection from the pool.
    pub fn connection(&self) -> Result<PooledConnection> {
        Ok(Connection {
            inner: self.inner.get()?,
        })
    }
}

fn run_migrations(conn: &mut PgConnection) -> Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| Error::MigrationError(err.to_string()))?;

    Ok(())
}
