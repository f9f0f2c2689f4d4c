//! sqlx-backed store with one write pool and a pool per read replica.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Instant;

use super::signature::from_sqlx;
use super::{Query, QueryOutcome, Route, Store, StoreError};
use crate::config::{Dialect, StoreConfig, TargetConfig};

/// Write pool plus read pools, each labelled with its host for logs.
struct Replicas<P> {
    write: (String, P),
    read: Vec<(String, P)>,
}

impl<P> Replicas<P> {
    fn all(&self) -> impl Iterator<Item = &(String, P)> {
        std::iter::once(&self.write).chain(self.read.iter())
    }
}

enum Pools {
    Postgres(Replicas<PgPool>),
    Sqlite(Replicas<SqlitePool>),
}

/// Replicated SQL store. Reads rotate round-robin across the read pools;
/// writes always go to the primary.
pub struct ReplicatedStore {
    pools: Pools,
    next_read: AtomicUsize,
    benchmark: bool,
}

impl ReplicatedStore {
    /// Build lazily-connecting pools for every target. Each pool holds up to
    /// `max_connections`; nothing is dialled until the first query or
    /// [`authenticate`](Self::authenticate).
    pub fn connect_lazy(cfg: &StoreConfig, max_connections: u32) -> Result<Self> {
        if cfg.read.is_empty() {
            anyhow::bail!("store needs at least one read target");
        }
        let max_connections = max_connections.max(1);
        let pools = match cfg.dialect {
            Dialect::Postgres => {
                let pool = |t: &TargetConfig| {
                    let opts = pg_options(&cfg.database, t);
                    let pool = PgPoolOptions::new()
                        .max_connections(max_connections)
                        .min_connections(cfg.min_connections.min(max_connections))
                        .connect_lazy_with(opts);
                    (t.host.clone(), pool)
                };
                Pools::Postgres(Replicas {
                    write: pool(&cfg.write),
                    read: cfg.read.iter().map(pool).collect(),
                })
            }
            Dialect::Sqlite => {
                let opts = sqlite_options(&cfg.database)?;
                let pool = |t: &TargetConfig| {
                    let pool = SqlitePoolOptions::new()
                        .max_connections(max_connections)
                        .min_connections(cfg.min_connections.min(max_connections))
                        .connect_lazy_with(opts.clone());
                    (t.host.clone(), pool)
                };
                Pools::Sqlite(Replicas {
                    write: pool(&cfg.write),
                    read: cfg.read.iter().map(pool).collect(),
                })
            }
        };
        Ok(Self {
            pools,
            next_read: AtomicUsize::new(0),
            benchmark: cfg.benchmark,
        })
    }

    /// Ping every pool once. Run before load starts so a bad target is a
    /// startup error rather than a stream of fatal task outcomes.
    pub async fn authenticate(&self) -> Result<()> {
        match &self.pools {
            Pools::Postgres(r) => {
                for (host, pool) in r.all() {
                    sqlx::query("SELECT 1")
                        .execute(pool)
                        .await
                        .map_err(from_sqlx)
                        .with_context(|| format!("authenticate against {}", host))?;
                }
            }
            Pools::Sqlite(r) => {
                for (host, pool) in r.all() {
                    sqlx::query("SELECT 1")
                        .execute(pool)
                        .await
                        .map_err(from_sqlx)
                        .with_context(|| format!("authenticate against {}", host))?;
                }
            }
        }
        tracing::info!(targets = self.target_count(), "store authenticated");
        Ok(())
    }

    /// Number of targets (write primary plus read replicas).
    pub fn target_count(&self) -> usize {
        match &self.pools {
            Pools::Postgres(r) => 1 + r.read.len(),
            Pools::Sqlite(r) => 1 + r.read.len(),
        }
    }

    pub async fn close(&self) {
        match &self.pools {
            Pools::Postgres(r) => {
                for (_, pool) in r.all() {
                    pool.close().await;
                }
            }
            Pools::Sqlite(r) => {
                for (_, pool) in r.all() {
                    pool.close().await;
                }
            }
        }
    }

    fn pick<'a, P>(&self, replicas: &'a Replicas<P>, route: Route) -> &'a (String, P) {
        match route {
            Route::Write => &replicas.write,
            Route::Read => {
                let i = self.next_read.fetch_add(1, Ordering::Relaxed);
                &replicas.read[i % replicas.read.len()]
            }
        }
    }
}

#[async_trait]
impl Store for ReplicatedStore {
    async fn execute(&self, query: &Query) -> Result<QueryOutcome, StoreError> {
        let started = Instant::now();
        let (host, rows_affected) = match &self.pools {
            Pools::Postgres(r) => {
                let (host, pool) = self.pick(r, query.route);
                let done = sqlx::query(&query.sql)
                    .execute(pool)
                    .await
                    .map_err(from_sqlx)?;
                (host, done.rows_affected())
            }
            Pools::Sqlite(r) => {
                let (host, pool) = self.pick(r, query.route);
                let done = sqlx::query(&query.sql)
                    .execute(pool)
                    .await
                    .map_err(from_sqlx)?;
                (host, done.rows_affected())
            }
        };
        if self.benchmark {
            tracing::debug!(
                host = %host,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "executed {}",
                query
            );
        }
        Ok(QueryOutcome { rows_affected })
    }
}

fn pg_options(database: &str, target: &TargetConfig) -> PgConnectOptions {
    let mut opts = PgConnectOptions::new()
        .host(&target.host)
        .database(database);
    if let Some(port) = target.port {
        opts = opts.port(port);
    }
    if let Some(user) = &target.username {
        opts = opts.username(user);
    }
    if let Some(password) = &target.password {
        opts = opts.password(password);
    }
    opts
}

fn sqlite_options(database: &str) -> Result<SqliteConnectOptions> {
    if database == ":memory:" {
        return SqliteConnectOptions::from_str("sqlite::memory:")
            .context("sqlite in-memory options");
    }
    Ok(SqliteConnectOptions::new()
        .filename(database)
        .create_if_missing(true))
}
