use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex},
};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::Key;
use diesel::{
    SqliteConnection,
    connection::TransactionManager,
    r2d2::{ConnectionManager, Pool, PooledConnection},
};

use crate::{config::Settings, storage::BlobStore, util_resp::FailureResponse};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub pool: DbPool,
    pub key: Key,
    pub settings: Arc<Settings>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Connections with an open transaction, registered by [`ThreadSafeConn`]
/// so that [`commit_transactions`] can settle them once the response is
/// known.
#[derive(Clone, Default)]
struct OpenTransactions(Arc<Mutex<Vec<Arc<tokio::sync::Mutex<PooledConn>>>>>);

/// Commits every transaction opened while handling the request if the
/// response is informational, successful or a redirect, and rolls them back
/// otherwise.
pub async fn commit_transactions(mut req: Request, next: Next) -> Response {
    let open = OpenTransactions::default();
    req.extensions_mut().insert(open.clone());

    let res = next.run(req).await;

    let conns = match open.0.lock() {
        Ok(mut conns) => std::mem::take(&mut *conns),
        Err(_) => {
            tracing::error!("transaction registry was poisoned");
            return FailureResponse::ServerError(()).into_response();
        }
    };

    let status = res.status();
    let keep = status.is_success()
        || status.is_redirection()
        || status.is_informational();

    for conn in conns {
        let mut conn = conn.lock().await;
        let outcome = if keep {
            <PooledConn as diesel::Connection>::TransactionManager::commit_transaction(
                &mut *conn,
            )
        } else {
            <PooledConn as diesel::Connection>::TransactionManager::rollback_transaction(
                &mut *conn,
            )
        };
        if let Err(e) = outcome {
            tracing::error!("failed to settle request transaction: {e}");
            return FailureResponse::ServerError(()).into_response();
        }
    }

    res
}

pub struct Conn<const TX: bool> {
    inner: tokio::sync::OwnedMutexGuard<PooledConn>,
}

impl<const TX: bool> Deref for Conn<TX> {
    type Target = PooledConn;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

impl<const TX: bool> DerefMut for Conn<TX> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.deref_mut()
    }
}

#[async_trait]
impl<S, const TX: bool> FromRequestParts<S> for Conn<TX>
where
    S: Send + Sync,
    DbPool: FromRef<S>,
{
    type Rejection = FailureResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let conn = ThreadSafeConn::<TX>::from_request_parts(parts, state).await?;
        let inner = conn.inner.try_lock_owned().map_err(|_| {
            tracing::error!("request connection is already locked");
            FailureResponse::ServerError(())
        })?;
        Ok(Conn { inner })
    }
}

/// A pooled connection shared between all extractors of one request.
#[derive(Clone)]
pub struct ThreadSafeConn<const TX: bool> {
    pub inner: Arc<tokio::sync::Mutex<PooledConn>>,
}

#[async_trait]
impl<S, const TX: bool> FromRequestParts<S> for ThreadSafeConn<TX>
where
    S: Send + Sync,
    DbPool: FromRef<S>,
{
    type Rejection = FailureResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        if let Some(conn) = parts.extensions.get::<ThreadSafeConn<TX>>() {
            return Ok(conn.clone());
        }

        let open = if TX {
            match parts.extensions.get::<OpenTransactions>() {
                Some(open) => Some(open.clone()),
                None => {
                    tracing::error!(
                        "transactional connection requested outside of the commit middleware"
                    );
                    return Err(FailureResponse::ServerError(()));
                }
            }
        } else {
            None
        };

        let pool = DbPool::from_ref(state);
        let mut conn = tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|e| {
                tracing::error!("connection checkout task failed: {e}");
                FailureResponse::ServerError(())
            })?
            .map_err(|e| {
                tracing::error!("could not check out a connection: {e}");
                FailureResponse::ServerError(())
            })?;

        if TX {
            <PooledConn as diesel::Connection>::TransactionManager::begin_transaction(
                &mut conn,
            )
            .map_err(FailureResponse::from)?;
        }

        let inner = Arc::new(tokio::sync::Mutex::new(conn));

        if let Some(open) = open {
            match open.0.lock() {
                Ok(mut conns) => conns.push(inner.clone()),
                Err(_) => return Err(FailureResponse::ServerError(())),
            }
        }

        let conn = ThreadSafeConn { inner };
        parts.extensions.insert(conn.clone());
        Ok(conn)
    }
}
