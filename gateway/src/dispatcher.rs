//! Backend dispatcher.
//!
//! Maps a logical database type onto a driver connection string and opens one
//! live connection per request. Connections are not pooled: each query opens,
//! uses and closes its own.

use std::net::Ipv6Addr;
use std::time::Duration;

use sqlx::{mysql::MySqlConnection, postgres::PgConnection, Connection};
use url::Url;

use common::errors::{AppError, AppResult};
use common::models::DbType;

use crate::resolver::ResolvedTarget;

/// Builds the connection string for `db_type` from individual parameters.
///
/// Credentials and the database name are percent-encoded and IPv6 hosts are
/// bracketed. A host that cannot appear in a URL is a `Validation` failure.
pub fn build_connection_string(
    db_type: DbType,
    host: &str,
    port: u16,
    database: &str,
    username: &str,
    password: &str,
) -> AppResult<String> {
    let invalid =
        |what: &str| AppError::Validation(format!("invalid {} for {} connection", what, db_type));

    let mut url = Url::parse(&format!("{}://localhost", db_type.as_str()))
        .map_err(|_| invalid("scheme"))?;
    let host = match host.parse::<Ipv6Addr>() {
        Ok(ip) => format!("[{}]", ip),
        Err(_) => host.to_string(),
    };
    url.set_host(Some(&host)).map_err(|_| invalid("host"))?;
    url.set_port(Some(port)).map_err(|_| invalid("port"))?;
    url.set_username(username).map_err(|_| invalid("username"))?;
    url.set_password(Some(password)).map_err(|_| invalid("password"))?;
    url.set_path(&urlencoding::encode(database));
    Ok(url.into())
}

/// Connection string with the password masked, for logs.
pub fn redact(connection_string: &str) -> String {
    match Url::parse(connection_string) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable connection string>".to_string(),
    }
}

/// Driver handle behind a [`LiveConnection`].
enum Backend {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    #[cfg(feature = "oracle")]
    Oracle(std::sync::Arc<oracle::Connection>),
}

/// An open connection to one backend, valid for one request.
pub struct LiveConnection {
    db_type: DbType,
    backend: Option<Backend>,
}

impl LiveConnection {
    /// Backend type of this connection.
    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    /// Whether `close` has not run yet.
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub(crate) fn postgres(&mut self) -> Option<&mut PgConnection> {
        match self.backend.as_mut() {
            Some(Backend::Postgres(conn)) => Some(conn),
            _ => None,
        }
    }

    pub(crate) fn mysql(&mut self) -> Option<&mut MySqlConnection> {
        match self.backend.as_mut() {
            Some(Backend::MySql(conn)) => Some(conn),
            _ => None,
        }
    }

    #[cfg(feature = "oracle")]
    pub(crate) fn oracle(&self) -> Option<std::sync::Arc<oracle::Connection>> {
        match self.backend.as_ref() {
            Some(Backend::Oracle(conn)) => Some(conn.clone()),
            _ => None,
        }
    }

    /// Closes the connection.
    ///
    /// Idempotent and infallible: driver errors during shutdown are logged
    /// and swallowed.
    pub async fn close(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        let outcome = match backend {
            Backend::Postgres(conn) => conn.close().await.map_err(|e| e.to_string()),
            Backend::MySql(conn) => conn.close().await.map_err(|e| e.to_string()),
            #[cfg(feature = "oracle")]
            Backend::Oracle(conn) => tokio::task::spawn_blocking(move || conn.close())
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string())),
        };
        match outcome {
            Ok(()) => tracing::debug!(db_type = %self.db_type, "连接已关闭"),
            Err(e) => tracing::warn!(db_type = %self.db_type, error = %e, "关闭连接时出错（已忽略）"),
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        // Reached when the request future is cancelled mid-flight; the driver
        // tears the socket down without a graceful goodbye.
        if self.backend.is_some() {
            tracing::debug!(db_type = %self.db_type, "连接未显式关闭，随请求取消而释放");
        }
    }
}

/// Opens live connections with a bounded timeout.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    connect_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher whose `open` gives up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Opens and validates a connection to `target`.
    ///
    /// Connectivity is checked eagerly: an unreachable host, rejected
    /// credentials or a timeout all surface here as `DatabaseConnection`.
    pub async fn open(&self, target: &ResolvedTarget) -> AppResult<LiveConnection> {
        tracing::debug!(
            db_type = %target.db_type,
            target = %redact(&target.connection_string),
            "打开目标库连接"
        );

        let connect = self.connect(target);
        let backend = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::DatabaseConnection(format!(
                    "timed out after {}s connecting to {}",
                    self.connect_timeout.as_secs_f32(),
                    target.db_type
                )))
            }
        };

        Ok(LiveConnection {
            db_type: target.db_type,
            backend: Some(backend),
        })
    }

    async fn connect(&self, target: &ResolvedTarget) -> AppResult<Backend> {
        let url = target.connection_string.as_str();
        match target.db_type {
            DbType::Postgres => PgConnection::connect(url)
                .await
                .map(Backend::Postgres)
                .map_err(|e| AppError::DatabaseConnection(e.to_string())),
            DbType::MySQL => MySqlConnection::connect(url)
                .await
                .map(Backend::MySql)
                .map_err(|e| AppError::DatabaseConnection(e.to_string())),
            DbType::Oracle => connect_oracle(url).await,
        }
    }
}

#[cfg(feature = "oracle")]
async fn connect_oracle(connection_string: &str) -> AppResult<Backend> {
    let params = OracleParams::parse(connection_string)?;
    let conn = tokio::task::spawn_blocking(move || {
        oracle::Connection::connect(&params.username, &params.password, &params.connect_string)
    })
    .await?
    .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
    Ok(Backend::Oracle(std::sync::Arc::new(conn)))
}

#[cfg(not(feature = "oracle"))]
async fn connect_oracle(_connection_string: &str) -> AppResult<Backend> {
    Err(AppError::DatabaseConnection("oracle support not compiled in".into()))
}

/// Oracle credentials and EZConnect string taken from an `oracle://` URL.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(not(feature = "oracle"), allow(dead_code))]
struct OracleParams {
    username: String,
    password: String,
    connect_string: String,
}

impl OracleParams {
    #[cfg_attr(not(feature = "oracle"), allow(dead_code))]
    fn parse(connection_string: &str) -> AppResult<Self> {
        let url = Url::parse(connection_string)
            .map_err(|e| AppError::DatabaseConnection(format!("invalid oracle connection string: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| AppError::DatabaseConnection("oracle connection string has no host".into()))?;
        let port = url.port().unwrap_or(DbType::Oracle.default_port());
        let service = url.path().trim_start_matches('/');

        let decode = |raw: &str| {
            urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .map_err(|e| AppError::DatabaseConnection(format!("invalid oracle credentials: {}", e)))
        };

        Ok(Self {
            username: decode(url.username())?,
            password: decode(url.password().unwrap_or(""))?,
            connect_string: format!("//{}:{}/{}", host, port, service),
        })
    }
}
