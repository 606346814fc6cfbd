use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::task;

use super::RoutesBackend;
use crate::error::StoreError;
use crate::models::{LookupRoute, Route, RouteState};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS routes (
        id          TEXT    NOT NULL,
        source_id   TEXT    NOT NULL,
        neighbor_id TEXT    NOT NULL,
        network     TEXT    NOT NULL,
        state       TEXT    NOT NULL,
        route       TEXT    NOT NULL,
        updated_at  INTEGER NOT NULL,
        PRIMARY KEY (id, source_id)
    );
    CREATE INDEX IF NOT EXISTS routes_network ON routes (network);
    CREATE INDEX IF NOT EXISTS routes_neighbor ON routes (source_id, neighbor_id);
";

// Filtered before imported, then in insertion order
const ORDER: &str = "ORDER BY source_id, CASE state WHEN 'filtered' THEN 0 ELSE 1 END, rowid";

/// Routes in a SQLite table, one row per (route id, source id).
///
/// A refresh upserts every route of the source with a fresh stamp
/// and deletes the rows that were not touched.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        debug!("Opening routes database {}", path.as_ref().display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking database work off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await?
    }

    async fn query(&self, sql: String, args: Vec<String>) -> Result<Vec<LookupRoute>, StoreError> {
        let rows = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(args.iter()), |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(source_id, state, route)| {
                let state: RouteState = state.parse()?;
                let route: Route = serde_json::from_str(&route)?;
                Ok(LookupRoute::new(Arc::new(route), state, source_id))
            })
            .collect()
    }
}

fn placeholders(count: usize, offset: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", i + offset + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl RoutesBackend for SqliteBackend {
    async fn set_routes(&self, source_id: &str, routes: Vec<LookupRoute>) -> Result<(), StoreError> {
        let rows = routes
            .iter()
            .filter(|r| r.state != RouteState::NotExported)
            .map(|r| {
                Ok((
                    r.route.id.clone(),
                    r.route.neighbor_id.to_string(),
                    r.route.network.to_lowercase(),
                    r.state.to_string(),
                    serde_json::to_string(&*r.route)?,
                ))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        let source_id = source_id.to_string();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let previous: Option<i64> = tx
                .query_row(
                    "SELECT MAX(updated_at) FROM routes WHERE source_id = ?1",
                    params![source_id],
                    |row| row.get::<_, Option<i64>>(0),
                )
                .optional()?
                .flatten();
            // Strictly newer than anything stored for the source
            let stamp = previous.map_or(Utc::now().timestamp_micros(), |prev| {
                Utc::now().timestamp_micros().max(prev + 1)
            });
            {
                let mut upsert = tx.prepare_cached(
                    "INSERT INTO routes
                        (id, source_id, neighbor_id, network, state, route, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (id, source_id) DO UPDATE SET
                        neighbor_id = excluded.neighbor_id,
                        network = excluded.network,
                        state = excluded.state,
                        route = excluded.route,
                        updated_at = excluded.updated_at",
                )?;
                for (id, neighbor_id, network, state, route) in &rows {
                    upsert.execute(params![id, source_id, neighbor_id, network, state, route, stamp])?;
                }
            }
            let stale = tx.execute(
                "DELETE FROM routes WHERE source_id = ?1 AND updated_at < ?2",
                params![source_id, stamp],
            )?;
            tx.commit()?;
            debug!(
                "Stored {} routes of {}, removed {} stale",
                rows.len(),
                source_id,
                stale
            );
            Ok(())
        })
        .await
    }

    async fn find_by_prefix_at(
        &self,
        source_id: &str,
        prefix: &str,
    ) -> Result<Vec<LookupRoute>, StoreError> {
        let sql = format!(
            "SELECT source_id, state, route FROM routes
             WHERE source_id = ?1 AND substr(network, 1, length(?2)) = ?2 {}",
            ORDER
        );
        self.query(sql, vec![source_id.to_string(), prefix.to_lowercase()])
            .await
    }

    async fn find_by_neighbors_at(
        &self,
        source_id: &str,
        neighbor_ids: &[String],
    ) -> Result<Vec<LookupRoute>, StoreError> {
        if neighbor_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT source_id, state, route FROM routes
             WHERE source_id = ?1 AND neighbor_id IN ({}) {}",
            placeholders(neighbor_ids.len(), 1),
            ORDER
        );
        let mut args = vec![source_id.to_string()];
        args.extend(neighbor_ids.iter().cloned());
        self.query(sql, args).await
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<LookupRoute>, StoreError> {
        let sql = format!(
            "SELECT source_id, state, route FROM routes
             WHERE substr(network, 1, length(?1)) = ?1 {}",
            ORDER
        );
        self.query(sql, vec![prefix.to_lowercase()]).await
    }

    async fn find_by_neighbors(&self, neighbor_ids: &[String]) -> Result<Vec<LookupRoute>, StoreError> {
        if neighbor_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT source_id, state, route FROM routes
             WHERE neighbor_id IN ({}) {}",
            placeholders(neighbor_ids.len(), 0),
            ORDER
        );
        self.query(sql, neighbor_ids.to_vec()).await
    }

    async fn count_routes_at(&self, source_id: &str) -> Result<(usize, usize), StoreError> {
        let source_id = source_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT state, COUNT(*) FROM routes WHERE source_id = ?1 GROUP BY state",
            )?;
            let counts = stmt
                .query_map(params![source_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let (mut imported, mut filtered) = (0, 0);
            for (state, count) in counts {
                match state.parse::<RouteState>()? {
                    RouteState::Imported => imported = count as usize,
                    RouteState::Filtered => filtered = count as usize,
                    RouteState::NotExported => (),
                }
            }
            Ok((imported, filtered))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(id: &str, network: &str, neighbor_id: &str, state: RouteState) -> LookupRoute {
        LookupRoute::new(Arc::new(Route::new(id, network, neighbor_id)), state, "rs1")
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3, 1), "?2, ?3, ?4");
        assert_eq!(placeholders(1, 0), "?1");
    }

    #[tokio::test]
    async fn test_upsert_and_stale_rows() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .set_routes(
                "rs1",
                vec![
                    lookup("r1", "10.0.0.0/24", "n1", RouteState::Imported),
                    lookup("r2", "10.0.1.0/24", "n1", RouteState::Imported),
                    lookup("r3", "10.0.2.0/24", "n1", RouteState::NotExported),
                ],
            )
            .await
            .unwrap();
        assert_eq!(backend.count_routes_at("rs1").await.unwrap(), (2, 0));

        // r1 becomes filtered, r2 is gone
        backend
            .set_routes(
                "rs1",
                vec![lookup("r1", "10.0.0.0/24", "n1", RouteState::Filtered)],
            )
            .await
            .unwrap();
        assert_eq!(backend.count_routes_at("rs1").await.unwrap(), (0, 1));
        let found = backend.find_by_prefix_at("rs1", "10.").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].state, RouteState::Filtered);
        assert_eq!(&*found[0].source_id, "rs1");
    }
}
