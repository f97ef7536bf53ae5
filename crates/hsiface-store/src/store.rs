use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use hsiface_core::{HubLeg, Prefix, RequestRecord, Tick};
use hsiface_protocol::HubLegState;

use crate::clock::ProcessClock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
    #[error("corrupt row for request {request_id}: {detail}")]
    CorruptRow { request_id: String, detail: String },
}

/// The durable `RequestRecord` store.
pub struct Store {
    conn: Connection,
    clock: ProcessClock,
}

impl Store {
    /// Open (or create) the store at `path`. Applies WAL + `synchronous=FULL`,
    /// runs `PRAGMA integrity_check`, and creates tables if needed.
    pub fn open(path: &Path, clock: ProcessClock) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Store { conn, clock })
    }

    pub fn open_in_memory(clock: ProcessClock) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Store { conn, clock })
    }

    /// Persist a record and all of its hub-legs. Overwrites any prior
    /// row for the same `request_id`.
    pub fn upsert(&mut self, record: &RequestRecord) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO request_records
                (request_id, prefix, username, start_tick, stop_tick, destination_dir,
                 expiry_deadline, created_at, in_progress_notified, email_sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(request_id) DO UPDATE SET
                prefix = excluded.prefix,
                username = excluded.username,
                start_tick = excluded.start_tick,
                stop_tick = excluded.stop_tick,
                destination_dir = excluded.destination_dir,
                expiry_deadline = excluded.expiry_deadline,
                created_at = excluded.created_at,
                in_progress_notified = excluded.in_progress_notified,
                email_sent = excluded.email_sent",
            params![
                record.request_id,
                record.prefix.as_str(),
                record.username,
                record.start_tick.0,
                record.stop_tick.0,
                record.destination_dir,
                self.clock.to_utc(record.expiry_deadline).to_rfc3339(),
                self.clock.to_utc(record.created_at).to_rfc3339(),
                record.in_progress_notified,
                record.email_sent,
            ],
        )?;
        tx.execute(
            "DELETE FROM hub_legs WHERE request_id = ?1",
            params![record.request_id],
        )?;
        for leg in record.hub_legs.values() {
            tx.execute(
                "INSERT INTO hub_legs (request_id, host, state, failure_reason, synthetic)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.request_id,
                    leg.host,
                    leg_state_str(leg.state),
                    leg.failure_reason,
                    leg.synthetic,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove a completed/expired request.
    pub fn delete(&mut self, request_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM request_records WHERE request_id = ?1",
            params![request_id],
        )?;
        Ok(())
    }

    /// Load every outstanding record. Called once at startup before the Report channel starts
    /// delivering new messages.
    pub fn load_all(&self) -> Result<BTreeMap<String, RequestRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT request_id, prefix, username, start_tick, stop_tick, destination_dir,
                    expiry_deadline, created_at, in_progress_notified, email_sent
             FROM request_records",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, bool>(8)?,
                row.get::<_, bool>(9)?,
            ))
        })?;

        let mut records = BTreeMap::new();
        for row in rows {
            let (
                request_id,
                prefix,
                username,
                start_tick,
                stop_tick,
                destination_dir,
                expiry_deadline,
                created_at,
                in_progress_notified,
                email_sent,
            ) = row?;

            let expiry_deadline = parse_rfc3339(&request_id, &expiry_deadline)?;
            let created_at = parse_rfc3339(&request_id, &created_at)?;

            let hub_legs = self.load_hub_legs(&request_id)?;

            records.insert(
                request_id.clone(),
                RequestRecord {
                    request_id,
                    prefix: Prefix::from(prefix.as_str()),
                    username,
                    start_tick: Tick(start_tick),
                    stop_tick: Tick(stop_tick),
                    destination_dir,
                    hub_legs,
                    expiry_deadline: self.clock.to_instant(expiry_deadline),
                    created_at: self.clock.to_instant(created_at),
                    in_progress_notified,
                    email_sent,
                },
            );
        }
        Ok(records)
    }

    fn load_hub_legs(&self, request_id: &str) -> Result<BTreeMap<String, HubLeg>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT host, state, failure_reason, synthetic FROM hub_legs WHERE request_id = ?1",
        )?;
        let rows = stmt.query_map(params![request_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;

        let mut legs = BTreeMap::new();
        for row in rows {
            let (host, state, failure_reason, synthetic) = row?;
            let state = parse_leg_state(request_id, &state)?;
            legs.insert(
                host.clone(),
                HubLeg {
                    host,
                    state,
                    failure_reason,
                    synthetic,
                },
            );
        }
        Ok(legs)
    }
}

fn leg_state_str(state: HubLegState) -> &'static str {
    match state {
        HubLegState::Initial => "INITIAL",
        HubLegState::Queued => "QUEUED",
        HubLegState::InProgress => "IN_PROGRESS",
        HubLegState::Done => "DONE",
        HubLegState::Failed => "FAILED",
    }
}

fn parse_leg_state(request_id: &str, s: &str) -> Result<HubLegState, StoreError> {
    match s {
        "INITIAL" => Ok(HubLegState::Initial),
        "QUEUED" => Ok(HubLegState::Queued),
        "IN_PROGRESS" => Ok(HubLegState::InProgress),
        "DONE" => Ok(HubLegState::Done),
        "FAILED" => Ok(HubLegState::Failed),
        other => Err(StoreError::CorruptRow {
            request_id: request_id.to_owned(),
            detail: format!("unknown hub_leg state {other:?}"),
        }),
    }
}

fn parse_rfc3339(request_id: &str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            request_id: request_id.to_owned(),
            detail: format!("bad timestamp {s:?}: {e}"),
        })
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> Result<(), StoreError> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}
