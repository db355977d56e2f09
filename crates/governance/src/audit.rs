//! Hash-chained, append-only audit log.
//!
//! Records are partitioned by tenant and UTC calendar day:
//! `<audit_dir>/<tenant>/<YYYY-MM-DD>.log`, one record per line in the form
//! `<timestamp>|<sha256 hex>|<canonical json>`. Each hash covers the previous
//! record's hash, so the file can be replayed from `GENESIS` to prove that no
//! record was altered, dropped or reordered after it was written.

use chrono::{NaiveDate, SecondsFormat, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use operative_core::{
    canonical::to_canonical_string,
    integrity::{
        chain_hash, format_chain_line, parse_chain_line, verify_chain_text, ChainError,
        ChainVerification, GENESIS,
    },
    traits::AuditSink,
    types::sanitize_segment,
    Error, Result,
};

/// Cached head of a tenant's current chain.
#[derive(Debug, Default)]
struct ChainHead {
    day: Option<NaiveDate>,
    last_hash: String,
}

/// One stored record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub line: usize,
    pub timestamp: String,
    pub hash: String,
    pub event: Value,
}

/// File-backed audit logger.
///
/// Appends for one tenant are serialized by that tenant's lock, so "previous
/// hash" is always the immediately preceding write. Different tenants append
/// in parallel.
pub struct ImmutableAuditLogger {
    audit_dir: PathBuf,
    heads: DashMap<String, Arc<Mutex<ChainHead>>>,
}

impl ImmutableAuditLogger {
    pub fn new(audit_dir: impl Into<PathBuf>) -> Self {
        Self {
            audit_dir: audit_dir.into(),
            heads: DashMap::new(),
        }
    }

    /// Path of a tenant's log for one day.
    pub fn log_path(&self, tenant_id: &str, day: NaiveDate) -> PathBuf {
        self.audit_dir
            .join(sanitize_segment(tenant_id))
            .join(format!("{}.log", day.format("%Y-%m-%d")))
    }

    fn head(&self, tenant_id: &str) -> Arc<Mutex<ChainHead>> {
        self.heads
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }

    /// Append an event and return its chain hash.
    pub fn log(&self, tenant_id: &str, event: &Value) -> Result<String> {
        let head = self.head(tenant_id);
        let mut head = head
            .lock()
            .map_err(|_| Error::internal("audit chain lock poisoned"))?;

        let now = Utc::now();
        let day = now.date_naive();
        let path = self.log_path(tenant_id, day);

        if head.day != Some(day) {
            head.last_hash = read_tail_hash(&path)?;
            head.day = Some(day);
        }

        let canonical = to_canonical_string(event)?;
        let hash = chain_hash(&head.last_hash, &canonical);
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut line = format_chain_line(&timestamp, &hash, &canonical);
        line.push('\n');

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        head.last_hash = hash.clone();
        tracing::debug!(tenant_id = tenant_id, hash = %&hash[..16], "Audit record appended");
        Ok(hash)
    }

    /// Replay a tenant's log for `day` from GENESIS.
    ///
    /// A missing log is reported as invalid rather than as an empty chain.
    pub fn verify_chain(&self, tenant_id: &str, day: NaiveDate) -> Result<ChainVerification> {
        let path = self.log_path(tenant_id, day);
        let head = self.head(tenant_id);
        let _guard = head
            .lock()
            .map_err(|_| Error::internal("audit chain lock poisoned"))?;

        if !path.exists() {
            return Ok(ChainVerification {
                valid: false,
                entries: 0,
                last_hash: GENESIS.to_string(),
                errors: vec![ChainError {
                    line: 0,
                    message: format!("audit log not found: {}", path.display()),
                }],
            });
        }

        let text = fs::read_to_string(&path)?;
        let result = verify_chain_text(&text);
        if result.valid {
            tracing::info!(tenant_id = tenant_id, %day, entries = result.entries, "Audit chain verified");
        } else {
            tracing::warn!(
                tenant_id = tenant_id,
                %day,
                errors = result.errors.len(),
                "Audit chain verification FAILED"
            );
        }
        Ok(result)
    }

    /// All parseable records of a tenant's log for `day`.
    pub fn entries(&self, tenant_id: &str, day: NaiveDate) -> Result<Vec<AuditRecord>> {
        let path = self.log_path(tenant_id, day);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        let records = text
            .lines()
            .enumerate()
            .filter_map(|(idx, raw)| {
                let parsed = parse_chain_line(raw)?;
                let event = serde_json::from_str(parsed.payload).ok()?;
                Some(AuditRecord {
                    line: idx + 1,
                    timestamp: parsed.timestamp.to_string(),
                    hash: parsed.hash.to_string(),
                    event,
                })
            })
            .collect();
        Ok(records)
    }

    /// Days for which a tenant has a log, oldest first.
    pub fn days(&self, tenant_id: &str) -> Result<Vec<NaiveDate>> {
        let dir = self.audit_dir.join(sanitize_segment(tenant_id));
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut days: Vec<NaiveDate> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".log")?.to_string();
                NaiveDate::parse_from_str(&stem, "%Y-%m-%d").ok()
            })
            .collect();
        days.sort();
        Ok(days)
    }
}

impl AuditSink for ImmutableAuditLogger {
    fn log(&self, tenant_id: &str, event: &Value) -> Result<String> {
        ImmutableAuditLogger::log(self, tenant_id, event)
    }
}

/// Hash of the last record in `path`, or GENESIS for a new chain.
fn read_tail_hash(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(GENESIS.to_string());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut last: Option<(usize, String)> = None;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.is_empty() {
            last = Some((idx + 1, line));
        }
    }
    match last {
        None => Ok(GENESIS.to_string()),
        Some((line_no, raw)) => parse_chain_line(&raw)
            .map(|parsed| parsed.hash.to_string())
            .ok_or_else(|| Error::AuditCorrupted {
                path: path.display().to_string(),
                line: line_no,
                reason: "unparseable tail record".into(),
            }),
    }
}
