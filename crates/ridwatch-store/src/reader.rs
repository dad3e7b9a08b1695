//! Exported event-log CSV reader.
//!
//! One row per TX or RX event with a stable header. Only RX rows become
//! [`ReceptionEvent`]s; TX rows still register their host's role. A header
//! missing a required column rejects the whole file. A row with an empty,
//! unparsable, or non-finite required value is dropped and counted.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ridwatch_core::enums::{EventType, HostType};
use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_core::events::ReceptionEvent;
use ridwatch_core::records::DropReason;
use ridwatch_core::types::{Position, ReceiverId};

/// Columns every event log must carry.
pub const REQUIRED_COLUMNS: [&str; 14] = [
    "time",
    "event_type",
    "host_id",
    "serial_number",
    "rid_timestamp",
    "pos_x",
    "pos_y",
    "pos_z",
    "rid_pos_x",
    "rid_pos_y",
    "rid_pos_z",
    "rssi",
    "is_spoofed",
    "host_type",
];

/// Per-file load statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub rows_read: usize,
    pub tx_rows: usize,
    pub rx_rows: usize,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl LoadStats {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn merge(&mut self, other: &LoadStats) {
        self.rows_read += other.rows_read;
        self.tx_rows += other.tx_rows;
        self.rx_rows += other.rx_rows;
        for (reason, count) in &other.dropped {
            *self.dropped.entry(*reason).or_insert(0) += count;
        }
    }

    fn drop_row(&mut self, reason: DropReason) {
        *self.dropped.entry(reason).or_insert(0) += 1;
    }
}

/// Everything read from one event log.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    pub events: Vec<ReceptionEvent>,
    pub hosts: BTreeMap<ReceiverId, HostType>,
    pub stats: LoadStats,
}

/// Resolved column indices for one header.
struct ColumnMap {
    time: usize,
    event_type: usize,
    host_id: usize,
    serial_number: usize,
    rid_timestamp: usize,
    pos: [usize; 3],
    rid_pos: [usize; 3],
    rssi: usize,
    is_spoofed: usize,
    host_type: usize,
    rid_speed_vertical: Option<usize>,
    rid_speed_horizontal: Option<usize>,
    rid_heading: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord, source: &Path) -> EngineResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| EngineError::MissingColumn {
                path: source.to_path_buf(),
                column: name.to_string(),
            })
        };

        Ok(Self {
            time: require("time")?,
            event_type: require("event_type")?,
            host_id: require("host_id")?,
            serial_number: require("serial_number")?,
            rid_timestamp: require("rid_timestamp")?,
            pos: [require("pos_x")?, require("pos_y")?, require("pos_z")?],
            rid_pos: [
                require("rid_pos_x")?,
                require("rid_pos_y")?,
                require("rid_pos_z")?,
            ],
            rssi: require("rssi")?,
            is_spoofed: require("is_spoofed")?,
            host_type: require("host_type")?,
            rid_speed_vertical: find("rid_speed_vertical"),
            rid_speed_horizontal: find("rid_speed_horizontal"),
            rid_heading: find("rid_heading"),
        })
    }
}

/// Read an event log from a file path.
pub fn read_event_log_file(path: &Path) -> EngineResult<ParsedLog> {
    let file = File::open(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_event_log(file, path)
}

/// Read an event log from any reader. `source` only labels diagnostics.
pub fn read_event_log<R: io::Read>(reader: R, source: &Path) -> EngineResult<ParsedLog> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| EngineError::Csv {
        path: source.to_path_buf(),
        message: format!("failed to read header: {e}"),
    })?;
    let columns = ColumnMap::from_headers(headers, source)?;

    let mut log = ParsedLog::default();

    for (idx, result) in rdr.records().enumerate() {
        log.stats.rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(source = %source.display(), row = idx, error = %e, "unreadable row");
                log.stats.drop_row(DropReason::UnreadableRow);
                continue;
            }
        };

        // Host roles come from every row, TX included.
        if let Ok(host_id) = parse_id(&record, columns.host_id) {
            let host_type = HostType::parse(field(&record, columns.host_type));
            log.hosts
                .entry(host_id)
                .and_modify(|t| {
                    if *t == HostType::Unknown {
                        *t = host_type;
                    }
                })
                .or_insert(host_type);
        }

        match EventType::parse(field(&record, columns.event_type)) {
            Some(EventType::Tx) => {
                log.stats.tx_rows += 1;
            }
            Some(EventType::Rx) => {
                log.stats.rx_rows += 1;
                match parse_reception(&record, &columns) {
                    Ok(event) => log.events.push(event),
                    Err(reason) => {
                        debug!(source = %source.display(), row = idx, ?reason, "dropped RX row");
                        log.stats.drop_row(reason);
                    }
                }
            }
            None => {
                log.stats.drop_row(DropReason::InvalidField);
            }
        }
    }

    let dropped = log.stats.dropped_total();
    if dropped > 0 {
        warn!(
            source = %source.display(),
            dropped,
            rows = log.stats.rows_read,
            "dropped malformed rows"
        );
    }

    Ok(log)
}

fn parse_reception(record: &StringRecord, columns: &ColumnMap) -> Result<ReceptionEvent, DropReason> {
    let event = ReceptionEvent {
        time: parse_f64(record, columns.time)?,
        receiver_id: parse_id(record, columns.host_id)?,
        receiver_type: HostType::parse(field(record, columns.host_type)),
        receiver_pos: parse_position(record, columns.pos)?,
        tx_serial_number: parse_id(record, columns.serial_number)?,
        tx_timestamp_ms: parse_i64(record, columns.rid_timestamp)?,
        claimed_pos: parse_position(record, columns.rid_pos)?,
        claimed_speed_vertical: parse_optional_f64(record, columns.rid_speed_vertical),
        claimed_speed_horizontal: parse_optional_f64(record, columns.rid_speed_horizontal),
        claimed_heading: parse_optional_f64(record, columns.rid_heading),
        rssi_dbm: parse_f64(record, columns.rssi)?,
        is_spoofed: parse_flag(record, columns.is_spoofed)?,
    };

    if !event.is_physically_valid() {
        return Err(DropReason::NonFiniteValue);
    }
    Ok(event)
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

fn parse_f64(record: &StringRecord, idx: usize) -> Result<f64, DropReason> {
    let raw = field(record, idx);
    if raw.is_empty() {
        return Err(DropReason::MissingField);
    }
    raw.parse::<f64>().map_err(|_| DropReason::InvalidField)
}

fn parse_optional_f64(record: &StringRecord, idx: Option<usize>) -> Option<f64> {
    idx.and_then(|i| field(record, i).parse::<f64>().ok())
}

/// Integer field; tolerates an integral float rendering such as `12.0`.
fn parse_i64(record: &StringRecord, idx: usize) -> Result<i64, DropReason> {
    let raw = field(record, idx);
    if raw.is_empty() {
        return Err(DropReason::MissingField);
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        _ => Err(DropReason::InvalidField),
    }
}

fn parse_id(record: &StringRecord, idx: usize) -> Result<u32, DropReason> {
    let v = parse_i64(record, idx)?;
    u32::try_from(v).map_err(|_| DropReason::InvalidField)
}

fn parse_flag(record: &StringRecord, idx: usize) -> Result<bool, DropReason> {
    match field(record, idx) {
        "" => Err(DropReason::MissingField),
        "1" | "1.0" | "true" | "True" | "TRUE" => Ok(true),
        "0" | "0.0" | "false" | "False" | "FALSE" => Ok(false),
        _ => Err(DropReason::InvalidField),
    }
}

fn parse_position(record: &StringRecord, idx: [usize; 3]) -> Result<Position, DropReason> {
    Ok(Position::new(
        parse_f64(record, idx[0])?,
        parse_f64(record, idx[1])?,
        parse_f64(record, idx[2])?,
    ))
}
