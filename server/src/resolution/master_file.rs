//! Turns DoH json answers into resource records by writing them as
//! master-file lines and reading them back with the zonefile scanner.
//! The scanner rejects data that is not valid for the record type.

use bytes::Bytes;
use domain::{
    base::{
        iana::Rtype,
        rdata::{ComposeRecordData, UnknownRecordData},
        Record,
    },
    rdata::ZoneRecordData,
    zonefile::inplace::{Entry, ScannedRecord, Zonefile},
};
use std::io::Cursor;

use super::record_type::RecordType;

/// A resource record reconstructed from a DoH answer.
pub type DohRecord = ScannedRecord;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to parse record `{line}`. {reason}")]
pub struct RecordParseError {
    pub line: String,
    pub reason: String,
}

/// Formats `<name> <TTL> IN <mnemonic> <data>`.
pub fn synthesize_line(name: &str, ttl: u32, rtype: RecordType, data: &str) -> String {
    format!("{name} {ttl} IN {} {data}", rtype.mnemonic())
}

/**
 * Builds the resource record for one DoH answer.
 * The record type decides how `data` is read. SPF data is read as TXT
 * and the record is then emitted with the SPF type code.
 */
pub fn answer_to_record(name: &str, ttl: u32, rtype: RecordType, data: &str) -> Result<DohRecord, RecordParseError> {
    let line = synthesize_line(name, ttl, rtype, data);
    if is_multiline(name) || is_multiline(data) {
        return Err(RecordParseError {
            line,
            reason: "Answer spans more than one line.".to_string(),
        });
    }
    let presentation = rtype.presentation_type();
    let scanned_line = synthesize_line(name, ttl, presentation, data);

    let record = parse_record(&scanned_line).map_err(|e| RecordParseError {
        line: line.clone(),
        reason: e.reason,
    })?;

    if record.rtype().to_int() != presentation.code() {
        return Err(RecordParseError {
            line,
            reason: format!("Scanned type {} does not match.", record.rtype()),
        });
    }

    if presentation == rtype {
        return Ok(record);
    }
    retag(record, Rtype::from_int(rtype.code())).map_err(|reason| RecordParseError { line, reason })
}

/// Parses a single master-file line into a record.
pub fn parse_record(line: &str) -> Result<DohRecord, RecordParseError> {
    if is_multiline(line) {
        return Err(RecordParseError {
            line: line.to_string(),
            reason: "Expected a single line.".to_string(),
        });
    }
    parse_line(line).map_err(|reason| RecordParseError {
        line: line.to_string(),
        reason,
    })
}

fn is_multiline(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

fn parse_line(line: &str) -> Result<DohRecord, String> {
    // Relative names are completed with the root like any resolver would.
    let zone = format!("$ORIGIN .\n{line}\n");
    let mut cursor = Cursor::new(zone.into_bytes());
    let zone = Zonefile::load(&mut cursor).map_err(|e| e.to_string())?;

    let mut records: Vec<DohRecord> = vec![];
    for entry in zone.into_iter() {
        match entry.map_err(|e| e.to_string())? {
            Entry::Record(record) => records.push(record),
            Entry::Include { .. } => return Err("$INCLUDE is not allowed in record data.".to_string()),
        }
    }

    match records.len() {
        1 => Ok(records.remove(0)),
        0 => Err("No record found.".to_string()),
        count => Err(format!("Expected exactly one record but found {count}.")),
    }
}

/// Moves the wire rdata of `record` into a record of another type.
fn retag(record: DohRecord, rtype: Rtype) -> Result<DohRecord, String> {
    let class = record.class();
    let ttl = record.ttl();
    let (owner, data) = record.into_owner_and_data();

    let mut rdata: Vec<u8> = Vec::new();
    data.compose_rdata(&mut rdata)
        .map_err(|_| "Failed to compose record data.".to_string())?;
    let unknown = UnknownRecordData::from_octets(rtype, Bytes::from(rdata)).map_err(|e| e.to_string())?;

    Ok(Record::new(owner, class, ttl, ZoneRecordData::Unknown(unknown)))
}
