//! Listing row + print page details -> [`Reservation`].
//!
//! # Identity policy
//!
//! The source exposes no stable id, so records are keyed by content:
//!
//! ```text
//! key = hex(sha256("v1" 0x1F facility 0x1F date 0x1F place 0x1F event))
//! ```
//!
//! `date` is the canonical date produced by [`canonical_date`]. Changing the
//! tuple or the hash invalidates every stored key; bump the version when doing so.

use crate::error::RowError;
use crate::models::{DetailMap, IdentityKey, Reservation};
use crate::scrapers::types::{ListingFields, RawListingRow};
use chrono::NaiveDate;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::debug;

pub const IDENTITY_POLICY_VERSION: &str = "v1";

const FIELD_SEPARATOR: char = '\u{1f}';

/// Detail key holding the combined `YYYYMMDD ~ YYYYMMDD HH:MM ~ HH:MM` range
pub const DATETIME_RANGE_KEY: &str = "datetime_range";
pub const START_TIME_KEY: &str = "start_time";
pub const END_TIME_KEY: &str = "end_time";

fn time_range() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"^\d{8}~\d{8}(\d{2}:\d{2})~(\d{2}:\d{2})$").expect("static regex")
    })
}

fn parse_compact_date(token: &str) -> Option<NaiveDate> {
    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = token[0..4].parse().ok()?;
    let month = token[4..6].parse().ok()?;
    let day = token[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `YYYYMMDD ~ YYYYMMDD` -> start date as `YYYY-MM-DD`.
///
/// An unparseable start token is returned as-is.
pub fn canonical_date(date_range: &str) -> String {
    let start = date_range.split('~').next().unwrap_or_default().trim();
    match parse_compact_date(start) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => {
            debug!("Unparseable start date '{}', keeping raw token", start);
            start.to_string()
        }
    }
}

/// Adds `start_time`/`end_time` from the combined date-time range, if present.
/// Existing `start_time`/`end_time` values are left untouched.
pub fn derive_times(details: &mut DetailMap) {
    let Some(range) = details.get(DATETIME_RANGE_KEY) else {
        return;
    };

    let compact: String = range.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(caps) = time_range().captures(&compact) else {
        return;
    };

    let start = caps[1].to_string();
    let end = caps[2].to_string();
    details.entry(START_TIME_KEY.to_string()).or_insert(start);
    details.entry(END_TIME_KEY.to_string()).or_insert(end);
}

pub fn identity_key(facility: &str, date: &str, place: &str, event: &str) -> IdentityKey {
    let mut hasher = Sha256::new();
    for (i, part) in [IDENTITY_POLICY_VERSION, facility, date, place, event]
        .iter()
        .enumerate()
    {
        if i > 0 {
            let mut buf = [0u8; 4];
            hasher.update(FIELD_SEPARATOR.encode_utf8(&mut buf).as_bytes());
        }
        hasher.update(part.as_bytes());
    }
    IdentityKey::new(hex::encode(hasher.finalize()))
}

/// Builds the reservation for one listing row of `facility`.
pub fn normalize(
    facility: &str,
    row: &RawListingRow,
    mut details: DetailMap,
) -> Result<Reservation, RowError> {
    let fields = ListingFields::try_from(row)?;
    let date = canonical_date(&fields.date_range);
    let key = identity_key(facility, &date, &fields.place, &fields.event);

    derive_times(&mut details);

    Ok(Reservation {
        facility: facility.to_string(),
        key,
        date,
        place: fields.place,
        department: fields.department,
        event: fields.event,
        approval: fields.approval,
        detail_url: row.detail_url.clone().unwrap_or_default(),
        details,
    })
}
