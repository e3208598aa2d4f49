//! Resource matching, duplicate detection and the derived-artifact
//! staleness convention.
//!
//! A derived resource is matched to its source by exact name and
//! case-insensitive format. Its `last_modified` is always stamped as the
//! source's modification time plus one second, which doubles as a cheap
//! causality marker: when a candidate's timestamp already equals
//! `source + 1s` the conversion is up to date and the upload is skipped.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::ckan::Resource;

/// Parse the catalog's naive ISO-8601 timestamps (microsecond precision,
/// no timezone); tolerates a full RFC 3339 string as well.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|t| t.naive_utc())
        })
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    if value.nanosecond() == 0 {
        value.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// The moment a resource last changed: `last_modified` when set, else
/// `created`. Empty strings count as unset, matching the catalog's habit
/// of returning `""` for never-modified resources.
pub fn last_event(resource: &Resource) -> Option<NaiveDateTime> {
    resource
        .last_modified
        .as_deref()
        .filter(|v| !v.is_empty())
        .or(resource.created.as_deref())
        .filter(|v| !v.is_empty())
        .and_then(parse_timestamp)
}

/// `last_event + 1s`, the timestamp a derived artifact of this resource
/// gets stamped with.
pub fn next_event(resource: &Resource) -> Option<NaiveDateTime> {
    last_event(resource).map(|t| t + Duration::seconds(1))
}

/// True when the derived resource already carries the source's `+1s`
/// marker, i.e. re-converting would reproduce what the catalog holds.
pub fn is_current(derived: &Resource, source: &Resource) -> bool {
    match (last_event(derived), next_event(source)) {
        (Some(derived_at), Some(expected)) => derived_at == expected,
        _ => false,
    }
}

/// Find the resource a (name, format) pair should update, if any.
/// Name matches exactly, format case-insensitively.
pub fn find_existing<'a>(
    resources: &'a [Resource],
    name: &str,
    format: &str,
) -> Option<&'a Resource> {
    resources
        .iter()
        .find(|r| r.name == name && r.format.eq_ignore_ascii_case(format))
}

/// Detect leftovers of prior partial runs: for every group of resources
/// sharing a name, the most recently modified one is canonical and the
/// rest are returned for deletion. Ties keep the first-listed resource.
pub fn stale_duplicates(resources: &[Resource]) -> Vec<&Resource> {
    let mut groups: HashMap<&str, Vec<&Resource>> = HashMap::new();
    for resource in resources {
        groups.entry(resource.name.as_str()).or_default().push(resource);
    }

    let mut stale = Vec::new();
    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|r| Reverse(last_event(r).unwrap_or(NaiveDateTime::MIN)));
        stale.extend(group.into_iter().skip(1));
    }
    stale
}

/// Name for a derived artifact: the source name upper-cased, with `CSV`
/// swapped for the target format when present, else the format appended.
pub fn derived_name(source_name: &str, format: &str) -> String {
    let upper = source_name.to_uppercase();
    if upper.contains("CSV") {
        upper.replace("CSV", format)
    } else {
        format!("{upper} - {format}")
    }
}
