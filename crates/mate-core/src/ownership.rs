//! TXT-record ownership protocol
//!
//! Every name mate manages carries a TXT record set with exactly two values:
//! the heritage tag shared by all mate instances, and the record group id of
//! the instance that owns it. Ownership is recomputed from the zone on every
//! cycle; there is no other ledger.
//!
//! ```text
//! a.example.com. 300 A   1.2.3.4
//! a.example.com. 300 TXT "heritage=mate" "mate/record-group-id=g1"
//! ```

use crate::record::{RecordSet, RecordType, ZoneEntry};

/// Tag identifying records written by any mate instance
pub const HERITAGE_TAG: &str = "heritage=mate";

/// Prefix of the value carrying the record group id
pub const GROUP_PREFIX: &str = "mate/record-group-id=";

/// Who manages a name, as far as this instance can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The name does not exist in the zone; we may claim it
    Available,
    /// The name exists without any TXT record; someone else wrote it
    Unmanaged,
    /// The name carries our marker
    Owned,
    /// The name carries a TXT record that is not our marker
    Foreign,
}

impl Ownership {
    /// Whether the reconciler may write records at this name
    pub fn is_writable(self) -> bool {
        matches!(self, Ownership::Available | Ownership::Owned)
    }
}

/// The marker of one record group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipMarker {
    group_id: String,
}

impl OwnershipMarker {
    /// Create the marker for a record group
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
        }
    }

    /// The configured record group id
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// The two TXT values identifying this group
    pub fn values(&self) -> Vec<String> {
        vec![
            HERITAGE_TAG.to_string(),
            format!("{}{}", GROUP_PREFIX, self.group_id),
        ]
    }

    /// The marker record written next to every managed name
    pub fn record(&self, name: impl Into<String>, ttl: u32) -> RecordSet {
        RecordSet::new(name, RecordType::Txt, self.values(), ttl)
    }

    /// Whether a TXT record set is exactly our marker
    ///
    /// Providers may hand TXT data back wrapped in double quotes; those are
    /// stripped before comparing.
    pub fn is_owned(&self, record: Option<&RecordSet>) -> bool {
        let Some(record) = record else {
            return false;
        };
        if record.record_type != RecordType::Txt || record.values.len() != 2 {
            return false;
        }
        let expected = self.values();
        record
            .values
            .iter()
            .zip(expected.iter())
            .all(|(actual, expected)| unquote(actual) == expected)
    }

    /// Classify a zone entry; `None` means the name does not exist
    pub fn classify(&self, entry: Option<&ZoneEntry>) -> Ownership {
        match entry {
            None => Ownership::Available,
            Some(ZoneEntry { marker: None, .. }) => Ownership::Unmanaged,
            Some(ZoneEntry {
                marker: Some(marker),
                ..
            }) => {
                if self.is_owned(Some(marker)) {
                    Ownership::Owned
                } else {
                    Ownership::Foreign
                }
            }
        }
    }
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txt(values: &[&str]) -> RecordSet {
        RecordSet::new(
            "a.example.com.",
            RecordType::Txt,
            values.iter().map(|v| v.to_string()).collect(),
            300,
        )
    }

    #[test]
    fn marker_values_match_wire_format() {
        let marker = OwnershipMarker::new("g1");
        assert_eq!(
            marker.values(),
            vec!["heritage=mate", "mate/record-group-id=g1"]
        );
    }

    #[test]
    fn exact_marker_is_owned() {
        let marker = OwnershipMarker::new("g1");
        assert!(marker.is_owned(Some(&txt(&["heritage=mate", "mate/record-group-id=g1"]))));
    }

    #[test]
    fn quoted_marker_is_owned() {
        let marker = OwnershipMarker::new("g1");
        assert!(marker.is_owned(Some(&txt(&[
            "\"heritage=mate\"",
            "\"mate/record-group-id=g1\""
        ]))));
    }

    #[test]
    fn other_group_is_not_owned() {
        let marker = OwnershipMarker::new("g1");
        assert!(!marker.is_owned(Some(&txt(&["heritage=mate", "mate/record-group-id=g2"]))));
    }

    #[test]
    fn wrong_shape_is_not_owned() {
        let marker = OwnershipMarker::new("g1");
        assert!(!marker.is_owned(None));
        assert!(!marker.is_owned(Some(&txt(&["heritage=mate"]))));
        assert!(!marker.is_owned(Some(&txt(&[
            "heritage=mate",
            "mate/record-group-id=g1",
            "extra"
        ]))));
        assert!(!marker.is_owned(Some(&txt(&["mate/record-group-id=g1", "heritage=mate"]))));

        let mut a_record = txt(&["heritage=mate", "mate/record-group-id=g1"]);
        a_record.record_type = RecordType::A;
        assert!(!marker.is_owned(Some(&a_record)));
    }

    #[test]
    fn classify_covers_every_state() {
        let marker = OwnershipMarker::new("g1");

        assert_eq!(marker.classify(None), Ownership::Available);

        let unmarked = ZoneEntry::default();
        assert_eq!(marker.classify(Some(&unmarked)), Ownership::Unmanaged);

        let ours = ZoneEntry {
            addresses: Vec::new(),
            marker: Some(marker.record("a.example.com.", 300)),
        };
        assert_eq!(marker.classify(Some(&ours)), Ownership::Owned);

        let theirs = ZoneEntry {
            addresses: Vec::new(),
            marker: Some(OwnershipMarker::new("g2").record("a.example.com.", 300)),
        };
        assert_eq!(marker.classify(Some(&theirs)), Ownership::Foreign);

        let spf = ZoneEntry {
            addresses: Vec::new(),
            marker: Some(txt(&["v=spf1 -all"])),
        };
        assert_eq!(marker.classify(Some(&spf)), Ownership::Foreign);
    }

    #[test]
    fn only_available_and_owned_are_writable() {
        assert!(Ownership::Available.is_writable());
        assert!(Ownership::Owned.is_writable());
        assert!(!Ownership::Unmanaged.is_writable());
        assert!(!Ownership::Foreign.is_writable());
    }
}
