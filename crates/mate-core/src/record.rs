//! Record types shared by the reconciler and every zone provider
//!
//! - [`Endpoint`]: a desired `name → address` mapping from the registry
//! - [`RecordSet`]: one resource record set as read from or written to a zone
//! - [`Change`]: a batch of additions and deletions
//! - [`ZoneSnapshot`]: what a provider currently serves, keyed by name

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Normalize a DNS name to lowercase absolute form (`a.example.com.`)
///
/// Providers return absolute names, registries usually don't; every zone
/// key goes through this function.
pub fn absolute_name(name: &str) -> String {
    let name = name.trim().to_ascii_lowercase();
    if name.ends_with('.') {
        name
    } else {
        format!("{}.", name)
    }
}

/// A desired DNS mapping produced by the endpoint registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// Fully-qualified DNS name
    pub name: String,
    /// Address to publish
    pub address: IpAddr,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    /// Create an endpoint from an address literal
    pub fn parse(name: impl Into<String>, address: &str) -> crate::Result<Self> {
        let name = name.into();
        if !has_name(&name) {
            return Err(crate::Error::invalid_input("Endpoint name cannot be empty"));
        }
        let address = address.trim().parse().map_err(|_| {
            crate::Error::invalid_input(format!("Invalid address for {}: {}", name, address))
        })?;
        Ok(Self { name, address })
    }

    /// Check that the endpoint names something below the root
    ///
    /// `new` and deserialization accept any name; an empty one would turn
    /// into the root `.` as a zone key.
    pub fn validate(&self) -> crate::Result<()> {
        if has_name(&self.name) {
            Ok(())
        } else {
            Err(crate::Error::invalid_input(format!(
                "Endpoint without a name: {}",
                self.address
            )))
        }
    }

    /// The endpoint name as a zone key
    pub fn fqdn(&self) -> String {
        absolute_name(&self.name)
    }

    /// Record type this endpoint's address is published as
    pub fn record_type(&self) -> RecordType {
        match self.address {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }
}

fn has_name(name: &str) -> bool {
    !matches!(name.trim(), "" | ".")
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.address)
    }
}

/// DNS record type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Text record (carries the ownership marker)
    Txt,
    /// Anything else the zone contains (CNAME, MX, SOA, ...)
    Other(String),
}

impl RecordType {
    /// Wire name of the type
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Txt => "TXT",
            RecordType::Other(other) => other,
        }
    }

    /// Whether records of this type carry endpoint addresses
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }
}

impl From<&str> for RecordType {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "TXT" => RecordType::Txt,
            other => RecordType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource record set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordSet {
    /// Absolute record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record data, in provider order
    pub values: Vec<String>,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl RecordSet {
    /// Create a record set
    pub fn new(
        name: impl Into<String>,
        record_type: RecordType,
        values: Vec<String>,
        ttl: u32,
    ) -> Self {
        Self {
            name: name.into(),
            record_type,
            values,
            ttl,
        }
    }

    /// Build an address record set from a group of addresses of one family
    ///
    /// Values are sorted and de-duplicated so the same endpoints always
    /// produce the same record set.
    pub fn address(
        name: impl Into<String>,
        record_type: RecordType,
        addresses: impl IntoIterator<Item = IpAddr>,
        ttl: u32,
    ) -> Self {
        let mut addresses: Vec<IpAddr> = addresses.into_iter().collect();
        addresses.sort();
        addresses.dedup();
        Self::new(
            name,
            record_type,
            addresses.into_iter().map(|ip| ip.to_string()).collect(),
            ttl,
        )
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {:?}",
            self.name, self.ttl, self.record_type, self.values
        )
    }
}

/// A batch of mutations submitted to a provider in one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Change {
    /// Record sets to create
    pub additions: Vec<RecordSet>,
    /// Record sets to delete, exactly as read from the zone
    pub deletions: Vec<RecordSet>,
}

impl Change {
    /// Create an empty change
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the change contains no mutations
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }
}

/// Records currently served at one name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneEntry {
    /// A/AAAA record sets at this name
    pub addresses: Vec<RecordSet>,
    /// The TXT record set at this name, if any
    pub marker: Option<RecordSet>,
}

/// The provider's view of a zone
///
/// A name missing from the snapshot does not exist. A name present with
/// `marker: None` exists but is not managed by anyone using the ownership
/// protocol. The two cases must never be conflated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneSnapshot {
    entries: BTreeMap<String, ZoneEntry>,
}

impl ZoneSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a record set read from the provider
    ///
    /// Every type registers its name as present; only address and TXT
    /// records are kept.
    pub fn insert(&mut self, record: RecordSet) {
        let entry = self.entries.entry(absolute_name(&record.name)).or_default();
        match record.record_type {
            RecordType::A | RecordType::Aaaa => entry.addresses.push(record),
            RecordType::Txt => entry.marker = Some(record),
            RecordType::Other(_) => {}
        }
    }

    /// Look up the entry for a name
    pub fn get(&self, name: &str) -> Option<&ZoneEntry> {
        self.entries.get(&absolute_name(name))
    }

    /// Whether the name exists in the zone
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&absolute_name(name))
    }

    /// Iterate over all names and their entries, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ZoneEntry)> {
        self.entries.iter()
    }

    /// Number of names in the zone
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the zone has no names
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RecordSet> for ZoneSnapshot {
    fn from_iter<T: IntoIterator<Item = RecordSet>>(iter: T) -> Self {
        let mut snapshot = ZoneSnapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}
