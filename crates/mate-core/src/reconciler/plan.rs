//! Pure diff computation
//!
//! Nothing in here talks to a provider. Given the desired endpoints and a
//! zone snapshot, [`plan_sync`] decides which record sets to add and which to
//! delete so that the names owned by one record group end up equal to the
//! desired names.

use std::collections::BTreeMap;
use std::net::IpAddr;

use tracing::{debug, trace, warn};

use crate::ownership::{Ownership, OwnershipMarker};
use crate::record::{Change, Endpoint, RecordSet, RecordType, ZoneEntry, ZoneSnapshot};

/// Group endpoints by absolute name
///
/// Endpoints without a name are dropped.
pub fn group_by_name(endpoints: &[Endpoint]) -> BTreeMap<String, Vec<IpAddr>> {
    let mut grouped: BTreeMap<String, Vec<IpAddr>> = BTreeMap::new();
    for endpoint in endpoints {
        if let Err(e) = endpoint.validate() {
            warn!("Ignoring endpoint: {}", e);
            continue;
        }
        grouped
            .entry(endpoint.fqdn())
            .or_default()
            .push(endpoint.address);
    }
    grouped
}

/// Address record sets for one name, one per address family
pub fn address_records(name: &str, addresses: &[IpAddr], ttl: u32) -> Vec<RecordSet> {
    let (v4, v6): (Vec<IpAddr>, Vec<IpAddr>) = addresses.iter().copied().partition(|ip| ip.is_ipv4());
    let mut records = Vec::with_capacity(2);
    if !v4.is_empty() {
        records.push(RecordSet::address(name, RecordType::A, v4, ttl));
    }
    if !v6.is_empty() {
        records.push(RecordSet::address(name, RecordType::Aaaa, v6, ttl));
    }
    records
}

/// Address records followed by the paired ownership marker
pub fn managed_records(
    name: &str,
    addresses: &[IpAddr],
    marker: &OwnershipMarker,
    ttl: u32,
) -> Vec<RecordSet> {
    let mut records = address_records(name, addresses, ttl);
    records.push(marker.record(name, ttl));
    records
}

/// Records at an owned name, addresses first, exactly as read
pub fn existing_records(entry: &ZoneEntry) -> Vec<RecordSet> {
    let mut records = sorted_addresses(entry);
    records.extend(entry.marker.iter().cloned());
    records
}

fn sorted_addresses(entry: &ZoneEntry) -> Vec<RecordSet> {
    let mut addresses = entry.addresses.clone();
    addresses.sort_by(|a, b| a.record_type.cmp(&b.record_type));
    addresses
}

/// Whether an address record set carries the same data as a desired one
///
/// Values are compared as sorted lists so provider ordering never causes a
/// spurious rewrite.
fn same_addresses(current: &[RecordSet], wanted: &[RecordSet]) -> bool {
    if current.len() != wanted.len() {
        return false;
    }
    current.iter().zip(wanted.iter()).all(|(c, w)| {
        let mut have = c.values.clone();
        let mut want = w.values.clone();
        have.sort();
        want.sort();
        c.record_type == w.record_type && c.ttl == w.ttl && have == want
    })
}

/// Compute the change that makes the owned names equal the desired ones
///
/// - Desired names that don't exist are claimed.
/// - Desired names we own are rewritten only when their records differ.
/// - Owned names that are no longer desired are deleted.
/// - Everything else is left alone, even when it collides with a desired name.
pub fn plan_sync(
    desired: &[Endpoint],
    current: &ZoneSnapshot,
    marker: &OwnershipMarker,
    ttl: u32,
) -> Change {
    let mut change = Change::new();
    let desired = group_by_name(desired);

    for (name, addresses) in &desired {
        let entry = current.get(name);
        match marker.classify(entry) {
            Ownership::Available => {
                trace!("Claiming {}", name);
                change
                    .additions
                    .extend(managed_records(name, addresses, marker, ttl));
            }
            Ownership::Owned => {
                let Some(entry) = entry else { continue };
                plan_owned(name, addresses, entry, marker, ttl, &mut change);
            }
            ownership => {
                debug!("Skipping {}: not ours ({:?})", name, ownership);
            }
        }
    }

    for (name, entry) in current.iter() {
        if desired.contains_key(name) {
            continue;
        }
        if marker.classify(Some(entry)) == Ownership::Owned {
            trace!("Releasing {}", name);
            change.deletions.extend(existing_records(entry));
        }
    }

    change
}

fn plan_owned(
    name: &str,
    addresses: &[IpAddr],
    entry: &ZoneEntry,
    marker: &OwnershipMarker,
    ttl: u32,
    change: &mut Change,
) {
    let wanted = address_records(name, addresses, ttl);
    let current = sorted_addresses(entry);
    let marker_current = entry.marker.as_ref().is_some_and(|m| m.ttl == ttl);

    if marker_current && same_addresses(&current, &wanted) {
        trace!("{} is up to date", name);
        return;
    }

    if current.is_empty() {
        warn!("{} has our marker but no address records, restoring them", name);
    } else {
        debug!("Refreshing {}", name);
    }

    change.deletions.extend(existing_records(entry));
    change
        .additions
        .extend(managed_records(name, addresses, marker, ttl));
}
