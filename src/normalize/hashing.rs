//! 128-bit identifiers for rows, files, and network entities.
//!
//! Every key in the pipeline is a SHA-256 digest truncated to 16 bytes and
//! rendered as 32 lowercase hex characters. Collision probability stays
//! negligible at ten years of retention.

use sha2::{Digest, Sha256};
use std::net::IpAddr;
use uuid::Uuid;

/// Rendered width of every hash in the pipeline.
pub const HASH_HEX_LEN: usize = 32;

fn hex128(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(HASH_HEX_LEN);
    for byte in &digest[..16] {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Hash an arbitrary string key (file paths, Zeek UIDs).
pub fn string_hash(input: &str) -> String {
    hex128(&[input.as_bytes()])
}

/// Stable import identifier derived from the chunk's start timestamp.
pub fn import_id(started_at_micros: i64) -> String {
    hex128(&[started_at_micros.to_string().as_bytes()])
}

/// Widen an address to its 16-byte IPv4-mapped-IPv6 form.
pub fn ip16(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// Network-scoped unique ID: the address namespaced by the sensor UUID.
pub fn nuid(ip: IpAddr, sensor: Uuid) -> String {
    hex128(&[&ip16(ip), sensor.as_bytes()])
}

/// Row hash for connection records.
pub fn conn_row_hash(src: IpAddr, src_nuid: &str, dst: IpAddr, dst_nuid: &str) -> String {
    hex128(&[
        &ip16(src),
        src_nuid.as_bytes(),
        &ip16(dst),
        dst_nuid.as_bytes(),
    ])
}

/// Row hash for records keyed by a server name: HTTP host, TLS SNI, or a
/// DNS query string.
pub fn fqdn_row_hash(
    src: IpAddr,
    src_nuid: &str,
    dst: IpAddr,
    dst_nuid: &str,
    fqdn: &str,
) -> String {
    hex128(&[
        &ip16(src),
        src_nuid.as_bytes(),
        &ip16(dst),
        dst_nuid.as_bytes(),
        fqdn.as_bytes(),
    ])
}

/// Seasoning recomputes SSL row hashes from the client side and the SNI only.
pub fn sni_row_hash(src: IpAddr, src_nuid: &str, server_name: &str) -> String {
    hex128(&[&ip16(src), src_nuid.as_bytes(), server_name.as_bytes()])
}
