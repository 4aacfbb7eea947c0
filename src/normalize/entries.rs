//! Database-shaped rows, one type per table. Every entry carries the
//! import stamp (`import_time`, `import_id`), the hashed Zeek UID, and a
//! domain-specific row hash used by the store's dedup key.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct ConnEntry {
    pub import_time: DateTime<Utc>,
    pub import_id: String,
    pub zeek_uid_hash: String,
    pub hash: String,
    pub ts: i64,
    pub src: String,
    pub src_nuid: String,
    pub dst: String,
    pub dst_nuid: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub proto: String,
    pub service: String,
    pub duration: f64,
    pub src_local: bool,
    pub dst_local: bool,
    pub src_bytes: u64,
    pub dst_bytes: u64,
    pub src_ip_bytes: u64,
    pub dst_ip_bytes: u64,
    pub src_packets: u64,
    pub dst_packets: u64,
    pub conn_state: String,
    pub missed_bytes: u64,
    pub icmp_type: u16,
    pub icmp_code: u16,
    /// Kept in tmp for joining but excluded from the final table.
    pub filtered: bool,
    /// Synthesized from an HTTP row whose host header was empty.
    pub missing_host_header: bool,
    pub missing_host_useragent: String,
}

#[derive(Debug, Clone, Default)]
pub struct HttpEntry {
    pub import_time: DateTime<Utc>,
    pub import_id: String,
    pub zeek_uid_hash: String,
    pub hash: String,
    pub ts: i64,
    pub src: String,
    pub src_nuid: String,
    pub dst: String,
    pub dst_nuid: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub method: String,
    pub host: String,
    pub uri: String,
    pub referrer: String,
    pub useragent: String,
    pub status_code: u64,
    pub proxied: Vec<String>,
    pub resp_mime_types: Vec<String>,
    // Connection-level fields, inherited from the joined conn row
    pub duration: f64,
    pub src_bytes: u64,
    pub dst_bytes: u64,
    pub src_packets: u64,
    pub dst_packets: u64,
    pub conn_state: String,
    /// Set on every row after the most recent one sharing a UID.
    pub multi_request: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SslEntry {
    pub import_time: DateTime<Utc>,
    pub import_id: String,
    pub zeek_uid_hash: String,
    pub hash: String,
    pub ts: i64,
    pub src: String,
    pub src_nuid: String,
    pub dst: String,
    pub dst_nuid: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub server_name: String,
    pub version: String,
    pub cipher: String,
    pub validation_status: String,
    pub ja3: String,
    // Connection-level fields, inherited from the joined conn row
    pub duration: f64,
    pub src_bytes: u64,
    pub dst_bytes: u64,
    pub src_packets: u64,
    pub dst_packets: u64,
    pub conn_state: String,
}

#[derive(Debug, Clone, Default)]
pub struct DnsEntry {
    pub import_time: DateTime<Utc>,
    pub import_id: String,
    pub zeek_uid_hash: String,
    pub hash: String,
    pub ts: i64,
    pub src: String,
    pub src_nuid: String,
    pub dst: String,
    pub dst_nuid: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub query: String,
    pub qtype: u64,
    pub qtype_name: String,
    pub rcode: u64,
    pub rcode_name: String,
    pub answers: Vec<String>,
}

/// One row per DNS A-record answer that parsed as an address.
#[derive(Debug, Clone, Default)]
pub struct PdnsEntry {
    pub import_time: DateTime<Utc>,
    pub import_id: String,
    pub zeek_uid_hash: String,
    /// Shares the parent DNS row's hash.
    pub hash: String,
    pub ts: i64,
    pub src: String,
    pub src_nuid: String,
    pub dst: String,
    pub dst_nuid: String,
    pub query: String,
    pub resolved_ip: String,
}
