pub mod entries;
pub mod hashing;

use crate::filter::{DomainVerdict, FilterPolicy};
use crate::zeek::records::{ConnRecord, DnsRecord, HttpRecord, SslRecord};
use chrono::{DateTime, Utc};
use entries::{ConnEntry, DnsEntry, HttpEntry, PdnsEntry, SslEntry};
use std::net::IpAddr;
use tracing::warn;
use uuid::Uuid;

/// Converts parsed Zeek records into storage entries for one hour chunk:
/// derives namespaced network IDs, computes row hashes, and applies the
/// filter policy. Dropped records return `None`.
#[derive(Debug, Clone)]
pub struct Normalizer {
    policy: FilterPolicy,
    sensor: Uuid,
    import_time: DateTime<Utc>,
    import_id: String,
}

struct Pair {
    src: IpAddr,
    src_nuid: String,
    dst: IpAddr,
    dst_nuid: String,
}

impl Normalizer {
    pub fn new(
        policy: FilterPolicy,
        sensor: Uuid,
        import_time: DateTime<Utc>,
        import_id: String,
    ) -> Self {
        Self {
            policy,
            sensor,
            import_time,
            import_id,
        }
    }

    pub fn import_id(&self) -> &str {
        &self.import_id
    }

    fn pair(&self, orig_h: &str, resp_h: &str, source: Option<&std::sync::Arc<str>>) -> Option<Pair> {
        let src: IpAddr = match orig_h.parse() {
            Ok(ip) => ip,
            Err(_) => {
                warn!(
                    addr = orig_h,
                    source = source.map(|s| s.as_ref()).unwrap_or(""),
                    "dropping record with unparsable source address"
                );
                return None;
            }
        };
        let dst: IpAddr = match resp_h.parse() {
            Ok(ip) => ip,
            Err(_) => {
                warn!(
                    addr = resp_h,
                    source = source.map(|s| s.as_ref()).unwrap_or(""),
                    "dropping record with unparsable destination address"
                );
                return None;
            }
        };
        Some(Pair {
            src,
            src_nuid: hashing::nuid(src, self.sensor),
            dst,
            dst_nuid: hashing::nuid(dst, self.sensor),
        })
    }

    fn stamp(&self) -> (DateTime<Utc>, String) {
        (self.import_time, self.import_id.clone())
    }

    /// Connection records always reach the tmp table unless a never-include
    /// rule matches; the direction policy only sets the `filtered` flag so
    /// application-layer joins still find their parent row.
    pub fn conn(&self, rec: ConnRecord) -> Option<ConnEntry> {
        let pair = self.pair(&rec.orig_h, &rec.resp_h, rec.source.as_ref())?;

        if self.policy.never_included(pair.src, pair.dst) {
            return None;
        }

        let (import_time, import_id) = self.stamp();
        let (icmp_type, icmp_code) = if rec.proto == "icmp" {
            (rec.orig_p, rec.resp_p)
        } else {
            (0, 0)
        };

        Some(ConnEntry {
            import_time,
            import_id,
            zeek_uid_hash: hashing::string_hash(&rec.uid),
            hash: hashing::conn_row_hash(pair.src, &pair.src_nuid, pair.dst, &pair.dst_nuid),
            ts: rec.ts,
            src: pair.src.to_string(),
            dst: pair.dst.to_string(),
            src_port: rec.orig_p,
            dst_port: rec.resp_p,
            proto: rec.proto,
            service: rec.service,
            duration: rec.duration,
            src_local: self.policy.is_internal(pair.src),
            dst_local: self.policy.is_internal(pair.dst),
            src_bytes: rec.orig_bytes,
            dst_bytes: rec.resp_bytes,
            src_ip_bytes: rec.orig_ip_bytes,
            dst_ip_bytes: rec.resp_ip_bytes,
            src_packets: rec.orig_pkts,
            dst_packets: rec.resp_pkts,
            conn_state: rec.conn_state,
            missed_bytes: rec.missed_bytes,
            icmp_type,
            icmp_code,
            filtered: self.policy.filter_pair(pair.src, pair.dst),
            missing_host_header: false,
            missing_host_useragent: String::new(),
            src_nuid: pair.src_nuid,
            dst_nuid: pair.dst_nuid,
        })
    }

    /// DNS queries without a dot are sensor-local noise and are dropped,
    /// as are queries excluded by domain or pair policy. Type-A answers
    /// that parse as addresses expand into passive-DNS rows.
    pub fn dns(&self, rec: DnsRecord) -> Option<(DnsEntry, Vec<PdnsEntry>)> {
        if !rec.query.contains('.') {
            return None;
        }

        let pair = self.pair(&rec.orig_h, &rec.resp_h, rec.source.as_ref())?;

        match self.policy.domain_verdict(&rec.query) {
            DomainVerdict::Drop => return None,
            DomainVerdict::Keep => {}
            DomainVerdict::Neutral => {
                if self.policy.filter_pair(pair.src, pair.dst) {
                    return None;
                }
            }
        }

        let (import_time, import_id) = self.stamp();
        let zeek_uid_hash = hashing::string_hash(&rec.uid);
        let hash = hashing::fqdn_row_hash(
            pair.src,
            &pair.src_nuid,
            pair.dst,
            &pair.dst_nuid,
            &rec.query,
        );

        let mut pdns = Vec::new();
        if rec.qtype_name == "A" {
            for answer in &rec.answers {
                if answer.parse::<IpAddr>().is_ok() {
                    pdns.push(PdnsEntry {
                        import_time,
                        import_id: import_id.clone(),
                        zeek_uid_hash: zeek_uid_hash.clone(),
                        hash: hash.clone(),
                        ts: rec.ts,
                        src: pair.src.to_string(),
                        src_nuid: pair.src_nuid.clone(),
                        dst: pair.dst.to_string(),
                        dst_nuid: pair.dst_nuid.clone(),
                        query: rec.query.clone(),
                        resolved_ip: answer.clone(),
                    });
                }
            }
        }

        let entry = DnsEntry {
            import_time,
            import_id,
            zeek_uid_hash,
            hash,
            ts: rec.ts,
            src: pair.src.to_string(),
            src_nuid: pair.src_nuid,
            dst: pair.dst.to_string(),
            dst_nuid: pair.dst_nuid,
            src_port: rec.orig_p,
            dst_port: rec.resp_p,
            query: rec.query,
            qtype: rec.qtype,
            qtype_name: rec.qtype_name,
            rcode: rec.rcode,
            rcode_name: rec.rcode_name,
            answers: rec.answers,
        };

        Some((entry, pdns))
    }

    /// CONNECT requests talk to a proxy, so only the source side is held
    /// to the internal-match rule; everything else gets the pair filter.
    /// Empty-host rows survive only for internal sources (they feed the
    /// missing-host synthesis during seasoning).
    pub fn http(&self, rec: HttpRecord) -> Option<HttpEntry> {
        let pair = self.pair(&rec.orig_h, &rec.resp_h, rec.source.as_ref())?;

        if rec.host.is_empty() && !self.policy.is_internal(pair.src) {
            return None;
        }

        let verdict = if rec.host.is_empty() {
            DomainVerdict::Neutral
        } else {
            self.policy.domain_verdict(&rec.host)
        };
        match verdict {
            DomainVerdict::Drop => return None,
            DomainVerdict::Keep => {}
            DomainVerdict::Neutral => {
                let filtered = if rec.method == "CONNECT" {
                    self.policy.filter_single(pair.src)
                } else {
                    self.policy.filter_pair(pair.src, pair.dst)
                };
                if filtered {
                    return None;
                }
            }
        }

        let (import_time, import_id) = self.stamp();
        Some(HttpEntry {
            import_time,
            import_id,
            zeek_uid_hash: hashing::string_hash(&rec.uid),
            hash: hashing::fqdn_row_hash(
                pair.src,
                &pair.src_nuid,
                pair.dst,
                &pair.dst_nuid,
                &rec.host,
            ),
            ts: rec.ts,
            src: pair.src.to_string(),
            src_nuid: pair.src_nuid,
            dst: pair.dst.to_string(),
            dst_nuid: pair.dst_nuid,
            src_port: rec.orig_p,
            dst_port: rec.resp_p,
            method: rec.method,
            host: rec.host,
            uri: rec.uri,
            referrer: rec.referrer,
            useragent: rec.user_agent,
            status_code: rec.status_code,
            proxied: rec.proxied,
            resp_mime_types: rec.resp_mime_types,
            duration: 0.0,
            src_bytes: 0,
            dst_bytes: 0,
            src_packets: 0,
            dst_packets: 0,
            conn_state: String::new(),
            multi_request: false,
        })
    }

    /// TLS handshakes without an SNI carry nothing to score on.
    pub fn ssl(&self, rec: SslRecord) -> Option<SslEntry> {
        if rec.server_name.is_empty() {
            return None;
        }

        let pair = self.pair(&rec.orig_h, &rec.resp_h, rec.source.as_ref())?;

        match self.policy.domain_verdict(&rec.server_name) {
            DomainVerdict::Drop => return None,
            DomainVerdict::Keep => {}
            DomainVerdict::Neutral => {
                if self.policy.filter_pair(pair.src, pair.dst) {
                    return None;
                }
            }
        }

        let (import_time, import_id) = self.stamp();
        Some(SslEntry {
            import_time,
            import_id,
            zeek_uid_hash: hashing::string_hash(&rec.uid),
            hash: hashing::fqdn_row_hash(
                pair.src,
                &pair.src_nuid,
                pair.dst,
                &pair.dst_nuid,
                &rec.server_name,
            ),
            ts: rec.ts,
            src: pair.src.to_string(),
            src_nuid: pair.src_nuid,
            dst: pair.dst.to_string(),
            dst_nuid: pair.dst_nuid,
            src_port: rec.orig_p,
            dst_port: rec.resp_p,
            server_name: rec.server_name,
            version: rec.version,
            cipher: rec.cipher,
            validation_status: rec.validation_status,
            ja3: rec.ja3,
            duration: 0.0,
            src_bytes: 0,
            dst_bytes: 0,
            src_packets: 0,
            dst_packets: 0,
            conn_state: String::new(),
        })
    }
}
