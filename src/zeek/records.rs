//! Typed record shapes for the supported Zeek logs.
//!
//! Each record declares a `const` table mapping Zeek field names and types
//! to struct slots; the header parser builds a per-column permutation into
//! that table, so steady-state parsing never inspects field names. Open
//! logs (`open_conn`, …) share these shapes and differ only in the table
//! they are written to.

use super::fields::{FieldSpec, FieldValue, ZeekType};
use std::sync::Arc;

/// A typed Zeek record the scanner can populate slot by slot.
pub trait ZeekRecord: Default + Clone + Send + 'static {
    /// Field table: `(zeek_name, zeek_type, slot)` per supported field.
    const FIELDS: &'static [FieldSpec];

    fn set_field(&mut self, slot: usize, value: FieldValue);

    /// Breadcrumb naming the file this record came from.
    fn set_source(&mut self, source: &Arc<str>);
    fn source(&self) -> Option<&Arc<str>>;
}

const fn spec(name: &'static str, ty: ZeekType, slot: usize) -> FieldSpec {
    FieldSpec { name, ty, slot }
}

/// conn.log: one row per tracked connection.
#[derive(Debug, Clone, Default)]
pub struct ConnRecord {
    pub source: Option<Arc<str>>,
    pub ts: i64,
    pub uid: String,
    pub orig_h: String,
    pub orig_p: u16,
    pub resp_h: String,
    pub resp_p: u16,
    pub proto: String,
    pub service: String,
    pub duration: f64,
    pub orig_bytes: u64,
    pub resp_bytes: u64,
    pub conn_state: String,
    pub local_orig: bool,
    pub local_resp: bool,
    pub missed_bytes: u64,
    pub history: String,
    pub orig_pkts: u64,
    pub orig_ip_bytes: u64,
    pub resp_pkts: u64,
    pub resp_ip_bytes: u64,
}

impl ZeekRecord for ConnRecord {
    const FIELDS: &'static [FieldSpec] = &[
        spec("ts", ZeekType::Time, 0),
        spec("uid", ZeekType::String, 1),
        spec("id.orig_h", ZeekType::Addr, 2),
        spec("id.orig_p", ZeekType::Port, 3),
        spec("id.resp_h", ZeekType::Addr, 4),
        spec("id.resp_p", ZeekType::Port, 5),
        spec("proto", ZeekType::Enum, 6),
        spec("service", ZeekType::String, 7),
        spec("duration", ZeekType::Interval, 8),
        spec("orig_bytes", ZeekType::Count, 9),
        spec("resp_bytes", ZeekType::Count, 10),
        spec("conn_state", ZeekType::String, 11),
        spec("local_orig", ZeekType::Bool, 12),
        spec("local_resp", ZeekType::Bool, 13),
        spec("missed_bytes", ZeekType::Count, 14),
        spec("history", ZeekType::String, 15),
        spec("orig_pkts", ZeekType::Count, 16),
        spec("orig_ip_bytes", ZeekType::Count, 17),
        spec("resp_pkts", ZeekType::Count, 18),
        spec("resp_ip_bytes", ZeekType::Count, 19),
    ];

    fn set_field(&mut self, slot: usize, value: FieldValue) {
        use FieldValue::*;
        match (slot, value) {
            (0, Time(v)) => self.ts = v,
            (1, Str(v)) => self.uid = v,
            (2, Str(v)) => self.orig_h = v,
            (3, Port(v)) => self.orig_p = v,
            (4, Str(v)) => self.resp_h = v,
            (5, Port(v)) => self.resp_p = v,
            (6, Str(v)) => self.proto = v,
            (7, Str(v)) => self.service = v,
            (8, Interval(v)) => self.duration = v,
            (9, Count(v)) => self.orig_bytes = v,
            (10, Count(v)) => self.resp_bytes = v,
            (11, Str(v)) => self.conn_state = v,
            (12, Bool(v)) => self.local_orig = v,
            (13, Bool(v)) => self.local_resp = v,
            (14, Count(v)) => self.missed_bytes = v,
            (15, Str(v)) => self.history = v,
            (16, Count(v)) => self.orig_pkts = v,
            (17, Count(v)) => self.orig_ip_bytes = v,
            (18, Count(v)) => self.resp_pkts = v,
            (19, Count(v)) => self.resp_ip_bytes = v,
            _ => {}
        }
    }

    fn set_source(&mut self, source: &Arc<str>) {
        self.source = Some(source.clone());
    }

    fn source(&self) -> Option<&Arc<str>> {
        self.source.as_ref()
    }
}

/// dns.log: one row per DNS query/response pair.
#[derive(Debug, Clone, Default)]
pub struct DnsRecord {
    pub source: Option<Arc<str>>,
    pub ts: i64,
    pub uid: String,
    pub orig_h: String,
    pub orig_p: u16,
    pub resp_h: String,
    pub resp_p: u16,
    pub proto: String,
    pub trans_id: u64,
    pub rtt: f64,
    pub query: String,
    pub qclass: u64,
    pub qclass_name: String,
    pub qtype: u64,
    pub qtype_name: String,
    pub rcode: u64,
    pub rcode_name: String,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub z: u64,
    pub answers: Vec<String>,
    pub ttls: Vec<f64>,
    pub rejected: bool,
}

impl ZeekRecord for DnsRecord {
    const FIELDS: &'static [FieldSpec] = &[
        spec("ts", ZeekType::Time, 0),
        spec("uid", ZeekType::String, 1),
        spec("id.orig_h", ZeekType::Addr, 2),
        spec("id.orig_p", ZeekType::Port, 3),
        spec("id.resp_h", ZeekType::Addr, 4),
        spec("id.resp_p", ZeekType::Port, 5),
        spec("proto", ZeekType::Enum, 6),
        spec("trans_id", ZeekType::Count, 7),
        spec("rtt", ZeekType::Interval, 8),
        spec("query", ZeekType::String, 9),
        spec("qclass", ZeekType::Count, 10),
        spec("qclass_name", ZeekType::String, 11),
        spec("qtype", ZeekType::Count, 12),
        spec("qtype_name", ZeekType::String, 13),
        spec("rcode", ZeekType::Count, 14),
        spec("rcode_name", ZeekType::String, 15),
        spec("AA", ZeekType::Bool, 16),
        spec("TC", ZeekType::Bool, 17),
        spec("RD", ZeekType::Bool, 18),
        spec("RA", ZeekType::Bool, 19),
        spec("Z", ZeekType::Count, 20),
        spec("answers", ZeekType::VectorString, 21),
        spec("TTLs", ZeekType::VectorInterval, 22),
        spec("rejected", ZeekType::Bool, 23),
    ];

    fn set_field(&mut self, slot: usize, value: FieldValue) {
        use FieldValue::*;
        match (slot, value) {
            (0, Time(v)) => self.ts = v,
            (1, Str(v)) => self.uid = v,
            (2, Str(v)) => self.orig_h = v,
            (3, Port(v)) => self.orig_p = v,
            (4, Str(v)) => self.resp_h = v,
            (5, Port(v)) => self.resp_p = v,
            (6, Str(v)) => self.proto = v,
            (7, Count(v)) => self.trans_id = v,
            (8, Interval(v)) => self.rtt = v,
            (9, Str(v)) => self.query = v,
            (10, Count(v)) => self.qclass = v,
            (11, Str(v)) => self.qclass_name = v,
            (12, Count(v)) => self.qtype = v,
            (13, Str(v)) => self.qtype_name = v,
            (14, Count(v)) => self.rcode = v,
            (15, Str(v)) => self.rcode_name = v,
            (16, Bool(v)) => self.authoritative = v,
            (17, Bool(v)) => self.truncated = v,
            (18, Bool(v)) => self.recursion_desired = v,
            (19, Bool(v)) => self.recursion_available = v,
            (20, Count(v)) => self.z = v,
            (21, StrList(v)) => self.answers = v,
            (22, IntervalList(v)) => self.ttls = v,
            (23, Bool(v)) => self.rejected = v,
            _ => {}
        }
    }

    fn set_source(&mut self, source: &Arc<str>) {
        self.source = Some(source.clone());
    }

    fn source(&self) -> Option<&Arc<str>> {
        self.source.as_ref()
    }
}

/// http.log: one row per HTTP request/response on a connection.
#[derive(Debug, Clone, Default)]
pub struct HttpRecord {
    pub source: Option<Arc<str>>,
    pub ts: i64,
    pub uid: String,
    pub orig_h: String,
    pub orig_p: u16,
    pub resp_h: String,
    pub resp_p: u16,
    pub trans_depth: u64,
    pub method: String,
    pub host: String,
    pub uri: String,
    pub referrer: String,
    pub version: String,
    pub user_agent: String,
    pub origin: String,
    pub request_body_len: u64,
    pub response_body_len: u64,
    pub status_code: u64,
    pub status_msg: String,
    pub username: String,
    pub proxied: Vec<String>,
    pub orig_mime_types: Vec<String>,
    pub resp_fuids: Vec<String>,
    pub resp_mime_types: Vec<String>,
}

impl ZeekRecord for HttpRecord {
    const FIELDS: &'static [FieldSpec] = &[
        spec("ts", ZeekType::Time, 0),
        spec("uid", ZeekType::String, 1),
        spec("id.orig_h", ZeekType::Addr, 2),
        spec("id.orig_p", ZeekType::Port, 3),
        spec("id.resp_h", ZeekType::Addr, 4),
        spec("id.resp_p", ZeekType::Port, 5),
        spec("trans_depth", ZeekType::Count, 6),
        spec("method", ZeekType::String, 7),
        spec("host", ZeekType::String, 8),
        spec("uri", ZeekType::String, 9),
        spec("referrer", ZeekType::String, 10),
        spec("version", ZeekType::String, 11),
        spec("user_agent", ZeekType::String, 12),
        spec("origin", ZeekType::String, 13),
        spec("request_body_len", ZeekType::Count, 14),
        spec("response_body_len", ZeekType::Count, 15),
        spec("status_code", ZeekType::Count, 16),
        spec("status_msg", ZeekType::String, 17),
        spec("username", ZeekType::String, 18),
        spec("proxied", ZeekType::SetString, 19),
        spec("orig_mime_types", ZeekType::VectorString, 20),
        spec("resp_fuids", ZeekType::VectorString, 21),
        spec("resp_mime_types", ZeekType::VectorString, 22),
    ];

    fn set_field(&mut self, slot: usize, value: FieldValue) {
        use FieldValue::*;
        match (slot, value) {
            (0, Time(v)) => self.ts = v,
            (1, Str(v)) => self.uid = v,
            (2, Str(v)) => self.orig_h = v,
            (3, Port(v)) => self.orig_p = v,
            (4, Str(v)) => self.resp_h = v,
            (5, Port(v)) => self.resp_p = v,
            (6, Count(v)) => self.trans_depth = v,
            (7, Str(v)) => self.method = v,
            (8, Str(v)) => self.host = v,
            (9, Str(v)) => self.uri = v,
            (10, Str(v)) => self.referrer = v,
            (11, Str(v)) => self.version = v,
            (12, Str(v)) => self.user_agent = v,
            (13, Str(v)) => self.origin = v,
            (14, Count(v)) => self.request_body_len = v,
            (15, Count(v)) => self.response_body_len = v,
            (16, Count(v)) => self.status_code = v,
            (17, Str(v)) => self.status_msg = v,
            (18, Str(v)) => self.username = v,
            (19, StrList(v)) => self.proxied = v,
            (20, StrList(v)) => self.orig_mime_types = v,
            (21, StrList(v)) => self.resp_fuids = v,
            (22, StrList(v)) => self.resp_mime_types = v,
            _ => {}
        }
    }

    fn set_source(&mut self, source: &Arc<str>) {
        self.source = Some(source.clone());
    }

    fn source(&self) -> Option<&Arc<str>> {
        self.source.as_ref()
    }
}

/// ssl.log: one row per TLS handshake.
#[derive(Debug, Clone, Default)]
pub struct SslRecord {
    pub source: Option<Arc<str>>,
    pub ts: i64,
    pub uid: String,
    pub orig_h: String,
    pub orig_p: u16,
    pub resp_h: String,
    pub resp_p: u16,
    pub version: String,
    pub cipher: String,
    pub curve: String,
    pub server_name: String,
    pub resumed: bool,
    pub established: bool,
    pub subject: String,
    pub issuer: String,
    pub validation_status: String,
    pub ja3: String,
    pub ja3s: String,
}

impl ZeekRecord for SslRecord {
    const FIELDS: &'static [FieldSpec] = &[
        spec("ts", ZeekType::Time, 0),
        spec("uid", ZeekType::String, 1),
        spec("id.orig_h", ZeekType::Addr, 2),
        spec("id.orig_p", ZeekType::Port, 3),
        spec("id.resp_h", ZeekType::Addr, 4),
        spec("id.resp_p", ZeekType::Port, 5),
        spec("version", ZeekType::String, 6),
        spec("cipher", ZeekType::String, 7),
        spec("curve", ZeekType::String, 8),
        spec("server_name", ZeekType::String, 9),
        spec("resumed", ZeekType::Bool, 10),
        spec("established", ZeekType::Bool, 11),
        spec("subject", ZeekType::String, 12),
        spec("issuer", ZeekType::String, 13),
        spec("validation_status", ZeekType::String, 14),
        spec("ja3", ZeekType::String, 15),
        spec("ja3s", ZeekType::String, 16),
    ];

    fn set_field(&mut self, slot: usize, value: FieldValue) {
        use FieldValue::*;
        match (slot, value) {
            (0, Time(v)) => self.ts = v,
            (1, Str(v)) => self.uid = v,
            (2, Str(v)) => self.orig_h = v,
            (3, Port(v)) => self.orig_p = v,
            (4, Str(v)) => self.resp_h = v,
            (5, Port(v)) => self.resp_p = v,
            (6, Str(v)) => self.version = v,
            (7, Str(v)) => self.cipher = v,
            (8, Str(v)) => self.curve = v,
            (9, Str(v)) => self.server_name = v,
            (10, Bool(v)) => self.resumed = v,
            (11, Bool(v)) => self.established = v,
            (12, Str(v)) => self.subject = v,
            (13, Str(v)) => self.issuer = v,
            (14, Str(v)) => self.validation_status = v,
            (15, Str(v)) => self.ja3 = v,
            (16, Str(v)) => self.ja3s = v,
            _ => {}
        }
    }

    fn set_source(&mut self, source: &Arc<str>) {
        self.source = Some(source.clone());
    }

    fn source(&self) -> Option<&Arc<str>> {
        self.source.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_tables_have_unique_slots_and_names() {
        fn check(fields: &[FieldSpec]) {
            let mut names: Vec<_> = fields.iter().map(|f| f.name).collect();
            let mut slots: Vec<_> = fields.iter().map(|f| f.slot).collect();
            names.sort_unstable();
            names.dedup();
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(names.len(), fields.len());
            assert_eq!(slots.len(), fields.len());
        }
        check(ConnRecord::FIELDS);
        check(DnsRecord::FIELDS);
        check(HttpRecord::FIELDS);
        check(SslRecord::FIELDS);
    }

    #[test]
    fn test_set_field_routes_by_slot() {
        let mut conn = ConnRecord::default();
        conn.set_field(0, FieldValue::Time(1700000000));
        conn.set_field(1, FieldValue::Str("CAbc123".to_string()));
        conn.set_field(9, FieldValue::Count(512));
        assert_eq!(conn.ts, 1700000000);
        assert_eq!(conn.uid, "CAbc123");
        assert_eq!(conn.orig_bytes, 512);
    }

    #[test]
    fn test_mismatched_value_is_ignored() {
        let mut dns = DnsRecord::default();
        dns.set_field(9, FieldValue::Count(7));
        assert_eq!(dns.query, "");
    }
}
