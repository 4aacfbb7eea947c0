pub mod fields;
pub mod header;
pub mod records;
pub mod scan;

pub use fields::{FieldSpec, FieldValue, ZeekType};
pub use header::{HeaderError, LogFormat, ZeekHeader};
pub use records::{ConnRecord, DnsRecord, HttpRecord, SslRecord, ZeekRecord};
pub use scan::{ScanError, Scanner, MALFORMED_LINE_BUDGET};
