pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# STAKEOUT CONFIGURATION
# =============================================================================
# This file configures sensor identity, traffic filtering, and import tuning.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/stakeout/config.yml
#   3. /etc/stakeout/config.yml

# UUID of the Zeek sensor these logs came from. Network-scoped identifiers
# are derived from it, so keep it stable per sensor.
# sensor_uuid: "00000000-0000-0000-0000-000000000000"

filtering:
  # Subnets considered local to the monitored network.
  internal_subnets:
    - "10.0.0.0/8"
    - "172.16.0.0/12"
    - "192.168.0.0/16"

  # Pairs touching these subnets are always kept, even internal-to-internal.
  always_include_subnets: []

  # Pairs touching these subnets are dropped before they reach any table.
  never_include_subnets: []

  # Domain rules match exactly or by "*.example.com" suffix wildcard.
  always_include_domains: []
  never_include_domains: []

  # Also mark external-to-internal connections as filtered.
  filter_external_to_internal: false

import:
  # Rolling databases keep only the most recent N days of logs.
  retention_days: 15

  # At most this many HTTP requests per Zeek UID reach the final table.
  http_requests_per_uid: 20

  # Bulk-writer flushes per second (token bucket; burst equals the rate).
  writer_rate_limit: 5

  # Rows per writer batch.
  batch_size: 1000

  # Worker count per pool; 0 selects max(4, N_cpu/2).
  workers: 0

storage:
  # Path of the column-store database file.
  path: "stakeout.duckdb"
"#
    .to_string()
}
