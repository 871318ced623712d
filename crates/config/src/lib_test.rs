use std::time::Duration;

use crate::{
    Config, InitialPosition, InputConfig, OutputTarget, PartitionKeyField,
};

const FULL_CONFIG: &str = r#"
[input]
type = "file"
path = "streams/raw.frames"
initial_position = "LATEST"

[input.checkpoint_settings]
max_batch_size = 100
max_batch_wait = "5s"

[output.good]
type = "tcp"
target = "collector.internal:7402"
partition_key = "domain_userid"
delay_threshold = "150ms"
max_batch_size = 250
max_batch_bytes = 1048576

[output.good.backoff_policy]
min_backoff = "50ms"
max_backoff = "5s"

[output.pii]
type = "file"
path = "streams/pii.frames"
partition_key = "event_id"

[output.bad]
type = "file"
path = "streams/bad.frames"

[[enrichments]]
type = "event_fingerprint"

[[enrichments]]
type = "campaign_attribution"

[[enrichments]]
type = "ip_lookup"
database_uri = "https://assets.example.com/geo/prefixes.tsv"

[[enrichments]]
type = "pii_pseudonymization"
fields = ["user_id", "user_ipaddress"]

[assets]
update_period = "7d"
directory = "var/assets"
fetch_timeout = "30s"

[monitoring.metrics]
period = "10s"
stdout = true

[monitoring.metrics.statsd]
host = "statsd.internal"
port = 8125
prefix = "sluice"

[monitoring.metrics.statsd.tags]
env = "prod"

[monitoring.exception]
endpoint = "https://errors.example.com/report"

[pipeline]
concurrency = 32
ordered = true
shutdown_timeout = "10s"
"#;

#[test]
fn parses_a_full_document() {
    let config = Config::from_str(FULL_CONFIG).unwrap();

    match &config.input {
        InputConfig::File {
            initial_position,
            checkpoint_settings,
            ..
        } => {
            assert_eq!(*initial_position, InitialPosition::Latest);
            assert_eq!(checkpoint_settings.max_batch_size, 100);
            assert_eq!(checkpoint_settings.max_batch_wait, Duration::from_secs(5));
        }
        other => panic!("expected file input, got {other:?}"),
    }

    assert_eq!(
        config.output.good.partition_key,
        Some(PartitionKeyField::DomainUserid)
    );
    assert_eq!(config.output.good.delay_threshold, Duration::from_millis(150));
    assert_eq!(
        config.output.good.backoff_policy.min_backoff,
        Duration::from_millis(50)
    );
    assert!(config.output.pii.is_some());
    assert!(matches!(config.output.bad.target, OutputTarget::File { .. }));

    assert_eq!(config.enrichments.len(), 4);
    assert_eq!(config.enrichments[2].kind(), "ip_lookup");

    let statsd = config.monitoring.metrics.statsd.as_ref().unwrap();
    assert_eq!(statsd.host, "statsd.internal");
    assert_eq!(statsd.tags["env"], "prod");

    assert_eq!(config.pipeline.concurrency, 32);
    assert!(config.pipeline.ordered);
}

#[test]
fn empty_document_gets_defaults() {
    let config = Config::from_str("").unwrap();

    assert!(matches!(config.input, InputConfig::Stdin));
    assert!(matches!(config.output.good.target, OutputTarget::Stdout));
    assert!(config.output.pii.is_none());
    assert_eq!(config.output.good.max_batch_size, 500);
    assert_eq!(config.output.good.max_batch_bytes, 5 * 1024 * 1024);
    assert_eq!(config.output.good.record_byte_limit, 6_900_000);
    assert_eq!(
        config.output.good.delay_threshold,
        Duration::from_millis(200)
    );
    assert_eq!(
        config.output.good.backoff_policy.min_backoff,
        Duration::from_millis(100)
    );
    assert_eq!(
        config.output.good.backoff_policy.max_backoff,
        Duration::from_secs(10)
    );
    assert_eq!(
        config.assets.update_period,
        Duration::from_secs(7 * 24 * 60 * 60)
    );
    assert_eq!(config.pipeline.concurrency, 64);
    assert!(!config.pipeline.ordered);
    assert_eq!(config.monitoring.metrics.period, Duration::from_secs(10));
    assert!(config.monitoring.metrics.stdout);
}

#[test]
fn rejects_unknown_partition_key_field() {
    let err = Config::from_str(
        r#"
[output.good]
type = "stdout"
partition_key = "se_value"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("partition_key"), "{err}");
}

#[test]
fn rejects_non_pii_capable_field() {
    let err = Config::from_str(
        r#"
[[enrichments]]
type = "pii_pseudonymization"
fields = ["app_id"]
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("not a pii-capable field"), "{err}");
}

#[test]
fn rejects_inverted_backoff() {
    let err = Config::from_str(
        r#"
[output.good]
type = "stdout"

[output.good.backoff_policy]
min_backoff = "20s"
max_backoff = "1s"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("min_backoff exceeds max_backoff"));
}

#[test]
fn rejects_zero_concurrency() {
    let err = Config::from_str("[pipeline]\nconcurrency = 0\n").unwrap_err();
    assert!(err.to_string().contains("concurrency"));
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = Config::from_str("[outputs]\n").unwrap_err();
    assert!(err.to_string().contains("unknown field") || err.to_string().contains("outputs"));
}
