use chrono::{TimeZone, Utc};
use mtlsgate::pki::metadata::{parse_openssl_time, split_subject};
use proptest::prelude::*;

fn key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("C".to_string()),
        Just("ST".to_string()),
        Just("L".to_string()),
        Just("O".to_string()),
        Just("OU".to_string()),
        Just("CN".to_string()),
        Just("emailAddress".to_string()),
    ]
}

fn plain_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9@][A-Za-z0-9@ .-]{0,14}[A-Za-z0-9.]"
}

/// A value as OpenSSL would print it, and the value it stands for.
fn value() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        plain_value().prop_map(|v| (v.clone(), v)),
        (plain_value(), plain_value())
            .prop_map(|(a, b)| (format!("{a}\\, {b}"), format!("{a}, {b}"))),
        (plain_value(), plain_value())
            .prop_map(|(a, b)| (format!("\"{a}, {b}\""), format!("{a}, {b}"))),
    ]
}

proptest! {
    #[test]
    fn subject_round_trips(pairs in prop::collection::vec((key(), value()), 1..8)) {
        let line = pairs
            .iter()
            .map(|(key, (printed, _))| format!("{key} = {printed}"))
            .collect::<Vec<_>>()
            .join(", ");

        let parsed = split_subject(&line).unwrap();

        let expected: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(key, (_, value))| (key, value))
            .collect();
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn split_subject_never_panics(line in "\\PC*") {
        let _ = split_subject(&line);
    }

    #[test]
    fn openssl_times_parse(secs in 0i64..4_102_444_800i64) {
        let when = Utc.timestamp_opt(secs, 0).unwrap();
        let printed = when.format("%b %e %H:%M:%S %Y GMT").to_string();
        prop_assert_eq!(parse_openssl_time(&printed), Some(when));
    }
}
