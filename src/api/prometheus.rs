use crate::cache::{PollStats, ReadingSnapshot};
use crate::metering_energomera::structs::RegisterSpec;
use chrono::{DateTime, Utc};
use std::fmt::Write;

const PREFIX: &str = "energomera";
/// Value emitted for declared series the snapshot has no reading for
const MISSING_VALUE: &str = "0";

fn write_header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Renders the snapshot in the Prometheus text exposition format.
///
/// Every register and sub name of `catalog` is written, whether the
/// snapshot holds a value for it or not.
pub fn render_metrics(snapshot: &ReadingSnapshot, stats: &PollStats, catalog: &[RegisterSpec], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {PREFIX} metrics");

    let name = format!("{PREFIX}_time_since_last_update");
    write_header(&mut out, &name, "Seconds since the last successful poll cycle", "gauge");
    let _ = writeln!(out, "{name} {:.3}", stats.seconds_since_success(now));

    let name = format!("{PREFIX}_poll_success_total");
    write_header(&mut out, &name, "Number of successful poll cycles", "counter");
    let _ = writeln!(out, "{name} {}", stats.successful_polls);

    let name = format!("{PREFIX}_poll_failure_total");
    write_header(&mut out, &name, "Number of failed poll cycles", "counter");
    let _ = writeln!(out, "{name} {}", stats.failed_polls);

    for spec in catalog {
        let name = format!("{PREFIX}_{}", spec.name);
        write_header(&mut out, &name, &spec.describe_family(), "gauge");
        for sub_name in spec.sub_names {
            let value = snapshot.get(spec.name, sub_name).unwrap_or(MISSING_VALUE);
            let _ = writeln!(out, "{name}{{phase=\"{sub_name}\"}} {value}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering_energomera::meter_definitions::REGISTER_CATALOG;
    use crate::cache::ReadingCache;
    use crate::metering_energomera::structs::{PollResult, Reading};
    use chrono::Duration;

    fn snapshot() -> ReadingSnapshot {
        ReadingSnapshot::from_poll(PollResult {
            identity: "CE301".to_string(),
            serial_number: "1".to_string(),
            readings: vec![
                Reading { register_name: "frequency".to_string(), sub_name: "total".to_string(), raw_value: "50.00".to_string() },
                Reading { register_name: "voltage".to_string(), sub_name: "a".to_string(), raw_value: "230.12".to_string() },
            ],
        })
    }

    #[test]
    fn test_render_values() {
        let snap = snapshot();
        let stats = PollStats {
            successful_polls: 4,
            failed_polls: 1,
            last_success: Some(snap.captured_at),
            started_at: snap.captured_at - Duration::seconds(60),
        };
        let text = render_metrics(&snap, &stats, &REGISTER_CATALOG, snap.captured_at + Duration::milliseconds(1500));

        assert!(text.starts_with("# energomera metrics\n"));
        assert!(text.contains("energomera_time_since_last_update 1.500\n"));
        assert!(text.contains("energomera_poll_success_total 4\n"));
        assert!(text.contains("energomera_poll_failure_total 1\n"));
        assert!(text.contains("energomera_frequency{phase=\"total\"} 50.00\n"));
        assert!(text.contains("energomera_voltage{phase=\"a\"} 230.12\n"));
        assert!(text.contains("# HELP energomera_voltage Voltage on phase A, B, C\n"));
        assert!(text.contains("# TYPE energomera_voltage gauge\n"));
        assert!(text.contains("energomera_voltage{phase=\"b\"} 0\n"));
    }

    #[test]
    fn test_render_empty_snapshot_keeps_every_series() {
        let snap = ReadingSnapshot::failed("Timeout".to_string());
        let stats = PollStats::new(snap.captured_at - Duration::milliseconds(4200));
        let text = render_metrics(&snap, &stats, &REGISTER_CATALOG, snap.captured_at);

        // no success yet, counted from startup
        assert!(text.contains("energomera_time_since_last_update 4.200\n"));
        for spec in REGISTER_CATALOG.iter() {
            for sub in spec.sub_names {
                let line = format!("energomera_{}{{phase=\"{}\"}} 0\n", spec.name, sub);
                assert!(text.contains(&line), "missing {line}");
            }
        }

        let families = text.lines().filter(|l| l.starts_with("# TYPE energomera_") && l.ends_with(" gauge")).count();
        assert_eq!(families, REGISTER_CATALOG.len() + 1);
    }

    #[test]
    fn test_failed_cycle_does_not_reset_update_gauge() {
        let cache = ReadingCache::new();
        cache.publish(snapshot());
        let success = cache.stats().last_success.unwrap();

        let (snap, stats) = cache.view();
        let text = render_metrics(&snap, &stats, &REGISTER_CATALOG, success + Duration::seconds(5));
        assert!(text.contains("energomera_time_since_last_update 5.000\n"));

        cache.publish(ReadingSnapshot::failed("Timeout while waiting for frame terminator".to_string()));
        let (snap, stats) = cache.view();
        let text = render_metrics(&snap, &stats, &REGISTER_CATALOG, success + Duration::seconds(15));
        assert!(text.contains("energomera_time_since_last_update 15.000\n"));
        assert!(text.contains("energomera_poll_failure_total 1\n"));
        assert!(text.contains("energomera_frequency{phase=\"total\"} 0\n"));
    }
}
