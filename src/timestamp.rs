//! Sortable, strictly increasing tokens for naming temporary files.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

/// 20-digit UTC timestamp `YYYYMMDDhhmmssffffff`.
///
/// Successive calls within one process never return the same value: if the clock has not
/// advanced (or went backwards) the previous value is bumped by one microsecond.
pub fn timestamp20() -> String {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_MICROS.load(Ordering::Relaxed);
    let issued = loop {
        let next = now.max(prev + 1);
        match LAST_MICROS.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => break next,
            Err(actual) => prev = actual,
        }
    };
    format_micros(issued)
}

fn format_micros(micros: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .unwrap_or_default()
        .format("%Y%m%d%H%M%S%6f")
        .to_string()
}
