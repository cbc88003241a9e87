//! Hourly cash-flow buckets for the payments chart.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::types::Payment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    /// Start of the hour, `YYYY-MM-DDTHH:00`
    pub hour_label: String,
    pub hour_start: DateTime<Utc>,
    pub incoming_sats: i64,
    pub outgoing_sats: i64,
    /// Running signed total over this and all earlier buckets
    pub cumulative_balance: i64,
}

fn hour_start(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(TimeDelta::hours(1)).unwrap_or(time)
}

/// Group payments into hourly buckets in chronological order.
///
/// Only hours that contain at least one payment produce a bucket.
pub fn aggregate(payments: &[Payment]) -> Vec<Bucket> {
    let mut sorted: Vec<&Payment> = payments.iter().collect();
    sorted.sort_by_key(|payment| payment.time);

    let mut running = 0i64;
    let mut buckets = Vec::new();

    for (hour, group) in &sorted.into_iter().group_by(|payment| hour_start(payment.time)) {
        let (incoming, outgoing) = group.fold((0i64, 0i64), |(incoming, outgoing), payment| {
            let sat = payment.sat();
            if sat >= 0 {
                (incoming + sat, outgoing)
            } else {
                (incoming, outgoing + sat.abs())
            }
        });

        running += incoming - outgoing;
        buckets.push(Bucket {
            hour_label: hour.format("%Y-%m-%dT%H:00").to_string(),
            hour_start: hour,
            incoming_sats: incoming,
            outgoing_sats: outgoing,
            cumulative_balance: running,
        });
    }

    buckets
}
