// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time as an injected capability, so expiry arithmetic is testable.

use chrono::{DateTime, TimeZone, Timelike, Utc};

/// Provides the current time to everything that stamps or checks expiries.
pub trait Clock: std::fmt::Debug {
    /// The current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a fixed instant. Useful in tests and anywhere
/// reproducible expiry stamps are needed.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A clock fixed at the given date, midnight UTC.
    pub fn at(year: i32, month: u32, day: u32) -> Self {
        FixedClock(Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Truncates sub-second precision; expiry timestamps are second-granular
/// (`YYYY-MM-DDTHH:MM:SSZ`) on disk.
pub(crate) fn whole_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0).unwrap_or(time)
}
