use std::fmt;

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Point in time as assigned by the heartbeat sender: whole seconds plus
/// a sub-second nanosecond part.
///
/// `nanosec` is always below one second, so the derived ordering agrees with
/// [`Stamp::as_nanos`]. Decoded stamps are normalized the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "RawStamp")]
pub struct Stamp {
    pub sec: i64,
    pub nanosec: u32,
}

#[derive(Deserialize)]
struct RawStamp {
    sec: i64,
    nanosec: u32,
}

impl From<RawStamp> for Stamp {
    fn from(raw: RawStamp) -> Self {
        Stamp::new(raw.sec, raw.nanosec)
    }
}

impl Stamp {
    pub fn new(sec: i64, nanosec: u32) -> Self {
        // Normalize so that `nanosec` always stays below one second.
        let carry = (nanosec / NANOS_PER_SEC as u32) as i64;
        Self {
            sec: sec.saturating_add(carry),
            nanosec: nanosec % NANOS_PER_SEC as u32,
        }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::from_nanos(millis * 1_000_000)
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            sec: nanos.div_euclid(NANOS_PER_SEC),
            nanosec: nanos.rem_euclid(NANOS_PER_SEC) as u32,
        }
    }

    /// Current wall clock time (UTC).
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self::new(now.timestamp(), now.timestamp_subsec_nanos())
    }

    /// Signed nanoseconds since the epoch, saturating outside i64 range.
    pub fn as_nanos(&self) -> i64 {
        self.sec
            .saturating_mul(NANOS_PER_SEC)
            .saturating_add(self.nanosec as i64)
    }

    /// Signed nanoseconds elapsed from `earlier` to `self`.
    pub fn nanos_since(&self, earlier: Stamp) -> i64 {
        self.as_nanos().saturating_sub(earlier.as_nanos())
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.sec, self.nanosec) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            None => write!(f, "{}.{:09}", self.sec, self.nanosec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_millis_splits_seconds() {
        let stamp = Stamp::from_millis(1_250);
        assert_eq!(stamp.sec, 1);
        assert_eq!(stamp.nanosec, 250_000_000);
        assert_eq!(stamp.as_nanos(), 1_250_000_000);
    }

    #[test]
    fn test_negative_nanos_keep_nanosec_positive() {
        let stamp = Stamp::from_nanos(-1);
        assert_eq!(stamp.sec, -1);
        assert_eq!(stamp.nanosec, 999_999_999);
        assert_eq!(stamp.as_nanos(), -1);
    }

    #[test]
    fn test_new_normalizes_overflowing_nanosec() {
        let stamp = Stamp::new(2, 1_500_000_000);
        assert_eq!(stamp, Stamp::new(3, 500_000_000));
    }

    #[test]
    fn test_ordering_uses_sub_second_part() {
        assert!(Stamp::new(1, 10) < Stamp::new(1, 11));
        assert!(Stamp::new(1, 999_999_999) < Stamp::new(2, 0));
        assert_eq!(Stamp::from_millis(1000).nanos_since(Stamp::from_millis(400)), 600_000_000);
    }

    #[test]
    fn test_decoding_normalizes_overflowing_nanosec() {
        let stamp: Stamp = serde_json::from_str(r#"{"sec":1,"nanosec":1500000000}"#).unwrap();
        assert_eq!(stamp, Stamp::new(2, 500_000_000));
        assert_eq!(stamp.as_nanos(), 2_500_000_000);
        // Field ordering and nanosecond ordering agree
        assert!(stamp > Stamp::from_millis(2000));
        assert!(stamp < Stamp::from_millis(3000));
    }

    #[test]
    fn test_decoding_keeps_normalized_stamp() {
        let stamp = Stamp::new(12, 500);
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, r#"{"sec":12,"nanosec":500}"#);
        assert_eq!(serde_json::from_str::<Stamp>(&json).unwrap(), stamp);
    }

    #[test]
    fn test_display_is_rfc3339() {
        assert_eq!(Stamp::from_millis(1_500).to_string(), "1970-01-01T00:00:01.500Z");
    }
}
