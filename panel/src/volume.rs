//! Conversions between amplifier attenuation and on-screen volume

/// Quietest attenuation the amplifier reports, in dB
pub const MIN_DB: i32 = -79;
/// Loudest attenuation the amplifier reports, in dB
pub const MAX_DB: i32 = 0;

/// Convert amplifier attenuation (-79..0 dB) to a 0..100 percentage.
///
/// Equivalent to `vol / 0.79 + 100` for negative values, written so both
/// endpoints come out exact. Anything at or above 0 dB is full volume.
pub fn to_percent(vol_db: i32) -> f32 {
    if vol_db >= MAX_DB {
        return 100.0;
    }
    let vol = vol_db.max(MIN_DB);
    (vol - MIN_DB) as f32 * 100.0 / (-MIN_DB) as f32
}

/// Convert a percentage back to amplifier attenuation, truncating toward zero.
pub fn to_db(percent: f32) -> i32 {
    let percent = percent.clamp(0.0, 100.0);
    (percent * 0.79 - 79.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(to_percent(-79), 0.0);
        assert_eq!(to_percent(0), 100.0);
        assert_eq!(to_percent(12), 100.0);
        assert_eq!(to_percent(-200), 0.0);
    }

    #[test]
    fn test_midpoint() {
        let p = to_percent(-39);
        assert!((p - 50.63).abs() < 0.01, "got {p}");
    }

    #[test]
    fn test_to_db() {
        assert_eq!(to_db(0.0), -79);
        assert_eq!(to_db(100.0), 0);
        assert_eq!(to_db(50.0), -39);
        assert_eq!(to_db(150.0), 0);
    }

    proptest! {
        #[test]
        fn percent_is_monotonic(a in -79i32..=0, b in -79i32..=0) {
            prop_assume!(a <= b);
            prop_assert!(to_percent(a) <= to_percent(b));
        }

        #[test]
        fn non_negative_is_full(v in 0i32..1000) {
            prop_assert_eq!(to_percent(v), 100.0);
        }

        #[test]
        fn percent_stays_in_range(v in any::<i32>()) {
            let p = to_percent(v);
            prop_assert!((0.0..=100.0).contains(&p));
        }
    }
}
