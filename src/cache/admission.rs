//! Pure admission check: the two independent caps from `spec.md` §4.7.
//!
//! Deliberately side-effect-free — callers gather `current_cache_size` and
//! `disk_usage` themselves (from the store and [`super::disk_usage`]
//! respectively) and pass them in, so this function is trivial to unit
//! test without a real filesystem or database.

use super::disk_usage::DiskUsage;

/// Why admission for a candidate byte count failed, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenial {
    /// `current_cache_size + s > max_cache_bytes`.
    CacheBytesCap,
    /// Disk is already at or past `max_disk_usage_pct`.
    DiskAlreadyFull,
    /// Admitting `s` more bytes would push disk usage to or past
    /// `max_disk_usage_pct`.
    DiskWouldExceed,
}

/// Check whether a file of `candidate_size` bytes can be admitted given the
/// current cache size and host disk usage.
///
/// The disk-usage projection is computed against `disk.total`, not
/// `disk.total - candidate_size` — this is the retained Open Question from
/// `spec.md` §9: the source doesn't subtract the incoming file's size from
/// the denominator, and that behavior is kept as-specified.
pub fn check(
    candidate_size: u64,
    current_cache_size: u64,
    max_cache_bytes: u64,
    disk: DiskUsage,
    max_disk_usage_pct: f64,
) -> Result<(), AdmissionDenial> {
    if current_cache_size + candidate_size > max_cache_bytes {
        return Err(AdmissionDenial::CacheBytesCap);
    }

    if disk.used_percent >= max_disk_usage_pct {
        return Err(AdmissionDenial::DiskAlreadyFull);
    }

    let projected_used = disk.used + candidate_size;
    let projected_pct = if disk.total == 0 {
        0.0
    } else {
        (projected_used as f64 / disk.total as f64) * 100.0
    };
    if projected_pct >= max_disk_usage_pct {
        return Err(AdmissionDenial::DiskWouldExceed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(total: u64, used: u64) -> DiskUsage {
        DiskUsage {
            total,
            used,
            free: total.saturating_sub(used),
            used_percent: if total == 0 {
                0.0
            } else {
                (used as f64 / total as f64) * 100.0
            },
        }
    }

    #[test]
    fn admits_when_under_both_caps() {
        let d = disk(1_000_000, 100_000);
        assert!(check(1_000, 0, 500_000, d, 90.0).is_ok());
    }

    #[test]
    fn rejects_over_cache_bytes_cap() {
        let d = disk(1_000_000, 100_000);
        assert_eq!(
            check(1_000, 499_500, 500_000, d, 90.0),
            Err(AdmissionDenial::CacheBytesCap)
        );
    }

    #[test]
    fn rejects_when_disk_already_at_cap() {
        let d = disk(1_000_000, 900_000);
        assert_eq!(
            check(1, 0, 500_000, d, 90.0),
            Err(AdmissionDenial::DiskAlreadyFull)
        );
    }

    #[test]
    fn rejects_when_candidate_would_push_disk_over_cap() {
        let d = disk(1_000_000, 800_000);
        assert_eq!(
            check(150_000, 0, 1_000_000, d, 90.0),
            Err(AdmissionDenial::DiskWouldExceed)
        );
    }
}
