use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Stable key grouping near-duplicate notifications: same container,
/// same event kind, same action-or-reason, same minute bucket.
pub fn dedup_key(
    container: &str,
    kind: &str,
    discriminator: &str,
    timestamp: DateTime<Utc>,
) -> String {
    let minute_bucket = timestamp.timestamp().div_euclid(60);
    let mut hasher = Sha256::new();
    hasher.update(format!("{container}|{kind}|{discriminator}|{minute_bucket}").as_bytes());
    format!("{:x}", hasher.finalize())
}
