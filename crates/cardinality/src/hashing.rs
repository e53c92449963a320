//! Order-independent label-set hashing

use xxhash_rust::xxh3::Xxh3;

// Neither byte can occur in UTF-8, so no name/value split is ambiguous.
const KEY_VALUE_SEPARATOR: u8 = 0xfe;
const PAIR_SEPARATOR: u8 = 0xff;

/// Hash a metric name together with its labels
///
/// Labels are sorted by name (then value) before hashing, so any permutation
/// of the same pairs produces the same hash. The value is only stable within
/// one process run.
pub fn series_hash<I, K, V>(metric_name: &str, labels: I) -> u64
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = labels.into_iter().collect();
    pairs.sort_unstable_by(|a, b| {
        a.0.as_ref()
            .cmp(b.0.as_ref())
            .then_with(|| a.1.as_ref().cmp(b.1.as_ref()))
    });

    let mut hasher = Xxh3::new();
    hasher.update(metric_name.as_bytes());
    hasher.update(&[PAIR_SEPARATOR]);
    for (name, value) in &pairs {
        hasher.update(name.as_ref().as_bytes());
        hasher.update(&[KEY_VALUE_SEPARATOR]);
        hasher.update(value.as_ref().as_bytes());
        hasher.update(&[PAIR_SEPARATOR]);
    }
    hasher.digest()
}
