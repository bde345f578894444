//! Unit coercion for CPU and memory quantities
//!
//! Every memory metric is carried in Mi and every CPU metric in
//! millicores before classification.

pub const MI_PER_GI: f64 = 1024.0;
pub const MILLICORES_PER_CORE: f64 = 1000.0;

const BYTES_PER_MI: f64 = 1024.0 * 1024.0;

pub fn gi_to_mi(gi: f64) -> f64 {
    gi * MI_PER_GI
}

pub fn mi_to_gi(mi: f64) -> f64 {
    mi / MI_PER_GI
}

pub fn cores_to_millicores(cores: f64) -> f64 {
    cores * MILLICORES_PER_CORE
}

/// Parse a Kubernetes CPU quantity (`"250m"`, `"2"`, `"1.5"`, `"500000n"`)
/// into millicores
pub fn parse_cpu_millicores(quantity: &str) -> Option<f64> {
    let q = quantity.trim();
    if let Some(milli) = q.strip_suffix('m') {
        return milli.parse::<f64>().ok();
    }
    if let Some(nano) = q.strip_suffix('n') {
        return nano.parse::<f64>().ok().map(|n| n / 1_000_000.0);
    }
    if let Some(micro) = q.strip_suffix('u') {
        return micro.parse::<f64>().ok().map(|u| u / 1_000.0);
    }
    q.parse::<f64>().ok().map(cores_to_millicores)
}

/// Parse a Kubernetes memory quantity (`"512Mi"`, `"2Gi"`, `"1G"`,
/// `"1048576"`) into Mi
pub fn parse_memory_mi(quantity: &str) -> Option<f64> {
    let q = quantity.trim();

    const BINARY: &[(&str, f64)] = &[
        ("Ki", 1.0 / 1024.0),
        ("Mi", 1.0),
        ("Gi", MI_PER_GI),
        ("Ti", MI_PER_GI * 1024.0),
    ];
    for (suffix, factor) in BINARY {
        if let Some(number) = q.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| n * factor);
        }
    }

    const DECIMAL: &[(&str, f64)] = &[("k", 1e3), ("K", 1e3), ("M", 1e6), ("G", 1e9), ("T", 1e12)];
    for (suffix, bytes) in DECIMAL {
        if let Some(number) = q.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| n * bytes / BYTES_PER_MI);
        }
    }

    q.parse::<f64>().ok().map(|bytes| bytes / BYTES_PER_MI)
}

/// Percentage of `used` against `limit`; `None` when there is no usable limit
pub fn percent_of(used: f64, limit: f64) -> Option<f64> {
    (limit > 0.0).then(|| used / limit * 100.0)
}
