//! Cost-optimization recommendations for underutilized plans
//!
//! Two candidate actions exist for an App Service Plan that sits well below
//! its CPU and memory thresholds: move to the next smaller SKU of the same
//! family, or cut the instance count by a quarter. When both apply, the one
//! with the larger estimated monthly saving becomes primary; a tie goes to
//! the tier downgrade.

use serde::Serialize;

/// Fraction of instances removed by a capacity reduction
pub const CAPACITY_REDUCTION_FACTOR: f64 = 0.25;

/// Approximate monthly price per instance, USD (Linux, pay-as-you-go)
const SKU_MONTHLY_PRICES: &[(&str, f64)] = &[
    ("B1", 13.14),
    ("B2", 26.28),
    ("B3", 52.56),
    ("S1", 73.0),
    ("S2", 146.0),
    ("S3", 292.0),
    ("P1v2", 146.0),
    ("P2v2", 292.0),
    ("P3v2", 584.0),
    ("P1v3", 124.1),
    ("P2v3", 248.2),
    ("P3v3", 496.4),
];

/// Next smaller SKU within each family
const DOWNGRADE_PATH: &[(&str, &str)] = &[
    ("B3", "B2"),
    ("B2", "B1"),
    ("S3", "S2"),
    ("S2", "S1"),
    ("P3v2", "P2v2"),
    ("P2v2", "P1v2"),
    ("P3v3", "P2v3"),
    ("P2v3", "P1v3"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    TierDowngrade {
        from_sku: String,
        to_sku: String,
        capacity: u32,
        monthly_savings: f64,
    },
    CapacityReduction {
        sku: String,
        from_capacity: u32,
        to_capacity: u32,
        monthly_savings: f64,
    },
}

impl Recommendation {
    pub fn monthly_savings(&self) -> f64 {
        match self {
            Recommendation::TierDowngrade { monthly_savings, .. }
            | Recommendation::CapacityReduction { monthly_savings, .. } => *monthly_savings,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Recommendation::TierDowngrade {
                from_sku,
                to_sku,
                monthly_savings,
                ..
            } => format!(
                "Downgrade from {} to {} (saves ~${:.2}/month)",
                from_sku, to_sku, monthly_savings
            ),
            Recommendation::CapacityReduction {
                from_capacity,
                to_capacity,
                monthly_savings,
                ..
            } => format!(
                "Reduce instances from {} to {} (saves ~${:.2}/month)",
                from_capacity, to_capacity, monthly_savings
            ),
        }
    }

    fn is_tier_downgrade(&self) -> bool {
        matches!(self, Recommendation::TierDowngrade { .. })
    }
}

pub fn sku_monthly_price(sku: &str) -> Option<f64> {
    SKU_MONTHLY_PRICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(sku))
        .map(|(_, price)| *price)
}

pub fn downgrade_target(sku: &str) -> Option<&'static str> {
    DOWNGRADE_PATH
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(sku))
        .map(|(_, to)| *to)
}

/// Capacity after a 25% cut, never below one instance
pub fn reduced_capacity(capacity: u32) -> u32 {
    let reduced = (f64::from(capacity) * (1.0 - CAPACITY_REDUCTION_FACTOR)).floor() as u32;
    reduced.max(1)
}

/// Every applicable recommendation for a plan; empty for unknown SKUs
pub fn candidates(sku: &str, capacity: u32) -> Vec<Recommendation> {
    let Some(price) = sku_monthly_price(sku) else {
        return Vec::new();
    };
    let capacity = capacity.max(1);
    let mut out = Vec::new();

    if let Some(target) = downgrade_target(sku) {
        if let Some(target_price) = sku_monthly_price(target) {
            out.push(Recommendation::TierDowngrade {
                from_sku: sku.to_string(),
                to_sku: target.to_string(),
                capacity,
                monthly_savings: round_cents((price - target_price) * f64::from(capacity)),
            });
        }
    }

    let reduced = reduced_capacity(capacity);
    if reduced < capacity {
        out.push(Recommendation::CapacityReduction {
            sku: sku.to_string(),
            from_capacity: capacity,
            to_capacity: reduced,
            monthly_savings: round_cents(price * f64::from(capacity - reduced)),
        });
    }
    out
}

/// The candidate with the larger saving; tier downgrade wins ties
pub fn primary_recommendation(candidates: &[Recommendation]) -> Option<&Recommendation> {
    candidates.iter().fold(None, |best: Option<&Recommendation>, c| match best {
        None => Some(c),
        Some(b) => {
            let (bs, cs) = (b.monthly_savings(), c.monthly_savings());
            if cs > bs || (cs == bs && c.is_tier_downgrade() && !b.is_tier_downgrade()) {
                Some(c)
            } else {
                Some(b)
            }
        }
    })
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
