//! Vector ops (C2): the handful of arithmetic primitives every other
//! component builds on — null-skipping aggregation and the two supported
//! distance functions.
//!
//! A data item is `Option<Vec<f64>>`; `None` represents *void* throughout
//! this crate (never a zero-length vector, which is a distinct, valid,
//! all-zero item).

pub type DataVector = Vec<f64>;

/// `DistanceKind` is a closed sum type (§9): dispatched once per pass, never
/// per inner-loop element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DistanceKind {
    #[default]
    Euclidean,
    Cosine,
}

impl DistanceKind {
    pub fn distance(&self, a: Option<&DataVector>, b: Option<&DataVector>) -> f64 {
        match self {
            DistanceKind::Euclidean => euclidean_distance(a, b),
            DistanceKind::Cosine => cosine_distance(a, b),
        }
    }
}

/// `‖a−b‖₂`. Returns 0 if either operand is null.
pub fn euclidean_distance(a: Option<&DataVector>, b: Option<&DataVector>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt(),
        _ => 0.0,
    }
}

/// `1 − (a·b)/(‖a‖‖b‖)`. Returns 0 if either operand is null.
pub fn cosine_distance(a: Option<&DataVector>, b: Option<&DataVector>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                1.0 - dot / (norm_a * norm_b)
            }
        }
        _ => 0.0,
    }
}

/// Mean of the non-null vectors in `vs`, each of length `len`.
///
/// Returns a zero-vector when all entries are null. This deliberately
/// diverges from the unguarded "divide by 0 elements" behaviour of the
/// source this was distilled from: a fully-void neighbourhood is expected
/// (edge partitions, void leaves) and should aggregate to a defined value,
/// not `NaN`.
pub fn aggregate(vs: &[Option<&DataVector>], len: usize) -> DataVector {
    let mut sum = vec![0.0; len];
    let mut count = 0.0;
    for v in vs {
        if let Some(v) = v {
            for (s, x) in sum.iter_mut().zip(v.iter()) {
                *s += x;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for s in sum.iter_mut() {
            *s /= count;
        }
    }
    sum
}

/// Weighted mean of the non-null vectors in `vs`, each of length `len`, using
/// the corresponding positive weight in `ws` (assumed same length as `vs`,
/// summing to a positive total over the non-null entries).
pub fn weighted_aggregate(vs: &[Option<&DataVector>], ws: &[f64], len: usize) -> DataVector {
    let mut sum = vec![0.0; len];
    let mut total_weight = 0.0;
    for (v, w) in vs.iter().zip(ws.iter()) {
        if let Some(v) = v {
            for (s, x) in sum.iter_mut().zip(v.iter()) {
                *s += w * x;
            }
            total_weight += w;
        }
    }
    if total_weight > 0.0 {
        for s in sum.iter_mut() {
            *s /= total_weight;
        }
    }
    sum
}

/// Returns the index into `vs` of the non-null vector minimising the sum of
/// `distance` to the other non-null vectors; `distance` is assumed
/// symmetric. Returns `None` if every entry is null.
///
/// Ties keep the first (lowest-index) minimiser, matching the stable
/// tie-break used by mean-mode aggregation's left-to-right accumulation.
pub fn find_min(
    vs: &[Option<&DataVector>],
    distance: impl Fn(&DataVector, &DataVector) -> f64,
) -> Option<usize> {
    let n = vs.len();
    let mut totals = vec![0.0; n];
    let mut best: Option<(usize, f64)> = None;

    for i in 0..n {
        let Some(vi) = vs[i] else { continue };
        for j in (i + 1)..n {
            let Some(vj) = vs[j] else { continue };
            let d = distance(vi, vj);
            totals[i] += d;
            totals[j] += d;
        }
    }

    for i in 0..n {
        if vs[i].is_none() {
            continue;
        }
        match best {
            Some((_, best_total)) if totals[i] >= best_total => {}
            _ => best = Some((i, totals[i])),
        }
    }

    best.map(|(idx, _)| idx)
}
