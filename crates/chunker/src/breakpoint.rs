use serde::{Deserialize, Serialize};

/// Policy selecting the distance threshold above which the sentence stream
/// is cut into a new chunk.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "amount")]
pub enum BreakpointPolicy {
    /// Threshold is the p-th percentile of the distance series.
    Percentile(f64),
    /// Threshold is mean + k * standard deviation.
    StandardDeviation(f64),
    /// Threshold is Q3 + k * IQR.
    Interquartile(f64),
    /// Threshold is the p-th percentile of the numeric gradient of the
    /// distance series; breakpoints are indexes of the gradient above it.
    Gradient(f64),
}

impl BreakpointPolicy {
    /// Returns the threshold and the series it applies to (the distances
    /// themselves, or their gradient for the Gradient policy).
    pub fn threshold(&self, distances: &[f64]) -> (f64, Vec<f64>) {
        match *self {
            BreakpointPolicy::Percentile(p) => (percentile(distances, p), distances.to_vec()),
            BreakpointPolicy::StandardDeviation(k) => {
                (mean(distances) + k * std_deviation(distances), distances.to_vec())
            }
            BreakpointPolicy::Interquartile(k) => {
                let q1 = percentile(distances, 25.0);
                let q3 = percentile(distances, 75.0);
                (q3 + k * (q3 - q1), distances.to_vec())
            }
            BreakpointPolicy::Gradient(p) => {
                let gradient = gradient(distances);
                (percentile(&gradient, p), gradient)
            }
        }
    }

    /// Indexes whose series value strictly exceeds the policy threshold.
    pub fn breakpoints(&self, distances: &[f64]) -> Vec<usize> {
        if distances.is_empty() {
            return Vec::new();
        }
        let (threshold, series) = self.threshold(distances);
        series
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > threshold)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Linear-interpolated percentile over an unsorted sample.
fn percentile(sample: &[f64], p: f64) -> f64 {
    assert!(!sample.is_empty(), "percentile of an empty sample");

    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

fn mean(sample: &[f64]) -> f64 {
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Population standard deviation.
fn std_deviation(sample: &[f64]) -> f64 {
    let mean = mean(sample);
    let variance =
        sample.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / sample.len() as f64;
    variance.sqrt()
}

/// Numeric gradient with central differences and one-sided edges, over a
/// unit-spaced index.
fn gradient(sample: &[f64]) -> Vec<f64> {
    let n = sample.len();
    if n < 2 {
        return sample.to_vec();
    }

    let mut out = Vec::with_capacity(n);
    out.push(sample[1] - sample[0]);
    for i in 1..n - 1 {
        out.push((sample[i + 1] - sample[i - 1]) / 2.0);
    }
    out.push(sample[n - 1] - sample[n - 2]);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &[f64] = &[0.1, 0.2, 0.15, 0.8, 0.12, 0.18, 0.9, 0.11];

    #[test]
    fn percentile_interpolates() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.0), 1.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 100.0), 4.0);
        assert_eq!(percentile(&[5.0], 85.0), 5.0);
    }

    #[test]
    fn gradient_matches_central_differences() {
        let g = gradient(&[1.0, 2.0, 4.0, 7.0]);
        assert_eq!(g, vec![1.0, 1.5, 2.5, 3.0]);
    }

    #[test]
    fn percentile_policy_cuts_outliers() {
        let cuts = BreakpointPolicy::Percentile(85.0).breakpoints(SAMPLE);
        assert_eq!(cuts, vec![3, 6]);
    }

    #[test]
    fn interquartile_policy_cuts_outliers() {
        let cuts = BreakpointPolicy::Interquartile(1.5).breakpoints(SAMPLE);
        assert_eq!(cuts, vec![3, 6]);
    }

    #[test]
    fn standard_deviation_policy() {
        let cuts = BreakpointPolicy::StandardDeviation(1.0).breakpoints(SAMPLE);
        assert_eq!(cuts, vec![3, 6]);
    }

    #[test]
    fn gradient_policy_uses_the_gradient_series() {
        let distances = vec![0.1, 0.1, 0.1, 0.9, 0.1, 0.1];
        let (threshold, series) = BreakpointPolicy::Gradient(90.0).threshold(&distances);
        assert_eq!(series.len(), distances.len());
        assert!(series.iter().any(|v| *v > threshold));
    }

    #[test]
    fn uniform_distances_produce_no_cuts() {
        let distances = vec![0.5; 8];
        assert!(BreakpointPolicy::Percentile(85.0)
            .breakpoints(&distances)
            .is_empty());
        assert!(BreakpointPolicy::Interquartile(1.5)
            .breakpoints(&distances)
            .is_empty());
    }

    #[test]
    fn empty_distances_produce_no_cuts() {
        assert!(BreakpointPolicy::Percentile(85.0).breakpoints(&[]).is_empty());
    }
}
