//! Per-day utilization clustering
//!
//! Runs an unsupervised clustering pass over the metric columns of one
//! day frame. Columns are min-max normalized for distance computation;
//! centroids are reported in raw units. The cluster count is picked by an
//! elbow rule on the inertia curve, bounded by `max_clusters`: clusters
//! are added while each addition still explains a configurable share of
//! the day's total variance.
//!
//! Seeding is deterministic (evenly spaced quantiles of the CPU column)
//! so repeated scans of the same day assign the same labels.

use crate::models::MetricAttribute;
use crate::pipeline::segment::DayFrame;
use serde::{Deserialize, Serialize};

/// Clustering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClustererConfig {
    pub max_clusters: usize,
    pub max_iterations: usize,
    /// Minimum share of total inertia an extra cluster must explain
    pub elbow_min_improvement: f64,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            max_clusters: 4,
            max_iterations: 50,
            elbow_min_improvement: 0.15,
        }
    }
}

/// Row-to-cluster mapping plus per-cluster centroids for one day.
///
/// Labels are contiguous integers starting at 0 and index into
/// `centroids`. A `None` centroid carries no signal and must be skipped,
/// not treated as zero.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    pub labels: Vec<usize>,
    pub centroids: Vec<Option<Vec<f64>>>,
}

impl ClusterAssignment {
    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }
}

/// Cluster one day frame over the configured metric columns
pub fn cluster(
    frame: &DayFrame,
    attributes: &[MetricAttribute],
    config: &ClustererConfig,
) -> ClusterAssignment {
    let rows: Vec<Vec<f64>> = frame
        .rows
        .iter()
        .map(|s| attributes.iter().map(|a| a.value(s)).collect())
        .collect();

    if rows.is_empty() {
        return ClusterAssignment {
            labels: vec![],
            centroids: vec![],
        };
    }

    let normalized = normalize_columns(&rows);
    let distinct = count_distinct(&normalized);
    let max_k = config.max_clusters.max(1).min(distinct);

    let runs: Vec<KMeansRun> = (1..=max_k)
        .map(|k| lloyd(&normalized, k, config.max_iterations))
        .collect();
    let inertias: Vec<f64> = runs.iter().map(|r| r.inertia).collect();
    let chosen = elbow(&inertias, config.elbow_min_improvement);
    let run = &runs[chosen];

    finalize(run, &rows)
}

struct KMeansRun {
    labels: Vec<usize>,
    k: usize,
    inertia: f64,
}

/// Min-max normalize each column; constant columns collapse to zero so
/// they carry no distance weight.
fn normalize_columns(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let cols = rows[0].len();
    let mut mins = vec![f64::INFINITY; cols];
    let mut maxs = vec![f64::NEG_INFINITY; cols];
    for row in rows {
        for (c, v) in row.iter().enumerate() {
            mins[c] = mins[c].min(*v);
            maxs[c] = maxs[c].max(*v);
        }
    }
    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(c, v)| {
                    let range = maxs[c] - mins[c];
                    if range <= f64::EPSILON {
                        0.0
                    } else {
                        (v - mins[c]) / range
                    }
                })
                .collect()
        })
        .collect()
}

fn count_distinct(rows: &[Vec<f64>]) -> usize {
    let mut distinct: Vec<&Vec<f64>> = Vec::new();
    for row in rows {
        if !distinct.iter().any(|d| *d == row) {
            distinct.push(row);
        }
        if distinct.len() > 16 {
            // Enough variety for any max_clusters we allow
            return distinct.len();
        }
    }
    distinct.len()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Deterministic seeding: rows sorted by the first (CPU) column, seeds at
/// evenly spaced ranks.
fn seed_centroids(rows: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| {
        rows[a][0]
            .partial_cmp(&rows[b][0])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    (0..k)
        .map(|j| {
            let rank = if k == 1 {
                rows.len() / 2
            } else {
                (j * (rows.len() - 1)) / (k - 1)
            };
            rows[order[rank]].clone()
        })
        .collect()
}

fn lloyd(rows: &[Vec<f64>], k: usize, max_iterations: usize) -> KMeansRun {
    let mut centroids = seed_centroids(rows, k);
    let mut labels = vec![0usize; rows.len()];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, row) in rows.iter().enumerate() {
            let nearest = centroids
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    squared_distance(row, a)
                        .partial_cmp(&squared_distance(row, b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(j, _)| j)
                .unwrap_or(0);
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }

        for (j, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = rows
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == j)
                .map(|(r, _)| r)
                .collect();
            if members.is_empty() {
                continue;
            }
            for (c, slot) in centroid.iter_mut().enumerate() {
                *slot = members.iter().map(|m| m[c]).sum::<f64>() / members.len() as f64;
            }
        }

        if !changed {
            break;
        }
    }

    let inertia = rows
        .iter()
        .zip(&labels)
        .map(|(row, l)| squared_distance(row, &centroids[*l]))
        .sum();

    KMeansRun { labels, k, inertia }
}

/// Elbow rule on the inertia curve: grow k while each extra cluster
/// still explains at least `min_improvement` of the k=1 inertia.
/// Returns an index into the runs list.
fn elbow(inertias: &[f64], min_improvement: f64) -> usize {
    if inertias.is_empty() {
        return 0;
    }
    let total = inertias[0];
    if total <= f64::EPSILON {
        // Flat day: one behavior cluster describes it
        return 0;
    }
    let mut chosen = 0;
    for k in 1..inertias.len() {
        let improvement = (inertias[k - 1] - inertias[k]) / total;
        if improvement >= min_improvement {
            chosen = k;
        } else {
            break;
        }
    }
    chosen
}

/// Compact empty clusters away and compute raw-unit centroids. Labels in
/// the result are contiguous and index into the centroid list.
fn finalize(run: &KMeansRun, raw_rows: &[Vec<f64>]) -> ClusterAssignment {
    let mut remap = vec![usize::MAX; run.k];
    let mut centroids: Vec<Option<Vec<f64>>> = Vec::new();

    for old in 0..run.k {
        let members: Vec<&Vec<f64>> = raw_rows
            .iter()
            .zip(&run.labels)
            .filter(|(_, l)| **l == old)
            .map(|(r, _)| r)
            .collect();
        if members.is_empty() {
            continue;
        }
        remap[old] = centroids.len();
        let cols = members[0].len();
        let centroid: Vec<f64> = (0..cols)
            .map(|c| members.iter().map(|m| m[c]).sum::<f64>() / members.len() as f64)
            .collect();
        centroids.push(Some(centroid));
    }

    let labels = run.labels.iter().map(|l| remap[*l]).collect();
    ClusterAssignment { labels, centroids }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricSample;
    use chrono::{Duration, TimeZone, Utc};

    fn day_frame(cpu_values: &[f64]) -> DayFrame {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        DayFrame {
            date: start.date_naive(),
            rows: cpu_values
                .iter()
                .enumerate()
                .map(|(i, cpu)| MetricSample {
                    timestamp: start + Duration::minutes(i as i64 * 5),
                    cpu_load: *cpu,
                    memory_load: *cpu / 2.0,
                    net_output_load: -1.0,
                    avg_disk_iops: -1.0,
                    max_disk_iops: -1.0,
                })
                .collect(),
        }
    }

    fn attrs() -> Vec<MetricAttribute> {
        MetricAttribute::DEFAULT_SET.to_vec()
    }

    #[test]
    fn test_flat_day_is_one_cluster() {
        let frame = day_frame(&[5.0; 48]);
        let assignment = cluster(&frame, &attrs(), &ClustererConfig::default());
        assert_eq!(assignment.cluster_count(), 1);
        assert!(assignment.labels.iter().all(|l| *l == 0));
        let centroid = assignment.centroids[0].as_ref().unwrap();
        assert!((centroid[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_bimodal_day_splits_in_two() {
        let mut values = vec![3.0; 24];
        values.extend(vec![80.0; 24]);
        let frame = day_frame(&values);
        let assignment = cluster(&frame, &attrs(), &ClustererConfig::default());
        assert_eq!(assignment.cluster_count(), 2);

        let low_label = assignment.labels[0];
        let high_label = assignment.labels[47];
        assert_ne!(low_label, high_label);
        assert!(assignment.labels[..24].iter().all(|l| *l == low_label));
        assert!(assignment.labels[24..].iter().all(|l| *l == high_label));
    }

    #[test]
    fn test_centroids_in_raw_units() {
        let mut values = vec![10.0; 20];
        values.extend(vec![90.0; 20]);
        let frame = day_frame(&values);
        let assignment = cluster(&frame, &attrs(), &ClustererConfig::default());

        let mut cpu_centroids: Vec<f64> = assignment
            .centroids
            .iter()
            .flatten()
            .map(|c| c[0])
            .collect();
        cpu_centroids.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((cpu_centroids[0] - 10.0).abs() < 1.0);
        assert!((cpu_centroids[1] - 90.0).abs() < 1.0);
    }

    #[test]
    fn test_labels_are_contiguous() {
        let mut values = vec![2.0; 16];
        values.extend(vec![45.0; 16]);
        values.extend(vec![95.0; 16]);
        let frame = day_frame(&values);
        let assignment = cluster(&frame, &attrs(), &ClustererConfig::default());

        let max_label = *assignment.labels.iter().max().unwrap();
        assert_eq!(max_label + 1, assignment.cluster_count());
        for label in 0..assignment.cluster_count() {
            assert!(assignment.labels.contains(&label));
            assert!(assignment.centroids[label].is_some());
        }
    }

    #[test]
    fn test_empty_frame() {
        let frame = day_frame(&[]);
        let assignment = cluster(&frame, &attrs(), &ClustererConfig::default());
        assert!(assignment.labels.is_empty());
        assert!(assignment.centroids.is_empty());
    }

    #[test]
    fn test_deterministic_across_runs() {
        let mut values = vec![3.0; 30];
        values.extend(vec![60.0; 18]);
        let frame = day_frame(&values);
        let a = cluster(&frame, &attrs(), &ClustererConfig::default());
        let b = cluster(&frame, &attrs(), &ClustererConfig::default());
        assert_eq!(a.labels, b.labels);
    }
}
