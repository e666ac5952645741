//! Full-covariance Gaussian mixture models over RGB colours.

/// Components per mixture.
pub(crate) const COMPONENTS: usize = 5;

const KMEANS_ITERATIONS: usize = 10;
const COVARIANCE_EPSILON: f64 = 0.01;

pub(crate) type Color = [f64; 3];

#[derive(Debug, Clone, Copy, Default)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    det: f64,
}

impl Component {
    /// Unnormalised Gaussian density (the shared `(2π)^-3/2` factor is dropped).
    fn density(&self, color: &Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];
        let mut mult = 0.0;
        for r in 0..3 {
            let mut row = 0.0;
            for c in 0..3 {
                row += d[c] * self.inverse[c][r];
            }
            mult += row * d[r];
        }
        (-0.5 * mult).exp() / self.det.sqrt()
    }
}

/// Running sums used to fit one component.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: usize,
    sum: Color,
    prod: [[f64; 3]; 3],
}

impl Accumulator {
    fn add(&mut self, color: &Color) {
        self.count += 1;
        for r in 0..3 {
            self.sum[r] += color[r];
            for c in 0..3 {
                self.prod[r][c] += color[r] * color[c];
            }
        }
    }
}

/// Colour model for one side (foreground or background) of the cut.
#[derive(Debug, Clone)]
pub(crate) struct Gmm {
    components: [Component; COMPONENTS],
}

impl Gmm {
    /// Seed the mixture by k-means clustering `samples`.
    ///
    /// Returns `None` for an empty sample set.
    pub(crate) fn from_samples(samples: &[Color]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let labels = kmeans(samples, COMPONENTS);
        let mut gmm = Self {
            components: [Component::default(); COMPONENTS],
        };
        gmm.learn(samples.iter().zip(labels.iter().copied()));
        Some(gmm)
    }

    /// Index of the component most likely to have produced `color`.
    pub(crate) fn which_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_density = 0.0;
        for (k, component) in self.components.iter().enumerate() {
            let p = component.density(color);
            if p > best_density {
                best = k;
                best_density = p;
            }
        }
        best
    }

    /// Mixture likelihood of `color`.
    pub(crate) fn likelihood(&self, color: &Color) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(color))
            .sum()
    }

    /// Refit every component from `(colour, component)` assignments.
    pub(crate) fn learn<'a>(&mut self, assigned: impl Iterator<Item = (&'a Color, usize)>) {
        let mut acc = [Accumulator::default(); COMPONENTS];
        let mut total = 0usize;
        for (color, k) in assigned {
            acc[k].add(color);
            total += 1;
        }

        for (component, acc) in self.components.iter_mut().zip(acc.iter()) {
            *component = fit_component(acc, total);
        }
    }
}

fn fit_component(acc: &Accumulator, total: usize) -> Component {
    if acc.count == 0 || total == 0 {
        return Component::default();
    }
    let n = acc.count as f64;
    let mean = [acc.sum[0] / n, acc.sum[1] / n, acc.sum[2] / n];

    let mut cov = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            cov[r][c] = acc.prod[r][c] / n - mean[r] * mean[c];
        }
    }

    let mut det = determinant(&cov);
    if det <= f64::EPSILON {
        // Flat clusters (one colour) get a little variance to stay invertible.
        for (r, row) in cov.iter_mut().enumerate() {
            row[r] += COVARIANCE_EPSILON;
        }
        det = determinant(&cov);
    }

    Component {
        weight: n / total as f64,
        mean,
        inverse: invert(&cov, det),
        det,
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn invert(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn distance_sq(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Deterministic k-means: centres start at brightness quantiles.
fn kmeans(samples: &[Color], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| {
        let la = samples[a].iter().sum::<f64>();
        let lb = samples[b].iter().sum::<f64>();
        la.total_cmp(&lb)
    });
    let mut centres: Vec<Color> = (0..k)
        .map(|i| samples[order[((2 * i + 1) * samples.len()) / (2 * k)]])
        .collect();

    let mut labels = vec![0usize; samples.len()];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (sample, label) in samples.iter().zip(labels.iter_mut()) {
            let nearest = centres
                .iter()
                .enumerate()
                .map(|(i, c)| (i, distance_sq(sample, c)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(i, _)| i);
            if nearest != *label {
                *label = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (sample, &label) in samples.iter().zip(labels.iter()) {
            for c in 0..3 {
                sums[label][c] += sample[c];
            }
            counts[label] += 1;
        }
        for ((centre, sum), &count) in centres.iter_mut().zip(sums.iter()).zip(counts.iter()) {
            if count > 0 {
                let n = count as f64;
                *centre = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }

        if !changed {
            break;
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(centre: Color, n: usize) -> Vec<Color> {
        (0..n)
            .map(|i| {
                [
                    centre[0] + (i % 7) as f64 - 3.0,
                    centre[1] + ((i / 7) % 5) as f64 - 2.0,
                    centre[2] + ((i / 35) % 3) as f64 - 1.0,
                ]
            })
            .collect()
    }

    #[test]
    fn empty_samples_give_no_model() {
        assert!(Gmm::from_samples(&[]).is_none());
    }

    #[test]
    fn likelihood_prefers_training_colours() {
        let mut samples = cluster([200.0, 30.0, 30.0], 200);
        samples.extend(cluster([30.0, 30.0, 200.0], 200));
        let gmm = Gmm::from_samples(&samples).unwrap();

        let seen = gmm.likelihood(&[200.0, 30.0, 30.0]);
        let unseen = gmm.likelihood(&[30.0, 220.0, 30.0]);
        assert!(seen > unseen * 1e6, "{seen} vs {unseen}");
    }

    #[test]
    fn single_colour_stays_invertible() {
        let samples = vec![[128.0, 128.0, 128.0]; 50];
        let gmm = Gmm::from_samples(&samples).unwrap();
        let p = gmm.likelihood(&[128.0, 128.0, 128.0]);
        assert!(p.is_finite() && p > 0.0);
    }

    #[test]
    fn weights_sum_to_one() {
        let mut samples = cluster([10.0, 10.0, 10.0], 60);
        samples.extend(cluster([240.0, 240.0, 240.0], 40));
        let gmm = Gmm::from_samples(&samples).unwrap();
        let total: f64 = gmm.components.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn kmeans_splits_distinct_clusters() {
        let mut samples = cluster([0.0, 0.0, 0.0], 30);
        samples.extend(cluster([255.0, 255.0, 255.0], 30));
        let labels = kmeans(&samples, 2);
        assert!(labels[..30].iter().all(|&l| l == labels[0]));
        assert!(labels[30..].iter().all(|&l| l == labels[30]));
        assert_ne!(labels[0], labels[30]);
    }

    #[test]
    fn inverse_of_identity_is_identity() {
        let id = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert_eq!(invert(&id, determinant(&id)), id);
    }
}
