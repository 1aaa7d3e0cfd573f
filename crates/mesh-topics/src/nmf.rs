//! Non-negative matrix factorization.
//!
//! Multiplicative updates (Lee and Seung) minimizing the Frobenius norm
//! `||V - WH||`. Factors start from seeded uniform noise scaled to the
//! data, so a given seed always gives the same factorization.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

type Matrix = Vec<Vec<f64>>;

const EPSILON: f64 = 1e-10;
/// Error is checked every this many iterations.
const CHECK_EVERY: usize = 10;

/// Factorization parameters.
#[derive(Debug, Clone)]
pub struct Nmf {
    pub components: usize,
    pub max_iterations: usize,
    /// Stop once the error improves by less than this, relative to the
    /// initial error
    pub tolerance: f64,
    pub seed: u64,
}

/// `V ≈ W H` with `W` (documents x components) and `H` (components x terms).
#[derive(Debug, Clone)]
pub struct Factorization {
    pub w: Matrix,
    pub h: Matrix,
    pub iterations: usize,
    pub error: f64,
}

impl Nmf {
    pub fn new(components: usize, max_iterations: usize, seed: u64) -> Self {
        Self {
            components,
            max_iterations,
            tolerance: 1e-4,
            seed,
        }
    }

    /// Factorize the non-negative `v` (rows of equal length).
    pub fn factorize(&self, v: &[Vec<f64>]) -> Factorization {
        let n = v.len();
        let m = v.first().map_or(0, Vec::len);
        let k = self.components.max(1);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mean = if n * m == 0 {
            0.0
        } else {
            v.iter().flatten().sum::<f64>() / (n * m) as f64
        };
        let scale = (mean / k as f64).sqrt();
        let mut w: Matrix = (0..n)
            .map(|_| (0..k).map(|_| scale * rng.random::<f64>()).collect())
            .collect();
        let mut h: Matrix = (0..k)
            .map(|_| (0..m).map(|_| scale * rng.random::<f64>()).collect())
            .collect();

        let initial_error = frobenius_error(v, &w, &h);
        let mut previous_error = initial_error;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            update_h(v, &w, &mut h);
            update_w(v, &mut w, &h);
            iterations += 1;

            if iterations % CHECK_EVERY == 0 {
                let error = frobenius_error(v, &w, &h);
                if initial_error > 0.0 && (previous_error - error) / initial_error < self.tolerance {
                    break;
                }
                previous_error = error;
            }
        }

        let error = frobenius_error(v, &w, &h);
        debug!(iterations, error, components = k, "NMF converged");
        Factorization {
            w,
            h,
            iterations,
            error,
        }
    }
}

/// `H <- H * (W^T V) / (W^T W H)`
fn update_h(v: &[Vec<f64>], w: &Matrix, h: &mut Matrix) {
    let k = h.len();
    let m = h.first().map_or(0, Vec::len);

    let wt_v = mul_transpose_a(w, v, k, m);
    let wt_w = mul_transpose_a(w, w, k, k);
    let wt_w_h = mul(&wt_w, h, m);

    for a in 0..k {
        for j in 0..m {
            h[a][j] *= wt_v[a][j] / (wt_w_h[a][j] + EPSILON);
        }
    }
}

/// `W <- W * (V H^T) / (W H H^T)`
fn update_w(v: &[Vec<f64>], w: &mut Matrix, h: &Matrix) {
    let k = h.len();

    let v_ht = mul_transpose_b(v, h, k);
    let h_ht = mul_transpose_b(h, h, k);
    let w_h_ht = mul(w, &h_ht, k);

    for (i, row) in w.iter_mut().enumerate() {
        for a in 0..k {
            row[a] *= v_ht[i][a] / (w_h_ht[i][a] + EPSILON);
        }
    }
}

/// `A B` where `B` has `cols` columns.
fn mul(a: &[Vec<f64>], b: &[Vec<f64>], cols: usize) -> Matrix {
    a.iter()
        .map(|row| {
            let mut out = vec![0.0; cols];
            for (x, b_row) in row.iter().zip(b) {
                if *x == 0.0 {
                    continue;
                }
                for (o, y) in out.iter_mut().zip(b_row) {
                    *o += x * y;
                }
            }
            out
        })
        .collect()
}

/// `A^T B` for `A` (n x rows_out) and `B` (n x cols).
fn mul_transpose_a(a: &[Vec<f64>], b: &[Vec<f64>], rows_out: usize, cols: usize) -> Matrix {
    let mut out = vec![vec![0.0; cols]; rows_out];
    for (a_row, b_row) in a.iter().zip(b) {
        for (r, x) in a_row.iter().enumerate() {
            if *x == 0.0 {
                continue;
            }
            for (o, y) in out[r].iter_mut().zip(b_row) {
                *o += x * y;
            }
        }
    }
    out
}

/// `A B^T` for `B` with `rows_b` rows.
fn mul_transpose_b(a: &[Vec<f64>], b: &[Vec<f64>], rows_b: usize) -> Matrix {
    a.iter()
        .map(|a_row| {
            (0..rows_b)
                .map(|r| a_row.iter().zip(&b[r]).map(|(x, y)| x * y).sum())
                .collect()
        })
        .collect()
}

fn frobenius_error(v: &[Vec<f64>], w: &Matrix, h: &Matrix) -> f64 {
    let m = h.first().map_or(0, Vec::len);
    let wh = mul(w, h, m);
    v.iter()
        .zip(&wh)
        .flat_map(|(v_row, wh_row)| v_row.iter().zip(wh_row).map(|(x, y)| (x - y) * (x - y)))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_matrix() -> Matrix {
        // Two clear blocks: docs 0-1 use terms 0-1, docs 2-3 use terms 2-3
        vec![
            vec![1.0, 0.9, 0.0, 0.0],
            vec![0.8, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.7],
            vec![0.0, 0.0, 0.9, 1.0],
        ]
    }

    fn argmax(row: &[f64]) -> usize {
        let mut best = 0;
        for (i, x) in row.iter().enumerate() {
            if *x > row[best] {
                best = i;
            }
        }
        best
    }

    #[test]
    fn test_separates_blocks() {
        let v = block_matrix();
        let f = Nmf::new(2, 500, 42).factorize(&v);

        assert_eq!(f.w.len(), 4);
        assert_eq!(f.h.len(), 2);
        assert_eq!(argmax(&f.w[0]), argmax(&f.w[1]));
        assert_eq!(argmax(&f.w[2]), argmax(&f.w[3]));
        assert_ne!(argmax(&f.w[0]), argmax(&f.w[2]));
        assert!(f.error < 0.5);
    }

    #[test]
    fn test_factors_stay_non_negative() {
        let f = Nmf::new(3, 100, 7).factorize(&block_matrix());
        assert!(f.w.iter().flatten().all(|x| *x >= 0.0));
        assert!(f.h.iter().flatten().all(|x| *x >= 0.0));
    }

    #[test]
    fn test_same_seed_same_result() {
        let v = block_matrix();
        let a = Nmf::new(2, 200, 42).factorize(&v);
        let b = Nmf::new(2, 200, 42).factorize(&v);
        assert_eq!(a.w, b.w);
        assert_eq!(a.h, b.h);
    }

    #[test]
    fn test_empty_input() {
        let f = Nmf::new(2, 10, 1).factorize(&[]);
        assert!(f.w.is_empty());
        assert_eq!(f.error, 0.0);
    }
}
