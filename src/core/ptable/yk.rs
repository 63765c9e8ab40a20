// yk.rs - Single-layer Y(m, n, k, j) helper used while generating p-value tables

use crate::error::RecError;

/// Y values for one fixed k, plus the diagonal Y(m, n, k-1, k-1) of the
/// previous layer. Only lives for the duration of one table generation.
pub(super) struct YkTable {
    m_size: usize,
    n_size: usize,
    j_size: usize,
    current_k: usize,
    offsets: Vec<usize>,
    values: Vec<f32>,
    last_diagonal: Vec<f32>,
}

fn min_j(m: usize, n: usize) -> usize {
    n.saturating_sub(m)
}

impl YkTable {
    pub(super) fn new(m_size: usize, n_size: usize, j_size: usize) -> Result<Self, RecError> {
        let pairs = m_size
            .checked_mul(n_size)
            .ok_or(RecError::Allocation("Y-value table"))?;

        let mut offsets = Vec::new();
        offsets
            .try_reserve_exact(pairs)
            .map_err(|_| RecError::Allocation("Y-value table"))?;
        let mut total = 0usize;
        for m in 1..=m_size {
            for n in 1..=n_size {
                offsets.push(total);
                let max_j = n.min(j_size);
                let low = min_j(m, n);
                if max_j >= low {
                    total += max_j - low + 1;
                }
            }
        }

        let mut values = Vec::new();
        values
            .try_reserve_exact(total)
            .map_err(|_| RecError::Allocation("Y-value table"))?;
        values.resize(total, 0.0f32);

        let mut last_diagonal = Vec::new();
        last_diagonal
            .try_reserve_exact(pairs)
            .map_err(|_| RecError::Allocation("Y-value table"))?;
        last_diagonal.resize(pairs, 0.0f32);

        Ok(Self {
            m_size,
            n_size,
            j_size,
            current_k: 0,
            offsets,
            values,
            last_diagonal,
        })
    }

    fn pair_index(&self, m: usize, n: usize) -> usize {
        (m - 1) * self.n_size + n - 1
    }

    fn index(&self, m: usize, n: usize, j: usize) -> usize {
        self.offsets[self.pair_index(m, n)] + (j - min_j(m, n))
    }

    /// Y(m, n, k, j) where `k` is the layer currently held.
    pub(super) fn value(&self, m: usize, n: usize, k: usize, j: usize) -> f64 {
        if n == 0 {
            return if k == 0 && j == 0 { 1.0 } else { 0.0 };
        }
        if m == 0 {
            return if n == k && k == j { 1.0 } else { 0.0 };
        }
        if k == 0 && j == 0 {
            return 0.0;
        }
        if j > k || k > n || k + m < n || j > n || j + m < n {
            return 0.0;
        }
        debug_assert_eq!(k, self.current_k, "Y layer {} requested while holding {}", k, self.current_k);
        if m > self.m_size || n > self.n_size || j > self.j_size {
            return 0.0;
        }
        f64::from(self.values[self.index(m, n, j)])
    }

    /// Replace the held layer with layer `k`; layers must be generated in order from 1.
    pub(super) fn generate_layer(&mut self, k: usize) {
        debug_assert!(k >= 1 && k <= self.j_size);

        if k == 1 {
            // Y(m, n, 0, 0) = 0 for m, n > 0
            self.last_diagonal.iter_mut().for_each(|v| *v = 0.0);
        } else {
            debug_assert_eq!(k, self.current_k + 1);
            for m in 1..=self.m_size {
                let max_n = (k - 1 + m).min(self.n_size);
                for n in (k - 1)..=max_n {
                    let diagonal = self.value(m, n, k - 1, k - 1) as f32;
                    let at = self.pair_index(m, n);
                    self.last_diagonal[at] = diagonal;
                }
            }
        }

        self.current_k = k;

        for m in 1..=self.m_size {
            let max_n = (k + m).min(self.n_size);
            for n in k..=max_n {
                let fm = m as f64;
                let fn_ = n as f64;
                // j > k is never read
                let max_j = n.min(self.j_size).min(k);
                for j in min_j(m, n)..=max_j {
                    let y = if j == 0 {
                        (fm / (fm + fn_)) * (self.value(m - 1, n, k, 1) + self.value(m - 1, n, k, 0))
                    } else if j == k {
                        let previous_diagonal = if n == 1 {
                            if k == 1 {
                                1.0
                            } else {
                                0.0
                            }
                        } else {
                            f64::from(self.last_diagonal[self.pair_index(m, n - 1)])
                        };
                        (fn_ / (fm + fn_)) * (previous_diagonal + self.value(m, n - 1, k, j - 1))
                    } else {
                        (fm * self.value(m - 1, n, k, j + 1) + fn_ * self.value(m, n - 1, k, j - 1))
                            / (fm + fn_)
                    };
                    let at = self.index(m, n, j);
                    self.values[at] = y as f32;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_values() {
        let yk = YkTable::new(4, 4, 4).unwrap();
        assert_eq!(yk.value(3, 0, 0, 0), 1.0);
        assert_eq!(yk.value(3, 0, 1, 0), 0.0);
        assert_eq!(yk.value(0, 2, 2, 2), 1.0);
        assert_eq!(yk.value(0, 2, 2, 1), 0.0);
        assert_eq!(yk.value(2, 3, 0, 0), 0.0);
    }

    #[test]
    fn test_first_layer() {
        let mut yk = YkTable::new(4, 4, 4).unwrap();
        yk.generate_layer(1);
        assert!((yk.value(1, 1, 1, 1) - 0.5).abs() < 1e-7);
        assert!((yk.value(2, 1, 1, 1) - 1.0 / 3.0).abs() < 1e-7);
    }

    #[test]
    fn test_layers_stay_probabilities() {
        let mut yk = YkTable::new(6, 6, 6).unwrap();
        for k in 1..6 {
            yk.generate_layer(k);
            for m in 1..=6 {
                for n in 1..=6 {
                    for j in 0..=k {
                        let y = yk.value(m, n, k, j);
                        assert!((0.0..=1.0 + 1e-6).contains(&y), "Y({}, {}, {}, {}) = {}", m, n, k, j, y);
                    }
                }
            }
        }
    }
}
