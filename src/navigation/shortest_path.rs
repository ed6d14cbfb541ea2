//! All-pairs shortest paths over a dense access-graph matrix.
//!
//! Dense-matrix convention: an off-diagonal entry that is `0` or not finite
//! means "no edge". The graph is directed, `m[(i, j)]` is the cost of
//! `i -> j`.

use nalgebra::DMatrix;

/// Floyd-Warshall distances and predecessors.
#[derive(Clone, Debug)]
pub struct ShortestPaths {
    /// `dist[(i, j)]`, infinite when `j` is unreachable from `i`.
    pub dist: DMatrix<f64>,
    /// `pred[i][j]`: node before `j` on the shortest `i -> j` path.
    pub pred: Vec<Vec<Option<usize>>>,
}

impl ShortestPaths {
    /// Run Floyd-Warshall on `m` (must be square).
    pub fn floyd_warshall(m: &DMatrix<f64>) -> Self {
        let n = m.nrows().min(m.ncols());
        let mut dist = DMatrix::from_element(n, n, f64::INFINITY);
        let mut pred: Vec<Vec<Option<usize>>> = vec![vec![None; n]; n];

        for i in 0..n {
            dist[(i, i)] = 0.0;
            for j in 0..n {
                let w = m[(i, j)];
                if i != j && w != 0.0 && w.is_finite() {
                    dist[(i, j)] = w;
                    pred[i][j] = Some(i);
                }
            }
        }

        for k in 0..n {
            for i in 0..n {
                let dik = dist[(i, k)];
                if !dik.is_finite() {
                    continue;
                }
                for j in 0..n {
                    let candidate = dik + dist[(k, j)];
                    if candidate < dist[(i, j)] {
                        dist[(i, j)] = candidate;
                        pred[i][j] = pred[k][j];
                    }
                }
            }
        }

        Self { dist, pred }
    }

    pub fn len(&self) -> usize {
        self.pred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pred.is_empty()
    }

    /// Nodes of the shortest `source -> target` path, listed from `target`
    /// back to `source`.
    ///
    /// `None` when `target` is unreachable or the predecessor chain is
    /// corrupt (loops or dead-ends before reaching `source`). The walk is
    /// bounded by the node count, so it always terminates.
    pub fn backtrace(&self, source: usize, target: usize) -> Option<Vec<usize>> {
        let n = self.len();
        if source >= n || target >= n {
            return None;
        }
        if source == target {
            return Some(vec![target]);
        }

        let row = &self.pred[source];
        let mut path = vec![target];
        let mut current = target;
        for _ in 0..n {
            let prev = row[current]?;
            path.push(prev);
            if prev == source {
                return Some(path);
            }
            current = prev;
        }
        None
    }

    /// Shortest walk from `from` to `to` when edges point towards the
    /// walker: the graph path `to -> from` traced back gives `[from, .., to]`.
    pub fn walk(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        self.backtrace(to, from)
    }

    /// Distance of the `from -> to` walk (see [`Self::walk`]).
    pub fn walk_distance(&self, from: usize, to: usize) -> f64 {
        if to >= self.len() || from >= self.len() {
            return f64::INFINITY;
        }
        self.dist[(to, from)]
    }
}
