use std::collections::{HashMap, VecDeque};

use crate::params::GridGrowthParams;
use kiddo::{KdTree, SquaredEuclidean};
use log::{debug, trace};
use nalgebra::{Point2, Vector2};

/// Integer lattice coordinates `(i, j)` -> corner index.
pub type GridLabels = HashMap<(i32, i32), usize>;

const STEPS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const MAX_RADIUS: f32 = 1.0e6;

/// Breadth-first lattice growth over a fixed corner cloud.
pub struct GridGrower<'a> {
    positions: &'a [Point2<f32>],
    tree: KdTree<f32, 2>,
    params: &'a GridGrowthParams,
}

impl<'a> GridGrower<'a> {
    pub fn new(positions: &'a [Point2<f32>], params: &'a GridGrowthParams) -> Self {
        let coords = positions.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();
        Self {
            positions,
            tree,
            params,
        }
    }

    #[inline]
    fn pos(&self, idx: usize) -> Vector2<f32> {
        self.positions[idx].coords
    }

    /// Corner indices ordered by distance to the centroid of the cloud,
    /// truncated to `max_seeds`.
    pub fn seeds(&self) -> Vec<usize> {
        if self.positions.is_empty() {
            return Vec::new();
        }
        let centroid = self
            .positions
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.coords)
            / self.positions.len() as f32;

        let mut order: Vec<usize> = (0..self.positions.len()).collect();
        order.sort_by(|&a, &b| {
            let da = (self.pos(a) - centroid).norm_squared();
            let db = (self.pos(b) - centroid).norm_squared();
            da.total_cmp(&db)
        });
        order.truncate(self.params.max_seeds);
        order
    }

    /// Up to `k` corners closest to `p`, nearest first. The radius query is
    /// widened until enough corners fall inside it.
    fn k_nearest(&self, p: Vector2<f32>, k: usize) -> Vec<usize> {
        let mut radius = 4.0f32;
        loop {
            let found = self
                .tree
                .within::<SquaredEuclidean>(&[p.x, p.y], radius * radius);
            if found.len() >= k || found.len() >= self.positions.len() || radius > MAX_RADIUS {
                return found
                    .into_iter()
                    .take(k)
                    .map(|nn| nn.item as usize)
                    .collect();
            }
            radius *= 2.0;
        }
    }

    /// Two local grid steps at `seed`: the nearest neighbor, and the nearest
    /// roughly perpendicular neighbor of comparable length.
    fn seed_steps(&self, seed: usize) -> Option<(Vector2<f32>, Vector2<f32>)> {
        let p = self.pos(seed);
        let mut candidates = self
            .k_nearest(p, self.params.k_neighbors + 1)
            .into_iter()
            .filter(|&idx| idx != seed)
            .map(|idx| self.pos(idx) - p)
            .filter(|d| d.norm() > 1e-3);

        let u = candidates.next()?;
        let u_len = u.norm();
        let v = candidates.find(|w| {
            let w_len = w.norm();
            let cos = (u.dot(w) / (u_len * w_len)).abs();
            let ratio = w_len / u_len;
            cos < self.params.max_axis_cos
                && ratio <= self.params.max_step_ratio
                && ratio >= 1.0 / self.params.max_step_ratio
        })?;
        Some((u, v))
    }

    /// Closest corner to `target` within `radius` that is not yet labelled.
    fn nearest_free(&self, target: Vector2<f32>, radius: f32, used: &[bool]) -> Option<usize> {
        self.tree
            .within::<SquaredEuclidean>(&[target.x, target.y], radius * radius)
            .into_iter()
            .map(|nn| nn.item as usize)
            .find(|&idx| !used[idx])
    }

    /// Local steps at a labelled cell, measured from labelled neighbors when
    /// available and falling back to the inherited steps otherwise.
    fn local_steps(
        &self,
        labels: &GridLabels,
        (i, j): (i32, i32),
        inherited: (Vector2<f32>, Vector2<f32>),
    ) -> (Vector2<f32>, Vector2<f32>) {
        let at = |cell: (i32, i32)| labels.get(&cell).map(|&idx| self.pos(idx));
        let Some(p) = at((i, j)) else {
            return inherited;
        };
        let u = match (at((i + 1, j)), at((i - 1, j))) {
            (Some(r), _) => r - p,
            (None, Some(l)) => p - l,
            _ => inherited.0,
        };
        let v = match (at((i, j + 1)), at((i, j - 1))) {
            (Some(d), _) => d - p,
            (None, Some(up)) => p - up,
            _ => inherited.1,
        };
        (u, v)
    }

    /// Grow a lattice from `seed`. Returns `None` if the seed has no usable
    /// pair of neighbor steps.
    pub fn grow_from(&self, seed: usize) -> Option<GridLabels> {
        let (u0, v0) = self.seed_steps(seed)?;

        let mut labels = GridLabels::new();
        let mut inherited: HashMap<(i32, i32), (Vector2<f32>, Vector2<f32>)> = HashMap::new();
        let mut used = vec![false; self.positions.len()];
        let mut queue = VecDeque::new();

        labels.insert((0, 0), seed);
        inherited.insert((0, 0), (u0, v0));
        used[seed] = true;
        queue.push_back((0, 0));

        while let Some(cell) = queue.pop_front() {
            let fallback = inherited.get(&cell).copied().unwrap_or((u0, v0));
            let (u, v) = self.local_steps(&labels, cell, fallback);
            let p = self.pos(labels[&cell]);

            for (di, dj) in STEPS {
                let next = (cell.0 + di, cell.1 + dj);
                if labels.contains_key(&next) {
                    continue;
                }
                let step = u * di as f32 + v * dj as f32;
                let radius = self.params.search_radius_rel * step.norm();
                let Some(idx) = self.nearest_free(p + step, radius, &used) else {
                    continue;
                };

                let actual = self.pos(idx) - p;
                let steps = if di != 0 {
                    (actual * di as f32, v)
                } else {
                    (u, actual * dj as f32)
                };
                labels.insert(next, idx);
                inherited.insert(next, steps);
                used[idx] = true;
                queue.push_back(next);
            }
        }

        trace!("seed {} grew {} labelled corners", seed, labels.len());
        Some(labels)
    }
}

/// Placement of the board inside a labelled lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardWindow {
    /// Lattice coordinates of board corner `(0, 0)`.
    pub origin: (i32, i32),
    /// The lattice holds the board as `rows x cols`; board `(a, b)` sits at
    /// lattice `origin + (b, a)`. This only reflects how the lattice happened
    /// to be labelled.
    pub transposed: bool,
}

impl BoardWindow {
    #[inline]
    pub fn cell(&self, a: usize, b: usize) -> (i32, i32) {
        let (a, b) = (a as i32, b as i32);
        if self.transposed {
            (self.origin.0 + b, self.origin.1 + a)
        } else {
            (self.origin.0 + a, self.origin.1 + b)
        }
    }
}

/// Find the unique fully populated `cols x rows` (or transposed) window.
///
/// Returns `None` when no window is complete or more than one is, since the
/// board position would then be ambiguous.
pub fn find_board_window(labels: &GridLabels, cols: usize, rows: usize) -> Option<BoardWindow> {
    if labels.len() < cols * rows {
        return None;
    }
    let (mut min_i, mut max_i, mut min_j, mut max_j) = (i32::MAX, i32::MIN, i32::MAX, i32::MIN);
    for &(i, j) in labels.keys() {
        min_i = min_i.min(i);
        max_i = max_i.max(i);
        min_j = min_j.min(j);
        max_j = max_j.max(j);
    }

    let mut layouts = vec![false];
    if cols != rows {
        layouts.push(true);
    }

    let mut found = Vec::new();
    for transposed in layouts {
        let (w, h) = if transposed {
            (rows as i32, cols as i32)
        } else {
            (cols as i32, rows as i32)
        };
        for i0 in min_i..=(max_i - w + 1) {
            for j0 in min_j..=(max_j - h + 1) {
                let window = BoardWindow {
                    origin: (i0, j0),
                    transposed,
                };
                let complete = (0..rows)
                    .all(|b| (0..cols).all(|a| labels.contains_key(&window.cell(a, b))));
                if complete {
                    found.push(window);
                }
            }
        }
    }

    match found.as_slice() {
        [only] => Some(*only),
        [] => None,
        many => {
            debug!(
                "{} complete board windows, position is ambiguous",
                many.len()
            );
            None
        }
    }
}

/// Reorder `points` (row-major, `i` fastest) so that the `i` axis runs along
/// +x and the `j` axis along +y. Square boards may also be transposed.
///
/// Returns `true` when the `i` axis still ends up closer to vertical, i.e. the
/// board is held with its `cols` side upright.
pub(crate) fn canonicalize_orientation(
    points: &mut Vec<Point2<f32>>,
    cols: usize,
    rows: usize,
) -> bool {
    let axes = |pts: &[Point2<f32>], cols: usize, rows: usize| {
        let at = |a: usize, b: usize| pts[b * cols + a].coords;
        let d_a = (0..rows).fold(Vector2::zeros(), |acc, b| acc + at(cols - 1, b) - at(0, b));
        let d_b = (0..cols).fold(Vector2::zeros(), |acc, a| acc + at(a, rows - 1) - at(a, 0));
        (d_a, d_b)
    };

    if cols == rows {
        let (d_a, _) = axes(points, cols, rows);
        if d_a.x.abs() < d_a.y.abs() {
            let transposed = (0..rows)
                .flat_map(|b| (0..cols).map(move |a| (a, b)))
                .map(|(a, b)| points[a * cols + b])
                .collect();
            *points = transposed;
        }
    }

    let (d_a, d_b) = axes(points, cols, rows);
    // Image y points down, so a board seen from the front has positive cross.
    if d_a.x * d_b.y - d_a.y * d_b.x < 0.0 {
        let flipped = (0..rows)
            .rev()
            .flat_map(|b| (0..cols).map(move |a| b * cols + a))
            .map(|k| points[k])
            .collect();
        *points = flipped;
    }

    let (d_a, _) = axes(points, cols, rows);
    if d_a.x < 0.0 {
        points.reverse();
    }
    d_a.y.abs() > d_a.x.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(cols: usize, rows: usize, spacing: f32, origin: (f32, f32)) -> Vec<Point2<f32>> {
        (0..rows)
            .flat_map(|j| {
                (0..cols).map(move |i| {
                    Point2::new(origin.0 + i as f32 * spacing, origin.1 + j as f32 * spacing)
                })
            })
            .collect()
    }

    #[test]
    fn grows_full_regular_lattice() {
        let pts = lattice(5, 4, 20.0, (100.0, 50.0));
        let params = GridGrowthParams::default();
        let grower = GridGrower::new(&pts, &params);
        let seed = grower.seeds()[0];
        let labels = grower.grow_from(seed).expect("seed steps");
        assert_eq!(labels.len(), 20);

        let window = find_board_window(&labels, 5, 4).expect("window");
        let mut seen: Vec<usize> = (0..4)
            .flat_map(|b| (0..5).map(move |a| (a, b)))
            .map(|(a, b)| labels[&window.cell(a, b)])
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn window_search_accepts_transposed_and_rejects_ambiguous() {
        let mut labels = GridLabels::new();
        for i in 0..3 {
            for j in 0..4 {
                labels.insert((i, j), labels.len());
            }
        }
        let w = find_board_window(&labels, 4, 3).expect("transposed window");
        assert!(w.transposed);
        assert_eq!(w.cell(3, 0), (0, 3));

        // A 3x4 lattice contains two 3x3 windows.
        assert!(find_board_window(&labels, 3, 3).is_none());
        // And no 5x2 window at all.
        assert!(find_board_window(&labels, 5, 2).is_none());
    }

    #[test]
    fn canonical_orientation_undoes_flips() {
        let truth = lattice(4, 3, 10.0, (0.0, 0.0));

        let mut rotated = truth.clone();
        rotated.reverse();
        assert!(!canonicalize_orientation(&mut rotated, 4, 3));
        assert_eq!(rotated, truth);

        let mut mirrored: Vec<Point2<f32>> = (0..3)
            .rev()
            .flat_map(|b| (0..4).map(move |a| b * 4 + a))
            .map(|k| truth[k])
            .collect();
        canonicalize_orientation(&mut mirrored, 4, 3);
        assert_eq!(mirrored, truth);
    }
}
