use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Homogeneous coordinates whose `w` falls below this magnitude map to infinity.
pub const PROJECTION_EPS: f64 = 1e-10;

/// Normalised triangle area below which three points count as collinear.
const COLLINEAR_EPS: f64 = 1e-9;

/// Relative singular-value gap below which the DLT null space is not 1-D.
const RANK_EPS: f64 = 1e-12;

/// Smallest-to-largest singular value ratio a normalised solution must exceed.
const CONDITION_EPS: f64 = 1e-10;

/// Planar projective transform, normalised so that `h[(2, 2)] == 1`.
///
/// The matrix is immutable once built: every constructor normalises and
/// validates it, and there is no mutable accessor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography {
    h: Matrix3<f64>,
}

/// Reasons a direct solve can fail.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("correspondence coordinates must be finite")]
    NonFinite,
    #[error("need at least {needed} correspondences, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("source and destination sets differ in length ({src} vs {dst})")]
    LengthMismatch { src: usize, dst: usize },
    #[error("three {set} points are collinear or coincident")]
    Collinear { set: &'static str },
    #[error("linear system is singular")]
    Singular,
    #[error("point configuration does not determine a unique homography")]
    RankDeficient,
    #[error("solution is not a finite, invertible homography")]
    InvalidSolution,
}

impl Homography {
    /// Normalise `m` by its bottom-right element.
    ///
    /// Returns `None` for matrices that are non-finite, singular, or whose
    /// bottom-right element is zero.
    ///
    /// Only exact singularity is rejected here. The solvers check conditioning
    /// in normalised coordinates, where it does not depend on the world units.
    pub fn from_matrix(m: Matrix3<f64>) -> Option<Self> {
        let s = m[(2, 2)];
        if !s.is_finite() || s.abs() < 1e-12 {
            return None;
        }
        let h = m / s;
        if h.iter().any(|v| !v.is_finite()) {
            return None;
        }
        if !h.determinant().is_normal() {
            return None;
        }
        Some(Self { h })
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Option<Self> {
        Self::from_matrix(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    /// `H * [x, y, 1]^T` without the perspective divide.
    #[inline]
    pub fn apply_homogeneous(&self, p: Point2<f64>) -> Vector3<f64> {
        self.h * Vector3::new(p.x, p.y, 1.0)
    }

    /// Map `p` through the homography.
    ///
    /// Returns `None` when the point lands on (or numerically near) the line
    /// at infinity.
    #[inline]
    pub fn project(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.apply_homogeneous(p);
        let w = v[2];
        if !w.is_finite() || w.abs() < PROJECTION_EPS {
            return None;
        }
        let out = Point2::new(v[0] / w, v[1] / w);
        (out.x.is_finite() && out.y.is_finite()).then_some(out)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().and_then(Self::from_matrix)
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}

impl TryFrom<[[f64; 3]; 3]> for Homography {
    type Error = String;

    fn try_from(rows: [[f64; 3]; 3]) -> Result<Self, Self::Error> {
        Homography::from_array(rows)
            .ok_or_else(|| "matrix is not a finite, invertible homography".to_string())
    }
}

/// Distance between `project(h, src)` and `dst`, infinite if `src` maps to infinity.
pub fn transfer_error(h: &Homography, src: Point2<f64>, dst: Point2<f64>) -> f64 {
    match h.project(src) {
        Some(p) => (p - dst).norm(),
        None => f64::INFINITY,
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // Hartley normalization: translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);

    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

/// True if `hn`, a solution between Hartley-normalised point sets, is finite
/// and far from rank-deficient.
fn well_conditioned(hn: &Matrix3<f64>) -> bool {
    if hn.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let sv = hn.singular_values();
    let max = sv.max();
    max > 0.0 && sv.min() > CONDITION_EPS * max
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    if !well_conditioned(&hn) {
        return None;
    }
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

fn all_finite(pts: &[Point2<f64>]) -> bool {
    pts.iter().all(|p| p.x.is_finite() && p.y.is_finite())
}

/// True if any three of `pts` are (numerically) collinear.
///
/// Expects Hartley-normalised input so that the area tolerance is scale-free.
fn has_collinear_triple(pts: &[Point2<f64>]) -> bool {
    let n = pts.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let a = pts[j] - pts[i];
                let b = pts[k] - pts[i];
                if (a.x * b.y - a.y * b.x).abs() < COLLINEAR_EPS {
                    return true;
                }
            }
        }
    }
    false
}

/// True if every point of `pts` lies on one line, coincident points included.
///
/// Tested on the scatter of the Hartley-normalised set, so the tolerance does
/// not depend on the units of `pts`.
pub(crate) fn all_collinear(pts: &[Point2<f64>]) -> bool {
    if pts.len() < 3 {
        return true;
    }
    let (norm, _) = normalize_points(pts);
    let n = norm.len() as f64;
    let cx = norm.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = norm.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0_f64, 0.0_f64, 0.0_f64);
    for p in &norm {
        let (dx, dy) = (p.x - cx, p.y - cy);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    let trace = sxx + syy;
    trace <= COLLINEAR_EPS || (sxx * syy - sxy * sxy) <= COLLINEAR_EPS * trace * trace
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Solves the 8-unknown linear system with `h33 = 1`. Fails if three points of
/// either set are collinear, since the transform is then not unique.
pub fn homography_from_4pt(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Result<Homography, SolveError> {
    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // For each correspondence (x,y)->(u,v):
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    if !all_finite(src) || !all_finite(dst) {
        return Err(SolveError::NonFinite);
    }
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);
    if has_collinear_triple(&src_n) {
        return Err(SolveError::Collinear { set: "source" });
    }
    if has_collinear_triple(&dst_n) {
        return Err(SolveError::Collinear { set: "destination" });
    }

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b).ok_or(SolveError::Singular)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    denormalize_homography(hn, t_src, t_dst)
        .and_then(Homography::from_matrix)
        .ok_or(SolveError::InvalidSolution)
}

/// Least-squares DLT estimate of H such that `dst ~ H * src`.
///
/// Four correspondences are delegated to [`homography_from_4pt`]. With more,
/// `h` is the right singular vector of the smallest singular value of the
/// stacked `2N x 9` system, which must be the only (near-)null direction.
pub fn homography_least_squares(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> Result<Homography, SolveError> {
    if src.len() != dst.len() {
        return Err(SolveError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(SolveError::TooFewPoints {
            needed: 4,
            got: src.len(),
        });
    }
    if !all_finite(src) || !all_finite(dst) {
        return Err(SolveError::NonFinite);
    }
    if src.len() == 4 {
        let s: &[Point2<f64>; 4] = src.try_into().map_err(|_| SolveError::Singular)?;
        let d: &[Point2<f64>; 4] = dst.try_into().map_err(|_| SolveError::Singular)?;
        return homography_from_4pt(s, d);
    }

    let (r, tr) = normalize_points(src);
    let (i, ti) = normalize_points(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let x = r[k].x;
        let y = r[k].y;
        let u = i[k].x;
        let v = i[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(true, true);
    let vt = svd.v_t.ok_or(SolveError::Singular)?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&p, &q| svd.singular_values[p].total_cmp(&svd.singular_values[q]));
    let (&min_idx, &next_idx, &max_idx) = match order.as_slice() {
        [lo, next, .., hi] => (lo, next, hi),
        _ => return Err(SolveError::Singular),
    };
    if svd.singular_values[next_idx] <= RANK_EPS * svd.singular_values[max_idx] {
        return Err(SolveError::RankDeficient);
    }

    let h = vt.row(min_idx);
    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // Denormalize: H = Ti^{-1} * Hn * Tr
    denormalize_homography(hn, tr, ti)
        .and_then(Homography::from_matrix)
        .ok_or(SolveError::InvalidSolution)
}
