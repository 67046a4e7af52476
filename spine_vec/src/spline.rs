// Natural cubic spline fitting through the digitized spine points and the
// tangent angles derived from it.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{Point, SvError};

/// Which coordinate is treated as the independent variable of the fitted curve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndependentAxis {
    /// x = f(y): the curve runs top to bottom, as points are digitized.
    Y,
    /// y = f(x).
    X,
}

impl Default for IndependentAxis {
    fn default() -> Self {
        IndependentAxis::Y
    }
}

impl IndependentAxis {
    pub fn independent(self, point: &Point) -> f64 {
        match self {
            IndependentAxis::Y => point.y,
            IndependentAxis::X => point.x,
        }
    }

    pub fn dependent(self, point: &Point) -> f64 {
        match self {
            IndependentAxis::Y => point.x,
            IndependentAxis::X => point.y,
        }
    }

    /// Map an (independent, dependent) pair back to (x, y).
    pub fn to_xy(self, independent: f64, dependent: f64) -> (f64, f64) {
        match self {
            IndependentAxis::Y => (dependent, independent),
            IndependentAxis::X => (independent, dependent),
        }
    }
}

/// Interpolating cubic spline with zero second derivative at both ends.
#[derive(Clone, Debug)]
pub struct NaturalCubicSpline {
    knots: Array1<f64>,
    values: Array1<f64>,
    second: Array1<f64>,
}

impl NaturalCubicSpline {
    /// Fit through `(knots[i], values[i])`. Knots must be finite and strictly increasing.
    pub fn fit(knots: &[f64], values: &[f64]) -> Result<Self, SvError> {
        if knots.len() != values.len() {
            return Err(SvError::InvalidParameter(format!(
                "spline needs matching knot/value lengths ({} vs {})",
                knots.len(),
                values.len()
            )));
        }
        let n = knots.len();
        if n < 2 {
            return Err(SvError::InsufficientPoints(n));
        }
        if let Some(bad) = knots.iter().chain(values).find(|v| !v.is_finite()) {
            return Err(SvError::NonFiniteCoordinate(*bad));
        }
        for w in knots.windows(2) {
            if w[1] <= w[0] {
                return Err(SvError::NonIncreasingAxis(w[1]));
            }
        }

        // Tridiagonal sweep for the second derivatives; the natural boundary
        // pins both ends at zero.
        let mut second = vec![0.0; n];
        let mut u = vec![0.0; n - 1];
        for i in 1..n - 1 {
            let sig = (knots[i] - knots[i - 1]) / (knots[i + 1] - knots[i - 1]);
            let p = sig * second[i - 1] + 2.0;
            second[i] = (sig - 1.0) / p;
            let slope_diff = (values[i + 1] - values[i]) / (knots[i + 1] - knots[i])
                - (values[i] - values[i - 1]) / (knots[i] - knots[i - 1]);
            u[i] = (6.0 * slope_diff / (knots[i + 1] - knots[i - 1]) - sig * u[i - 1]) / p;
        }
        for k in (0..n - 2).rev() {
            second[k + 1] = second[k + 1] * second[k + 2] + u[k + 1];
        }

        Ok(Self {
            knots: Array1::from_vec(knots.to_vec()),
            values: Array1::from_vec(values.to_vec()),
            second: Array1::from_vec(second),
        })
    }

    pub fn knots(&self) -> &Array1<f64> {
        &self.knots
    }

    /// Second derivative at each knot.
    pub fn second_derivatives(&self) -> &Array1<f64> {
        &self.second
    }

    /// Bracketing interval for `t`; outside the knot range the end segment is
    /// extended.
    fn segment(&self, t: f64) -> (usize, usize) {
        let mut lo = 0;
        let mut hi = self.knots.len() - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.knots[mid] > t {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        (lo, hi)
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let (lo, hi) = self.segment(t);
        let h = self.knots[hi] - self.knots[lo];
        let a = (self.knots[hi] - t) / h;
        let b = (t - self.knots[lo]) / h;
        a * self.values[lo]
            + b * self.values[hi]
            + ((a * a * a - a) * self.second[lo] + (b * b * b - b) * self.second[hi]) * h * h
                / 6.0
    }

    /// First derivative.
    pub fn derivative(&self, t: f64) -> f64 {
        let (lo, hi) = self.segment(t);
        let h = self.knots[hi] - self.knots[lo];
        let a = (self.knots[hi] - t) / h;
        let b = (t - self.knots[lo]) / h;
        (self.values[hi] - self.values[lo]) / h - (3.0 * a * a - 1.0) / 6.0 * h * self.second[lo]
            + (3.0 * b * b - 1.0) / 6.0 * h * self.second[hi]
    }
}

/// Angle in degrees of the unit tangent `(slope, 1)`, measured from the
/// independent axis direction.
pub fn tangent_angle_deg(slope: f64) -> f64 {
    let norm = (slope * slope + 1.0).sqrt();
    (slope / norm).atan2(1.0 / norm).to_degrees()
}

/// Spline through a point set, oriented by the chosen independent axis.
#[derive(Clone, Debug)]
pub struct FittedCurve {
    axis: IndependentAxis,
    spline: NaturalCubicSpline,
}

impl FittedCurve {
    /// Fit through points already sorted ascending on `axis`.
    pub fn fit(points: &[Point], axis: IndependentAxis) -> Result<Self, SvError> {
        let knots: Vec<f64> = points.iter().map(|p| axis.independent(p)).collect();
        let values: Vec<f64> = points.iter().map(|p| axis.dependent(p)).collect();
        let spline = NaturalCubicSpline::fit(&knots, &values)?;
        Ok(Self { axis, spline })
    }

    pub fn value_at(&self, t: f64) -> f64 {
        self.spline.evaluate(t)
    }

    pub fn slope_at(&self, t: f64) -> f64 {
        self.spline.derivative(t)
    }

    pub fn tangent_angle_at(&self, t: f64) -> f64 {
        tangent_angle_deg(self.slope_at(t))
    }

    /// One tangent angle per point, in input order.
    pub fn tangent_angles(&self, points: &[Point]) -> Vec<f64> {
        points
            .iter()
            .map(|p| self.tangent_angle_at(self.axis.independent(p)))
            .collect()
    }

    /// `count` evenly spaced (x, y) samples spanning the knot range.
    pub fn sample(&self, count: usize) -> Result<Vec<(f64, f64)>, SvError> {
        if count < 2 {
            return Err(SvError::InvalidParameter(format!(
                "curve sampling needs at least 2 samples, got {}",
                count
            )));
        }
        let knots = self.spline.knots();
        let start = knots[0];
        let end = knots[knots.len() - 1];
        let grid = Array1::linspace(start, end, count);
        Ok(grid
            .iter()
            .map(|&t| self.axis.to_xy(t, self.value_at(t)))
            .collect())
    }
}
