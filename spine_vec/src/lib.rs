//! Spinal load vector computation: fits a curve through labeled vertebral
//! points and decomposes body weight into per-level shear and normal loads.

use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod levels;
pub mod spline;
pub mod table;
pub mod vectors;

pub use levels::{weight_shares, LevelCode, Region, RegionWeightShare, WeightShareTable};
pub use spline::{tangent_angle_deg, FittedCurve, IndependentAxis, NaturalCubicSpline};
pub use table::{
    build_rows, read_coordinates, write_coordinates, write_result_table, OutputRow, RowKind,
    COORDINATE_HEADERS, GLOBAL_TAG, RESULT_HEADERS,
};
pub use vectors::{
    aggregate, decompose, LevelVector, RegionResultant, Resultants, SIGNED_LOAD_DIVISOR,
    STANDARD_GRAVITY,
};

#[derive(Error, Debug)]
pub enum SvError {
    #[error("curve fitting needs at least 2 points, got {0}")]
    InsufficientPoints(usize),
    #[error("independent-axis values must be strictly increasing (repeated or unsorted at {0})")]
    NonIncreasingAxis(f64),
    #[error("non-finite coordinate: {0}")]
    NonFiniteCoordinate(f64),
    #[error("unknown vertebral level label: {0:?}")]
    UnknownLevel(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Body weight used when none is supplied, kg.
pub const DEFAULT_WEIGHT_KG: f64 = 60.0;

/// Labeled points required in every region before vectors are computed.
pub const MIN_POINTS_PER_REGION: usize = 2;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    pub axis: IndependentAxis,
    /// Gravitational acceleration applied to the body weight, m/s^2.
    pub gravity_m_s2: f64,
    pub min_points_per_region: usize,
    pub curve_samples: usize,
    /// Weight the CLI falls back to when `--weight` is absent, kg.
    pub weight_kg: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            axis: IndependentAxis::Y,
            gravity_m_s2: STANDARD_GRAVITY,
            min_points_per_region: MIN_POINTS_PER_REGION,
            curve_samples: 1000,
            weight_kg: DEFAULT_WEIGHT_KG,
        }
    }
}

impl Params {
    pub fn from_json(text: &str) -> Result<Self, SvError> {
        let params: Params = serde_json::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), SvError> {
        if self.curve_samples < 2 {
            return Err(SvError::InvalidParameter(format!(
                "curve_samples must be at least 2, got {}",
                self.curve_samples
            )));
        }
        if !self.gravity_m_s2.is_finite() || self.gravity_m_s2 <= 0.0 {
            return Err(SvError::InvalidParameter(format!(
                "gravity_m_s2 must be a positive number, got {}",
                self.gravity_m_s2
            )));
        }
        if self.min_points_per_region == 0 {
            return Err(SvError::InvalidParameter(
                "min_points_per_region must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A digitized point. An empty label marks a curve-only point.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub label: String,
}

impl Point {
    pub fn new(x: f64, y: f64, label: impl Into<String>) -> Self {
        Self {
            x,
            y,
            label: label.into(),
        }
    }

    pub fn unlabeled(x: f64, y: f64) -> Self {
        Self::new(x, y, String::new())
    }

    pub fn is_labeled(&self) -> bool {
        !self.label.trim().is_empty()
    }

    pub fn level(&self) -> Option<LevelCode> {
        LevelCode::parse(&self.label)
    }
}

/// Why a point set cannot be evaluated yet. These are expected, user-correctable
/// conditions rather than errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Insufficiency {
    NoPoints,
    InvalidWeight,
    SparseRegion {
        region: Region,
        count: usize,
        required: usize,
    },
}

impl fmt::Display for Insufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insufficiency::NoPoints => f.write_str("no points supplied"),
            Insufficiency::InvalidWeight => f.write_str("weight must be a positive number"),
            Insufficiency::SparseRegion {
                region,
                count,
                required,
            } => write!(
                f,
                "{} region has {} labeled point(s); at least {} are required",
                region, count, required
            ),
        }
    }
}

/// Labeled point counts per region; unrecognized labels are not counted.
pub fn region_counts(points: &[Point]) -> [(Region, usize); 3] {
    Region::ALL.map(|region| {
        let count = points
            .iter()
            .filter_map(Point::level)
            .filter(|level| level.region() == region)
            .count();
        (region, count)
    })
}

/// First reason, if any, that `points` and `weight` cannot be evaluated with
/// `min_per_region` labeled points required in each region.
pub fn check_sufficiency(
    points: &[Point],
    weight: f64,
    min_per_region: usize,
) -> Option<Insufficiency> {
    if points.is_empty() {
        return Some(Insufficiency::NoPoints);
    }
    if !weight.is_finite() || weight <= 0.0 {
        return Some(Insufficiency::InvalidWeight);
    }
    region_counts(points)
        .into_iter()
        .find(|(_, count)| *count < min_per_region)
        .map(|(region, count)| Insufficiency::SparseRegion {
            region,
            count,
            required: min_per_region,
        })
}

/// Parse a weight as typed by a user. Empty, non-numeric, non-finite and
/// non-positive input yields `None`.
pub fn parse_weight(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite() && *w > 0.0)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpineLoadResult {
    pub weight_kg: f64,
    pub axis: IndependentAxis,
    /// Input points sorted along the independent axis.
    pub points: Vec<Point>,
    /// Tangent angle at each sorted point, degrees.
    pub angles_deg: Vec<f64>,
    pub levels: Vec<LevelVector>,
    pub resultants: Resultants,
    pub rows: Vec<OutputRow>,
}

impl SpineLoadResult {
    /// Whole-spine resultant.
    pub fn global(&self) -> &RegionResultant {
        &self.resultants.global
    }
}

/// Points sorted ascending along `axis`; ties keep input order.
pub fn sort_points(points: &[Point], axis: IndependentAxis) -> Vec<Point> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| OrderedFloat(axis.independent(p)));
    sorted
}

/// Compute load vectors with default parameters.
///
/// Returns `Ok(None)` when the data is insufficient (see [`check_sufficiency`])
/// and `Err` when a labeled point carries a code outside the level enumeration
/// or the curve cannot be fitted.
pub fn compute_spine_vectors(
    points: &[Point],
    weight: f64,
) -> Result<Option<SpineLoadResult>, SvError> {
    let params = Params::default();
    compute_spine_vectors_with(points, weight, &params)
}

/// Same as [`compute_spine_vectors`] with the weight given as text.
pub fn compute_spine_vectors_from_text(
    points: &[Point],
    weight: &str,
) -> Result<Option<SpineLoadResult>, SvError> {
    match parse_weight(weight) {
        Some(weight) => compute_spine_vectors(points, weight),
        None => {
            debug!(input = weight, "weight is not a positive number");
            Ok(None)
        }
    }
}

pub fn compute_spine_vectors_with(
    points: &[Point],
    weight: f64,
    params: &Params,
) -> Result<Option<SpineLoadResult>, SvError> {
    params.validate()?;
    if let Some(reason) = check_sufficiency(points, weight, params.min_points_per_region) {
        debug!(%reason, "insufficient data for spine vectors");
        return Ok(None);
    }
    debug!(points = points.len(), weight, "computing spine vectors");

    let sorted = sort_points(points, params.axis);
    let curve = FittedCurve::fit(&sorted, params.axis)?;
    let angles_deg = curve.tangent_angles(&sorted);

    let shares = weight_shares();
    let mut levels = Vec::with_capacity(sorted.len());
    for (point, &angle) in sorted.iter().zip(angles_deg.iter()) {
        if !point.is_labeled() {
            continue;
        }
        levels.push(decompose(point, angle, weight, params.gravity_m_s2, shares)?);
    }

    let resultants = aggregate(&levels);
    if !resultants.is_finite() {
        return Err(SvError::InvalidParameter(format!(
            "weight {} kg overflows the resultant loads",
            weight
        )));
    }
    let rows = build_rows(&levels, &resultants);
    debug!(
        levels = levels.len(),
        magnitude = resultants.global.magnitude,
        clinical_angle = resultants.global.clinical_angle_deg,
        "spine vectors computed"
    );

    Ok(Some(SpineLoadResult {
        weight_kg: weight,
        axis: params.axis,
        points: sorted,
        angles_deg,
        levels,
        resultants,
        rows,
    }))
}
