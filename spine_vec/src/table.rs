// Result table assembly and the CSV codecs for result and coordinate tables.

use std::io::{Read, Write};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::levels::Region;
use crate::spline::IndependentAxis;
use crate::vectors::{LevelVector, RegionResultant, Resultants};
use crate::{Point, SvError};

/// Tag of the whole-spine resultant row.
pub const GLOBAL_TAG: &str = "GSV";

pub const RESULT_HEADERS: [&str; 5] = [
    "Slope Angle",
    "Shear Vector Magnitude",
    "Normal Vector Magnitude",
    "Vector Ratio",
    "Level",
];

pub const COORDINATE_HEADERS: [&str; 3] = ["Level", "X", "Y"];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Level,
    Summary,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OutputRow {
    pub angle_deg: f64,
    pub shear_magnitude: f64,
    pub normal_magnitude: f64,
    pub ratio: f64,
    pub label: String,
    pub kind: RowKind,
}

impl OutputRow {
    fn from_level(v: &LevelVector) -> Self {
        Self {
            angle_deg: v.angle_deg,
            shear_magnitude: v.signed_shear,
            normal_magnitude: v.signed_normal,
            ratio: v.ratio,
            label: v.level.to_string(),
            kind: RowKind::Level,
        }
    }

    /// The reported angle is the resultant direction rounded half-to-even to
    /// whole degrees, then reflected through 180.
    fn from_resultant(r: &RegionResultant, tag: &str) -> Self {
        Self {
            angle_deg: 180.0 - r.angle_deg.round_ties_even(),
            shear_magnitude: r.magnitude,
            normal_magnitude: r.normal_magnitude,
            ratio: r.ratio,
            label: tag.to_string(),
            kind: RowKind::Summary,
        }
    }

    /// CSV cells: level rows keep one decimal, summary rows report whole
    /// degrees and newtons with a one-decimal ratio.
    pub fn to_record(&self) -> [String; 5] {
        match self.kind {
            RowKind::Level => [
                format!("{:.1}", self.angle_deg),
                format!("{:.1}", self.shear_magnitude),
                format!("{:.1}", self.normal_magnitude),
                format!("{:.1}", self.ratio),
                self.label.clone(),
            ],
            RowKind::Summary => [
                format!("{:.0}", self.angle_deg),
                format!("{:.0}", self.shear_magnitude),
                format!("{:.0}", self.normal_magnitude),
                format!("{:.1}", self.ratio),
                self.label.clone(),
            ],
        }
    }
}

/// Level rows in input order followed by the three regional and the global
/// resultant rows.
pub fn build_rows(levels: &[LevelVector], resultants: &Resultants) -> Vec<OutputRow> {
    let mut rows: Vec<OutputRow> = levels.iter().map(OutputRow::from_level).collect();
    for region in Region::ALL {
        rows.push(OutputRow::from_resultant(
            resultants.region(region),
            region.summary_tag(),
        ));
    }
    rows.push(OutputRow::from_resultant(&resultants.global, GLOBAL_TAG));
    rows
}

pub fn write_result_table<W: Write>(rows: &[OutputRow], writer: W) -> Result<(), SvError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(RESULT_HEADERS)?;
    for row in rows {
        csv.write_record(row.to_record())?;
    }
    csv.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CoordinateRecord {
    #[serde(rename = "Level", default)]
    level: String,
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
}

/// Write a `Level,X,Y` table sorted along `axis`.
pub fn write_coordinates<W: Write>(
    points: &[Point],
    axis: IndependentAxis,
    writer: W,
) -> Result<(), SvError> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| OrderedFloat(axis.independent(p)));
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(COORDINATE_HEADERS)?;
    for p in &sorted {
        csv.write_record([p.label.clone(), p.x.to_string(), p.y.to_string()])?;
    }
    csv.flush()?;
    Ok(())
}

/// Read a `Level,X,Y` table back into points, in file order.
pub fn read_coordinates<R: Read>(reader: R) -> Result<Vec<Point>, SvError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut points = Vec::new();
    for record in csv.deserialize::<CoordinateRecord>() {
        let record = record?;
        if !record.x.is_finite() || !record.y.is_finite() {
            return Err(SvError::NonFiniteCoordinate(if record.x.is_finite() {
                record.y
            } else {
                record.x
            }));
        }
        points.push(Point::new(record.x, record.y, record.level));
    }
    Ok(points)
}
