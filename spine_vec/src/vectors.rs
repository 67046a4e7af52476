// Per-level shear/normal decomposition and regional resultant aggregation.

use serde::{Deserialize, Serialize};

use crate::levels::{LevelCode, Region, WeightShareTable};
use crate::{Point, SvError};

/// Standard gravity (m/s^2).
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Divisor applied to the cumulative-share (signed) force formulas. The value
/// is carried over from the clinical model as-is; its derivation is not known.
pub const SIGNED_LOAD_DIVISOR: f64 = 58.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LevelVector {
    pub level: LevelCode,
    pub start: (f64, f64),
    pub angle_deg: f64,
    pub shear_magnitude: f64,
    pub normal_magnitude: f64,
    /// Shear load from the cumulative share, sign kept.
    pub signed_shear: f64,
    /// Normal load from the cumulative share, sign kept.
    pub signed_normal: f64,
    pub ratio: f64,
    pub shear_vector: (f64, f64),
    pub normal_vector: (f64, f64),
}

/// Decompose the load of `weight` kg under `gravity` m/s^2 at one labeled point.
///
/// Shear and normal magnitudes use the level's single-level share; the signed
/// pair uses the cumulative share and [`SIGNED_LOAD_DIVISOR`]. The shear
/// excursion vector flips both components for negative angles while the normal
/// vector does not.
pub fn decompose(
    point: &Point,
    angle_deg: f64,
    weight: f64,
    gravity: f64,
    shares: &WeightShareTable,
) -> Result<LevelVector, SvError> {
    let (level, share) = shares.lookup(&point.label)?;
    if !weight.is_finite() || weight <= 0.0 {
        return Err(SvError::InvalidParameter(format!(
            "weight must be a positive number, got {}",
            weight
        )));
    }
    if !gravity.is_finite() || gravity <= 0.0 {
        return Err(SvError::InvalidParameter(format!(
            "gravity must be a positive number, got {}",
            gravity
        )));
    }
    if !angle_deg.is_finite() {
        return Err(SvError::InvalidParameter(format!(
            "tangent angle at {} is not finite",
            level
        )));
    }

    let theta = angle_deg.to_radians();
    let (sin, cos) = theta.sin_cos();
    let load = gravity * weight;

    let shear_magnitude = (load * sin * share.single_level).abs();
    let normal_magnitude = (load * cos * share.single_level).abs();
    let signed_shear = load * sin * share.cumulative / SIGNED_LOAD_DIVISOR;
    let signed_normal = load * cos * share.cumulative / SIGNED_LOAD_DIVISOR;
    let finite = [load, shear_magnitude, normal_magnitude, signed_shear, signed_normal]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(SvError::InvalidParameter(format!(
            "load of {} kg at {} overflows",
            weight, level
        )));
    }

    let shear_vector = if theta < 0.0 {
        (shear_magnitude * cos, -shear_magnitude * sin)
    } else {
        (-shear_magnitude * cos, shear_magnitude * sin)
    };
    let normal_vector = (normal_magnitude * sin, normal_magnitude * cos);

    Ok(LevelVector {
        level,
        start: (point.x, point.y),
        angle_deg,
        shear_magnitude,
        normal_magnitude,
        signed_shear,
        signed_normal,
        ratio: theta.tan(),
        shear_vector,
        normal_vector,
    })
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RegionResultant {
    /// Sum of the member shear vectors.
    pub vector: (f64, f64),
    pub magnitude: f64,
    /// `atan2(y, x)` of the resultant, degrees.
    pub angle_deg: f64,
    /// Reported angle: 180 minus `angle_deg`.
    pub clinical_angle_deg: f64,
    pub ratio: f64,
    pub normal_vector: (f64, f64),
    pub normal_magnitude: f64,
    pub levels: usize,
}

impl RegionResultant {
    pub fn is_finite(&self) -> bool {
        [
            self.vector.0,
            self.vector.1,
            self.magnitude,
            self.angle_deg,
            self.ratio,
            self.normal_vector.0,
            self.normal_vector.1,
            self.normal_magnitude,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    fn from_vectors<'a>(vectors: impl Iterator<Item = &'a LevelVector>) -> Self {
        let mut shear = (0.0, 0.0);
        let mut normal = (0.0, 0.0);
        let mut levels = 0;
        for v in vectors {
            shear.0 += v.shear_vector.0;
            shear.1 += v.shear_vector.1;
            normal.0 += v.normal_vector.0;
            normal.1 += v.normal_vector.1;
            levels += 1;
        }
        let angle_rad = shear.1.atan2(shear.0);
        let angle_deg = angle_rad.to_degrees();
        Self {
            vector: shear,
            magnitude: shear.0.hypot(shear.1),
            angle_deg,
            clinical_angle_deg: 180.0 - angle_deg,
            ratio: angle_rad.tan(),
            normal_vector: normal,
            normal_magnitude: normal.0.hypot(normal.1),
            levels,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Resultants {
    pub cervical: RegionResultant,
    pub thoracic: RegionResultant,
    pub lumbar: RegionResultant,
    pub global: RegionResultant,
}

impl Resultants {
    pub fn region(&self, region: Region) -> &RegionResultant {
        match region {
            Region::Cervical => &self.cervical,
            Region::Thoracic => &self.thoracic,
            Region::Lumbar => &self.lumbar,
        }
    }

    pub fn is_finite(&self) -> bool {
        Region::ALL
            .iter()
            .all(|region| self.region(*region).is_finite())
            && self.global.is_finite()
    }
}

/// Sum level vectors per region and over every level.
pub fn aggregate(levels: &[LevelVector]) -> Resultants {
    let bucket = |region: Region| {
        RegionResultant::from_vectors(levels.iter().filter(move |v| v.level.region() == region))
    };
    Resultants {
        cervical: bucket(Region::Cervical),
        thoracic: bucket(Region::Thoracic),
        lumbar: bucket(Region::Lumbar),
        global: RegionResultant::from_vectors(levels.iter()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::weight_shares;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn zero_angle_is_pure_normal_load() {
        let shares = weight_shares();
        let s = shares.get(LevelCode::T6).unwrap();
        let point = Point::new(10.0, 20.0, "T6");
        let v = decompose(&point, 0.0, 60.0, STANDARD_GRAVITY, shares).unwrap();
        assert_eq!(v.shear_magnitude, 0.0);
        assert!(close(v.normal_magnitude, STANDARD_GRAVITY * 60.0 * s.single_level));
        assert!(close(
            v.signed_normal,
            STANDARD_GRAVITY * 60.0 * s.cumulative / SIGNED_LOAD_DIVISOR
        ));
        assert_eq!(v.ratio, 0.0);
        assert_eq!(v.start, (10.0, 20.0));
        // Zero takes the non-negative branch.
        assert!(v.shear_vector.0 == 0.0 && v.shear_vector.1 == 0.0);
        assert!(close(v.normal_vector.1, v.normal_magnitude));
    }

    #[test]
    fn sign_branches_for_shear_and_normal_vectors() {
        let shares = weight_shares();
        let point = Point::new(0.0, 0.0, "L2");
        let pos = decompose(&point, 30.0, 70.0, STANDARD_GRAVITY, shares).unwrap();
        let neg = decompose(&point, -30.0, 70.0, STANDARD_GRAVITY, shares).unwrap();
        let (s, c) = 30f64.to_radians().sin_cos();

        let m = pos.shear_magnitude;
        assert!(close(neg.shear_magnitude, m));
        assert!(close(pos.shear_vector.0, -m * c));
        assert!(close(pos.shear_vector.1, m * s));
        // Negative angle: (m cos θ, -m sin θ) with θ < 0.
        assert!(close(neg.shear_vector.0, m * c));
        assert!(close(neg.shear_vector.1, m * s));

        let n = pos.normal_magnitude;
        assert!(close(pos.normal_vector.0, n * s));
        assert!(close(pos.normal_vector.1, n * c));
        assert!(close(neg.normal_vector.0, -n * s));
        assert!(close(neg.normal_vector.1, n * c));

        assert!(pos.signed_shear > 0.0 && neg.signed_shear < 0.0);
        assert!(close(pos.ratio, 30f64.to_radians().tan()));
        assert!(close(neg.ratio, -pos.ratio));
    }

    #[test]
    fn unknown_label_is_a_contract_violation() {
        let shares = weight_shares();
        let point = Point::new(0.0, 0.0, "X1");
        match decompose(&point, 5.0, 60.0, STANDARD_GRAVITY, shares) {
            Err(SvError::UnknownLevel(label)) => assert_eq!(label, "X1"),
            other => panic!("expected UnknownLevel, got {:?}", other),
        }
        assert!(matches!(
            decompose(&Point::unlabeled(0.0, 0.0), 5.0, 60.0, STANDARD_GRAVITY, shares),
            Err(SvError::UnknownLevel(_))
        ));
    }

    #[test]
    fn invalid_weight_or_angle_is_rejected() {
        let shares = weight_shares();
        let point = Point::new(0.0, 0.0, "C3");
        assert!(decompose(&point, 5.0, 0.0, STANDARD_GRAVITY, shares).is_err());
        assert!(decompose(&point, 5.0, f64::NAN, STANDARD_GRAVITY, shares).is_err());
        assert!(decompose(&point, f64::INFINITY, 60.0, STANDARD_GRAVITY, shares).is_err());
        assert!(decompose(&point, 5.0, 60.0, 0.0, shares).is_err());
        assert!(decompose(&point, 5.0, 60.0, f64::NAN, shares).is_err());
    }

    #[test]
    fn overflowing_load_is_rejected() {
        let shares = weight_shares();
        let point = Point::new(0.0, 0.0, "T6");
        for angle in [0.0, 45.0, -80.0] {
            assert!(matches!(
                decompose(&point, angle, 1e308, STANDARD_GRAVITY, shares),
                Err(SvError::InvalidParameter(_))
            ));
        }
        let v = decompose(&point, 0.0, 1e300, STANDARD_GRAVITY, shares).unwrap();
        assert!(v.normal_magnitude.is_finite() && v.shear_magnitude == 0.0);
    }

    #[test]
    fn aggregate_sums_shear_vectors_per_region() {
        let shares = weight_shares();
        let levels: Vec<LevelVector> = [("C2", 3.0), ("C5", 2.0), ("T6", 4.0), ("L4", -3.0)]
            .iter()
            .map(|(label, angle)| {
                let point = Point::new(0.0, 0.0, *label);
                decompose(&point, *angle, 60.0, STANDARD_GRAVITY, shares).unwrap()
            })
            .collect();
        let result = aggregate(&levels);

        assert_eq!(result.cervical.levels, 2);
        assert_eq!(result.thoracic.levels, 1);
        assert_eq!(result.lumbar.levels, 1);
        assert_eq!(result.global.levels, 4);

        let cx = levels[0].shear_vector.0 + levels[1].shear_vector.0;
        let cy = levels[0].shear_vector.1 + levels[1].shear_vector.1;
        assert!(close(result.cervical.vector.0, cx));
        assert!(close(result.cervical.vector.1, cy));
        assert!(close(result.cervical.magnitude, cx.hypot(cy)));
        let angle = cy.atan2(cx).to_degrees();
        assert!(close(result.cervical.angle_deg, angle));
        assert!(close(result.cervical.clinical_angle_deg, 180.0 - angle));
        assert!(close(result.cervical.ratio, cy / cx));

        let gx: f64 = levels.iter().map(|v| v.shear_vector.0).sum();
        let gy: f64 = levels.iter().map(|v| v.shear_vector.1).sum();
        assert!(close(result.global.vector.0, gx));
        assert!(close(result.global.vector.1, gy));
        let nx: f64 = levels.iter().map(|v| v.normal_vector.0).sum();
        let ny: f64 = levels.iter().map(|v| v.normal_vector.1).sum();
        assert!(close(result.global.normal_magnitude, nx.hypot(ny)));
        assert_eq!(result.region(Region::Lumbar), &result.lumbar);
    }
}
