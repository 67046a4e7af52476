// Vertebral level codes, spinal regions and the anatomical weight-distribution
// model that assigns each level its share of the supported body weight.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::SvError;

/// Head contribution, in percent of body weight, carried by the cervical spine.
pub const HEAD_CONTRIBUTION: f64 = 7.0;
/// Contribution of the cervical segments themselves.
pub const CERVICAL_CONTRIBUTION: f64 = 4.0;
/// Total share of body weight supported at the lumbosacral junction.
pub const LUMBAR_SUPPORTED_WEIGHT: f64 = 65.0;
/// Trunk and upper extremities, spread jointly over the thoracic and lumbar levels.
pub const TRUNK_UPPER_EXTREMITY_CONTRIBUTION: f64 =
    LUMBAR_SUPPORTED_WEIGHT - HEAD_CONTRIBUTION - CERVICAL_CONTRIBUTION;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    Cervical,
    Thoracic,
    Lumbar,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Cervical, Region::Thoracic, Region::Lumbar];

    pub fn name(self) -> &'static str {
        match self {
            Region::Cervical => "cervical",
            Region::Thoracic => "thoracic",
            Region::Lumbar => "lumbar",
        }
    }

    /// Tag used for the region's resultant row in the result table.
    pub fn summary_tag(self) -> &'static str {
        match self {
            Region::Cervical => "RSV-C",
            Region::Thoracic => "RSV-T",
            Region::Lumbar => "RSV-L",
        }
    }

    /// Levels belonging to this region, cranial to caudal.
    pub fn levels(self) -> impl Iterator<Item = LevelCode> {
        LevelCode::ALL
            .into_iter()
            .filter(move |level| level.region() == self)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Vertebral level identifier. Declaration order is the cranial to caudal
/// ordering, so the derived `Ord` follows the spine.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LevelCode {
    C1,
    C2,
    C3,
    C4,
    C5,
    C6,
    C7,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    T8,
    T9,
    T10,
    T11,
    T12,
    L1,
    L2,
    L3,
    L4,
    L5,
    S1,
}

impl LevelCode {
    pub const ALL: [LevelCode; 25] = [
        LevelCode::C1,
        LevelCode::C2,
        LevelCode::C3,
        LevelCode::C4,
        LevelCode::C5,
        LevelCode::C6,
        LevelCode::C7,
        LevelCode::T1,
        LevelCode::T2,
        LevelCode::T3,
        LevelCode::T4,
        LevelCode::T5,
        LevelCode::T6,
        LevelCode::T7,
        LevelCode::T8,
        LevelCode::T9,
        LevelCode::T10,
        LevelCode::T11,
        LevelCode::T12,
        LevelCode::L1,
        LevelCode::L2,
        LevelCode::L3,
        LevelCode::L4,
        LevelCode::L5,
        LevelCode::S1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LevelCode::C1 => "C1",
            LevelCode::C2 => "C2",
            LevelCode::C3 => "C3",
            LevelCode::C4 => "C4",
            LevelCode::C5 => "C5",
            LevelCode::C6 => "C6",
            LevelCode::C7 => "C7",
            LevelCode::T1 => "T1",
            LevelCode::T2 => "T2",
            LevelCode::T3 => "T3",
            LevelCode::T4 => "T4",
            LevelCode::T5 => "T5",
            LevelCode::T6 => "T6",
            LevelCode::T7 => "T7",
            LevelCode::T8 => "T8",
            LevelCode::T9 => "T9",
            LevelCode::T10 => "T10",
            LevelCode::T11 => "T11",
            LevelCode::T12 => "T12",
            LevelCode::L1 => "L1",
            LevelCode::L2 => "L2",
            LevelCode::L3 => "L3",
            LevelCode::L4 => "L4",
            LevelCode::L5 => "L5",
            LevelCode::S1 => "S1",
        }
    }

    pub fn region(self) -> Region {
        match self {
            LevelCode::C1
            | LevelCode::C2
            | LevelCode::C3
            | LevelCode::C4
            | LevelCode::C5
            | LevelCode::C6
            | LevelCode::C7 => Region::Cervical,
            LevelCode::T1
            | LevelCode::T2
            | LevelCode::T3
            | LevelCode::T4
            | LevelCode::T5
            | LevelCode::T6
            | LevelCode::T7
            | LevelCode::T8
            | LevelCode::T9
            | LevelCode::T10
            | LevelCode::T11
            | LevelCode::T12 => Region::Thoracic,
            LevelCode::L1
            | LevelCode::L2
            | LevelCode::L3
            | LevelCode::L4
            | LevelCode::L5
            | LevelCode::S1 => Region::Lumbar,
        }
    }

    /// Relative contribution of the level within its region.
    pub fn relative_weight(self) -> f64 {
        match self {
            LevelCode::C1
            | LevelCode::C2
            | LevelCode::C3
            | LevelCode::C4
            | LevelCode::C5
            | LevelCode::C6
            | LevelCode::C7 => 1.0,
            LevelCode::T1 | LevelCode::T2 => 1.1,
            LevelCode::T3 => 1.4,
            LevelCode::T4 | LevelCode::T5 | LevelCode::T6 => 1.3,
            LevelCode::T7 => 1.4,
            LevelCode::T8 => 1.5,
            LevelCode::T9 => 1.6,
            LevelCode::T10 => 2.0,
            LevelCode::T11 => 2.1,
            LevelCode::T12 => 2.5,
            LevelCode::L1 | LevelCode::L2 => 2.4,
            LevelCode::L3 => 2.3,
            LevelCode::L4 | LevelCode::L5 | LevelCode::S1 => 2.6,
        }
    }

    /// Parse a user-entered label. Surrounding whitespace and letter case are ignored.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_uppercase();
        LevelCode::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
    }
}

impl fmt::Display for LevelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LevelCode {
    type Err = SvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LevelCode::parse(s).ok_or_else(|| SvError::UnknownLevel(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RegionWeightShare {
    /// Fraction of the region's fixed contribution borne by this level.
    pub single_level: f64,
    /// Running contribution including every more cranial region.
    pub cumulative: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightShareTable {
    shares: BTreeMap<LevelCode, RegionWeightShare>,
}

impl WeightShareTable {
    /// Derive the per-level shares from the level proportions and region totals.
    ///
    /// Cervical levels all sit on the head contribution (the offset does not
    /// run within the region). Thoracic and lumbar levels share the trunk and
    /// upper-extremity contribution and accumulate caudally from the combined
    /// head and cervical total.
    pub fn compute() -> Self {
        let mut shares = BTreeMap::new();

        let cervical: Vec<LevelCode> = Region::Cervical.levels().collect();
        let cervical_sum: f64 = cervical.iter().map(|l| l.relative_weight()).sum();
        for level in cervical {
            let single_level = CERVICAL_CONTRIBUTION * level.relative_weight() / cervical_sum;
            shares.insert(
                level,
                RegionWeightShare {
                    single_level,
                    cumulative: HEAD_CONTRIBUTION + single_level,
                },
            );
        }

        let trunk: Vec<LevelCode> = Region::Thoracic
            .levels()
            .chain(Region::Lumbar.levels())
            .collect();
        let trunk_sum: f64 = trunk.iter().map(|l| l.relative_weight()).sum();
        let mut prior = HEAD_CONTRIBUTION + CERVICAL_CONTRIBUTION;
        for level in trunk {
            let single_level =
                TRUNK_UPPER_EXTREMITY_CONTRIBUTION * level.relative_weight() / trunk_sum;
            let cumulative = prior + single_level;
            shares.insert(
                level,
                RegionWeightShare {
                    single_level,
                    cumulative,
                },
            );
            prior = cumulative;
        }

        Self { shares }
    }

    pub fn get(&self, level: LevelCode) -> Option<&RegionWeightShare> {
        self.shares.get(&level)
    }

    /// Resolve a raw point label to its level and share.
    pub fn lookup(&self, label: &str) -> Result<(LevelCode, RegionWeightShare), SvError> {
        let level = LevelCode::parse(label)
            .ok_or_else(|| SvError::UnknownLevel(label.to_string()))?;
        let share = self
            .get(level)
            .copied()
            .ok_or_else(|| SvError::UnknownLevel(label.to_string()))?;
        Ok((level, share))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LevelCode, &RegionWeightShare)> {
        self.shares.iter().map(|(level, share)| (*level, share))
    }

    /// Sum of single-level shares over a region.
    pub fn region_total(&self, region: Region) -> f64 {
        self.iter()
            .filter(|(level, _)| level.region() == region)
            .map(|(_, share)| share.single_level)
            .sum()
    }
}

/// Process-wide share table, computed on first use.
pub fn weight_shares() -> &'static WeightShareTable {
    static TABLE: OnceLock<WeightShareTable> = OnceLock::new();
    TABLE.get_or_init(WeightShareTable::compute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_has_twenty_five_levels_in_spinal_order() {
        assert_eq!(LevelCode::ALL.len(), 25);
        assert_eq!(Region::Cervical.levels().count(), 7);
        assert_eq!(Region::Thoracic.levels().count(), 12);
        assert_eq!(Region::Lumbar.levels().count(), 6);
        for pair in LevelCode::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn parse_accepts_case_and_whitespace_variants() {
        assert_eq!(LevelCode::parse("T10"), Some(LevelCode::T10));
        assert_eq!(LevelCode::parse(" l4 "), Some(LevelCode::L4));
        assert_eq!(LevelCode::parse("S1"), Some(LevelCode::S1));
        assert_eq!(LevelCode::parse("X1"), None);
        assert_eq!(LevelCode::parse(""), None);
        assert!("T13".parse::<LevelCode>().is_err());
        assert_eq!(LevelCode::S1.region(), Region::Lumbar);
    }

    #[test]
    fn single_shares_sum_to_region_totals() {
        let table = WeightShareTable::compute();
        let cervical = table.region_total(Region::Cervical);
        let trunk = table.region_total(Region::Thoracic) + table.region_total(Region::Lumbar);
        assert!((cervical - CERVICAL_CONTRIBUTION).abs() < 1e-9);
        assert!((trunk - TRUNK_UPPER_EXTREMITY_CONTRIBUTION).abs() < 1e-9);
    }

    #[test]
    fn cumulative_share_is_non_decreasing_and_ends_at_supported_weight() {
        let table = weight_shares();
        let cumulative: Vec<f64> = LevelCode::ALL
            .iter()
            .map(|level| table.get(*level).unwrap().cumulative)
            .collect();
        for pair in cumulative.windows(2) {
            assert!(pair[1] >= pair[0], "{:?}", pair);
        }
        assert!((cumulative[24] - LUMBAR_SUPPORTED_WEIGHT).abs() < 1e-9);
        // Every cervical level sits on the head contribution.
        let c1 = table.get(LevelCode::C1).unwrap();
        assert!((c1.single_level - 4.0 / 7.0).abs() < 1e-12);
        assert!((c1.cumulative - (7.0 + 4.0 / 7.0)).abs() < 1e-12);
    }

    #[test]
    fn lookup_rejects_unknown_labels() {
        let table = weight_shares();
        let (level, share) = table.lookup("t6").unwrap();
        assert_eq!(level, LevelCode::T6);
        assert!((share.single_level - 54.0 * 1.3 / 33.5).abs() < 1e-9);
        match table.lookup("X1") {
            Err(SvError::UnknownLevel(label)) => assert_eq!(label, "X1"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
