// Static joint limit table (values from the Mantis URDF)
//
// Arms and head are in radians, the waist in meters and grippers in
// normalized units (0.0 closed .. 1.0 open).

use std::collections::HashMap;

use tracing::info;

use crate::limb::Limb;

/// `(lower, upper)` bound for one joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitEntry {
    pub lower: f64,
    pub upper: f64,
}

impl LimitEntry {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Default rows: (joint_name, lower, upper)
const MANTIS_LIMITS: [(&str, f64, f64); 19] = [
    ("left_shoulder_pitch_joint", -2.61, 0.78),
    ("left_shoulder_yaw_joint", 0.08, 1.04),
    ("left_shoulder_roll_joint", -1.57, 1.57),
    ("left_elbow_pitch_joint", -0.78, 1.57),
    ("left_wrist_roll_joint", -1.57, 1.57),
    ("left_wrist_pitch_joint", -0.52, 0.52),
    ("left_wrist_yaw_joint", -1.57, 1.57),
    ("right_shoulder_pitch_joint", -2.61, 0.78),
    ("right_shoulder_yaw_joint", -1.04, -0.08), // mirrored
    ("right_shoulder_roll_joint", -1.57, 1.57),
    ("right_elbow_pitch_joint", -0.78, 1.57),
    ("right_wrist_roll_joint", -1.57, 1.57),
    ("right_wrist_pitch_joint", -0.52, 0.52),
    ("right_wrist_yaw_joint", -1.57, 1.57),
    ("head_pitch", -0.7, 0.2),
    ("head_yaw", -1.57, 1.57),
    ("waist", -0.62, 0.24),
    ("left_gripper", 0.0, 1.0),
    ("right_gripper", 0.0, 1.0),
];

/// Read-only lookup of per-joint bounds, organised per limb
#[derive(Debug, Clone)]
pub struct LimitTable {
    per_limb: HashMap<Limb, Vec<LimitEntry>>,
}

impl Default for LimitTable {
    fn default() -> Self {
        Self::mantis()
    }
}

impl LimitTable {
    /// The Mantis limit table
    pub fn mantis() -> Self {
        let rows = MANTIS_LIMITS
            .iter()
            .map(|&(name, lower, upper)| (name, LimitEntry::new(lower, upper)));
        Self::from_entries(rows)
    }

    /// Build a table from `(joint_name, entry)` rows
    ///
    /// Joints without a row are left unbounded.
    pub fn from_entries<'a>(rows: impl IntoIterator<Item = (&'a str, LimitEntry)>) -> Self {
        let by_name: HashMap<&str, LimitEntry> = rows.into_iter().collect();
        let unbounded = LimitEntry::new(f64::NEG_INFINITY, f64::INFINITY);

        let per_limb = Limb::JOINTED
            .iter()
            .map(|&limb| {
                let entries = limb
                    .joint_names()
                    .iter()
                    .map(|name| by_name.get(name).copied().unwrap_or(unbounded))
                    .collect();
                (limb, entries)
            })
            .collect();

        Self { per_limb }
    }

    /// Limits of every joint of `limb`, in joint order
    pub fn limb(&self, limb: Limb) -> &[LimitEntry] {
        self.per_limb.get(&limb).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, limb: Limb, index: usize) -> Option<LimitEntry> {
        self.limb(limb).get(index).copied()
    }

    /// Clamp one joint value; returns the limited value and whether it changed
    ///
    /// Out-of-range values are a recovered limit violation, logged but never an error.
    pub fn clamp_joint(&self, limb: Limb, index: usize, value: f64) -> (f64, bool) {
        let Some(entry) = self.get(limb, index) else {
            return (value, false);
        };
        if entry.contains(value) {
            return (value, false);
        }
        let limited = entry.clamp(value);
        info!(
            "Limit violation on {} joint {}: {:.3} clamped to {:.3}",
            limb, index, value, limited
        );
        (limited, true)
    }

    /// Clamp `values` in place, returns true if anything changed
    pub fn clamp(&self, limb: Limb, values: &mut [f64]) -> bool {
        let mut clamped = false;
        for (index, value) in values.iter_mut().enumerate() {
            let (limited, changed) = self.clamp_joint(limb, index, *value);
            *value = limited;
            clamped |= changed;
        }
        clamped
    }
}
