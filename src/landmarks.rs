//! Facial landmark definitions and the positioned landmark set.
//!
//! A small static registry defines the landmarks the detector knows about:
//! their anatomical codes, laterality, visibility, and a canonical position
//! prior expressed in the face frame (units of one inter-pupil distance,
//! origin at the mid-eye point, x toward the subject's screen-right, y up,
//! z out of the face).

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};
use crate::kdtree::KdTree;
use crate::mesh::Mesh;
use crate::meshops;
use crate::types::{transform_pos, Mat4f, Side, Vec3f};

pub type LandmarkId = u16;

pub const PUPIL: LandmarkId = 0;
pub const PRONASALE: LandmarkId = 1;
pub const NASION: LandmarkId = 2;
pub const SUBNASALE: LandmarkId = 3;
pub const GLABELLA: LandmarkId = 4;
pub const GNATHION: LandmarkId = 5;
pub const EXOCANTHION: LandmarkId = 6;
pub const ENDOCANTHION: LandmarkId = 7;
pub const ALARE: LandmarkId = 8;
pub const CHEILION: LandmarkId = 9;
pub const LABIALE_SUPERIUS: LandmarkId = 10;
pub const LABIALE_INFERIUS: LandmarkId = 11;
pub const POGONION: LandmarkId = 12;

/// Static definition of a single landmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub id: LandmarkId,
    pub code: &'static str,
    pub name: &'static str,
    pub bilateral: bool,
    /// Whether the landmark sits on the visible facial surface. Non-visible
    /// landmarks are excluded from snapping.
    pub visible: bool,
    /// Canonical face-frame offset; bilateral priors give the right side and
    /// are mirrored in x for the left.
    pub prior: [f32; 3],
}

static REGISTRY: &[Landmark] = &[
    Landmark { id: PUPIL, code: "pup", name: "Pupil", bilateral: true, visible: false, prior: [0.50, 0.0, 0.0] },
    Landmark { id: PRONASALE, code: "prn", name: "Pronasale", bilateral: false, visible: true, prior: [0.0, -0.55, 0.35] },
    Landmark { id: NASION, code: "n", name: "Nasion", bilateral: false, visible: true, prior: [0.0, -0.10, 0.10] },
    Landmark { id: SUBNASALE, code: "sn", name: "Subnasale", bilateral: false, visible: true, prior: [0.0, -0.75, 0.20] },
    Landmark { id: GLABELLA, code: "g", name: "Glabella", bilateral: false, visible: true, prior: [0.0, 0.15, 0.12] },
    Landmark { id: GNATHION, code: "gn", name: "Gnathion", bilateral: false, visible: true, prior: [0.0, -1.65, -0.05] },
    Landmark { id: EXOCANTHION, code: "ex", name: "Exocanthion", bilateral: true, visible: true, prior: [0.72, 0.02, 0.0] },
    Landmark { id: ENDOCANTHION, code: "en", name: "Endocanthion", bilateral: true, visible: true, prior: [0.28, 0.0, 0.05] },
    Landmark { id: ALARE, code: "al", name: "Alare", bilateral: true, visible: true, prior: [0.25, -0.60, 0.15] },
    Landmark { id: CHEILION, code: "ch", name: "Cheilion", bilateral: true, visible: true, prior: [0.35, -1.05, 0.05] },
    Landmark { id: LABIALE_SUPERIUS, code: "ls", name: "Labiale Superius", bilateral: false, visible: true, prior: [0.0, -0.95, 0.18] },
    Landmark { id: LABIALE_INFERIUS, code: "li", name: "Labiale Inferius", bilateral: false, visible: true, prior: [0.0, -1.20, 0.12] },
    Landmark { id: POGONION, code: "pg", name: "Pogonion", bilateral: false, visible: true, prior: [0.0, -1.50, 0.05] },
];

/// All registered landmark definitions.
pub fn registry() -> &'static [Landmark] {
    REGISTRY
}

/// Definition of the landmark with the given id, if registered.
pub fn landmark(id: LandmarkId) -> Option<&'static Landmark> {
    REGISTRY.iter().find(|l| l.id == id)
}

/// Definition of the landmark with the given anatomical code.
pub fn landmark_by_code(code: &str) -> Option<&'static Landmark> {
    REGISTRY.iter().find(|l| l.code == code)
}

/// Axis-aligned bounds of a landmark set, carried with the transform that
/// maps them back into the source model's frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3f,
    pub max: Vec3f,
    pub transform: Mat4f,
}

// Per-axis expansion factors applied when deriving bounds from landmarks,
// measured about the medial mean. Top and bottom of Y expand independently.
const BOUNDS_X_FACTOR: f32 = 1.0;
const BOUNDS_Y_TOP_FACTOR: f32 = 1.0;
const BOUNDS_Y_BOTTOM_FACTOR: f32 = 1.0;
const BOUNDS_Z_FACTOR: f32 = 1.0;

/// Positioned landmarks for a single face, keyed by id and laterality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    left: HashMap<LandmarkId, Vec3f>,
    mid: HashMap<LandmarkId, Vec3f>,
    right: HashMap<LandmarkId, Vec3f>,
    ids: BTreeSet<LandmarkId>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a landmark position.
    ///
    /// Returns the side the position was actually stored against: landmarks
    /// that are not bilateral are always stored as [`Side::Medial`] whatever
    /// side the caller names. Returns `None`, storing nothing, for an
    /// unregistered id or for a bilateral landmark given [`Side::Medial`].
    pub fn set(&mut self, id: LandmarkId, pos: Vec3f, side: Side) -> Option<Side> {
        let lmk = landmark(id)?;
        let side = if !lmk.bilateral {
            Side::Medial
        } else if side == Side::Medial {
            return None;
        } else {
            side
        };
        self.lateral_mut(side).insert(id, pos);
        self.ids.insert(id);
        Some(side)
    }

    /// Position of a landmark on the given side.
    pub fn pos(&self, id: LandmarkId, side: Side) -> Result<Vec3f> {
        let lmk = landmark(id).ok_or(DetectError::UnknownLandmark(id))?;
        let side = if !lmk.bilateral {
            Side::Medial
        } else if side == Side::Medial {
            return Err(DetectError::BilateralQueriedMedial(id));
        } else {
            side
        };
        self.lateral(side)
            .get(&id)
            .copied()
            .ok_or(DetectError::MissingLandmark { id, side })
    }

    pub fn has(&self, id: LandmarkId) -> bool {
        self.ids.contains(&id)
    }

    pub fn has_side(&self, id: LandmarkId, side: Side) -> bool {
        self.lateral(side).contains_key(&id)
    }

    /// Ids of all landmarks with at least one recorded position.
    pub fn ids(&self) -> &BTreeSet<LandmarkId> {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn lateral(&self, side: Side) -> &HashMap<LandmarkId, Vec3f> {
        match side {
            Side::Left => &self.left,
            Side::Medial => &self.mid,
            Side::Right => &self.right,
        }
    }

    fn lateral_mut(&mut self, side: Side) -> &mut HashMap<LandmarkId, Vec3f> {
        match side {
            Side::Left => &mut self.left,
            Side::Medial => &mut self.mid,
            Side::Right => &mut self.right,
        }
    }

    fn for_each(&self, mut f: impl FnMut(LandmarkId, Side, &Vec3f)) {
        for (side, map) in [
            (Side::Left, &self.left),
            (Side::Medial, &self.mid),
            (Side::Right, &self.right),
        ] {
            for (&id, p) in map {
                f(id, side, p);
            }
        }
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut Vec3f)) {
        for map in [&mut self.left, &mut self.mid, &mut self.right] {
            for p in map.values_mut() {
                f(p);
            }
        }
    }

    /// The recorded landmark nearest to the given one, excluding the query
    /// landmark itself on its own side.
    pub fn nearest(&self, id: LandmarkId, side: Side) -> Option<(LandmarkId, Side)> {
        let q = self.pos(id, side).ok()?;
        let mut best: Option<(LandmarkId, Side, f32)> = None;
        self.for_each(|oid, oside, p| {
            if oid == id && oside == side {
                return;
            }
            let sq = (p - q).norm_squared();
            if best.map_or(true, |(_, _, b)| sq < b) {
                best = Some((oid, oside, sq));
            }
        });
        best.map(|(oid, oside, _)| (oid, oside))
    }

    /// Snap a position to the nearest visible landmark within the given
    /// squared distance, or return it unchanged.
    pub fn snap_to(&self, p: Vec3f, max_sq: f32) -> Vec3f {
        let mut best = (p, max_sq);
        self.for_each(|id, _, q| {
            let visible = landmark(id).map_or(false, |l| l.visible);
            if !visible {
                return;
            }
            let sq = (q - p).norm_squared();
            if sq < best.1 {
                best = (*q, sq);
            }
        });
        best.0
    }

    /// Mean of the medial landmark positions, or zero when there are none.
    pub fn medial_mean(&self) -> Vec3f {
        if self.mid.is_empty() {
            return Vec3f::zeros();
        }
        let mut sum = Vec3f::zeros();
        for p in self.mid.values() {
            sum += p;
        }
        sum / self.mid.len() as f32
    }

    /// Squared radius of the set: the largest squared distance of any
    /// landmark from the medial mean.
    pub fn sq_radius(&self) -> f32 {
        let c = self.medial_mean();
        let mut r = 0.0f32;
        self.for_each(|_, _, p| {
            r = r.max((p - c).norm_squared());
        });
        r
    }

    /// Vector from the left pupil to the right pupil, or zero if either
    /// pupil is missing.
    pub fn eye_vec(&self) -> Vec3f {
        match (self.left.get(&PUPIL), self.right.get(&PUPIL)) {
            (Some(l), Some(r)) => r - l,
            _ => Vec3f::zeros(),
        }
    }

    /// Midpoint of the pupils, or zero if either pupil is missing.
    pub fn mid_eye_pos(&self) -> Vec3f {
        match (self.left.get(&PUPIL), self.right.get(&PUPIL)) {
            (Some(l), Some(r)) => (l + r) * 0.5,
            _ => Vec3f::zeros(),
        }
    }

    /// Axis-aligned bounds of the landmarks after mapping them through
    /// `inverse`, carrying `transform` for the return trip. `None` for an
    /// empty set.
    pub fn make_bounds(&self, transform: &Mat4f, inverse: &Mat4f) -> Option<Bounds> {
        if self.is_empty() {
            return None;
        }
        let mut min = Vec3f::repeat(f32::MAX);
        let mut max = Vec3f::repeat(f32::MIN);
        self.for_each(|_, _, p| {
            let q = transform_pos(inverse, p);
            min = min.inf(&q);
            max = max.sup(&q);
        });

        // Expand per axis about the medial mean, mapped into the same frame.
        let cen = transform_pos(inverse, &self.medial_mean());
        min.x = cen.x - BOUNDS_X_FACTOR * (min.x - cen.x).abs();
        max.x = cen.x + BOUNDS_X_FACTOR * (max.x - cen.x).abs();
        min.y = cen.y - BOUNDS_Y_BOTTOM_FACTOR * (min.y - cen.y).abs();
        max.y = cen.y + BOUNDS_Y_TOP_FACTOR * (max.y - cen.y).abs();
        min.z = cen.z - BOUNDS_Z_FACTOR * (min.z - cen.z).abs();
        max.z = cen.z + BOUNDS_Z_FACTOR * (max.z - cen.z).abs();

        Some(Bounds {
            min,
            max,
            transform: *transform,
        })
    }

    /// Mean landmark set over several sets: each position is the sum across
    /// the sets holding it, divided by the number of non-empty sets.
    pub fn merge(sets: &[&LandmarkSet]) -> LandmarkSet {
        let n = sets.iter().filter(|s| !s.is_empty()).count();
        let mut out = LandmarkSet::new();
        if n == 0 {
            return out;
        }
        let mut sums: HashMap<(LandmarkId, Side), Vec3f> = HashMap::new();
        for s in sets {
            s.for_each(|id, side, p| {
                *sums.entry((id, side)).or_insert_with(Vec3f::zeros) += p;
            });
        }
        for ((id, side), sum) in sums {
            out.set(id, sum / n as f32, side);
        }
        out
    }

    /// Apply a homogeneous transform to every landmark position.
    pub fn transform(&mut self, t: &Mat4f) {
        self.for_each_mut(|p| *p = transform_pos(t, p));
    }

    /// Exchange the left and right laterals.
    pub fn swap_laterals(&mut self) {
        std::mem::swap(&mut self.left, &mut self.right);
    }

    /// Project every landmark onto the mesh surface.
    pub fn move_to_surface(&mut self, mesh: &Mesh, kd: &KdTree) {
        self.for_each_mut(|p| *p = meshops::to_surface(mesh, kd, p));
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
}
