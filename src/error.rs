use std::fmt;

use thiserror::Error;

use crate::types::Side;

/// Identifies which 2D view point could not be resolved to a surface position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickTarget {
    LeftEye,
    RightEye,
    EyeMidPoint,
}

impl fmt::Display for PickTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PickTarget::LeftEye => "left eye",
            PickTarget::RightEye => "right eye",
            PickTarget::EyeMidPoint => "eye mid-point",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Landmark set serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Face detector failed to initialise: {0}")]
    DetectorInit(String),

    #[error("Failed to find a candidate face from 2D image!")]
    NoFace,

    #[error("Failed to pick 3D position from 2D {0} position!")]
    PickMiss(PickTarget),

    #[error("Cropped model around point mid-eye point has < 50 polygons.")]
    RegionTooSmall,

    #[error("Unable to discover nose-tip from determined 3D eye mid-point.")]
    NoNoseTip,

    #[error("Eye positions are coincident; cannot derive an orientation frame")]
    DegenerateEyes,

    #[error("Insufficient local surface geometry to derive an orientation frame")]
    DegenerateFrame,

    #[error("Complete set of landmarks not found.")]
    IncompleteLandmarks,

    #[error("Mesh has no vertices")]
    EmptyMesh,

    #[error("Vertex {0} is not a valid seed for this mesh")]
    InvalidSeedVertex(usize),

    #[error("Unknown landmark id {0}")]
    UnknownLandmark(u16),

    #[error("Landmark {id} has no {side:?} position")]
    MissingLandmark { id: u16, side: Side },

    #[error("Landmark {0} is bilateral; it has no medial position")]
    BilateralQueriedMedial(u16),
}

pub type Result<T> = std::result::Result<T, DetectError>;
