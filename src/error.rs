use thiserror::Error;


pub type SplatResult<T> = Result<T, SplatError>;

#[derive(Error, Debug)]
pub enum SplatError {
    #[error("tile instance capacity exceeded: {required} instances required, capacity is {capacity}")]
    InstanceCapacity {
        required: usize,
        capacity: usize,
    },

    #[error("buffer `{name}` has {actual} elements, expected {expected}")]
    BufferSize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("focal length projection requires a camera resolution")]
    MissingResolution,

    #[error("camera resolution {camera_width}x{camera_height} does not match the {target_width}x{target_height} target")]
    ResolutionMismatch {
        camera_width: u32,
        camera_height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("unsupported spherical harmonics degree: {0}")]
    UnsupportedShDegree(usize),

    #[error("invalid ply: {0}")]
    Ply(String),

    #[error("device error: {0}")]
    Device(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SplatError {
    pub(crate) fn check_len(name: &'static str, expected: usize, actual: usize) -> SplatResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(SplatError::BufferSize { name, expected, actual })
        }
    }
}
