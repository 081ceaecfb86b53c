use thiserror::Error;

/// Recoverable failures of the rig alignment steps.
///
/// Steps return `anyhow::Result`; callers that need to branch on the failure
/// kind use `err.downcast_ref::<CalibrationError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    /// No camera pair produced a closed-form estimate.
    #[error("no camera pair could be initialized ({pairs_tried} pairs tried)")]
    NotInitializable { pairs_tried: usize },
    /// Refinement requested before a successful initialization.
    #[error("calibration not initialized - call step_initialize first")]
    NotInitialized,
    /// No solved pair has enough valid correspondences to refine.
    #[error("no solved pair has at least {required} valid correspondences")]
    EmptyProblem { required: usize },
    /// Correspondences are derived data and are missing until matched.
    #[error("correspondences not computed - call step_match first")]
    NoCorrespondences,
    #[error("camera {camera} out of range for {num_cameras} cameras")]
    CameraOutOfRange { camera: usize, num_cameras: usize },
    /// The pair grid has no entry mapping a camera onto itself.
    #[error("pair {camera}->{camera} maps a camera onto itself")]
    SelfPair { camera: usize },
    /// A composed camera pose could not be inverted.
    #[error("composed transform of camera {camera} is singular")]
    SingularTransform { camera: usize },
}
