//! Output of the external face detection model.

use serde::{Deserialize, Serialize};

use super::crop::Area;
use super::embedding::Embeddings;

/// One face detection produced by the (black box) detection model: a
/// bounding box, embedding vectors, the detection score and the absolute
/// pixel size of the cropped region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceDetection {
    pub area: Area,
    /// Absolute pixel size of the detected region.
    pub size: i32,
    /// Detector confidence score.
    pub score: i32,
    pub embeddings: Embeddings,
    /// Relative facial landmark points, serialized as JSON.
    pub landmarks_json: String,
}
