use ndarray::Array2;
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;
pub const COORDINATES_PER_LANDMARK: usize = 3;
pub const LANDMARK_VALUES: usize = LANDMARK_COUNT * COORDINATES_PER_LANDMARK;

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("Se esperaban {expected} puntos, se recibieron {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// The 63 normalized coordinates of a hand skeleton, in the order the
/// model was trained with. Only the length is enforced; values are kept
/// exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkVector([f64; LANDMARK_VALUES]);

impl LandmarkVector {
    /// Coordinates of the `index`-th landmark, assuming x, y, z interleaving.
    #[cfg(test)]
    pub(crate) fn landmark(&self, index: usize) -> Option<[f64; COORDINATES_PER_LANDMARK]> {
        if index >= LANDMARK_COUNT {
            return None;
        }
        let start = index * COORDINATES_PER_LANDMARK;
        Some([self.0[start], self.0[start + 1], self.0[start + 2]])
    }

    /// Single-row matrix fed to the classifier.
    ///
    /// The exported classifier takes `float` input, so each value is
    /// narrowed to `f32` here: precision beyond f32 is lost and magnitudes
    /// past `f32::MAX` become infinite.
    pub fn to_input_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((1, LANDMARK_VALUES), |(_, column)| self.0[column] as f32)
    }
}

impl TryFrom<Vec<f64>> for LandmarkVector {
    type Error = LandmarkError;

    fn try_from(points: Vec<f64>) -> Result<Self, Self::Error> {
        let actual = points.len();
        let values: [f64; LANDMARK_VALUES] =
            points
                .try_into()
                .map_err(|_| LandmarkError::WrongLength {
                    expected: LANDMARK_VALUES,
                    actual,
                })?;

        Ok(Self(values))
    }
}
