use crate::{
    config::ModelConfig,
    landmarks::LandmarkVector,
    model_service::{ModelService, PredictionError},
};
use async_trait::async_trait;
use ndarray::Array2;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    tensor::TensorElementType,
    value::{DynValue, TensorRef, ValueType},
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to build ONNX session from {path:?}: {source}")]
    Session { path: PathBuf, source: ort::Error },
    #[error("model has no output named `{expected}` (available: {available:?})")]
    MissingOutput {
        expected: String,
        available: Vec<String>,
    },
}

/// First label of the output tensor, before it is turned into a class index.
#[derive(Debug, PartialEq)]
enum RawLabel {
    Integer(i64),
    Float(f64),
    Text(String),
}

fn first_label(value: &DynValue) -> Result<RawLabel, PredictionError> {
    let label = match value.dtype() {
        ValueType::Tensor {
            ty: TensorElementType::Int64,
            ..
        } => value
            .try_extract_tensor::<i64>()?
            .1
            .first()
            .map(|label| RawLabel::Integer(*label)),
        ValueType::Tensor {
            ty: TensorElementType::Int32,
            ..
        } => value
            .try_extract_tensor::<i32>()?
            .1
            .first()
            .map(|label| RawLabel::Integer(i64::from(*label))),
        ValueType::Tensor {
            ty: TensorElementType::Float32,
            ..
        } => value
            .try_extract_tensor::<f32>()?
            .1
            .first()
            .map(|label| RawLabel::Float(f64::from(*label))),
        ValueType::Tensor {
            ty: TensorElementType::Float64,
            ..
        } => value
            .try_extract_tensor::<f64>()?
            .1
            .first()
            .map(|label| RawLabel::Float(*label)),
        ValueType::Tensor {
            ty: TensorElementType::String,
            ..
        } => value
            .try_extract_strings()?
            .1
            .into_iter()
            .next()
            .map(RawLabel::Text),
        other => {
            return Err(PredictionError::UnconvertibleLabel(format!(
                "unsupported output type {:?}",
                other
            )))
        }
    };

    label.ok_or(PredictionError::EmptyOutput)
}

/// Integers pass through, floats only when whole, strings when they parse.
fn coerce_label(label: RawLabel) -> Result<i64, PredictionError> {
    match label {
        RawLabel::Integer(index) => Ok(index),
        RawLabel::Float(value) => {
            if value.is_finite()
                && value.fract() == 0.0
                && value >= i64::MIN as f64
                && value < i64::MAX as f64
            {
                Ok(value as i64)
            } else {
                Err(PredictionError::UnconvertibleLabel(value.to_string()))
            }
        }
        RawLabel::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| PredictionError::UnconvertibleLabel(format!("{:?}", text))),
    }
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    label_output: Arc<str>,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelLoadError> {
        model_config
            .validate()
            .map_err(ModelLoadError::InvalidConfig)?;

        let path = model_config.get_path();
        let sessions = (0..model_config.num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(&path)?;
                Ok(session)
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|source| ModelLoadError::Session {
                path: path.clone(),
                source,
            })?;

        if let Some(session) = sessions.first() {
            let available: Vec<String> = session
                .outputs
                .iter()
                .map(|output| output.name.clone())
                .collect();
            if !available.contains(&model_config.label_output) {
                return Err(ModelLoadError::MissingOutput {
                    expected: model_config.label_output.clone(),
                    available,
                });
            }
        }

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            sessions.len(),
            path
        );

        Ok(Self {
            sessions: Arc::new(
                sessions
                    .into_iter()
                    .map(|session| Arc::new(Mutex::new(session)))
                    .collect(),
            ),
            counter: Arc::new(AtomicUsize::new(0)),
            label_output: Arc::from(model_config.label_output.as_str()),
        })
    }

    pub fn run_inference(&self, input: &Array2<f32>) -> Result<i64, PredictionError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let slot = &self.sessions[index];
        // A panic while holding the lock leaves the session itself intact.
        let mut session = slot.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Session {} mutex was poisoned, recovering it", index);
            slot.clear_poison();
            poisoned.into_inner()
        });

        tracing::debug!("Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let label = first_label(&outputs[&*self.label_output])?;

        coerce_label(label)
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, landmarks: LandmarkVector) -> Result<i64, PredictionError> {
        let service = self.clone();

        tokio::task::spawn_blocking(move || service.run_inference(&landmarks.to_input_array()))
            .await
            .map_err(|e| PredictionError::TaskFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LANDMARK_VALUES;

    fn fixture_config(onnx_file: &str, label_output: &str, num_instances: usize) -> ModelConfig {
        ModelConfig {
            onnx_file: onnx_file.to_string(),
            model_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures"),
            label_output: label_output.to_string(),
            num_instances,
        }
    }

    /// The fixture graphs return the position of the largest input value.
    fn landmarks_with_peak_at(position: usize) -> LandmarkVector {
        let mut points = vec![0.1; LANDMARK_VALUES];
        points[position] = 0.9;
        LandmarkVector::try_from(points).unwrap()
    }

    #[test]
    fn test_coerce_integer_labels() {
        assert_eq!(coerce_label(RawLabel::Integer(4)).unwrap(), 4);
        assert_eq!(coerce_label(RawLabel::Integer(0)).unwrap(), 0);
    }

    #[test]
    fn test_coerce_whole_float_labels() {
        assert_eq!(coerce_label(RawLabel::Float(7.0)).unwrap(), 7);
        assert_eq!(coerce_label(RawLabel::Float(-0.0)).unwrap(), 0);
    }

    #[test]
    fn test_reject_fractional_and_non_finite_floats() {
        for value in [2.5, f64::NAN, f64::INFINITY, 1e20] {
            let err = coerce_label(RawLabel::Float(value)).unwrap_err();
            assert!(matches!(err, PredictionError::UnconvertibleLabel(_)));
        }
    }

    #[test]
    fn test_coerce_text_labels() {
        assert_eq!(coerce_label(RawLabel::Text("3".to_string())).unwrap(), 3);
        assert_eq!(coerce_label(RawLabel::Text(" 12 ".to_string())).unwrap(), 12);

        let err = coerce_label(RawLabel::Text("hola".to_string())).unwrap_err();
        assert!(matches!(err, PredictionError::UnconvertibleLabel(_)));
        assert_eq!(err.reason(), "unconvertible_label");
    }

    #[test]
    fn test_missing_model_file_fails_to_load() {
        let model_config = ModelConfig {
            onnx_file: "sign_language_model.onnx".to_string(),
            model_dir: PathBuf::from("./no_such_model_dir"),
            label_output: "output_label".to_string(),
            num_instances: 1,
        };

        let err = OrtModelService::new(&model_config)
            .err()
            .expect("loading a missing model must fail");

        assert!(matches!(err, ModelLoadError::InvalidConfig(_)));
        assert!(err.to_string().contains("Model file not found"));
    }

    #[test]
    fn test_corrupt_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("corrupt.onnx"), b"definitely not protobuf").unwrap();
        let model_config = ModelConfig {
            onnx_file: "corrupt.onnx".to_string(),
            model_dir: dir.path().to_path_buf(),
            label_output: "output_label".to_string(),
            num_instances: 1,
        };

        let err = OrtModelService::new(&model_config)
            .err()
            .expect("loading a corrupt model must fail");

        assert!(matches!(err, ModelLoadError::Session { .. }));
    }

    #[test]
    fn test_unknown_label_output_fails_to_load() {
        let err = OrtModelService::new(&fixture_config("argmax_int64.onnx", "probabilities", 1))
            .err()
            .expect("a model without the label output must fail");

        match err {
            ModelLoadError::MissingOutput {
                expected,
                available,
            } => {
                assert_eq!(expected, "probabilities");
                assert_eq!(available, vec!["output_label".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_predict_with_int64_labels() {
        let service =
            OrtModelService::new(&fixture_config("argmax_int64.onnx", "output_label", 2)).unwrap();

        for position in [0, 21, 62] {
            let label = service.predict(landmarks_with_peak_at(position)).await.unwrap();
            assert_eq!(label, position as i64);
        }
    }

    #[tokio::test]
    async fn test_predict_with_float_labels() {
        let service =
            OrtModelService::new(&fixture_config("argmax_float.onnx", "output_label", 1)).unwrap();

        let label = service.predict(landmarks_with_peak_at(40)).await.unwrap();

        assert_eq!(label, 40);
    }

    #[tokio::test]
    async fn test_predict_with_string_labels() {
        let service =
            OrtModelService::new(&fixture_config("argmax_string.onnx", "output_label", 1))
                .unwrap();

        let label = service.predict(landmarks_with_peak_at(9)).await.unwrap();

        assert_eq!(label, 9);
    }

    #[test]
    fn test_poisoned_session_is_recovered() {
        let service =
            OrtModelService::new(&fixture_config("argmax_int64.onnx", "output_label", 1)).unwrap();

        let slot = service.sessions[0].clone();
        let panicked = std::thread::spawn(move || {
            let _guard = slot.lock().unwrap();
            panic!("handler panicked while holding the session");
        })
        .join()
        .is_err();
        assert!(panicked);
        assert!(service.sessions[0].is_poisoned());

        let input = landmarks_with_peak_at(5).to_input_array();
        assert_eq!(service.run_inference(&input).unwrap(), 5);
        assert!(!service.sessions[0].is_poisoned());
    }
}
