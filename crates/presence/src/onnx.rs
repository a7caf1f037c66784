//! ONNX Runtime backend for YOLO-style detectors
//!
//! Expects a single `[1, 3, S, S]` input and a `[1, 4 + classes, anchors]`
//! output (the layout of YOLOv8 and later exports). Boxes are centre-format
//! in model pixels and are scaled back to frame pixels.

use crate::{BoundingBox, Classifier, ClassifierError, Detection, PresenceConfig};
use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};
use ndarray::{Array4, Axis, Ix2};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, error, info};

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    session: Session,
    input_size: u32,
    class_names: Vec<String>,
}

impl OnnxClassifier {
    /// Load the model named by `config.model_path`
    pub fn new(config: &PresenceConfig) -> Result<Self, ClassifierError> {
        let path = config
            .model_path
            .as_deref()
            .ok_or_else(|| ClassifierError::ModelLoad("no model path configured".into()))?;

        info!("Loading detection model from {}", path);

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                error!("Failed to load detection model: {}", e);
                ClassifierError::ModelLoad(e.to_string())
            })?;

        info!("Detection model loaded and ready");

        Ok(Self {
            session,
            input_size: config.model_input_size,
            class_names: config.class_names.clone(),
        })
    }

    fn preprocess(&self, frame: &VideoFrame) -> Result<Array4<f32>, ClassifierError> {
        let img = frame
            .to_rgb_image()
            .ok_or_else(|| ClassifierError::ImageProcessing("Failed to create image buffer".into()))?;

        let size = self.input_size;
        let resized = imageops::resize(&img, size, size, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        Ok(input)
    }

    fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}

impl Classifier for OnnxClassifier {
    fn detect(
        &mut self,
        frame: &VideoFrame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, ClassifierError> {
        let input = self.preprocess(frame)?;

        let inputs = ort::inputs![input].map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let raw = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let rows = raw
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let classes = rows.shape()[0].saturating_sub(4);
        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;

        let mut detections = Vec::new();
        for anchor in rows.axis_iter(Axis(1)) {
            let best = (0..classes)
                .map(|c| (c, anchor[4 + c]))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            let Some((class_id, score)) = best else {
                continue;
            };
            if score < confidence_threshold {
                continue;
            }

            let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
            detections.push(
                Detection::new(self.label_for(class_id), score).with_bbox(BoundingBox {
                    x: (cx - w / 2.0) * scale_x,
                    y: (cy - h / 2.0) * scale_y,
                    width: w * scale_x,
                    height: h * scale_y,
                }),
            );
        }

        debug!(
            "Frame {}: {} detections above {:.2}",
            frame.sequence,
            detections.len(),
            confidence_threshold
        );
        Ok(detections)
    }
}
