use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageBuffer, Rgb};
use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
use tracing::{debug, info};

use crate::classifier::{Classification, Classifier, ClassifierError};

const LOGGED_CANDIDATES: usize = 3;

fn backend<E: std::fmt::Display>(err: E) -> ClassifierError {
    ClassifierError::Backend(err.to_string())
}

/// Frozen TensorFlow graph plus its index-aligned class list.
pub struct Model {
    session: Mutex<Session>,
    graph: Graph,
    labels: Vec<String>,
    input_op: String,
    output_op: String,
    input_size: u32,
}

impl Model {
    pub fn new(
        model_path: &Path,
        labels_path: &Path,
        input_op: &str,
        output_op: &str,
        input_size: u32,
    ) -> Result<Self, ClassifierError> {
        let mut graph = Graph::new();
        let mut model_file = File::open(model_path)?;
        let mut model_bytes = Vec::new();
        model_file.read_to_end(&mut model_bytes)?;

        graph
            .import_graph_def(&model_bytes, &ImportGraphDefOptions::new())
            .map_err(backend)?;

        let session = Session::new(&SessionOptions::new(), &graph).map_err(backend)?;

        let labels: Vec<String> = std::fs::read_to_string(labels_path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        info!(
            classes = labels.len(),
            path = %model_path.display(),
            "loaded classifier graph"
        );

        Ok(Model {
            session: Mutex::new(session),
            graph,
            labels,
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
            input_size,
        })
    }

    fn pad_to_square(&self, image: &DynamicImage) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
        let target = self.input_size;
        // resize keeps the aspect ratio, so one edge ends up shorter than target
        let fitted = image.resize(target, target, FilterType::Lanczos3).to_rgb8();
        let (width, height) = fitted.dimensions();

        let mut output = ImageBuffer::from_pixel(target, target, Rgb([0, 0, 0]));
        let x_offset = (target.saturating_sub(width) / 2) as i64;
        let y_offset = (target.saturating_sub(height) / 2) as i64;
        image::imageops::overlay(&mut output, &fitted, x_offset, y_offset);

        output
    }

    fn preprocess_image(&self, image: &DynamicImage) -> Tensor<f32> {
        let padded = self.pad_to_square(image);
        let size = self.input_size as u64;

        let flat_img: Vec<f32> = padded
            .pixels()
            .flat_map(|pixel| pixel.0)
            .map(|channel| channel as f32 / 255.0)
            .collect();

        let mut tensor = Tensor::new(&[1, size, size, 3]);
        tensor.copy_from_slice(&flat_img);
        tensor
    }

    fn operation(&self, name: &str) -> Result<tensorflow::Operation, ClassifierError> {
        self.graph
            .operation_by_name(name)
            .map_err(backend)?
            .ok_or_else(|| ClassifierError::MissingOperation(name.to_string()))
    }

    /// Every class with its score, best first.
    pub fn predict(&self, image: &DynamicImage) -> Result<Vec<Classification>, ClassifierError> {
        let input_tensor = self.preprocess_image(image);
        let input_operation = self.operation(&self.input_op)?;
        let output_operation = self.operation(&self.output_op)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);

        let scores: Vec<f32> = {
            let session = self.session.lock().map_err(|_| ClassifierError::Poisoned)?;
            session.run(&mut args).map_err(backend)?;
            let output_tensor: Tensor<f32> = args.fetch(output_token).map_err(backend)?;
            output_tensor.to_vec()
        };

        let mut ranked: Vec<Classification> = scores
            .iter()
            .enumerate()
            .map(|(i, &score)| {
                let label = self.labels.get(i).map(String::as_str).unwrap_or("Unknown");
                Classification::new(label, score)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(ranked)
    }
}

impl Classifier for Model {
    fn classify(&self, image: &DynamicImage) -> Result<Classification, ClassifierError> {
        let (width, height) = image.dimensions();
        let ranked = self.predict(image)?;

        debug!(
            width,
            height,
            top = ?&ranked[..ranked.len().min(LOGGED_CANDIDATES)],
            "classified image"
        );

        ranked.into_iter().next().ok_or(ClassifierError::EmptyOutput)
    }
}
