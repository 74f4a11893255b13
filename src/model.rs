use std::{
    collections::HashMap,
    fmt,
    io::Cursor,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use dirs::home_dir;
use image::{
    imageops, imageops::FilterType, DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma,
    RgbImage, RgbaImage,
};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    errors::{RemBgError, Result},
    traits::BackgroundRemover,
};

const MODEL_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";
const MODEL_HOME_ENV: &str = "U2NET_HOME";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Pretrained networks selectable with `--model`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum ModelName {
    /// General purpose
    #[default]
    #[value(name = "u2net")]
    U2net,
    /// Lightweight u2net
    #[value(name = "u2netp")]
    U2netp,
    /// Human segmentation
    #[value(name = "u2net_human_seg")]
    U2netHumanSeg,
    /// Silhouettes
    #[value(name = "silueta")]
    Silueta,
    /// High quality general purpose
    #[value(name = "isnet-general-use")]
    IsnetGeneralUse,
}

impl ModelName {
    pub const ALL: [ModelName; 5] = [
        ModelName::U2net,
        ModelName::U2netp,
        ModelName::U2netHumanSeg,
        ModelName::Silueta,
        ModelName::IsnetGeneralUse,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ModelName::U2net => "u2net",
            ModelName::U2netp => "u2netp",
            ModelName::U2netHumanSeg => "u2net_human_seg",
            ModelName::Silueta => "silueta",
            ModelName::IsnetGeneralUse => "isnet-general-use",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            ModelName::U2net => "general purpose (default)",
            ModelName::U2netp => "lightweight version of u2net",
            ModelName::U2netHumanSeg => "tuned for human segmentation",
            ModelName::Silueta => "tuned for silhouettes",
            ModelName::IsnetGeneralUse => "high quality general purpose",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.onnx", self.as_str())
    }

    pub fn download_url(self) -> String {
        format!("{}/{}", MODEL_BASE_URL, self.file_name())
    }

    /// Side length of the square input the network expects.
    pub const fn input_size(self) -> u32 {
        match self {
            ModelName::IsnetGeneralUse => 1024,
            _ => 320,
        }
    }

    pub const fn mean(self) -> [f32; 3] {
        match self {
            ModelName::IsnetGeneralUse => [0.5, 0.5, 0.5],
            _ => IMAGENET_MEAN,
        }
    }

    pub const fn std(self) -> [f32; 3] {
        match self {
            ModelName::IsnetGeneralUse => [1.0, 1.0, 1.0],
            _ => IMAGENET_STD,
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory holding the `.onnx` files.
///
/// An explicit directory wins, then `U2NET_HOME`, then `~/.u2net`.
pub fn model_home(override_dir: Option<&Path>) -> PathBuf {
    resolve_model_home(
        override_dir,
        std::env::var(MODEL_HOME_ENV).ok(),
        home_dir(),
    )
}

fn resolve_model_home(
    override_dir: Option<&Path>,
    env_home: Option<String>,
    user_home: Option<PathBuf>,
) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Some(env_home) = env_home.filter(|h| !h.is_empty()) {
        return PathBuf::from(env_home);
    }

    if let Some(home) = user_home {
        return home.join(".u2net");
    }

    PathBuf::from(".u2net")
}

struct LoadedModel {
    session: Session,
    input_name: String,
    output_name: String,
}

/// ONNX Runtime backed remover for the u2net family.
///
/// Sessions are created once per model and reused for every image.
pub struct OnnxBackgroundRemover {
    model_dir: PathBuf,
    device_id: i32,
    sessions: Mutex<HashMap<ModelName, LoadedModel>>,
}

impl OnnxBackgroundRemover {
    pub fn new(model_dir: impl Into<PathBuf>, device_id: i32) -> Self {
        Self {
            model_dir: model_dir.into(),
            device_id,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn model_path(&self, model: ModelName) -> PathBuf {
        self.model_dir.join(model.file_name())
    }

    /// Load and warm up `model` so the first image does not pay for it.
    pub fn prepare(&self, model: ModelName) -> Result<()> {
        self.with_model(model, |_| Ok(()))
    }

    fn with_model<T>(
        &self,
        model: ModelName,
        f: impl FnOnce(&mut LoadedModel) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.sessions.lock();
        if !sessions.contains_key(&model) {
            let loaded = self.load(model)?;
            sessions.insert(model, loaded);
        }
        match sessions.get_mut(&model) {
            Some(loaded) => f(loaded),
            None => Err(RemBgError::Configuration {
                message: format!("session for {} was not cached", model),
            }),
        }
    }

    fn load(&self, model: ModelName) -> Result<LoadedModel> {
        let model_path = self.model_path(model);
        if !model_path.is_file() {
            return Err(RemBgError::MissingModel {
                model: model.to_string(),
                path: model_path,
                url: model.download_url(),
            });
        }

        info!("Loading model {} from {}", model, model_path.display());

        let mut session = SessionBuilder::new()
            .map_err(|e| model_error("session builder initialisation", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
            ])
            .map_err(|e| model_error("execution provider registration", e))?
            .with_memory_pattern(true)
            .map_err(|e| model_error("memory pattern configuration", e))?
            .commit_from_file(&model_path)
            .map_err(|e| model_error(format!("model load: {}", model_path.display()), e))?;

        let (input_name, output_name) = match (session.inputs.first(), session.outputs.first()) {
            (Some(input), Some(output)) => (input.name.clone(), output.name.clone()),
            _ => {
                return Err(RemBgError::Model {
                    operation: format!("model signature: {}", model_path.display()),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "model has no inputs or outputs",
                    )),
                })
            }
        };

        // warm up
        let size = model.input_size() as usize;
        let data = Array4::<f32>::zeros((1, 3, size, size));
        let warm_up = TensorRef::from_array_view(&data)
            .map_err(|e| model_error("warm-up tensor creation", e))?;
        session
            .run(ort::inputs![input_name.as_str() => warm_up])
            .map_err(|e| model_error("warm-up run", e))?;

        debug!("Model {} ready (input `{}`, output `{}`)", model, input_name, output_name);

        Ok(LoadedModel {
            session,
            input_name,
            output_name,
        })
    }

    fn predict_mask(&self, image: &RgbImage, model: ModelName) -> Result<GrayImage> {
        let tensor = preprocess(image, model);
        let (width, height) = image.dimensions();

        self.with_model(model, |loaded| {
            let outputs = loaded.session.run(
                ort::inputs![loaded.input_name.as_str() => TensorRef::from_array_view(&tensor)?],
            )?;
            let prediction = outputs[loaded.output_name.as_str()]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix4>()?;
            Ok(postprocess_mask(
                prediction.slice(s![0, 0, .., ..]),
                width,
                height,
            ))
        })
    }
}

impl BackgroundRemover for OnnxBackgroundRemover {
    fn remove(&self, image: &[u8], model: ModelName) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(image).map_err(|e| RemBgError::ImageProcessing {
            path: "<memory>".to_string(),
            operation: "image decode".to_string(),
            source: Box::new(e),
        })?;

        let mask = self.predict_mask(&decoded.to_rgb8(), model)?;
        let cutout = apply_alpha(&decoded, &mask)?;
        encode_png(&cutout)
    }
}

fn model_error(
    operation: impl Into<String>,
    err: impl std::error::Error + Send + Sync + 'static,
) -> RemBgError {
    RemBgError::Model {
        operation: operation.into(),
        source: Box::new(err),
    }
}

/// Resize to the model's square input and normalise into an NCHW tensor.
pub fn preprocess(image: &RgbImage, model: ModelName) -> Array4<f32> {
    let size = model.input_size();
    let resized = imageops::resize(image, size, size, FilterType::Lanczos3);
    let pixels = resized.as_ndarray3();

    let max = pixels.iter().copied().max().unwrap_or(0) as f32;
    let max = max.max(1e-6);
    let (mean, std) = (model.mean(), model.std());

    Array4::from_shape_fn((1, 3, size as usize, size as usize), |(_, c, y, x)| {
        (pixels[[c, y, x]] as f32 / max - mean[c]) / std[c]
    })
}

/// Min-max normalise a raw prediction into an 8-bit mask at the original size.
pub fn postprocess_mask(prediction: ArrayView2<f32>, width: u32, height: u32) -> GrayImage {
    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    let (rows, cols) = prediction.dim();

    let mask = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = prediction[[y as usize, x as usize]];
        let normalized = if range > f32::EPSILON {
            (value - min) / range
        } else {
            0.0
        };
        Luma([(normalized * 255.0).clamp(0.0, 255.0) as u8])
    });

    if mask.dimensions() == (width, height) {
        mask
    } else {
        imageops::resize(&mask, width, height, FilterType::Lanczos3)
    }
}

/// Use `mask` as the alpha channel of `image`.
pub fn apply_alpha(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        let (iw, ih) = image.dimensions();
        let (mw, mh) = mask.dimensions();
        return Err(RemBgError::ImageProcessing {
            path: "<memory>".to_string(),
            operation: "mask application".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("image is {}x{} but mask is {}x{}", iw, ih, mw, mh),
            )),
        });
    }

    let mut rgba = image.to_rgba8();
    for (pixel, Luma([alpha])) in rgba.pixels_mut().zip(mask.pixels()) {
        pixel[3] = *alpha;
    }
    Ok(rgba)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| RemBgError::ImageProcessing {
            path: "<memory>".to_string(),
            operation: "png encode".to_string(),
            source: Box::new(e),
        })?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_model_names_parse() {
        for model in ModelName::ALL {
            let parsed = ModelName::from_str(model.as_str(), false).unwrap();
            assert_eq!(parsed, model);
        }
        assert!(ModelName::from_str("u2net-human-seg", false).is_err());
        assert_eq!(ModelName::default(), ModelName::U2net);
    }

    #[test]
    fn test_model_descriptors() {
        assert_eq!(ModelName::U2netHumanSeg.file_name(), "u2net_human_seg.onnx");
        assert_eq!(
            ModelName::IsnetGeneralUse.download_url(),
            "https://github.com/danielgatis/rembg/releases/download/v0.0.0/isnet-general-use.onnx"
        );
        assert_eq!(ModelName::U2netp.input_size(), 320);
        assert_eq!(ModelName::IsnetGeneralUse.input_size(), 1024);
        assert_eq!(ModelName::IsnetGeneralUse.std(), [1.0, 1.0, 1.0]);
        assert_eq!(ModelName::Silueta.mean(), IMAGENET_MEAN);
    }

    #[test]
    fn test_model_home_resolution_order() {
        let explicit = Path::new("/opt/models");
        let home = Some(PathBuf::from("/home/user"));

        assert_eq!(
            resolve_model_home(Some(explicit), Some("/env/models".into()), home.clone()),
            PathBuf::from("/opt/models")
        );
        assert_eq!(
            resolve_model_home(None, Some("/env/models".into()), home.clone()),
            PathBuf::from("/env/models")
        );
        assert_eq!(
            resolve_model_home(None, Some(String::new()), home.clone()),
            PathBuf::from("/home/user/.u2net")
        );
        assert_eq!(
            resolve_model_home(None, None, None),
            PathBuf::from(".u2net")
        );
    }

    #[test]
    fn test_prepare_missing_model_fails_fast() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let remover = OnnxBackgroundRemover::new(temp_dir.path(), 0);

        let err = remover.prepare(ModelName::Silueta).unwrap_err();
        match err {
            RemBgError::MissingModel { model, path, url } => {
                assert_eq!(model, "silueta");
                assert_eq!(path, temp_dir.path().join("silueta.onnx"));
                assert!(url.ends_with("/silueta.onnx"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_model_error_keeps_source() {
        let err = model_error("warm-up run", ort::Error::new("bad input shape"));

        let source = std::error::Error::source(&err).unwrap();
        let ort_err = source.downcast_ref::<ort::Error>().unwrap();
        assert_eq!(ort_err.message(), "bad input shape");
        assert!(err.to_string().contains("warm-up run"));
    }

    #[test]
    fn test_remove_rejects_undecodable_bytes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let remover = OnnxBackgroundRemover::new(temp_dir.path(), 0);

        let err = remover.remove(b"not an image", ModelName::U2net).unwrap_err();
        assert!(matches!(err, RemBgError::ImageProcessing { .. }));
    }

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let image = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        let tensor = preprocess(&image, ModelName::IsnetGeneralUse);

        assert_eq!(tensor.shape(), &[1, 3, 1024, 1024]);
        // white scaled by its own max is 1.0, then (1.0 - 0.5) / 1.0
        assert!((tensor[[0, 0, 10, 10]] - 0.5).abs() < 1e-2);
    }

    #[test]
    fn test_postprocess_mask_min_max() {
        let prediction = ndarray::array![[0.2_f32, 0.6], [1.0, 0.2]];
        let mask = postprocess_mask(prediction.view(), 2, 2);

        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(0, 1)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 127);
    }

    #[test]
    fn test_postprocess_flat_prediction_is_transparent() {
        let prediction = Array2::<f32>::from_elem((4, 4), 0.7);
        let mask = postprocess_mask(prediction.view(), 8, 6);

        assert_eq!(mask.dimensions(), (8, 6));
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_apply_alpha() -> Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([10, 20, 30])));
        let mask = GrayImage::from_raw(2, 1, vec![0, 200]).unwrap();

        let rgba = apply_alpha(&image, &mask)?;
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(rgba.get_pixel(1, 0).0, [10, 20, 30, 200]);
        Ok(())
    }

    #[test]
    fn test_apply_alpha_dimension_mismatch() {
        let image = DynamicImage::new_rgb8(3, 3);
        let mask = GrayImage::new(2, 2);
        assert!(apply_alpha(&image, &mask).is_err());
    }

    #[test]
    fn test_encode_png_signature() -> Result<()> {
        let bytes = encode_png(&RgbaImage::new(4, 4))?;
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        Ok(())
    }
}
