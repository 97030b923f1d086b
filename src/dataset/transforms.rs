//! Image Transform Pipeline
//!
//! Composes the per-sample preprocessing steps applied at load time:
//!
//! ```text
//! LoadImage -> AddChannel -> ScaleIntensity
//!     -> [RandRotate -> RandFlip -> RandZoom]   (training only)
//!     -> EnsureType
//! ```
//!
//! Random steps draw from a caller-supplied RNG so a fixed seed reproduces
//! the same augmentation sequence.

use std::f32::consts::PI;
use std::fmt;
use std::path::Path;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::utils::error::{MedNistError, Result};

/// Dense float array with an explicit shape, row-major.
///
/// `[H, W]` right after loading, `[C, H, W]` once a channel axis exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ImageArray {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(MedNistError::Transform {
                step: "ImageArray",
                message: format!("shape {:?} needs {} values, got {}", shape, expected, data.len()),
            });
        }
        Ok(Self { shape, data })
    }

    /// `(channels, height, width)` for a channel-first array
    pub fn chw(&self, step: &'static str) -> Result<(usize, usize, usize)> {
        match self.shape.as_slice() {
            &[c, h, w] => Ok((c, h, w)),
            other => Err(MedNistError::Transform {
                step,
                message: format!("expected [C, H, W], got shape {:?}", other),
            }),
        }
    }
}

/// One named preprocessing step
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Decode the file as single-channel grayscale `[H, W]`
    LoadImage,
    /// `[H, W]` -> `[1, H, W]`
    AddChannel,
    /// Min-max rescale to `[0, 1]`
    ScaleIntensity,
    /// Rotate by a uniform angle in `[-max_radians, max_radians]`
    RandRotate { max_radians: f32, prob: f32 },
    /// Mirror along the width axis
    RandFlip { prob: f32 },
    /// Zoom about the centre by a uniform factor, output size unchanged
    RandZoom { min_zoom: f32, max_zoom: f32, prob: f32 },
    /// Validate and emit the canonical `[C, H, W]` float array
    EnsureType,
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::LoadImage => "LoadImage",
            Transform::AddChannel => "AddChannel",
            Transform::ScaleIntensity => "ScaleIntensity",
            Transform::RandRotate { .. } => "RandRotate",
            Transform::RandFlip { .. } => "RandFlip",
            Transform::RandZoom { .. } => "RandZoom",
            Transform::EnsureType => "EnsureType",
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(
            self,
            Transform::RandRotate { .. } | Transform::RandFlip { .. } | Transform::RandZoom { .. }
        )
    }

    /// Apply to an already loaded array. `LoadImage` is handled by [`Pipeline`].
    pub fn apply(&self, input: ImageArray, rng: &mut ChaCha8Rng) -> Result<ImageArray> {
        match *self {
            Transform::LoadImage => Err(MedNistError::Transform {
                step: self.name(),
                message: "image already loaded".to_string(),
            }),
            Transform::AddChannel => add_channel(input),
            Transform::ScaleIntensity => Ok(scale_intensity(input)),
            Transform::RandRotate { max_radians, prob } => {
                input.chw(self.name())?;
                if rng.gen::<f32>() < prob {
                    let angle = rng.gen_range(-max_radians..=max_radians);
                    rotate(&input, angle)
                } else {
                    Ok(input)
                }
            }
            Transform::RandFlip { prob } => {
                input.chw(self.name())?;
                if rng.gen::<f32>() < prob {
                    flip_horizontal(input)
                } else {
                    Ok(input)
                }
            }
            Transform::RandZoom {
                min_zoom,
                max_zoom,
                prob,
            } => {
                input.chw(self.name())?;
                if rng.gen::<f32>() < prob {
                    let factor = rng.gen_range(min_zoom..=max_zoom);
                    zoom(&input, factor)
                } else {
                    Ok(input)
                }
            }
            Transform::EnsureType => ensure_type(input),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered list of transforms, starting with `LoadImage`
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    steps: Vec<Transform>,
}

impl Pipeline {
    pub fn new(steps: Vec<Transform>) -> Result<Self> {
        if steps.first() != Some(&Transform::LoadImage) {
            return Err(MedNistError::Config(
                "Transform pipeline must start with LoadImage".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    /// Training pipeline with rotation (±15°), flip and zoom, each at p=0.5
    pub fn train() -> Self {
        Self {
            steps: vec![
                Transform::LoadImage,
                Transform::AddChannel,
                Transform::ScaleIntensity,
                Transform::RandRotate {
                    max_radians: PI / 12.0,
                    prob: 0.5,
                },
                Transform::RandFlip { prob: 0.5 },
                Transform::RandZoom {
                    min_zoom: 0.9,
                    max_zoom: 1.1,
                    prob: 0.5,
                },
                Transform::EnsureType,
            ],
        }
    }

    /// Deterministic pipeline for validation and test
    pub fn eval() -> Self {
        Self {
            steps: vec![
                Transform::LoadImage,
                Transform::AddChannel,
                Transform::ScaleIntensity,
                Transform::EnsureType,
            ],
        }
    }

    pub fn steps(&self) -> &[Transform] {
        &self.steps
    }

    pub fn is_deterministic(&self) -> bool {
        !self.steps.iter().any(Transform::is_random)
    }

    /// Run every step on the image at `path`
    pub fn apply(&self, path: &Path, rng: &mut ChaCha8Rng) -> Result<ImageArray> {
        let mut current: Option<ImageArray> = None;

        for step in &self.steps {
            current = Some(match (step, current) {
                (Transform::LoadImage, _) => load_image(path)?,
                (step, Some(array)) => step.apply(array, rng)?,
                (step, None) => {
                    return Err(MedNistError::Transform {
                        step: step.name(),
                        message: "no image loaded".to_string(),
                    })
                }
            });
        }

        current.ok_or_else(|| MedNistError::Transform {
            step: "Pipeline",
            message: "empty pipeline".to_string(),
        })
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(Transform::name).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

/// Decode an image file as grayscale `[H, W]` with values in 0..=255
pub fn load_image(path: &Path) -> Result<ImageArray> {
    let img = image::open(path)
        .map_err(|e| MedNistError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .to_luma8();

    let (width, height) = img.dimensions();
    let data: Vec<f32> = img.into_raw().into_iter().map(f32::from).collect();
    ImageArray::new(vec![height as usize, width as usize], data)
}

fn add_channel(input: ImageArray) -> Result<ImageArray> {
    match input.shape.as_slice() {
        &[h, w] => Ok(ImageArray {
            shape: vec![1, h, w],
            data: input.data,
        }),
        other => Err(MedNistError::Transform {
            step: "AddChannel",
            message: format!("expected [H, W], got shape {:?}", other),
        }),
    }
}

/// Constant images become all zeros
fn scale_intensity(mut input: ImageArray) -> ImageArray {
    let (min, max) = input
        .data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        input.data.iter_mut().for_each(|v| *v = 0.0);
    } else {
        input.data.iter_mut().for_each(|v| *v = (*v - min) / range);
    }
    input
}

/// Bilinear sample of one `[H, W]` plane at a fractional position.
/// Positions outside the plane take the nearest border value.
fn sample_bilinear(plane: &[f32], h: usize, w: usize, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |xi: usize, yi: usize| plane[yi * w + xi];

    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Resample every channel through an inverse coordinate map
fn resample<F>(input: &ImageArray, step: &'static str, map: F) -> Result<ImageArray>
where
    F: Fn(f32, f32) -> (f32, f32),
{
    let (c, h, w) = input.chw(step)?;
    let plane_len = h * w;
    let mut data = vec![0.0f32; input.data.len()];

    for ch in 0..c {
        let plane = &input.data[ch * plane_len..(ch + 1) * plane_len];
        let out = &mut data[ch * plane_len..(ch + 1) * plane_len];
        for y in 0..h {
            for x in 0..w {
                let (sx, sy) = map(x as f32, y as f32);
                out[y * w + x] = sample_bilinear(plane, h, w, sx, sy);
            }
        }
    }

    ImageArray::new(input.shape.clone(), data)
}

/// Rotate about the image centre, keeping the size. Border padding.
pub fn rotate(input: &ImageArray, angle_radians: f32) -> Result<ImageArray> {
    let (_, h, w) = input.chw("RandRotate")?;
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let (sin_a, cos_a) = angle_radians.sin_cos();

    resample(input, "RandRotate", |x, y| {
        let dx = x - cx;
        let dy = y - cy;
        (cx + dx * cos_a + dy * sin_a, cy - dx * sin_a + dy * cos_a)
    })
}

/// Mirror each row
pub fn flip_horizontal(mut input: ImageArray) -> Result<ImageArray> {
    let (_, _, w) = input.chw("RandFlip")?;
    if w > 0 {
        input.data.chunks_mut(w).for_each(|row| row.reverse());
    }
    Ok(input)
}

/// Zoom about the centre; factors above 1 magnify. Edge padding.
pub fn zoom(input: &ImageArray, factor: f32) -> Result<ImageArray> {
    if factor <= 0.0 || !factor.is_finite() {
        return Err(MedNistError::Transform {
            step: "RandZoom",
            message: format!("zoom factor must be positive, got {}", factor),
        });
    }

    let (_, h, w) = input.chw("RandZoom")?;
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;

    resample(input, "RandZoom", |x, y| {
        (cx + (x - cx) / factor, cy + (y - cy) / factor)
    })
}

fn ensure_type(input: ImageArray) -> Result<ImageArray> {
    input.chw("EnsureType")?;
    if let Some(bad) = input.data.iter().find(|v| !v.is_finite()) {
        return Err(MedNistError::Transform {
            step: "EnsureType",
            message: format!("non-finite value {}", bad),
        });
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use rand::SeedableRng;

    fn gradient_file(dir: &Path, w: u32, h: u32) -> std::path::PathBuf {
        let img = GrayImage::from_fn(w, h, |x, y| Luma([(10 + x * 3 + y * 5) as u8]));
        let path = dir.join("gradient.png");
        img.save(&path).unwrap();
        path
    }

    fn chw(c: usize, h: usize, w: usize, data: Vec<f32>) -> ImageArray {
        ImageArray::new(vec![c, h, w], data).unwrap()
    }

    #[test]
    fn test_eval_pipeline_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_file(dir.path(), 8, 6);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let out = Pipeline::eval().apply(&path, &mut rng).unwrap();
        assert_eq!(out.shape, vec![1, 6, 8]);

        let min = out.data.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = out.data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(min.abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic_prefix_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_file(dir.path(), 12, 12);

        let prefix = Pipeline::new(vec![
            Transform::LoadImage,
            Transform::AddChannel,
            Transform::ScaleIntensity,
        ])
        .unwrap();
        assert!(prefix.is_deterministic());

        let a = prefix.apply(&path, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let b = prefix.apply(&path, &mut ChaCha8Rng::seed_from_u64(99)).unwrap();
        assert_eq!(a.shape, b.shape);
        for (x, y) in a.data.iter().zip(&b.data) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_train_pipeline_same_seed_same_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_file(dir.path(), 16, 16);
        let pipeline = Pipeline::train();
        assert!(!pipeline.is_deterministic());

        let a = pipeline.apply(&path, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        let b = pipeline.apply(&path, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape, vec![1, 16, 16]);
    }

    #[test]
    fn test_pipeline_must_start_with_load() {
        assert!(Pipeline::new(vec![Transform::AddChannel]).is_err());
        assert_eq!(
            Pipeline::eval().to_string(),
            "LoadImage -> AddChannel -> ScaleIntensity -> EnsureType"
        );
    }

    #[test]
    fn test_scale_intensity_constant_image() {
        let out = scale_intensity(chw(1, 2, 2, vec![7.0; 4]));
        assert_eq!(out.data, vec![0.0; 4]);
    }

    #[test]
    fn test_scale_intensity_range() {
        let out = scale_intensity(chw(1, 1, 3, vec![10.0, 20.0, 30.0]));
        assert_eq!(out.data, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_add_channel_rejects_chw() {
        let two_d = ImageArray::new(vec![2, 2], vec![0.0; 4]).unwrap();
        let out = add_channel(two_d).unwrap();
        assert_eq!(out.shape, vec![1, 2, 2]);
        assert!(add_channel(out).is_err());
    }

    #[test]
    fn test_ensure_type_requires_channel_axis() {
        let two_d = ImageArray::new(vec![2, 2], vec![0.0; 4]).unwrap();
        assert!(ensure_type(two_d).is_err());

        let nan = chw(1, 1, 2, vec![0.0, f32::NAN]);
        assert!(ensure_type(nan).is_err());
    }

    #[test]
    fn test_flip_horizontal() {
        let out = flip_horizontal(chw(1, 2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        assert_eq!(out.data, vec![3.0, 2.0, 1.0, 6.0, 5.0, 4.0]);
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let input = chw(1, 3, 3, (0..9).map(|v| v as f32).collect());
        let out = rotate(&input, 0.0).unwrap();
        for (a, b) in input.data.iter().zip(&out.data) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rotate_half_turn() {
        let input = chw(1, 3, 3, (0..9).map(|v| v as f32).collect());
        let out = rotate(&input, PI).unwrap();
        let expected: Vec<f32> = (0..9).rev().map(|v| v as f32).collect();
        for (a, b) in expected.iter().zip(&out.data) {
            assert!((a - b).abs() < 1e-4, "{:?}", out.data);
        }
    }

    #[test]
    fn test_rotate_pads_corners_with_border() {
        let input = chw(1, 8, 8, vec![1.0; 64]);
        let out = rotate(&input, PI / 4.0).unwrap();
        // corners map outside the source and take the edge value
        assert!(out.data.iter().all(|v| (v - 1.0).abs() < 1e-5), "{:?}", out.data);
    }

    #[test]
    fn test_rotate_border_repeats_nearest_edge() {
        // left column 0, right column 1
        let data: Vec<f32> = (0..16).map(|i| if i % 4 < 2 { 0.0 } else { 1.0 }).collect();
        let input = chw(1, 4, 4, data);
        let out = rotate(&input, PI / 12.0).unwrap();
        assert!(out.data[0] < 0.5);
        assert!(out.data[3] > 0.5);
        assert!(out.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_zoom_keeps_size_and_edges() {
        let input = chw(1, 4, 4, vec![1.0; 16]);
        let out = zoom(&input, 0.9).unwrap();
        assert_eq!(out.shape, vec![1, 4, 4]);
        // edge padding keeps a constant image constant
        assert!(out.data.iter().all(|v| (v - 1.0).abs() < 1e-5));

        assert!(zoom(&input, 0.0).is_err());
    }

    #[test]
    fn test_random_steps_require_channel_axis() {
        let two_d = ImageArray::new(vec![2, 2], vec![0.0; 4]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let step = Transform::RandFlip { prob: 1.0 };
        assert!(step.apply(two_d, &mut rng).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_image(Path::new("/nonexistent/file.png")).unwrap_err();
        assert!(matches!(err, MedNistError::ImageLoad(_, _)));
    }
}
