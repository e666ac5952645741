//! Body-seeded iterative graph cut.
//!
//! The canvas is split into a hard-background frame and a rectangle of
//! "probably foreground" pixels estimated from the face. Colour mixtures for
//! both sides are re-estimated every round and the labelling is refined with
//! a min-cut over an 8-connected contrast-sensitive grid.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

use super::gmm::{Color, Gmm};
use super::maxflow::{Graph, Segment};
use super::{SegmentationHints, Segmenter};
use crate::error::PassportPhotoError;
use crate::geometry::BoundingBox;

/// Smoothness weight between neighbouring pixels.
const GAMMA: f64 = 50.0;
/// Terminal weight pinning hard-labelled pixels to their side.
const LAMBDA: f64 = 9.0 * GAMMA;

/// Tuning for [`EnergyCutSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyCutSettings {
    /// Refinement rounds (component assignment, model fit, min-cut).
    pub iterations: u32,
    /// Longest side of the working copy; larger canvases are downscaled
    /// for the cut and the resulting mask scaled back.
    pub max_working_dimension: u32,
}

impl Default for EnergyCutSettings {
    fn default() -> Self {
        Self {
            iterations: 5,
            max_working_dimension: 450,
        }
    }
}

/// Per-pixel state of the cut. Only the frame outside the body region is
/// fixed; everything inside it is re-decided every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Label {
    Background,
    ProbableBackground,
    ProbableForeground,
}

impl Label {
    fn is_foreground(self) -> bool {
        self == Label::ProbableForeground
    }

    fn is_probable(self) -> bool {
        self != Label::Background
    }
}

/// Rough head-and-shoulders region derived from the face box.
///
/// Twice the face width, four times its height, centred horizontally on
/// the face and starting half a face-height above it, clipped to the
/// canvas. A region swallowing the entire canvas is inset by one pixel so
/// the background model always has samples. Returns `None` when nothing is
/// left.
pub fn estimate_body_region(face: &BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
    let body = BoundingBox::new(
        face.x + face.width / 2 - face.width,
        face.y - face.height / 2,
        face.width.saturating_mul(2),
        face.height.saturating_mul(4),
    );
    inset_if_full(body.clamp_to(width, height)?, width, height)
}

/// Segmenter running the body-seeded graph cut.
#[derive(Debug, Clone, Default)]
pub struct EnergyCutSegmenter {
    settings: EnergyCutSettings,
}

impl EnergyCutSegmenter {
    /// Create a segmenter with the given tuning.
    pub fn new(settings: EnergyCutSettings) -> Self {
        Self { settings }
    }

    /// The active tuning.
    pub fn settings(&self) -> &EnergyCutSettings {
        &self.settings
    }
}

impl Segmenter for EnergyCutSegmenter {
    fn segment(
        &self,
        canvas: &RgbImage,
        hints: &SegmentationHints,
    ) -> Result<GrayImage, PassportPhotoError> {
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return Err(PassportPhotoError::SegmentationError(
                "canvas is empty".to_string(),
            ));
        }
        if self.settings.iterations == 0 {
            return Err(PassportPhotoError::SegmentationError(
                "energy cut needs at least one iteration".to_string(),
            ));
        }

        let body = estimate_body_region(&hints.face, width, height).ok_or_else(|| {
            PassportPhotoError::SegmentationError(format!(
                "body region for face {:?} lies outside the {width}x{height} canvas",
                hints.face
            ))
        })?;
        debug!("energy cut seeded with body region {body:?}");

        let longest = width.max(height);
        let limit = self.settings.max_working_dimension.max(1);
        if longest <= limit {
            let labels = grab_cut(canvas, &body, self.settings.iterations)?;
            return Ok(labels_to_mask(&labels, width, height));
        }

        let scale = f64::from(limit) / f64::from(longest);
        let work_w = ((f64::from(width) * scale).round() as u32).max(1);
        let work_h = ((f64::from(height) * scale).round() as u32).max(1);
        let working = imageops::resize(canvas, work_w, work_h, FilterType::Triangle);
        let work_body = scale_region(&body, scale, work_w, work_h).ok_or_else(|| {
            PassportPhotoError::SegmentationError(format!(
                "body region {body:?} vanished at working scale {scale:.3}"
            ))
        })?;
        debug!("energy cut working at {work_w}x{work_h} with region {work_body:?}");

        let labels = grab_cut(&working, &work_body, self.settings.iterations)?;
        let small = labels_to_mask(&labels, work_w, work_h);
        Ok(imageops::resize(&small, width, height, FilterType::Nearest))
    }
}

fn scale_region(region: &BoundingBox, scale: f64, width: u32, height: u32) -> Option<BoundingBox> {
    let x0 = (f64::from(region.x) * scale).floor() as i32;
    let y0 = (f64::from(region.y) * scale).floor() as i32;
    let x1 = (f64::from(region.right()) * scale).ceil() as i32;
    let y1 = (f64::from(region.bottom()) * scale).ceil() as i32;
    let clamped = BoundingBox::new(x0, y0, x1 - x0, y1 - y0).clamp_to(width, height)?;
    inset_if_full(clamped, width, height)
}

/// Shrink a region covering the whole `width` x `height` frame by one pixel.
fn inset_if_full(region: BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
    let covers = region.x == 0
        && region.y == 0
        && region.width as u32 == width
        && region.height as u32 == height;
    if !covers {
        return Some(region);
    }
    let inset = BoundingBox::new(1, 1, region.width - 2, region.height - 2);
    (!inset.is_empty()).then_some(inset)
}

fn labels_to_mask(labels: &[Label], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for (pixel, label) in mask.pixels_mut().zip(labels.iter()) {
        *pixel = Luma([if label.is_foreground() { 255 } else { 0 }]);
    }
    mask
}

/// Run `iterations` rounds of the cut on `image` seeded by `region`.
pub(crate) fn grab_cut(
    image: &RgbImage,
    region: &BoundingBox,
    iterations: u32,
) -> Result<Vec<Label>, PassportPhotoError> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);

    let colors: Vec<Color> = image
        .pixels()
        .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
        .collect();

    let mut labels = vec![Label::Background; w * h];
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            labels[y as usize * w + x as usize] = Label::ProbableForeground;
        }
    }

    let (bgd_samples, fgd_samples) = split_samples(&colors, &labels);
    let mut bgd = Gmm::from_samples(&bgd_samples).ok_or_else(|| {
        PassportPhotoError::SegmentationError("no background samples outside body region".into())
    })?;
    let mut fgd = Gmm::from_samples(&fgd_samples).ok_or_else(|| {
        PassportPhotoError::SegmentationError("no foreground samples inside body region".into())
    })?;

    let weights = NeighbourWeights::new(&colors, w, h);
    let mut components = vec![0usize; w * h];

    for round in 0..iterations {
        for ((component, color), label) in components.iter_mut().zip(&colors).zip(&labels) {
            *component = if label.is_foreground() {
                fgd.which_component(color)
            } else {
                bgd.which_component(color)
            };
        }

        bgd.learn(
            colors
                .iter()
                .zip(&components)
                .zip(&labels)
                .filter(|(_, label)| !label.is_foreground())
                .map(|((color, &k), _)| (color, k)),
        );
        fgd.learn(
            colors
                .iter()
                .zip(&components)
                .zip(&labels)
                .filter(|(_, label)| label.is_foreground())
                .map(|((color, &k), _)| (color, k)),
        );

        let mut graph = build_graph(&colors, &labels, &bgd, &fgd, &weights, w, h);
        let flow = graph.maxflow();

        let mut flipped = 0usize;
        for (p, label) in labels.iter_mut().enumerate() {
            if !label.is_probable() {
                continue;
            }
            let next = match graph.segment(p) {
                Segment::Source => Label::ProbableForeground,
                Segment::Sink => Label::ProbableBackground,
            };
            if next != *label {
                flipped += 1;
                *label = next;
            }
        }
        debug!("energy cut round {round}: flow {flow:.1}, {flipped} label(s) changed");
    }

    Ok(labels)
}

fn split_samples(colors: &[Color], labels: &[Label]) -> (Vec<Color>, Vec<Color>) {
    let mut bgd = Vec::new();
    let mut fgd = Vec::new();
    for (color, label) in colors.iter().zip(labels) {
        if label.is_foreground() {
            fgd.push(*color);
        } else {
            bgd.push(*color);
        }
    }
    (bgd, fgd)
}

fn build_graph(
    colors: &[Color],
    labels: &[Label],
    bgd: &Gmm,
    fgd: &Gmm,
    weights: &NeighbourWeights,
    w: usize,
    h: usize,
) -> Graph {
    let mut graph = Graph::new(w * h, 4 * w * h);

    for y in 0..h {
        for x in 0..w {
            let p = y * w + x;
            let (from_source, to_sink) = match labels[p] {
                Label::Background => (0.0, LAMBDA),
                Label::ProbableBackground | Label::ProbableForeground => (
                    neg_log(bgd.likelihood(&colors[p])),
                    neg_log(fgd.likelihood(&colors[p])),
                ),
            };
            graph.add_terminal_weights(p, from_source, to_sink);

            if x > 0 {
                graph.add_edge(p, p - 1, weights.left[p], weights.left[p]);
                if y > 0 {
                    graph.add_edge(p, p - w - 1, weights.up_left[p], weights.up_left[p]);
                }
            }
            if y > 0 {
                graph.add_edge(p, p - w, weights.up[p], weights.up[p]);
                if x + 1 < w {
                    graph.add_edge(p, p - w + 1, weights.up_right[p], weights.up_right[p]);
                }
            }
        }
    }
    graph
}

fn neg_log(p: f64) -> f64 {
    -p.max(f64::MIN_POSITIVE).ln()
}

/// Contrast-sensitive n-link weights towards the already-visited neighbours.
struct NeighbourWeights {
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

impl NeighbourWeights {
    fn new(colors: &[Color], w: usize, h: usize) -> Self {
        let beta = contrast_beta(colors, w, h);
        let diagonal = GAMMA / std::f64::consts::SQRT_2;
        let weight = |a: &Color, b: &Color, scale: f64| scale * (-beta * distance_sq(a, b)).exp();

        let n = w * h;
        let mut left = vec![0.0; n];
        let mut up_left = vec![0.0; n];
        let mut up = vec![0.0; n];
        let mut up_right = vec![0.0; n];

        for y in 0..h {
            for x in 0..w {
                let p = y * w + x;
                let c = &colors[p];
                if x > 0 {
                    left[p] = weight(c, &colors[p - 1], GAMMA);
                }
                if x > 0 && y > 0 {
                    up_left[p] = weight(c, &colors[p - w - 1], diagonal);
                }
                if y > 0 {
                    up[p] = weight(c, &colors[p - w], GAMMA);
                }
                if x + 1 < w && y > 0 {
                    up_right[p] = weight(c, &colors[p - w + 1], diagonal);
                }
            }
        }

        Self {
            left,
            up_left,
            up,
            up_right,
        }
    }
}

fn distance_sq(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// `1 / (2 · mean squared neighbour difference)`, or 0 for flat images.
fn contrast_beta(colors: &[Color], w: usize, h: usize) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for y in 0..h {
        for x in 0..w {
            let p = y * w + x;
            let c = &colors[p];
            if x > 0 {
                total += distance_sq(c, &colors[p - 1]);
                pairs += 1;
            }
            if x > 0 && y > 0 {
                total += distance_sq(c, &colors[p - w - 1]);
                pairs += 1;
            }
            if y > 0 {
                total += distance_sq(c, &colors[p - w]);
                pairs += 1;
            }
            if x + 1 < w && y > 0 {
                total += distance_sq(c, &colors[p - w + 1]);
                pairs += 1;
            }
        }
    }
    if total <= f64::EPSILON || pairs == 0 {
        0.0
    } else {
        1.0 / (2.0 * total / pairs as f64)
    }
}
