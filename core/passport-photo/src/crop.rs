use image::{imageops, Rgb, RgbImage};

use crate::geometry::{BoundingBox, TargetSize};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Where the face-centred window falls relative to the source image and
/// where the overlapping part lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasPlacement {
    /// Left edge of the ideal (unclipped) window in source coordinates.
    pub ideal_x: i32,
    /// Top edge of the ideal (unclipped) window in source coordinates.
    pub ideal_y: i32,
    /// Left edge of the copied source region.
    pub src_x: u32,
    /// Top edge of the copied source region.
    pub src_y: u32,
    /// Canvas column receiving `src_x`.
    pub dest_x: u32,
    /// Canvas row receiving `src_y`.
    pub dest_y: u32,
    /// Width of the copied region (0 when nothing overlaps).
    pub width: u32,
    /// Height of the copied region (0 when nothing overlaps).
    pub height: u32,
}

impl CanvasPlacement {
    /// `true` when some source pixels reach the canvas.
    pub fn has_overlap(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Map a box from source coordinates onto the canvas.
    pub fn to_canvas(&self, bounds: &BoundingBox) -> BoundingBox {
        bounds.translate(-self.ideal_x, -self.ideal_y)
    }
}

/// A white canvas with the face-centred source region pasted in.
#[derive(Debug, Clone)]
pub struct FramedCanvas {
    /// The composed canvas, always exactly the target size.
    pub image: RgbImage,
    /// Geometry used to build it.
    pub placement: CanvasPlacement,
    /// The face box in canvas coordinates.
    pub face: BoundingBox,
}

/// Compute the crop window that centres `face` on a `target` canvas.
///
/// The window may extend past any edge of the source; only the overlapping
/// part is reported for copying.
pub fn plan_canvas(
    source_width: u32,
    source_height: u32,
    face: &BoundingBox,
    target: TargetSize,
) -> CanvasPlacement {
    let (cx, cy) = face.center();

    // Truncation toward zero, as an integer cast of the offset.
    let ideal_x = (cx - f64::from(target.width) / 2.0) as i32;
    let ideal_y = (cy - f64::from(target.height) / 2.0) as i32;

    let src_x = i64::from(ideal_x.max(0));
    let src_y = i64::from(ideal_y.max(0));
    let dest_x = src_x - i64::from(ideal_x);
    let dest_y = src_y - i64::from(ideal_y);

    let width = (i64::from(target.width) - dest_x)
        .min(i64::from(source_width) - src_x)
        .max(0);
    let height = (i64::from(target.height) - dest_y)
        .min(i64::from(source_height) - src_y)
        .max(0);

    CanvasPlacement {
        ideal_x,
        ideal_y,
        src_x: src_x as u32,
        src_y: src_y as u32,
        dest_x: dest_x.min(i64::from(target.width)) as u32,
        dest_y: dest_y.min(i64::from(target.height)) as u32,
        width: width as u32,
        height: height as u32,
    }
}

/// Build the white `target` canvas with the face centred on it.
pub fn compose_canvas(source: &RgbImage, face: &BoundingBox, target: TargetSize) -> FramedCanvas {
    let placement = plan_canvas(source.width(), source.height(), face, target);
    let mut image = RgbImage::from_pixel(target.width, target.height, WHITE);

    if placement.has_overlap() {
        let region = imageops::crop_imm(
            source,
            placement.src_x,
            placement.src_y,
            placement.width,
            placement.height,
        )
        .to_image();
        imageops::replace(
            &mut image,
            &region,
            i64::from(placement.dest_x),
            i64::from(placement.dest_y),
        );
    }

    FramedCanvas {
        image,
        placement,
        face: placement.to_canvas(face),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 200) as u8, (y % 200) as u8, ((x + y) % 7) as u8])
        })
    }

    #[test]
    fn large_source_fills_canvas() {
        let face = BoundingBox::new(400, 400, 200, 200);
        let placement = plan_canvas(1000, 1000, &face, TargetSize::new(700, 900));
        assert_eq!(
            placement,
            CanvasPlacement {
                ideal_x: 150,
                ideal_y: 50,
                src_x: 150,
                src_y: 50,
                dest_x: 0,
                dest_y: 0,
                width: 700,
                height: 900,
            }
        );
    }

    #[test]
    fn small_source_is_padded_with_white() {
        let face = BoundingBox::new(100, 100, 80, 80);
        let placement = plan_canvas(300, 300, &face, TargetSize::new(700, 900));
        assert_eq!(
            placement,
            CanvasPlacement {
                ideal_x: -210,
                ideal_y: -310,
                src_x: 0,
                src_y: 0,
                dest_x: 210,
                dest_y: 310,
                width: 300,
                height: 300,
            }
        );

        let source = patterned(300, 300);
        let framed = compose_canvas(&source, &face, TargetSize::new(700, 900));
        assert_eq!(framed.image.dimensions(), (700, 900));

        for (x, y, pixel) in framed.image.enumerate_pixels() {
            let inside = (210..510).contains(&x) && (310..610).contains(&y);
            if inside {
                assert_eq!(pixel, source.get_pixel(x - 210, y - 310));
            } else {
                assert_eq!(pixel, &WHITE, "({x}, {y}) should be white padding");
            }
        }
    }

    #[test]
    fn full_overlap_copies_the_window_verbatim() {
        let source = patterned(1000, 1000);
        let face = BoundingBox::new(400, 400, 200, 200);
        let framed = compose_canvas(&source, &face, TargetSize::new(700, 900));
        assert_eq!(framed.image.get_pixel(0, 0), source.get_pixel(150, 50));
        assert_eq!(framed.image.get_pixel(699, 899), source.get_pixel(849, 949));
    }

    #[test]
    fn face_near_right_edge_pads_right_side() {
        let face = BoundingBox::new(900, 400, 100, 100);
        let placement = plan_canvas(1000, 1000, &face, TargetSize::new(700, 900));
        assert_eq!(placement.ideal_x, 600);
        assert_eq!(placement.dest_x, 0);
        assert_eq!(placement.width, 400);
        assert_eq!(placement.height, 900);
    }

    #[test]
    fn face_is_centred_on_canvas() {
        let face = BoundingBox::new(1200, 900, 240, 300);
        let framed = compose_canvas(&patterned(3000, 3000), &face, TargetSize::new(700, 900));
        let (cx, cy) = framed.face.center();
        assert!((cx - 350.0).abs() <= 1.0, "cx = {cx}");
        assert!((cy - 450.0).abs() <= 1.0, "cy = {cy}");
    }

    #[test]
    fn shifted_face_uses_ideal_offset() {
        let face = BoundingBox::new(100, 100, 80, 80);
        let framed = compose_canvas(&patterned(300, 300), &face, TargetSize::new(700, 900));
        assert_eq!(framed.face, BoundingBox::new(310, 410, 80, 80));
    }

    #[test]
    fn odd_centre_truncates_toward_zero() {
        let face = BoundingBox::new(100, 100, 81, 81);
        let placement = plan_canvas(300, 300, &face, TargetSize::new(700, 900));
        // 140.5 - 350 = -209.5 -> -209
        assert_eq!(placement.ideal_x, -209);
        assert_eq!(placement.dest_x, 209);
    }
}
