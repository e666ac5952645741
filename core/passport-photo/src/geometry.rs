use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle in pixel coordinates.
///
/// Offsets may be negative while crop geometry is being computed; boxes
/// handed out by face detection always lie inside their source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner.
    pub x: i32,
    /// Y coordinate of the top-left corner.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Area in square pixels (`width × height`), computed without overflow.
    pub fn area(&self) -> i64 {
        i64::from(self.width) * i64::from(self.height)
    }

    /// Centroid of the box.
    pub fn center(&self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.width) / 2.0,
            f64::from(self.y) + f64::from(self.height) / 2.0,
        )
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// `true` when the box covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Move the box by `(dx, dy)`.
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Intersect with the `width × height` image rectangle anchored at the
    /// origin. Returns `None` when nothing of the box remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let max_x = i32::try_from(width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height).unwrap_or(i32::MAX);

        let x0 = self.x.clamp(0, max_x);
        let y0 = self.y.clamp(0, max_y);
        let x1 = self.right().clamp(0, max_x);
        let y1 = self.bottom().clamp(0, max_y);

        let clamped = Self::new(x0, y0, x1 - x0, y1 - y0);
        (!clamped.is_empty()).then_some(clamped)
    }
}

/// Fixed output frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSize {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
}

impl TargetSize {
    /// Create a new target size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for TargetSize {
    /// Passport framing: 700×900 (7:9).
    fn default() -> Self {
        Self {
            width: 700,
            height: 900,
        }
    }
}
