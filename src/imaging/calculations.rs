//! Pure geometry for the crop viewport.
//!
//! Everything here is a plain function of numbers: no images, no I/O. The
//! viewport ([`crate::viewport::Viewport`]) and the cropper call into these to
//! turn zoom/pan state into a sampling rectangle on the source image.
//!
//! ## Units
//!
//! - **zoom**: a factor `>= 1`. At zoom 1 the sampling window is the largest
//!   window of the target aspect that fits inside the image ("cover" fit).
//! - **offset**: percentage-like pan units. `±50` moves the window to the edge
//!   of the area it may travel; the allowed range grows with zoom as
//!   `(zoom - 1) * 50`.

/// Pan units that correspond to a full half-travel of the sampling window.
pub const PAN_UNIT: f64 = 50.0;

/// Default zoom ceiling.
pub const DEFAULT_MAX_ZOOM: f64 = 3.0;

/// A rectangle on the source image, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceRect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// True if the rectangle lies inside `[0, width] x [0, height]`.
    ///
    /// A small epsilon absorbs float noise from the offset conversion.
    pub fn fits_within(&self, natural: (u32, u32)) -> bool {
        const EPS: f64 = 1e-6;
        let (w, h) = (natural.0 as f64, natural.1 as f64);
        self.x >= -EPS
            && self.y >= -EPS
            && self.x + self.width <= w + EPS
            && self.y + self.height <= h + EPS
    }
}

/// Width / height of an image, or `None` when either side is zero (not loaded).
pub fn image_aspect(natural: (u32, u32)) -> Option<f64> {
    let (w, h) = natural;
    if w == 0 || h == 0 {
        None
    } else {
        Some(w as f64 / h as f64)
    }
}

/// Smallest zoom at which the image covers the target aspect.
///
/// Wider-than-target images cover at zoom 1. Narrower images need
/// `target / image` so the window is not taller than the image allows.
/// Unknown dimensions (image not loaded yet) give 1.
///
/// ```
/// # use memory_vault::imaging::min_zoom;
/// assert_eq!(min_zoom(Some((2000, 1000)), 1.0), 1.0);
/// assert_eq!(min_zoom(Some((1000, 2000)), 1.0), 2.0);
/// assert_eq!(min_zoom(None, 1.0), 1.0);
/// ```
pub fn min_zoom(natural: Option<(u32, u32)>, target_aspect: f64) -> f64 {
    match natural.and_then(image_aspect) {
        Some(aspect) if aspect <= target_aspect => target_aspect / aspect,
        _ => 1.0,
    }
}

/// Clamp a requested zoom into `[min_zoom, max_zoom]`.
///
/// The ceiling never drops below the floor: a very tall image on a wide
/// preset may need more zoom than the configured maximum.
pub fn effective_zoom(requested: f64, min_zoom: f64, max_zoom: f64) -> f64 {
    let requested = if requested.is_finite() {
        requested
    } else {
        min_zoom
    };
    requested.max(min_zoom).min(max_zoom.max(min_zoom))
}

/// Size of the sampling window at a given zoom.
///
/// At zoom 1 one side matches the image exactly and the other is derived
/// from the target aspect; both shrink by `1 / zoom`.
pub fn draw_dimensions(natural: (u32, u32), target_aspect: f64, zoom: f64) -> (f64, f64) {
    let (w, h) = (natural.0 as f64, natural.1 as f64);
    let zoom = zoom.max(1.0);
    let image_aspect = w / h;

    let (draw_w, draw_h) = if image_aspect > target_aspect {
        (h * target_aspect, h)
    } else {
        (w, w / target_aspect)
    };

    (draw_w / zoom, draw_h / zoom)
}

/// Largest pan offset (in pan units) allowed at `zoom`.
pub fn max_pan_offset(zoom: f64) -> f64 {
    ((zoom - 1.0) * PAN_UNIT).max(0.0)
}

/// Clamp one offset component to `±max_pan_offset(zoom)`.
pub fn clamp_offset(offset: f64, zoom: f64) -> f64 {
    let bound = max_pan_offset(zoom);
    if offset.is_finite() {
        offset.clamp(-bound, bound)
    } else {
        0.0
    }
}

/// Convert a pan offset to a pixel shift along one axis.
///
/// `max_offset_pixels` is half the slack between the image and the window on
/// that axis. The result never exceeds the slack, so the window cannot leave
/// the image even when the pan bound is wider than one pan unit.
pub fn offset_to_pixels(offset: f64, natural_len: f64, draw_len: f64) -> f64 {
    let max_offset_pixels = ((natural_len - draw_len) / 2.0).max(0.0);
    let ratio = (offset / PAN_UNIT).clamp(-1.0, 1.0);
    ratio * max_offset_pixels
}

/// Sampling rectangle for a zoom and pan offset.
///
/// The window is centred on the image and shifted by the converted offset.
pub fn source_rect(
    natural: (u32, u32),
    target_aspect: f64,
    zoom: f64,
    offset: (f64, f64),
) -> SourceRect {
    let (w, h) = (natural.0 as f64, natural.1 as f64);
    let (draw_w, draw_h) = draw_dimensions(natural, target_aspect, zoom);

    let x = (w - draw_w) / 2.0 + offset_to_pixels(offset.0, w, draw_w);
    let y = (h - draw_h) / 2.0 + offset_to_pixels(offset.1, h, draw_h);

    SourceRect {
        x,
        y,
        width: draw_w,
        height: draw_h,
    }
}

/// Dimensions that fit within a bounding square of `max_dimension`.
///
/// Aspect ratio is preserved and images are never upscaled.
///
/// ```
/// # use memory_vault::imaging::fit_within;
/// assert_eq!(fit_within((4000, 3000), 1920), (1920, 1440));
/// assert_eq!(fit_within((800, 600), 1920), (800, 600));
/// ```
pub fn fit_within(source: (u32, u32), max_dimension: u32) -> (u32, u32) {
    let (w, h) = source;
    let longer = w.max(h);
    if longer <= max_dimension || longer == 0 {
        return (w, h);
    }

    let scale = max_dimension as f64 / longer as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    (new_w, new_h)
}
