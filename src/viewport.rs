//! Zoom/pan state of the crop editor.
//!
//! [`Viewport`] owns a [`ViewportState`] and keeps it valid: after every
//! update the zoom sits in `[min_zoom, max_zoom]` and each offset sits in
//! `±max_pan_offset(zoom)`. Until the source dimensions are known the zoom
//! floor is 1 and offsets are left alone; [`Viewport::set_natural`] clamps
//! them once the image has loaded.

use crate::imaging::calculations::{
    self, DEFAULT_MAX_ZOOM, SourceRect, clamp_offset, effective_zoom, max_pan_offset,
};
use serde::{Deserialize, Serialize};

/// Zoom change per wheel notch.
pub const WHEEL_ZOOM_STEP: f64 = 0.1;

/// The user-controlled part of the viewport. Serializable for drafts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    state: ViewportState,
    natural: Option<(u32, u32)>,
    target_aspect: f64,
    max_zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1.0, DEFAULT_MAX_ZOOM)
    }
}

impl Viewport {
    pub fn new(target_aspect: f64, max_zoom: f64) -> Self {
        Self {
            state: ViewportState::default(),
            natural: None,
            target_aspect,
            max_zoom,
        }
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn zoom(&self) -> f64 {
        self.state.zoom
    }

    pub fn offset(&self) -> (f64, f64) {
        (self.state.offset_x, self.state.offset_y)
    }

    pub fn natural(&self) -> Option<(u32, u32)> {
        self.natural
    }

    pub fn target_aspect(&self) -> f64 {
        self.target_aspect
    }

    pub fn min_zoom(&self) -> f64 {
        calculations::min_zoom(self.natural, self.target_aspect)
    }

    /// Configured ceiling, raised to the floor when the floor is higher.
    pub fn max_zoom(&self) -> f64 {
        self.max_zoom.max(self.min_zoom())
    }

    pub fn max_pan_offset(&self) -> f64 {
        max_pan_offset(self.state.zoom)
    }

    /// Record the loaded image's size. Zero-sized images count as not loaded.
    pub fn set_natural(&mut self, natural: (u32, u32)) {
        self.natural = if natural.0 == 0 || natural.1 == 0 {
            None
        } else {
            Some(natural)
        };
        self.clamp();
    }

    pub fn clear_natural(&mut self) {
        self.natural = None;
        self.clamp();
    }

    pub fn set_target_aspect(&mut self, aspect: f64) {
        self.target_aspect = aspect;
        self.clamp();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.state.zoom = zoom;
        self.clamp();
    }

    pub fn zoom_by(&mut self, delta: f64) {
        self.set_zoom(self.state.zoom + delta);
    }

    /// Wheel input: scrolling up (negative delta) zooms in by one step.
    pub fn zoom_by_wheel(&mut self, delta_y: f64) {
        if delta_y == 0.0 || !delta_y.is_finite() {
            return;
        }
        self.zoom_by(-delta_y.signum() * WHEEL_ZOOM_STEP);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.set_offset(self.state.offset_x + dx, self.state.offset_y + dy);
    }

    pub fn set_offset(&mut self, x: f64, y: f64) {
        self.state.offset_x = x;
        self.state.offset_y = y;
        self.clamp();
    }

    /// Back to the cover fit: minimum zoom, centred.
    pub fn reset(&mut self) {
        self.state = ViewportState {
            zoom: self.min_zoom(),
            offset_x: 0.0,
            offset_y: 0.0,
        };
    }

    /// Apply a saved state, clamped against the current image and preset.
    pub fn restore(&mut self, state: ViewportState) {
        self.state = state;
        self.clamp();
    }

    /// Sampling rectangle, or `None` until the image size is known.
    pub fn source_rect(&self) -> Option<SourceRect> {
        self.natural.map(|natural| {
            calculations::source_rect(
                natural,
                self.target_aspect,
                self.state.zoom,
                (self.state.offset_x, self.state.offset_y),
            )
        })
    }

    fn clamp(&mut self) {
        self.state.zoom = effective_zoom(self.state.zoom, self.min_zoom(), self.max_zoom);
        if self.natural.is_some() {
            self.state.offset_x = clamp_offset(self.state.offset_x, self.state.zoom);
            self.state.offset_y = clamp_offset(self.state.offset_y, self.state.zoom);
        } else {
            if !self.state.offset_x.is_finite() {
                self.state.offset_x = 0.0;
            }
            if !self.state.offset_y.is_finite() {
                self.state.offset_y = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(w: u32, h: u32, aspect: f64) -> Viewport {
        let mut v = Viewport::new(aspect, DEFAULT_MAX_ZOOM);
        v.set_natural((w, h));
        v
    }

    #[test]
    fn wide_image_on_square_starts_at_zoom_one() {
        let v = loaded(2000, 1000, 1.0);
        assert_eq!(v.min_zoom(), 1.0);
        assert_eq!(v.zoom(), 1.0);
        let rect = v.source_rect().unwrap();
        assert_eq!((rect.width, rect.height), (1000.0, 1000.0));
    }

    #[test]
    fn tall_image_on_square_is_raised_to_zoom_two() {
        let v = loaded(1000, 2000, 1.0);
        assert_eq!(v.min_zoom(), 2.0);
        assert_eq!(v.zoom(), 2.0);
    }

    #[test]
    fn offsets_clamp_to_zero_at_min_zoom() {
        let mut v = loaded(2000, 1000, 1.0);
        v.set_offset(35.0, -80.0);
        assert_eq!(v.max_pan_offset(), 0.0);
        assert_eq!(v.offset(), (0.0, 0.0));
    }

    #[test]
    fn pan_is_bounded_by_zoom() {
        let mut v = loaded(2000, 1000, 1.0);
        v.set_zoom(1.5);
        v.pan_by(40.0, -10.0);
        assert_eq!(v.offset(), (25.0, -10.0));
    }

    #[test]
    fn zooming_out_re_clamps_offsets() {
        let mut v = loaded(2000, 1000, 1.0);
        v.set_zoom(3.0);
        v.set_offset(90.0, 90.0);
        assert_eq!(v.offset(), (90.0, 90.0));
        v.set_zoom(1.2);
        let (x, y) = v.offset();
        assert!((x - 10.0).abs() < 1e-9 && (y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_ceiling_applies() {
        let mut v = loaded(2000, 1000, 1.0);
        v.set_zoom(8.0);
        assert_eq!(v.zoom(), DEFAULT_MAX_ZOOM);
    }

    #[test]
    fn wheel_zooms_in_on_negative_delta() {
        let mut v = loaded(2000, 1000, 1.0);
        v.zoom_by_wheel(-120.0);
        assert!((v.zoom() - 1.1).abs() < 1e-9);
        v.zoom_by_wheel(120.0);
        v.zoom_by_wheel(120.0);
        assert_eq!(v.zoom(), 1.0);
        v.zoom_by_wheel(0.0);
        assert_eq!(v.zoom(), 1.0);
    }

    #[test]
    fn unloaded_image_leaves_offsets_alone() {
        let mut v = Viewport::new(1.0, DEFAULT_MAX_ZOOM);
        v.set_offset(70.0, -70.0);
        assert_eq!(v.offset(), (70.0, -70.0));
        assert!(v.source_rect().is_none());

        v.set_natural((2000, 1000));
        assert_eq!(v.offset(), (0.0, 0.0));
    }

    #[test]
    fn switching_preset_raises_floor() {
        let mut v = loaded(1080, 1080, 1.0);
        assert_eq!(v.zoom(), 1.0);
        v.set_target_aspect(1.91);
        assert!((v.zoom() - 1.91).abs() < 1e-9);
        assert!(v.source_rect().unwrap().fits_within((1080, 1080)));
    }

    #[test]
    fn restore_clamps_saved_state() {
        let mut v = loaded(2000, 1000, 1.0);
        v.restore(ViewportState {
            zoom: 9.0,
            offset_x: 500.0,
            offset_y: -500.0,
        });
        assert_eq!(v.zoom(), 3.0);
        assert_eq!(v.offset(), (100.0, -100.0));
    }

    #[test]
    fn reset_returns_to_cover_fit() {
        let mut v = loaded(1000, 2000, 1.0);
        v.set_zoom(3.0);
        v.set_offset(20.0, 20.0);
        v.reset();
        assert_eq!(v.state(), ViewportState {
            zoom: 2.0,
            offset_x: 0.0,
            offset_y: 0.0
        });
    }

    #[test]
    fn zero_sized_image_counts_as_unloaded() {
        let mut v = Viewport::default();
        v.set_natural((0, 480));
        assert!(v.natural().is_none());
    }
}
