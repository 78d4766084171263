use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::clip::PixelBounds;
use crate::error::{EngineError, EngineResult};
use crate::layer::Layer;

/// How a layer's pixels combine with the pixels beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendOperator {
    /// Source over destination
    #[default]
    Normal,
    Multiply,
    Screen,
    Darken,
    Lighten,
    Overlay,
    /// Channel-wise sum, saturating at white
    Add,
    /// Removes destination coverage where the source is opaque
    Erase,
}

impl BlendOperator {
    pub fn all() -> &'static [BlendOperator] {
        &[
            BlendOperator::Normal,
            BlendOperator::Multiply,
            BlendOperator::Screen,
            BlendOperator::Darken,
            BlendOperator::Lighten,
            BlendOperator::Overlay,
            BlendOperator::Add,
            BlendOperator::Erase,
        ]
    }

    pub fn is_normal(self) -> bool {
        self == BlendOperator::Normal
    }

    pub fn label(self) -> &'static str {
        match self {
            BlendOperator::Normal => "Normal",
            BlendOperator::Multiply => "Multiply",
            BlendOperator::Screen => "Screen",
            BlendOperator::Darken => "Darken",
            BlendOperator::Lighten => "Lighten",
            BlendOperator::Overlay => "Overlay",
            BlendOperator::Add => "Add",
            BlendOperator::Erase => "Erase",
        }
    }

    /// Separable blend function B(cb, cs) on normalised channels.
    fn mix(self, cb: f32, cs: f32) -> f32 {
        match self {
            BlendOperator::Normal | BlendOperator::Erase => cs,
            BlendOperator::Multiply => cb * cs,
            BlendOperator::Screen => cb + cs - cb * cs,
            BlendOperator::Darken => cb.min(cs),
            BlendOperator::Lighten => cb.max(cs),
            BlendOperator::Overlay => {
                if cb <= 0.5 {
                    2.0 * cb * cs
                } else {
                    1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
                }
            }
            BlendOperator::Add => (cb + cs).min(1.0),
        }
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blend one straight-alpha pixel onto another.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, opacity: f32, op: BlendOperator) -> Rgba<u8> {
    let sa = (top[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return base;
    }
    if op.is_normal() && sa >= 1.0 {
        return top;
    }

    let ba = base[3] as f32 / 255.0;

    if op == BlendOperator::Erase {
        let alpha = to_u8(ba * (1.0 - sa));
        if alpha == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        return Rgba([base[0], base[1], base[2], alpha]);
    }

    let out_a = sa + ba * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let cs = top[c] as f32 / 255.0;
        let cb = base[c] as f32 / 255.0;
        let co = sa * (1.0 - ba) * cs + sa * ba * op.mix(cb, cs) + (1.0 - sa) * ba * cb;
        out[c] = to_u8(co / out_a);
    }
    out[3] = to_u8(out_a);
    Rgba(out)
}

fn ensure_same_size(dst: &RgbaImage, src: &RgbaImage) -> EngineResult<()> {
    if dst.dimensions() != src.dimensions() {
        return Err(EngineError::DimensionMismatch {
            expected: dst.dimensions(),
            actual: src.dimensions(),
        });
    }
    Ok(())
}

/// Composite `src` onto `dst` inside `area`.
pub fn composite_over(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    opacity: f32,
    op: BlendOperator,
    area: PixelBounds,
) -> EngineResult<()> {
    ensure_same_size(dst, src)?;
    if opacity <= 0.0 || area.is_empty() {
        return Ok(());
    }
    for y in area.y0..area.y1.min(dst.height()) {
        for x in area.x0..area.x1.min(dst.width()) {
            let top = *src.get_pixel(x, y);
            if top[3] == 0 {
                continue;
            }
            let base = dst.get_pixel_mut(x, y);
            *base = blend_pixel(*base, top, opacity, op);
        }
    }
    Ok(())
}

/// Composite a layer with its own opacity and blend operator.
pub fn composite_layer(dst: &mut RgbaImage, layer: &Layer, area: PixelBounds) -> EngineResult<()> {
    composite_over(dst, &layer.buffer, layer.opacity, layer.blend, area)
}

/// Copy `src` into `dst` inside `area`, replacing what was there.
pub fn copy_area(dst: &mut RgbaImage, src: &RgbaImage, area: PixelBounds) -> EngineResult<()> {
    ensure_same_size(dst, src)?;
    for y in area.y0..area.y1.min(dst.height()) {
        for x in area.x0..area.x1.min(dst.width()) {
            dst.put_pixel(x, y, *src.get_pixel(x, y));
        }
    }
    Ok(())
}

/// Reset every pixel of `buffer` to transparent.
pub fn clear(buffer: &mut RgbaImage) {
    for pixel in buffer.pixels_mut() {
        *pixel = Rgba([0, 0, 0, 0]);
    }
}

/// Naive from-scratch composite of `layers`, bottom to top, inside `area`.
pub fn flatten(layers: &[Layer], width: u32, height: u32, area: PixelBounds) -> EngineResult<RgbaImage> {
    let mut out = RgbaImage::new(width, height);
    for layer in layers {
        composite_layer(&mut out, layer, area)?;
    }
    Ok(out)
}

/// Two-tone checkerboard used behind transparent pixels.
pub fn checkerboard(width: u32, height: u32, cell: u32, light: [u8; 4], dark: [u8; 4]) -> RgbaImage {
    let cell = cell.max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba(light)
        } else {
            Rgba(dark)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    #[test]
    fn test_normal_opaque_replaces() {
        assert_eq!(blend_pixel(RED, BLUE, 1.0, BlendOperator::Normal), BLUE);
    }

    #[test]
    fn test_zero_coverage_keeps_base() {
        for op in BlendOperator::all() {
            assert_eq!(blend_pixel(RED, CLEAR, 1.0, *op), RED);
            assert_eq!(blend_pixel(RED, BLUE, 0.0, *op), RED);
        }
    }

    #[test]
    fn test_half_opacity_over_transparent_keeps_colour() {
        let out = blend_pixel(CLEAR, BLUE, 0.5, BlendOperator::Normal);
        assert_eq!(out, Rgba([0, 0, 255, 128]));
    }

    #[test]
    fn test_half_opacity_over_opaque_mixes() {
        let out = blend_pixel(RED, BLUE, 0.5, BlendOperator::Normal);
        assert_eq!(out, Rgba([128, 0, 128, 255]));
    }

    #[test]
    fn test_multiply_and_screen() {
        let grey = Rgba([128, 128, 128, 255]);
        let white = Rgba([255, 255, 255, 255]);
        assert_eq!(blend_pixel(white, grey, 1.0, BlendOperator::Multiply), grey);
        assert_eq!(blend_pixel(grey, white, 1.0, BlendOperator::Screen), white);
    }

    #[test]
    fn test_darken_lighten() {
        let a = Rgba([200, 10, 100, 255]);
        let b = Rgba([50, 60, 100, 255]);
        assert_eq!(blend_pixel(a, b, 1.0, BlendOperator::Darken), Rgba([50, 10, 100, 255]));
        assert_eq!(blend_pixel(a, b, 1.0, BlendOperator::Lighten), Rgba([200, 60, 100, 255]));
    }

    #[test]
    fn test_erase_removes_coverage() {
        assert_eq!(blend_pixel(RED, BLUE, 1.0, BlendOperator::Erase), CLEAR);
        let half = blend_pixel(RED, BLUE, 0.5, BlendOperator::Erase);
        assert_eq!(half, Rgba([255, 0, 0, 128]));
    }

    #[test]
    fn test_composite_over_respects_area() {
        let mut dst = RgbaImage::new(4, 4);
        let src = RgbaImage::from_pixel(4, 4, RED);
        let area = PixelBounds { x0: 1, y0: 1, x1: 3, y1: 3 };
        composite_over(&mut dst, &src, 1.0, BlendOperator::Normal, area).unwrap();
        assert_eq!(*dst.get_pixel(0, 0), CLEAR);
        assert_eq!(*dst.get_pixel(1, 1), RED);
        assert_eq!(*dst.get_pixel(2, 2), RED);
        assert_eq!(*dst.get_pixel(3, 3), CLEAR);
    }

    #[test]
    fn test_composite_over_rejects_size_mismatch() {
        let mut dst = RgbaImage::new(4, 4);
        let src = RgbaImage::new(2, 2);
        let result = composite_over(&mut dst, &src, 1.0, BlendOperator::Normal, PixelBounds::full(4, 4));
        assert!(matches!(result, Err(EngineError::DimensionMismatch { .. })));
    }
}
