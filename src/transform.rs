use crate::endpoint::StreamEndpoint;
use crate::error::TransformError;
use crate::frame::{Frame, PixelRect};
use crate::glyphs::{GLYPH_HEIGHT, GLYPH_WIDTH, glyph_rows};
use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Top-left corner of the label box.
const LABEL_INSET: (usize, usize) = (8, 3);
const LABEL_PADDING: usize = 4;
const LABEL_BOX_ALPHA: u8 = 200;
const LABEL_BOX_COLOR: [u8; 3] = [0, 0, 0];
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
pub const DEFAULT_LABEL_PX: f32 = 28.0;

/// Per-camera frame post-processing: flips, then a name label.
///
/// The label has two tiers. A TrueType font, when one is configured and can
/// render every character, draws anti-aliased text. Otherwise the built-in
/// bitmap glyphs draw it. The bitmap tier cannot fail, so a frame is never
/// dropped because of its label.
#[derive(Clone)]
pub struct FrameTransform {
    font: Option<FontArc>,
    label_px: f32,
}

impl std::fmt::Debug for FrameTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTransform")
            .field("font", &self.font.is_some())
            .field("label_px", &self.label_px)
            .finish()
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::bitmap_only(DEFAULT_LABEL_PX)
    }
}

impl FrameTransform {
    #[must_use]
    pub fn bitmap_only(label_px: f32) -> Self {
        Self {
            font: None,
            label_px: label_px.max(8.0),
        }
    }

    #[must_use]
    pub fn with_font(font: FontArc, label_px: f32) -> Self {
        Self {
            font: Some(font),
            label_px: label_px.max(8.0),
        }
    }

    /// Loads the configured font; a missing or unreadable font only costs the
    /// primary tier.
    #[must_use]
    pub fn from_font_path(path: Option<&Path>, label_px: f32) -> Self {
        let Some(path) = path else {
            return Self::bitmap_only(label_px);
        };
        match load_font(path) {
            Ok(font) => Self::with_font(font, label_px),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    "overlay font unavailable, using bitmap labels: {err:#}"
                );
                Self::bitmap_only(label_px)
            }
        }
    }

    #[must_use]
    pub fn apply(&self, mut frame: Frame, endpoint: &StreamEndpoint) -> Frame {
        if endpoint.flip_horizontal {
            frame.flip_horizontal();
        }
        if endpoint.flip_vertical {
            frame.flip_vertical();
        }

        let name = endpoint.display_name.trim();
        if name.is_empty() || frame.is_empty() {
            return frame;
        }

        let drawn = match &self.font {
            Some(font) => draw_font_label(&mut frame, font, self.label_px, name),
            None => Err(TransformError::FontUnavailable),
        };
        if let Err(err) = drawn {
            if !matches!(err, TransformError::FontUnavailable) {
                debug!(camera = %endpoint.id, "falling back to bitmap label: {err}");
            }
            draw_bitmap_label(&mut frame, self.bitmap_scale(), name);
        }
        frame
    }

    fn bitmap_scale(&self) -> usize {
        ((self.label_px / (GLYPH_HEIGHT as f32 + 2.0)).round() as usize).clamp(1, 8)
    }
}

fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed reading font file {}", path.display()))?;
    FontArc::try_from_vec(bytes)
        .with_context(|| format!("failed parsing font file {}", path.display()))
}

fn draw_font_label(
    frame: &mut Frame,
    font: &FontArc,
    label_px: f32,
    text: &str,
) -> Result<(), TransformError> {
    let scale = PxScale::from(label_px);
    let scaled = font.as_scaled(scale);
    let ascent = scaled.ascent();

    let mut caret = 0.0_f32;
    let mut glyphs = Vec::with_capacity(text.len());
    for c in text.chars() {
        let id = font.glyph_id(c);
        if id.0 == 0 && !c.is_whitespace() {
            return Err(TransformError::MissingGlyph(c));
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, ascent)));
        caret += scaled.h_advance(id);
    }

    let text_w = caret.ceil().max(1.0) as usize;
    let text_h = scaled.height().ceil().max(1.0) as usize;
    let label_box = label_box(text_w, text_h);
    if label_box.x + label_box.width > frame.width || label_box.y + label_box.height > frame.height
    {
        return Err(TransformError::FrameTooSmall {
            width: frame.width,
            height: frame.height,
        });
    }

    frame.fill_rect(label_box, LABEL_BOX_COLOR, LABEL_BOX_ALPHA);
    let origin_x = (label_box.x + LABEL_PADDING) as i64;
    let origin_y = (label_box.y + LABEL_PADDING) as i64;
    for glyph in glyphs {
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        let left = origin_x + bounds.min.x.floor() as i64;
        let top = origin_y + bounds.min.y.floor() as i64;
        outlined.draw(|gx, gy, coverage| {
            let x = left + i64::from(gx);
            let y = top + i64::from(gy);
            if x < 0 || y < 0 {
                return;
            }
            let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            frame.blend_pixel(x as usize, y as usize, LABEL_TEXT_COLOR, alpha);
        });
    }
    Ok(())
}

fn draw_bitmap_label(frame: &mut Frame, scale: usize, text: &str) {
    let advance = (GLYPH_WIDTH + 1) * scale;
    let char_count = text.chars().count();
    let text_w = (char_count * advance).saturating_sub(scale).max(1);
    let text_h = GLYPH_HEIGHT * scale;
    let label_box = label_box(text_w, text_h);
    frame.fill_rect(label_box, LABEL_BOX_COLOR, LABEL_BOX_ALPHA);

    let origin_x = label_box.x + LABEL_PADDING;
    let origin_y = label_box.y + LABEL_PADDING;
    for (idx, c) in text.chars().enumerate() {
        let glyph_x = origin_x + idx * advance;
        if glyph_x >= frame.width {
            break;
        }
        for (row, bits) in glyph_rows(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                frame.fill_rect(
                    PixelRect {
                        x: glyph_x + col * scale,
                        y: origin_y + row * scale,
                        width: scale,
                        height: scale,
                    },
                    LABEL_TEXT_COLOR,
                    u8::MAX,
                );
            }
        }
    }
}

fn label_box(text_w: usize, text_h: usize) -> PixelRect {
    PixelRect {
        x: LABEL_INSET.0,
        y: LABEL_INSET.1,
        width: text_w + LABEL_PADDING * 2,
        height: text_h + LABEL_PADDING * 2,
    }
}
