/// Packed RGB8 image, row-major, no padding between rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub rgb: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    #[must_use]
    pub fn new(width: usize, height: usize, rgb: Vec<u8>) -> Option<Self> {
        if rgb.len() != width.saturating_mul(height).saturating_mul(3) {
            return None;
        }
        Some(Self { width, height, rgb })
    }

    #[must_use]
    pub fn filled(width: usize, height: usize, color: [u8; 3]) -> Self {
        let mut rgb = Vec::with_capacity(width.saturating_mul(height).saturating_mul(3));
        for _ in 0..width.saturating_mul(height) {
            rgb.extend_from_slice(&color);
        }
        Self { width, height, rgb }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn row_bytes(&self) -> usize {
        self.width.saturating_mul(3)
    }

    #[cfg(test)]
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) * 3;
        Some([self.rgb[idx], self.rgb[idx + 1], self.rgb[idx + 2]])
    }

    pub fn flip_horizontal(&mut self) {
        let row_bytes = self.row_bytes();
        if row_bytes == 0 {
            return;
        }
        for row in self.rgb.chunks_exact_mut(row_bytes) {
            let mut left = 0_usize;
            let mut right = self.width.saturating_sub(1);
            while left < right {
                for channel in 0..3 {
                    row.swap(left * 3 + channel, right * 3 + channel);
                }
                left += 1;
                right -= 1;
            }
        }
    }

    pub fn flip_vertical(&mut self) {
        let row_bytes = self.row_bytes();
        if row_bytes == 0 || self.height < 2 {
            return;
        }
        let (mut top, mut bottom) = (0_usize, self.height - 1);
        while top < bottom {
            let (head, tail) = self.rgb.split_at_mut(bottom * row_bytes);
            head[top * row_bytes..(top + 1) * row_bytes].swap_with_slice(&mut tail[..row_bytes]);
            top += 1;
            bottom -= 1;
        }
    }

    /// Alpha-blends `color` over the pixel; `alpha` is 0..=255.
    pub fn blend_pixel(&mut self, x: usize, y: usize, color: [u8; 3], alpha: u8) {
        if x >= self.width || y >= self.height || alpha == 0 {
            return;
        }
        let idx = (y * self.width + x) * 3;
        let a = u16::from(alpha);
        for channel in 0..3 {
            let base = u16::from(self.rgb[idx + channel]);
            let over = u16::from(color[channel]);
            self.rgb[idx + channel] = ((over * a + base * (255 - a) + 127) / 255) as u8;
        }
    }

    /// Blends a filled rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, rect: PixelRect, color: [u8; 3], alpha: u8) {
        let x_end = rect.x.saturating_add(rect.width).min(self.width);
        let y_end = rect.y.saturating_add(rect.height).min(self.height);
        for y in rect.y..y_end {
            for x in rect.x..x_end {
                self.blend_pixel(x, y, color, alpha);
            }
        }
    }

    /// Copies `rect` (clipped to the frame) into `out` as a packed RGB buffer.
    /// Returns the clipped rect that was copied.
    pub fn extract_rect(&self, rect: PixelRect, out: &mut Vec<u8>) -> PixelRect {
        let x = rect.x.min(self.width);
        let y = rect.y.min(self.height);
        let clipped = PixelRect {
            x,
            y,
            width: rect.width.min(self.width - x),
            height: rect.height.min(self.height - y),
        };

        let row_bytes = clipped.width.saturating_mul(3);
        out.clear();
        out.reserve(row_bytes.saturating_mul(clipped.height));
        for row in 0..clipped.height {
            let src_start = ((clipped.y + row) * self.width + clipped.x) * 3;
            out.extend_from_slice(&self.rgb[src_start..src_start + row_bytes]);
        }
        clipped
    }

    /// Copies `src` into this frame with its top-left corner at (x, y), clipped.
    pub fn paste(&mut self, src: &Frame, x: usize, y: usize) {
        if x >= self.width || y >= self.height {
            return;
        }
        let copy_w = src.width.min(self.width - x);
        let copy_h = src.height.min(self.height - y);
        let row_bytes = copy_w * 3;
        for row in 0..copy_h {
            let src_start = row * src.width * 3;
            let dst_start = ((y + row) * self.width + x) * 3;
            self.rgb[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src.rgb[src_start..src_start + row_bytes]);
        }
    }
}
