//! Render surface that places camera bitmaps with the Kitty graphics
//! protocol and writes status text straight into a slot's cells.

use crate::display::{RenderSurface, Slot};
use crate::frame::Frame;
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use std::fmt::Write as _;
use std::io::Write;

const DELETE_ALL_IMAGES: &[u8] = b"\x1b_Ga=d,d=A,q=2;\x1b\\";

/// Collects graphics and text commands for one tick; `write_to` hands the
/// batch to the terminal in a single write.
#[derive(Debug, Default)]
pub struct KittySurface {
    graphics: bool,
    control: String,
    payload: String,
    batch: Vec<u8>,
    /// Slot indexes that currently show an image.
    placed: Vec<usize>,
}

impl KittySurface {
    #[must_use]
    pub fn new(graphics: bool) -> Self {
        Self {
            graphics,
            ..Self::default()
        }
    }

    /// Drops every image placement, e.g. before a layout change.
    pub fn clear_images(&mut self) {
        if self.graphics {
            self.batch.extend_from_slice(DELETE_ALL_IMAGES);
        }
        self.placed.clear();
    }

    pub fn write_to(&mut self, out: &mut impl Write) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        out.write_all(&self.batch)
            .context("failed writing batched kitty graphics")?;
        out.flush().context("failed flushing kitty graphics")?;
        self.batch.clear();
        Ok(())
    }

    fn move_to(&mut self, col: u16, row: u16) {
        let _ = write!(
            &mut self.batch,
            "\x1b[{};{}H",
            u32::from(row) + 1,
            u32::from(col) + 1
        );
    }

    fn write_text(&mut self, slot: &Slot, text: &str) {
        let cells = slot.cells;
        if cells.cols == 0 || cells.rows == 0 {
            return;
        }
        let blank = " ".repeat(usize::from(cells.cols));
        for row in 0..cells.rows {
            self.move_to(cells.col, cells.row + row);
            self.batch.extend_from_slice(blank.as_bytes());
        }

        let lines: Vec<&str> = text.lines().take(usize::from(cells.rows)).collect();
        let top = cells.row + (cells.rows - lines.len() as u16) / 2;
        for (offset, line) in lines.iter().enumerate() {
            let clipped: String = line.chars().take(usize::from(cells.cols)).collect();
            let width = clipped.chars().count() as u16;
            self.move_to(cells.col + (cells.cols - width) / 2, top + offset as u16);
            self.batch.extend_from_slice(clipped.as_bytes());
        }
    }
}

impl RenderSurface for KittySurface {
    fn present(&mut self, slot: &Slot, frame: &Frame) -> Result<()> {
        if !self.graphics {
            let text = format!("{}\n{}x{}", slot.label, frame.width, frame.height);
            self.write_text(slot, &text);
            return Ok(());
        }

        self.payload.clear();
        BASE64_ENGINE.encode_string(&frame.rgb, &mut self.payload);
        self.control.clear();
        let _ = write!(
            &mut self.control,
            "a=T,f=24,s={},v={},i={},p=1,c={},r={},C=1,z=-1,q=2",
            frame.width,
            frame.height,
            image_id(slot),
            slot.cells.cols,
            slot.cells.rows
        );
        self.move_to(slot.cells.col, slot.cells.row);
        push_kitty_chunked_bytes(&mut self.batch, &self.control, &self.payload);
        if !self.placed.contains(&slot.index) {
            self.placed.push(slot.index);
        }
        Ok(())
    }

    fn indicate(&mut self, slot: &Slot, text: &str) -> Result<()> {
        if let Some(pos) = self.placed.iter().position(|idx| *idx == slot.index) {
            self.placed.swap_remove(pos);
            let _ = write!(
                &mut self.batch,
                "\x1b_Ga=d,d=I,i={},q=2;\x1b\\",
                image_id(slot)
            );
        }
        self.write_text(slot, text);
        Ok(())
    }
}

fn image_id(slot: &Slot) -> usize {
    slot.index + 1
}

/// Splits a base64 payload into protocol-sized chunks; only the first
/// carries `control`.
fn push_kitty_chunked_bytes(out: &mut Vec<u8>, control: &str, payload: &str) {
    const CHUNK: usize = 4_096;

    let mut offset = 0_usize;
    let payload_len = payload.len();

    while offset < payload_len {
        let next = (offset + CHUNK).min(payload_len);
        let chunk = &payload[offset..next];
        let more = if next < payload_len { b'1' } else { b'0' };

        out.extend_from_slice(b"\x1b_G");
        if offset == 0 {
            out.extend_from_slice(control.as_bytes());
            out.extend_from_slice(b",m=");
        } else {
            out.extend_from_slice(b"m=");
        }
        out.push(more);
        out.extend_from_slice(b";");
        out.extend_from_slice(chunk.as_bytes());
        out.extend_from_slice(b"\x1b\\");
        offset = next;
    }

    if payload_len == 0 {
        out.extend_from_slice(b"\x1b_G");
        out.extend_from_slice(control.as_bytes());
        out.extend_from_slice(b",m=0;\x1b\\");
    }
}

/// Pixel size of one terminal cell, when the terminal reports it.
#[must_use]
pub fn terminal_cell_pixel_size() -> Option<(usize, usize)> {
    let window = crossterm::terminal::window_size().ok()?;
    if window.columns == 0 || window.rows == 0 || window.width == 0 || window.height == 0 {
        return None;
    }

    let cell_px_w = usize::from((window.width / window.columns).max(1));
    let cell_px_h = usize::from((window.height / window.rows).max(1));
    Some((cell_px_w, cell_px_h))
}

#[must_use]
pub fn detect_kitty_graphics_support() -> bool {
    if let Some(explicit) = parse_bool_env("CAMWALL_KITTY_GRAPHICS") {
        return explicit;
    }

    let term = std::env::var("TERM").unwrap_or_default();
    let term_program = std::env::var("TERM_PROGRAM").unwrap_or_default();
    if term_or_program_indicates_kitty_graphics(&term, &term_program) {
        return true;
    }

    // Terminals that keep TERM as xterm-256color.
    [
        "KITTY_WINDOW_ID",
        "KITTY_PID",
        "WEZTERM_EXECUTABLE",
        "WEZTERM_PANE",
        "GHOSTTY_RESOURCES_DIR",
        "KONSOLE_VERSION",
    ]
    .into_iter()
    .any(|name| std::env::var_os(name).is_some())
}

fn term_or_program_indicates_kitty_graphics(term: &str, term_program: &str) -> bool {
    let term = term.to_ascii_lowercase();
    let term_program = term_program.to_ascii_lowercase();

    ["kitty", "ghostty", "wezterm", "foot", "konsole"]
        .into_iter()
        .any(|hint| term.contains(hint))
        || ["ghostty", "wezterm", "konsole"]
            .into_iter()
            .any(|hint| term_program.contains(hint))
}

fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    parse_bool_value(&value)
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
