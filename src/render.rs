use crate::{config::Appearance, registry::WindowRegistry};
use hex_color::HexColor;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, PixmapMut, Transform};

pub const BYTES_PER_PIXEL: u32 = 4;

const MAX_TILE_SIZE: u32 = 1024;
const MAX_PADDING: u32 = 256;
const MAX_COLUMNS: u32 = 64;

const BORDER_WIDTH: u32 = 4;
const CORNER_RADIUS: f32 = 6.0;
const PIP_SIZE: u32 = 8;
const PIP_GAP: u32 = 4;
const MAX_PIPS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Grid placement of the window tiles.
///
/// Sizes from the config are clamped, so every coordinate fits in a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    tile_size: u32,
    padding: u32,
    columns: u32,
}

impl Layout {
    pub fn new(appearance: &Appearance, count: usize) -> Self {
        let max_columns = appearance.max_columns.clamp(1, MAX_COLUMNS);
        let count = u32::try_from(count.max(1)).unwrap_or(u32::MAX);
        Self {
            tile_size: appearance.tile_size.clamp(1, MAX_TILE_SIZE),
            padding: appearance.padding.min(MAX_PADDING),
            columns: count.min(max_columns),
        }
    }

    fn stride(&self) -> u32 {
        self.tile_size.saturating_add(self.padding)
    }

    pub fn dimensions(&self, count: usize) -> (u32, u32) {
        let count = u32::try_from(count.max(1)).unwrap_or(u32::MAX);
        let rows = count.div_ceil(self.columns);
        (
            self.padding
                .saturating_add(self.columns.saturating_mul(self.stride())),
            self.padding.saturating_add(rows.saturating_mul(self.stride())),
        )
    }

    pub fn tile(&self, index: usize) -> Rect {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        Rect {
            x: self
                .padding
                .saturating_add((index % self.columns).saturating_mul(self.stride())),
            y: self
                .padding
                .saturating_add((index / self.columns).saturating_mul(self.stride())),
            width: self.tile_size,
            height: self.tile_size,
        }
    }
}

fn color(hex: HexColor) -> Color {
    Color::from_rgba8(hex.r, hex.g, hex.b, hex.a)
}

fn border(rect: Rect) -> Rect {
    Rect {
        x: rect.x.saturating_sub(BORDER_WIDTH),
        y: rect.y.saturating_sub(BORDER_WIDTH),
        width: rect.width.saturating_add(2 * BORDER_WIDTH),
        height: rect.height.saturating_add(2 * BORDER_WIDTH),
    }
}

fn pips(tile: Rect, count: u32) -> impl Iterator<Item = Rect> {
    let shown = count.min(MAX_PIPS);
    let total = shown * PIP_SIZE + shown.saturating_sub(1) * PIP_GAP;
    let x0 = tile.x.saturating_add(tile.width.saturating_sub(total) / 2);
    let y = tile
        .y
        .saturating_add(tile.height)
        .saturating_sub(PIP_SIZE + PIP_GAP);
    (0..shown).map(move |i| Rect {
        x: x0.saturating_add(i * (PIP_SIZE + PIP_GAP)),
        y,
        width: PIP_SIZE,
        height: PIP_SIZE,
    })
}

fn fill_rect(pixmap: &mut PixmapMut<'_>, rect: Rect, hex: HexColor) {
    let Some(rect) = tiny_skia::Rect::from_xywh(
        rect.x as f32,
        rect.y as f32,
        rect.width as f32,
        rect.height as f32,
    ) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(color(hex));
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
}

fn fill_rounded(pixmap: &mut PixmapMut<'_>, rect: Rect, hex: HexColor) {
    let (x, y, width, height) = (
        rect.x as f32,
        rect.y as f32,
        rect.width as f32,
        rect.height as f32,
    );
    let r = CORNER_RADIUS.min(width / 2.0).min(height / 2.0);

    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + width - r, y);
    pb.quad_to(x + width, y, x + width, y + r);
    pb.line_to(x + width, y + height - r);
    pb.quad_to(x + width, y + height, x + width - r, y + height);
    pb.line_to(x + r, y + height);
    pb.quad_to(x, y + height, x, y + height - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    let Some(path) = pb.finish() else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color(color(hex));
    pixmap.fill_path(
        &path,
        &paint,
        FillRule::Winding,
        Transform::identity(),
        None,
    );
}

/// Draws the whole switcher: background, one tile per window, the selection
/// border and, for grouped entries, one pip per collapsed window.
pub fn paint(
    pixmap: &mut PixmapMut<'_>,
    registry: &WindowRegistry,
    appearance: &Appearance,
    show_group_count: bool,
) {
    let layout = Layout::new(appearance, registry.len());
    pixmap.fill(color(appearance.background_color));

    for (index, window) in registry.iter().enumerate() {
        let tile = layout.tile(index);
        if index == registry.selected_index() {
            fill_rounded(pixmap, border(tile), appearance.selected_color);
        }
        fill_rounded(pixmap, tile, appearance.tile_color);

        if show_group_count && window.group_count > 1 {
            for pip in pips(tile, window.group_count) {
                fill_rect(pixmap, pip, appearance.accent_color);
            }
        }
    }
}

/// Reorders tiny-skia's RGBA bytes into the BGRA layout of `Argb8888`.
pub fn to_argb8888(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(BYTES_PER_PIXEL as usize) {
        pixel.swap(0, 2);
    }
}
