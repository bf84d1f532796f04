//! The fixed map-item color palette, expanded once per process.
//!
//! Save records store one palette index per pixel. Each vanilla base color
//! occupies four consecutive indices, one per brightness variant, so index
//! `4 * base + variant` selects a concrete RGB value. Index 0 belongs to the
//! "no color" base and marks unexplored pixels.

use std::sync::OnceLock;

/// Palette index written for pixels the map has never observed.
pub const UNEXPLORED: u8 = 0;

/// Brightness multipliers (out of 255) in palette-index order.
const SHADES: [u32; 4] = [180, 220, 255, 135];

/// Vanilla base map colors (RGB) in id order, through the 1.17 additions.
const BASE_COLORS: [[u8; 3]; 62] = [
    [0, 0, 0],       // none
    [127, 178, 56],  // grass
    [247, 233, 163], // sand
    [199, 199, 199], // wool
    [255, 0, 0],     // fire
    [160, 160, 255], // ice
    [167, 167, 167], // metal
    [0, 124, 0],     // plant
    [255, 255, 255], // snow
    [164, 168, 184], // clay
    [151, 109, 77],  // dirt
    [112, 112, 112], // stone
    [64, 64, 255],   // water
    [143, 119, 72],  // wood
    [255, 252, 245], // quartz
    [216, 127, 51],  // orange
    [178, 76, 216],  // magenta
    [102, 153, 216], // light blue
    [229, 229, 51],  // yellow
    [127, 204, 25],  // light green
    [242, 127, 165], // pink
    [76, 76, 76],    // gray
    [153, 153, 153], // light gray
    [76, 127, 153],  // cyan
    [127, 63, 178],  // purple
    [51, 76, 178],   // blue
    [102, 76, 51],   // brown
    [102, 127, 51],  // green
    [153, 51, 51],   // red
    [25, 25, 25],    // black
    [250, 238, 77],  // gold
    [92, 219, 213],  // diamond
    [74, 128, 255],  // lapis
    [0, 217, 58],    // emerald
    [129, 86, 49],   // podzol
    [112, 2, 0],     // nether
    [209, 177, 161], // white terracotta
    [159, 82, 36],   // orange terracotta
    [149, 87, 108],  // magenta terracotta
    [112, 108, 138], // light blue terracotta
    [186, 133, 36],  // yellow terracotta
    [103, 117, 53],  // light green terracotta
    [160, 77, 78],   // pink terracotta
    [57, 41, 35],    // gray terracotta
    [135, 107, 98],  // light gray terracotta
    [87, 92, 92],    // cyan terracotta
    [122, 73, 88],   // purple terracotta
    [76, 62, 92],    // blue terracotta
    [76, 50, 35],    // brown terracotta
    [76, 82, 42],    // green terracotta
    [142, 60, 46],   // red terracotta
    [37, 22, 16],    // black terracotta
    [189, 48, 49],   // crimson nylium
    [148, 63, 97],   // crimson stem
    [92, 25, 29],    // crimson hyphae
    [22, 126, 134],  // warped nylium
    [58, 142, 140],  // warped stem
    [86, 44, 62],    // warped hyphae
    [20, 180, 133],  // warped wart block
    [100, 100, 100], // deepslate
    [216, 175, 147], // raw iron
    [127, 167, 150], // glow lichen
];

/// Expanded palette in the shape the PNG encoder wants.
pub struct TilePalette {
    /// RGB triplets, one per palette index.
    pub plte: Vec<u8>,
    /// Per-index alpha; only the unexplored color family is transparent.
    pub trns: Vec<u8>,
}

/// The process-wide expanded palette, built on first use.
pub fn tile_palette() -> &'static TilePalette {
    static PALETTE: OnceLock<TilePalette> = OnceLock::new();
    PALETTE.get_or_init(|| {
        let mut plte = Vec::with_capacity(BASE_COLORS.len() * SHADES.len() * 3);
        let mut trns = Vec::with_capacity(BASE_COLORS.len() * SHADES.len());
        for (base, &[r, g, b]) in BASE_COLORS.iter().enumerate() {
            for mult in SHADES {
                plte.push(shade(r, mult));
                plte.push(shade(g, mult));
                plte.push(shade(b, mult));
                trns.push(if base == 0 { 0 } else { 255 });
            }
        }
        TilePalette { plte, trns }
    })
}

fn shade(component: u8, mult: u32) -> u8 {
    (u32::from(component) * mult / 255) as u8
}
