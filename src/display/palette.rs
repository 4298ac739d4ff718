//! The panel's 7-color palette and error-diffusion dithering.

use image::RgbImage;

/// Panel colors as rendered RGB, indexed by the panel's color code.
pub const PALETTE: [[u8; 3]; 7] = [
    [57, 48, 57],    // black
    [255, 255, 255], // white
    [58, 91, 70],    // green
    [61, 59, 94],    // blue
    [156, 72, 75],   // red
    [208, 190, 71],  // yellow
    [177, 106, 73],  // orange
];

/// Index of the palette color closest to `rgb` (squared Euclidean).
pub fn nearest(rgb: [f32; 3]) -> u8 {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (i, color) in PALETTE.iter().enumerate() {
        let dist: f32 = (0..3)
            .map(|c| {
                let d = rgb[c] - color[c] as f32;
                d * d
            })
            .sum();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best as u8
}

/// Map every pixel to a palette index with Floyd–Steinberg dithering.
///
/// Returns one index per pixel in row-major order.
pub fn dither(image: &RgbImage) -> Vec<u8> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut work: Vec<[f32; 3]> = image
        .pixels()
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();
    let mut out = vec![0u8; width * height];

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let old = work[i].map(|v| v.clamp(0.0, 255.0));
            let index = nearest(old);
            out[i] = index;

            let chosen = PALETTE[index as usize];
            let err = [
                old[0] - chosen[0] as f32,
                old[1] - chosen[1] as f32,
                old[2] - chosen[2] as f32,
            ];
            let mut spread = |dx: isize, dy: usize, weight: f32| {
                let nx = x as isize + dx;
                let ny = y + dy;
                if nx < 0 || nx as usize >= width || ny >= height {
                    return;
                }
                let cell = &mut work[ny * width + nx as usize];
                for c in 0..3 {
                    cell[c] += err[c] * weight;
                }
            };
            spread(1, 0, 7.0 / 16.0);
            spread(-1, 1, 3.0 / 16.0);
            spread(0, 1, 5.0 / 16.0);
            spread(1, 1, 1.0 / 16.0);
        }
    }
    out
}

/// Pack palette indices two per byte, first pixel in the high nibble.
///
/// An odd trailing pixel fills the high nibble of the last byte.
pub fn pack(indices: &[u8]) -> Vec<u8> {
    indices
        .chunks(2)
        .map(|pair| {
            let hi = pair[0] & 0x0f;
            let lo = pair.get(1).copied().unwrap_or(0) & 0x0f;
            (hi << 4) | lo
        })
        .collect()
}
