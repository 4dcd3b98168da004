/// Marker-controlled watershed fallback
///
/// Used when thresholding finds nothing convincing, typically a low-contrast
/// lesion whose boundary only shows up as a gradient ridge. Two markers are
/// flooded in order of rising gradient: the dark core around the darkest
/// interior pixel (lesion) and the whole view border (skin). Each pixel
/// joins whichever basin reaches it first.
use super::components::{Region, NEIGHBORS_8};
use crate::types::FrameView;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

pub const LABEL_LESION: u8 = 1;
pub const LABEL_BACKGROUND: u8 = 2;

/// Central-difference gradient magnitude, saturated to u8
pub fn gradient_magnitude(luma: &[u8], width: usize, height: usize, out: &mut [u8]) {
    for y in 0..height {
        for x in 0..width {
            let at = |xx: usize, yy: usize| luma[yy * width + xx] as i32;
            let gx = at((x + 1).min(width - 1), y) - at(x.saturating_sub(1), y);
            let gy = at(x, (y + 1).min(height - 1)) - at(x, y.saturating_sub(1));
            out[y * width + x] = (gx.abs() + gy.abs()).min(255) as u8;
        }
    }
}

/// Darkest pixel away from the outer eighth of the view; ties resolve to
/// the first in raster order.
pub fn darkest_interior_pixel(luma: &[u8], width: usize, height: usize) -> Option<usize> {
    let (mx, my) = (width / 8, height / 8);
    (my..height - my)
        .flat_map(|y| (mx..width - mx).map(move |x| y * width + x))
        .min_by_key(|&idx| (luma[idx], idx))
}

type FloodQueue = BinaryHeap<Reverse<(u8, u64, usize, u8)>>;

fn in_bounds(x: i32, y: i32, width: usize, height: usize) -> bool {
    x >= 0 && y >= 0 && x < width as i32 && y < height as i32
}

/// Flood both markers into `labels` (zeroed, view-sized) and return the
/// lesion basin's statistics.
///
/// The lesion marker is the 8-connected core around the darkest interior
/// pixel whose luminance stays below the midpoint between that pixel and
/// the view median.
pub fn flood_lesion_basin(
    view: &FrameView<'_>,
    luma: &[u8],
    gradient: &[u8],
    labels: &mut [u8],
    median: u8,
) -> Option<Region> {
    let (width, height) = (view.width() as usize, view.height() as usize);
    if width < 3 || height < 3 {
        return None;
    }
    let seed = darkest_interior_pixel(luma, width, height)?;
    let level = ((luma[seed] as u16 + median as u16) / 2) as u8;

    // (gradient, insertion order, index, label): the order keeps ties FIFO
    let mut queue = FloodQueue::new();
    let mut order = 0u64;
    let mut push = |queue: &mut FloodQueue, idx: usize, label: u8| {
        queue.push(Reverse((gradient[idx], order, idx, label)));
        order += 1;
    };

    labels[seed] = LABEL_LESION;
    let mut stack = vec![seed];
    while let Some(idx) = stack.pop() {
        push(&mut queue, idx, LABEL_LESION);
        let (x, y) = ((idx % width) as i32, (idx / width) as i32);
        for (dx, dy) in NEIGHBORS_8 {
            let (nx, ny) = (x + dx, y + dy);
            if !in_bounds(nx, ny, width, height) {
                continue;
            }
            let n = ny as usize * width + nx as usize;
            if labels[n] == 0 && luma[n] <= level {
                labels[n] = LABEL_LESION;
                stack.push(n);
            }
        }
    }

    for x in 0..width {
        for idx in [x, (height - 1) * width + x] {
            if labels[idx] == 0 {
                labels[idx] = LABEL_BACKGROUND;
                push(&mut queue, idx, LABEL_BACKGROUND);
            }
        }
    }
    for y in 1..height - 1 {
        for idx in [y * width, y * width + width - 1] {
            if labels[idx] == 0 {
                labels[idx] = LABEL_BACKGROUND;
                push(&mut queue, idx, LABEL_BACKGROUND);
            }
        }
    }

    while let Some(Reverse((_, _, idx, label))) = queue.pop() {
        let (x, y) = ((idx % width) as i32, (idx / width) as i32);
        for (dx, dy) in NEIGHBORS_8 {
            let (nx, ny) = (x + dx, y + dy);
            if !in_bounds(nx, ny, width, height) {
                continue;
            }
            let n = ny as usize * width + nx as usize;
            if labels[n] == 0 {
                labels[n] = label;
                push(&mut queue, n, label);
            }
        }
    }

    let first = labels.iter().position(|&l| l == LABEL_LESION)?;
    let mut region = Region::starting_at(first, width as u32);
    for (idx, _) in labels.iter().enumerate().filter(|&(_, &l)| l == LABEL_LESION) {
        let (x, y) = ((idx % width) as u32, (idx / width) as u32);
        region.add(x, y, view.pixel(x, y), luma[idx]);
    }
    Some(region)
}
