/// Threshold segmentation and connected-component labelling
///
/// Regions are 8-connected so a Moore boundary trace of one region can never
/// step into a neighbouring one.
use crate::types::FrameView;

/// Mask value for a pixel below threshold that has not been labelled yet
pub const MASK_CANDIDATE: u8 = 1;
/// Mask value for a pixel assigned to a region
pub const MASK_REGION: u8 = 2;

pub(crate) const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

/// Accumulated statistics of one connected region, in view coordinates
#[derive(Debug, Clone, Default)]
pub struct Region {
    pub area: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub sum_x: u64,
    pub sum_y: u64,
    pub sum_rgb: [u64; 3],
    pub sum_luma: u64,
    /// First pixel of the region in raster order
    pub seed: usize,
}

impl Region {
    pub(crate) fn starting_at(seed: usize, width: u32) -> Self {
        let (x, y) = (seed as u32 % width, seed as u32 / width);
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            seed,
            ..Default::default()
        }
    }

    pub(crate) fn add(&mut self, x: u32, y: u32, rgb: [u8; 3], luma: u8) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        for (sum, channel) in self.sum_rgb.iter_mut().zip(rgb) {
            *sum += channel as u64;
        }
        self.sum_luma += luma as u64;
    }

    pub fn centroid(&self) -> (f32, f32) {
        let n = self.area.max(1) as f64;
        ((self.sum_x as f64 / n) as f32, (self.sum_y as f64 / n) as f32)
    }

    pub fn mean_color(&self) -> [u8; 3] {
        let n = self.area.max(1) as u64;
        [
            (self.sum_rgb[0] / n) as u8,
            (self.sum_rgb[1] / n) as u8,
            (self.sum_rgb[2] / n) as u8,
        ]
    }

    pub fn mean_luma(&self) -> f32 {
        self.sum_luma as f32 / self.area.max(1) as f32
    }

    /// Number of distinct view edges the region touches (0-4)
    pub fn border_touches(&self, width: u32, height: u32) -> u8 {
        (self.min_x == 0) as u8
            + (self.min_y == 0) as u8
            + (self.max_x + 1 >= width) as u8
            + (self.max_y + 1 >= height) as u8
    }
}

/// Otsu's threshold over a luminance histogram.
///
/// Returns the highest level of the dark class, or `None` when the histogram
/// cannot be split (all pixels in one bin).
pub fn otsu_threshold(bins: &[u64; 256]) -> Option<u8> {
    let total: u64 = bins.iter().sum();
    if total == 0 {
        return None;
    }
    let total_sum: f64 = bins
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut best: Option<(u8, f64)> = None;
    let mut weight_dark = 0u64;
    let mut sum_dark = 0.0f64;
    for (level, &count) in bins.iter().enumerate() {
        weight_dark += count;
        sum_dark += level as f64 * count as f64;
        if weight_dark == 0 || weight_dark == total {
            continue;
        }
        let weight_light = total - weight_dark;
        let mean_dark = sum_dark / weight_dark as f64;
        let mean_light = (total_sum - sum_dark) / weight_light as f64;
        let between = weight_dark as f64 * weight_light as f64 * (mean_dark - mean_light).powi(2);

        if best.map_or(true, |(_, score)| between > score) {
            best = Some((level as u8, between));
        }
    }

    best.filter(|&(_, score)| score > 0.0).map(|(level, _)| level)
}

/// Label 8-connected regions of pixels at or below `threshold`.
///
/// `mask` must be zeroed and sized to the view; on return every labelled
/// pixel holds [`MASK_REGION`].
pub fn label_regions(view: &FrameView<'_>, luma: &[u8], mask: &mut [u8], threshold: u8) -> Vec<Region> {
    let (width, height) = (view.width(), view.height());

    for (m, &value) in mask.iter_mut().zip(luma) {
        if value <= threshold {
            *m = MASK_CANDIDATE;
        }
    }

    let mut regions = Vec::new();
    let mut stack = Vec::new();
    for start in 0..mask.len() {
        if mask[start] != MASK_CANDIDATE {
            continue;
        }

        let mut region = Region::starting_at(start, width);
        mask[start] = MASK_REGION;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx as u32 % width, idx as u32 / width);
            region.add(x, y, view.pixel(x, y), luma[idx]);

            for (dx, dy) in NEIGHBORS_8 {
                let (nx, ny) = (x as i32 + dx, y as i32 + dy);
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let n = ny as usize * width as usize + nx as usize;
                if mask[n] == MASK_CANDIDATE {
                    mask[n] = MASK_REGION;
                    stack.push(n);
                }
            }
        }

        regions.push(region);
    }

    regions
}

/// Moore-neighbour boundary trace of the region containing `seed`.
///
/// `seed` must be the region's first pixel in raster order. Points are view
/// pixel coordinates in clockwise order starting at the seed.
pub fn trace_contour(mask: &[u8], width: u32, height: u32, seed: usize, label: u8) -> Vec<(u32, u32)> {
    let start = (seed as u32 % width, seed as u32 / width);
    let mut contour = vec![start];
    let is_member = |x: i32, y: i32| {
        x >= 0
            && y >= 0
            && x < width as i32
            && y < height as i32
            && mask[y as usize * width as usize + x as usize] == label
    };

    let area_bound = mask.iter().filter(|&&m| m == label).count();
    let max_steps = 4 * area_bound + 16;

    let mut current = start;
    // Entered the seed from the west, which is background by construction
    let mut search_from = 0usize;
    for _ in 0..max_steps {
        let next = (0..8).map(|k| (search_from + k) % 8).find_map(|dir| {
            let (dx, dy) = NEIGHBORS_8[dir];
            let (nx, ny) = (current.0 as i32 + dx, current.1 as i32 + dy);
            is_member(nx, ny).then_some(((nx as u32, ny as u32), dir))
        });

        let Some((point, dir)) = next else {
            break;
        };
        if point == start {
            break;
        }
        contour.push(point);
        current = point;
        search_from = if dir % 2 == 0 { (dir + 6) % 8 } else { (dir + 5) % 8 };
    }

    contour
}
