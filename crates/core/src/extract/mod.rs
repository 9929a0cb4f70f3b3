use std::{collections::hash_map::Entry, collections::HashMap, fmt};

use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use serde::{Deserialize, Serialize};

use crate::{ColorHex, DominantColorSet, PaletteError, Result, Swatch, PALETTE_SIZE};

const NEAR_WHITE_THRESHOLD: u8 = 245;
const MAX_ITERATIONS: usize = 16;

/// Tunables for [`ColorExtractor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Longest edge, in pixels, of the image that is actually quantised.
    pub max_dimension: u32,
    /// Number of clusters the palette is reduced to before ranking.
    pub clusters: usize,
    /// Skip clusters that are (almost) white, unless nothing else remains.
    pub ignore_near_white: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_dimension: 200,
            clusters: 8,
            ignore_near_white: false,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_dimension == 0 {
            return Err(PaletteError::Config(
                "extractor max_dimension must be positive".to_string(),
            ));
        }
        if self.clusters < PALETTE_SIZE {
            return Err(PaletteError::Config(format!(
                "extractor needs at least {PALETTE_SIZE} clusters, got {}",
                self.clusters
            )));
        }
        Ok(())
    }
}

/// Reduces artwork to its four dominant colours.
///
/// Extraction is fully deterministic: the histogram is built in scan order
/// (left to right, top to bottom), centroids are seeded by farthest-point
/// selection starting at the first scanned colour, and every tie is resolved
/// toward the earlier centroid or the earlier scan position.
#[derive(Clone, Default)]
pub struct ColorExtractor {
    config: ExtractorConfig,
}

impl ColorExtractor {
    /// Extractor with the default [`ExtractorConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when `config` does not validate.
    pub fn with_config(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Settings this extractor was built with.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Decodes `bytes` (JPEG or PNG) and returns the four most dominant
    /// colours, most dominant first. Images with fewer than four distinct
    /// clusters are padded with their lowest-ranked cluster.
    pub fn extract(&self, bytes: &[u8]) -> Result<DominantColorSet> {
        let image = decode(bytes)?;
        let pixels = downscale(&flatten_alpha(&image), self.config.max_dimension);
        let bins = histogram(&pixels);
        if bins.is_empty() {
            return Err(PaletteError::Decode("image contains no pixels".to_string()));
        }

        let mut ranked = rank(quantize(&bins, self.config.clusters));

        if self.config.ignore_near_white {
            let kept: Vec<RankedSwatch> = ranked
                .iter()
                .copied()
                .filter(|swatch| !swatch.color.is_near_white(NEAR_WHITE_THRESHOLD))
                .collect();
            if !kept.is_empty() {
                ranked = kept;
            }
        }

        pad_to_palette(ranked)
    }
}

impl fmt::Debug for ColorExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorExtractor")
            .field("max_dimension", &self.config.max_dimension)
            .field("clusters", &self.config.clusters)
            .field("ignore_near_white", &self.config.ignore_near_white)
            .finish()
    }
}

/// A distinct colour of the downscaled image.
#[derive(Debug, Clone, Copy)]
struct ColorBin {
    rgb: [u8; 3],
    count: usize,
    first_seen: usize,
}

#[derive(Debug, Clone, Copy)]
struct RankedSwatch {
    color: ColorHex,
    pixels: usize,
    first_seen: usize,
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes)
        .map_err(|_| PaletteError::Decode("unrecognised image format".to_string()))?;

    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(PaletteError::Decode(format!(
            "unsupported image format {format:?}, expected JPEG or PNG"
        )));
    }

    let image = image::load_from_memory_with_format(bytes, format)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PaletteError::Decode("image has zero size".to_string()));
    }
    Ok(image)
}

/// Composites the image over opaque white.
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u32::from(a);
        let blend = |channel: u8| {
            ((u32::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Resamples so the longest edge is at most `max_dimension`. Smaller images
/// still go through the filter, at 1:1.
fn downscale(image: &RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height).max(1);
    let scale = (f64::from(max_dimension) / f64::from(longest)).min(1.0);
    let target_width = ((f64::from(width) * scale).round() as u32).max(1);
    let target_height = ((f64::from(height) * scale).round() as u32).max(1);

    image::imageops::resize(image, target_width, target_height, FilterType::Triangle)
}

fn histogram(image: &RgbImage) -> Vec<ColorBin> {
    let mut index: HashMap<[u8; 3], usize> = HashMap::new();
    let mut bins: Vec<ColorBin> = Vec::new();

    for (position, pixel) in image.pixels().enumerate() {
        match index.entry(pixel.0) {
            Entry::Occupied(slot) => bins[*slot.get()].count += 1,
            Entry::Vacant(slot) => {
                slot.insert(bins.len());
                bins.push(ColorBin {
                    rgb: pixel.0,
                    count: 1,
                    first_seen: position,
                });
            }
        }
    }

    bins
}

/// Weighted k-means over the histogram. Returns `(centroid, pixels,
/// first_seen)` for every non-empty cluster.
fn quantize(bins: &[ColorBin], clusters: usize) -> Vec<([f64; 3], usize, usize)> {
    let mut centroids = seed_centroids(bins, clusters);
    let mut assignment = vec![usize::MAX; bins.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut moved = false;
        for (bin, slot) in bins.iter().zip(assignment.iter_mut()) {
            let nearest = nearest_centroid(&centroids, to_point(bin.rgb));
            if *slot != nearest {
                *slot = nearest;
                moved = true;
            }
        }

        if !moved {
            break;
        }
        centroids = recompute_centroids(bins, &assignment, &centroids);
    }

    let mut members = vec![(0usize, usize::MAX); centroids.len()];
    for (bin, &cluster) in bins.iter().zip(&assignment) {
        let entry = &mut members[cluster];
        entry.0 += bin.count;
        entry.1 = entry.1.min(bin.first_seen);
    }

    centroids
        .into_iter()
        .zip(members)
        .filter(|(_, (pixels, _))| *pixels > 0)
        .map(|(centroid, (pixels, first_seen))| (centroid, pixels, first_seen))
        .collect()
}

/// Farthest-point seeding: the first scanned colour, then repeatedly the
/// colour farthest from every chosen centroid (earliest on ties).
fn seed_centroids(bins: &[ColorBin], clusters: usize) -> Vec<[f64; 3]> {
    let first = to_point(bins[0].rgb);
    let mut centroids = vec![first];
    let mut distances: Vec<f64> = bins
        .iter()
        .map(|bin| distance_sq(to_point(bin.rgb), first))
        .collect();

    while centroids.len() < clusters {
        let (index, farthest) = distances
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (index, &distance)| {
                if distance > best.1 {
                    (index, distance)
                } else {
                    best
                }
            });

        if farthest <= 0.0 {
            break;
        }

        let seed = to_point(bins[index].rgb);
        centroids.push(seed);
        for (distance, bin) in distances.iter_mut().zip(bins) {
            *distance = distance.min(distance_sq(to_point(bin.rgb), seed));
        }
    }

    centroids
}

fn nearest_centroid(centroids: &[[f64; 3]], point: [f64; 3]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = distance_sq(point, *centroid);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

fn recompute_centroids(
    bins: &[ColorBin],
    assignment: &[usize],
    previous: &[[f64; 3]],
) -> Vec<[f64; 3]> {
    let mut sums = vec![([0.0f64; 3], 0usize); previous.len()];
    for (bin, &cluster) in bins.iter().zip(assignment) {
        let (sum, weight) = &mut sums[cluster];
        let point = to_point(bin.rgb);
        for channel in 0..3 {
            sum[channel] += point[channel] * bin.count as f64;
        }
        *weight += bin.count;
    }

    sums.into_iter()
        .zip(previous)
        .map(|((sum, weight), old)| {
            if weight == 0 {
                *old
            } else {
                sum.map(|channel| channel / weight as f64)
            }
        })
        .collect()
}

/// Renders centroids, merges clusters that render identically, and orders
/// them by pixel count (descending) then scan position (ascending).
fn rank(clusters: Vec<([f64; 3], usize, usize)>) -> Vec<RankedSwatch> {
    let mut ranked: Vec<RankedSwatch> = Vec::with_capacity(clusters.len());

    for (centroid, pixels, first_seen) in clusters {
        let [r, g, b] = centroid.map(|channel| channel.round().clamp(0.0, 255.0) as u8);
        let color = ColorHex::from_rgb(r, g, b);

        match ranked.iter_mut().find(|swatch| swatch.color == color) {
            Some(existing) => {
                existing.pixels += pixels;
                existing.first_seen = existing.first_seen.min(first_seen);
            }
            None => ranked.push(RankedSwatch {
                color,
                pixels,
                first_seen,
            }),
        }
    }

    ranked.sort_by(|a, b| {
        b.pixels
            .cmp(&a.pixels)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });
    ranked
}

fn pad_to_palette(mut ranked: Vec<RankedSwatch>) -> Result<DominantColorSet> {
    let last = *ranked
        .last()
        .ok_or_else(|| PaletteError::Decode("image produced no colour clusters".to_string()))?;
    while ranked.len() < PALETTE_SIZE {
        ranked.push(last);
    }

    let swatches: Vec<Swatch> = ranked
        .into_iter()
        .take(PALETTE_SIZE)
        .map(|swatch| Swatch {
            color: swatch.color,
            pixels: swatch.pixels,
        })
        .collect();

    let swatches: [Swatch; PALETTE_SIZE] = swatches
        .try_into()
        .map_err(|_| PaletteError::Decode("palette has the wrong size".to_string()))?;
    DominantColorSet::new(swatches)
}

fn to_point(rgb: [u8; 3]) -> [f64; 3] {
    rgb.map(f64::from)
}

fn distance_sq(a: [f64; 3], b: [f64; 3]) -> f64 {
    (0..3).map(|channel| (a[channel] - b[channel]).powi(2)).sum()
}

#[cfg(test)]
pub(crate) fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encoding a png in memory");
    cursor.into_inner()
}
