//! Synthetic shop scenes with ground truth, for tests and benchmarking.
//!
//! Generates datasets with a known duplicate structure: a row of shop sites,
//! each photographed from several nearby camera positions, plus scripted
//! crops whose flat color encodes site identity. Resolving such a scene has
//! an exact expected outcome, which makes it usable for validation without
//! any real imagery or matcher backend.
//!
//! # Example
//!
//! ```rust
//! use geodedup::synthetic::{SceneOptions, SyntheticScene};
//!
//! let scene = SyntheticScene::generate(&SceneOptions::default());
//! assert_eq!(scene.dataset.image_count(), 12);
//! assert_eq!(scene.site_count(), 4);
//! ```

use crate::crop::{Crop, CropError, CropSource};
use crate::geo::{lat_degrees, lng_degrees};
use crate::matcher::{MatchOracle, OracleError};
use crate::{Dataset, Detection, DetectionId, GeoPoint, ImageRecord, PixelBox};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// Types
// ============================================================================

/// A ground-truth shop location with a fixed facade color.
#[derive(Debug, Clone)]
pub struct ShopSite {
    /// Index into [`SyntheticScene::sites`].
    pub id: usize,
    /// True position of the storefront.
    pub location: GeoPoint,
    /// Detector class of every observation of this site.
    pub class: String,
    /// Color stamped into every scripted crop of this site.
    pub color: [u8; 3],
    /// How many images observe this site.
    pub observations: usize,
}

/// Options controlling scene generation.
#[derive(Debug, Clone)]
pub struct SceneOptions {
    /// Position of the first site; the row extends east from here.
    pub origin: GeoPoint,
    /// Number of sites observed `observations_per_site` times each.
    pub site_count: usize,
    /// Images per site. Every image carries one detection of the site.
    pub observations_per_site: usize,
    /// Distance between consecutive sites in meters. Must stay well above
    /// the dedup radius or neighboring sites bleed into each other's
    /// candidate pairs.
    pub site_spacing_meters: f64,
    /// Camera position scatter around the site, per axis, in meters.
    pub scatter_meters: f64,
    /// Additional sites observed exactly once. These end the row and stay
    /// singletons after resolution.
    pub stray_count: usize,
    /// Detector class assigned to every detection.
    pub class: String,
    /// RNG seed for deterministic reproduction.
    pub seed: u64,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            origin: ZURICH,
            site_count: 4,
            observations_per_site: 3,
            // 200 m against the default 30 m radius keeps neighboring sites
            // disjoint even after camera scatter.
            site_spacing_meters: 200.0,
            // +/-5 m per axis puts same-site cameras at most ~14 m apart.
            scatter_meters: 5.0,
            stray_count: 0,
            class: "shop".to_string(),
            seed: 10,
        }
    }
}

/// A generated dataset together with its ground truth.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    /// The assembled dataset, ready to feed into an engine run.
    pub dataset: Dataset,
    /// Ground-truth sites in row order, strays last.
    pub sites: Vec<ShopSite>,
    /// Which site each detection observes.
    pub truth: HashMap<DetectionId, usize>,
    /// Scripted crop colors keyed by image name and box.
    crops: HashMap<(String, PixelBox), [u8; 3]>,
}

// ============================================================================
// Coordinate Helpers
// ============================================================================

/// Zurich, a representative mid-latitude origin for coordinate math.
const ZURICH: GeoPoint = GeoPoint {
    latitude: 47.37,
    longitude: 8.55,
};

/// Offset `center` by a uniform draw in `[-radius, radius]` meters per axis.
fn scatter(center: &GeoPoint, radius_meters: f64, rng: &mut StdRng) -> GeoPoint {
    if radius_meters <= 0.0 {
        return *center;
    }
    let north = rng.gen_range(-radius_meters..=radius_meters);
    let east = rng.gen_range(-radius_meters..=radius_meters);
    GeoPoint::new(
        center.latitude + lat_degrees(north),
        center.longitude + lng_degrees(east, center.latitude),
    )
}

/// Deterministic palette. 37 is odd, so the red channel alone separates up
/// to 256 sites.
fn site_color(index: usize) -> [u8; 3] {
    let i = index as u32;
    [
        (37 * i % 256) as u8,
        ((73 * i + 91) % 256) as u8,
        ((151 * i + 17) % 256) as u8,
    ]
}

// ============================================================================
// Scene Generation
// ============================================================================

impl SyntheticScene {
    /// Generate a scene from the given options.
    ///
    /// Sites sit on a straight east-west row spaced `site_spacing_meters`
    /// apart, multi-observation sites first, strays after. Each observation
    /// is one image whose camera position scatters uniformly around the
    /// site and whose single detection gets a random bounding box.
    pub fn generate(options: &SceneOptions) -> Self {
        let mut rng = StdRng::seed_from_u64(options.seed);

        let total_sites = options.site_count + options.stray_count;
        let mut sites = Vec::with_capacity(total_sites);
        let mut images = Vec::new();
        let mut truth = HashMap::new();
        let mut crops = HashMap::new();
        let mut next_id: u64 = 1;
        let mut image_idx: usize = 0;

        for site_idx in 0..total_sites {
            let location = GeoPoint::new(
                options.origin.latitude,
                options.origin.longitude
                    + lng_degrees(
                        options.site_spacing_meters * site_idx as f64,
                        options.origin.latitude,
                    ),
            );
            let observations = if site_idx < options.site_count {
                options.observations_per_site
            } else {
                1
            };
            let color = site_color(site_idx);

            sites.push(ShopSite {
                id: site_idx,
                location,
                class: options.class.clone(),
                color,
                observations,
            });

            for _ in 0..observations {
                let name = format!("synth_{:04}.jpg", image_idx);
                image_idx += 1;

                let camera = scatter(&location, options.scatter_meters, &mut rng);
                let bbox = PixelBox::from_size(
                    rng.gen_range(40..1600),
                    rng.gen_range(40..800),
                    rng.gen_range(80..320),
                    rng.gen_range(80..320),
                );
                let id = DetectionId(next_id);
                next_id += 1;

                truth.insert(id, site_idx);
                crops.insert((name.clone(), bbox), color);
                images.push(ImageRecord {
                    name,
                    location: Some(camera),
                    detections: vec![Detection {
                        id,
                        class: options.class.clone(),
                        bbox,
                        location: Some(location),
                    }],
                });
            }
        }

        let dataset = Dataset::new(images).expect("generated names and ids are unique");

        Self {
            dataset,
            sites,
            truth,
            crops,
        }
    }

    /// Number of sites observed more than once. After resolution this is
    /// the expected duplicate group count.
    pub fn site_count(&self) -> usize {
        self.sites.iter().filter(|s| s.observations >= 2).count()
    }

    /// Detections expected to be removed: every duplicate group keeps
    /// exactly one member.
    pub fn expected_removals(&self) -> usize {
        self.sites
            .iter()
            .filter(|s| s.observations >= 2)
            .map(|s| s.observations - 1)
            .sum()
    }

    /// Scripted crop source serving this scene's per-detection colors.
    pub fn crop_source(&self) -> ScriptedCropSource {
        ScriptedCropSource {
            colors: self.crops.clone(),
        }
    }
}

// ============================================================================
// Scripted Crops
// ============================================================================

/// [`CropSource`] that serves flat-colored crops from a lookup table.
///
/// Unknown image/box combinations return [`CropError::Unavailable`], which
/// is how tests exercise the skip path without touching pixel decoding.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCropSource {
    colors: HashMap<(String, PixelBox), [u8; 3]>,
}

impl ScriptedCropSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the color served for `image` + `bbox`.
    pub fn insert(&mut self, image: &str, bbox: PixelBox, rgb: [u8; 3]) {
        self.colors.insert((image.to_string(), bbox), rgb);
    }
}

impl CropSource for ScriptedCropSource {
    fn crop(&self, image: &str, bbox: &PixelBox) -> Result<Crop, CropError> {
        let key = (image.to_string(), *bbox);
        let rgb = self
            .colors
            .get(&key)
            .ok_or_else(|| CropError::Unavailable {
                name: image.to_string(),
                reason: "not scripted".to_string(),
            })?;
        Crop::filled(bbox.width().max(1), bbox.height().max(1), *rgb)
    }
}

// ============================================================================
// Color Oracles
// ============================================================================

/// Match oracle that compares mean crop color.
///
/// Equal colors yield a count well above threshold, anything else yields
/// zero. Stands in for a keypoint matcher wherever tests need exact control
/// over the vote.
#[derive(Debug, Clone)]
pub struct ColorOracle {
    name: String,
    threshold: u64,
}

impl ColorOracle {
    pub fn new(name: impl Into<String>, threshold: u64) -> Self {
        Self {
            name: name.into(),
            threshold,
        }
    }
}

impl MatchOracle for ColorOracle {
    fn name(&self) -> &str {
        &self.name
    }

    fn match_count(&self, a: &Crop, b: &Crop, _timeout: Duration) -> Result<u64, OracleError> {
        if a.mean_rgb() == b.mean_rgb() {
            Ok(self.threshold * 4 + 1)
        } else {
            Ok(0)
        }
    }

    fn threshold(&self) -> u64 {
        self.threshold
    }
}

/// A panel of `n` color oracles named `color-0`, `color-1`, and so on.
pub fn color_oracles(n: usize) -> Vec<Box<dyn MatchOracle>> {
    (0..n)
        .map(|i| Box::new(ColorOracle::new(format!("color-{i}"), 10)) as Box<dyn MatchOracle>)
        .collect()
}

// ============================================================================
// Predefined Scenes
// ============================================================================

impl SceneOptions {
    /// Configurable scene for benchmarks: a row of `sites` shops, each
    /// photographed `observations` times.
    pub fn row(sites: usize, observations: usize) -> Self {
        Self {
            site_count: sites,
            observations_per_site: observations,
            seed: sites as u64 * 1000 + observations as u64,
            ..Self::default()
        }
    }

    /// Every site observed exactly once. Resolution removes nothing.
    pub fn no_duplicates(sites: usize) -> Self {
        Self {
            site_count: 0,
            stray_count: sites,
            seed: sites as u64 * 7919,
            ..Self::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
