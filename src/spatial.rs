//! Neighborhood ball queries over image positions.
//!
//! Built once per run over every image that has a usable coordinate and at
//! least one matchable detection. Queries prefilter with an equirectangular
//! degree box around the origin and confirm with exact haversine distance,
//! so the radius is honored in meters at any city latitude.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo::{haversine_distance, lat_degrees, lng_degrees};
use crate::GeoPoint;

/// An image position with its dataset index for R-tree queries.
#[derive(Debug, Clone, Copy)]
pub struct ImagePoint {
    /// Index of the image in the dataset's image list.
    pub image: usize,
    pub lat: f64,
    pub lng: f64,
}

impl ImagePoint {
    pub fn new(image: usize, location: &GeoPoint) -> Self {
        Self {
            image,
            lat: location.latitude,
            lng: location.longitude,
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

impl RTreeObject for ImagePoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

impl PointDistance for ImagePoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlng = self.lng - point[0];
        let dlat = self.lat - point[1];
        dlng * dlng + dlat * dlat
    }
}

/// R-tree over image positions answering radius queries in meters.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<ImagePoint>,
    /// Mean latitude of the indexed points; fixes the longitude scale of the
    /// local projection for the whole run.
    reference_lat: f64,
}

impl SpatialIndex {
    /// Bulk-load the index from image positions.
    pub fn build(points: Vec<ImagePoint>) -> Self {
        let reference_lat = if points.is_empty() {
            0.0
        } else {
            points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64
        };
        Self {
            tree: RTree::bulk_load(points),
            reference_lat,
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImagePoint> {
        self.tree.iter()
    }

    /// Dataset indices of images within `radius_meters` of `origin`,
    /// ascending. The origin image itself is never part of its own ball.
    pub fn neighbors(&self, origin: &ImagePoint, radius_meters: f64) -> Vec<usize> {
        let dlat = lat_degrees(radius_meters);
        let dlng = lng_degrees(radius_meters, self.reference_lat);
        let envelope = AABB::from_corners(
            [origin.lng - dlng, origin.lat - dlat],
            [origin.lng + dlng, origin.lat + dlat],
        );

        let origin_loc = origin.location();
        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|p| p.image != origin.image)
            .filter(|p| haversine_distance(&p.location(), &origin_loc) <= radius_meters)
            .map(|p| p.image)
            .collect();
        found.sort_unstable();
        found
    }
}
