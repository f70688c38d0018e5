//! Dataset assembly and lookup.
//!
//! A [`Dataset`] is the engine's working copy of one area's images and
//! detections. Assembly validates structural identity (unique image names,
//! unique detection ids) and resolves loose detections to their images;
//! everything found wrong with individual records becomes a
//! [`DataWarning`](crate::DataWarning) instead of failing the run.

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::error::{DataWarning, DedupError, Result};
use crate::{Detection, DetectionId, ImageRecord};

/// In-memory detection dataset with id lookup tables.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: Vec<ImageRecord>,
    by_name: HashMap<String, usize>,
    /// Detection id -> (image index, slot within the image's detection list).
    by_detection: HashMap<DetectionId, (usize, usize)>,
}

impl Dataset {
    /// Build a dataset from images with their detections already attached.
    ///
    /// Fails on duplicate image names or duplicate detection ids; those make
    /// removal bookkeeping ambiguous and always indicate a broken upstream
    /// export. An empty image list is accepted here; emptiness is checked
    /// at the start of a run, where it is fatal.
    pub fn new(images: Vec<ImageRecord>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(images.len());
        let mut by_detection = HashMap::new();

        for (img_idx, image) in images.iter().enumerate() {
            if by_name.insert(image.name.clone(), img_idx).is_some() {
                return Err(DedupError::DuplicateImage {
                    name: image.name.clone(),
                });
            }
            for (slot, det) in image.detections.iter().enumerate() {
                if by_detection.insert(det.id, (img_idx, slot)).is_some() {
                    return Err(DedupError::DuplicateDetection { id: det.id });
                }
            }
        }

        Ok(Self {
            images,
            by_name,
            by_detection,
        })
    }

    /// Build a dataset from images plus loose detections addressed by image
    /// name, the shape detector output usually arrives in.
    ///
    /// A detection naming an image that is not in the dataset is dropped with
    /// a [`DataWarning::UnknownImage`] warning; the run continues without it.
    pub fn assemble(
        images: Vec<ImageRecord>,
        loose: Vec<(String, Detection)>,
    ) -> Result<(Self, Vec<DataWarning>)> {
        let mut dataset = Self::new(images)?;
        let mut warnings = Vec::new();

        for (image_name, det) in loose {
            let Some(&img_idx) = dataset.by_name.get(&image_name) else {
                let warning = DataWarning::UnknownImage {
                    detection: det.id,
                    image: image_name,
                };
                warn!("{warning}");
                warnings.push(warning);
                continue;
            };
            if dataset.by_detection.contains_key(&det.id) {
                return Err(DedupError::DuplicateDetection { id: det.id });
            }
            let slot = dataset.images[img_idx].detections.len();
            dataset.by_detection.insert(det.id, (img_idx, slot));
            dataset.images[img_idx].detections.push(det);
        }

        Ok((dataset, warnings))
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn image(&self, name: &str) -> Option<&ImageRecord> {
        self.by_name.get(name).map(|&idx| &self.images[idx])
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn detection_count(&self) -> usize {
        self.by_detection.len()
    }

    pub fn detection(&self, id: DetectionId) -> Option<&Detection> {
        self.by_detection
            .get(&id)
            .map(|&(img, slot)| &self.images[img].detections[slot])
    }

    /// The image a detection belongs to.
    pub fn detection_image(&self, id: DetectionId) -> Option<&ImageRecord> {
        self.by_detection.get(&id).map(|&(img, _)| &self.images[img])
    }

    /// Every detection id in the dataset, ascending.
    pub fn detection_ids(&self) -> Vec<DetectionId> {
        let mut ids: Vec<DetectionId> = self.by_detection.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Copy of this dataset without the given detections. Images whose
    /// detection list becomes empty through the removal are dropped; images
    /// that never had detections stay (they were never part of matching).
    ///
    /// Returns the filtered dataset and the names of dropped images.
    pub fn remove_detections(&self, removed: &HashSet<DetectionId>) -> (Dataset, Vec<String>) {
        let mut kept_images = Vec::with_capacity(self.images.len());
        let mut removed_images = Vec::new();

        for image in &self.images {
            let kept: Vec<Detection> = image
                .detections
                .iter()
                .filter(|det| !removed.contains(&det.id))
                .cloned()
                .collect();

            if kept.is_empty() && !image.detections.is_empty() {
                removed_images.push(image.name.clone());
            } else {
                kept_images.push(ImageRecord {
                    name: image.name.clone(),
                    location: image.location,
                    detections: kept,
                });
            }
        }

        // Filtering preserves uniqueness, so the lookup tables rebuild
        // without revalidation.
        let mut by_name = HashMap::with_capacity(kept_images.len());
        let mut by_detection = HashMap::new();
        for (img_idx, image) in kept_images.iter().enumerate() {
            by_name.insert(image.name.clone(), img_idx);
            for (slot, det) in image.detections.iter().enumerate() {
                by_detection.insert(det.id, (img_idx, slot));
            }
        }

        (
            Self {
                images: kept_images,
                by_name,
                by_detection,
            },
            removed_images,
        )
    }
}
