use std::collections::BTreeMap;

use super::Image;

/// Images of several resolutions, addressed by (resolution tag, date).
#[derive(Clone, Debug, Default)]
pub struct MultiResImages {
    images: BTreeMap<String, BTreeMap<i32, Image>>,
}

impl MultiResImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image, returning the one it replaces, if any.
    pub fn set(&mut self, tag: impl Into<String>, date: i32, image: Image) -> Option<Image> {
        self.images.entry(tag.into()).or_default().insert(date, image)
    }

    pub fn has(&self, tag: &str, date: i32) -> bool {
        self.get(tag, date).is_some()
    }

    pub fn get(&self, tag: &str, date: i32) -> Option<&Image> {
        self.images.get(tag)?.get(&date)
    }

    /// Any registered image; used to size defaults.
    pub fn get_any(&self) -> Option<&Image> {
        self.images.values().flat_map(|dates| dates.values()).next()
    }

    pub fn remove(&mut self, tag: &str, date: i32) -> Option<Image> {
        let dates = self.images.get_mut(tag)?;
        let removed = dates.remove(&date);
        if dates.is_empty() {
            self.images.remove(tag);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.images.values().map(|dates| dates.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
