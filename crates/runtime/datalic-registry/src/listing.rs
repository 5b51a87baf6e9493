//! Listing results, filters and summary counts

use datalic_core::{Category, Error, License, LicenseId};
use serde::{Deserialize, Serialize};

/// A license the registry could not read during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub id: LicenseId,
    pub reason: Error,
}

/// Everything a scan produced: readable licenses in listing order, plus what was skipped
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub licenses: Vec<License>,
    pub skipped: Vec<SkippedRecord>,
}

/// Search box + category selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingQuery {
    /// Case-insensitive substring of the dataset name
    pub search: Option<String>,
    /// `None` means all categories
    pub category: Option<Category>,
}

impl ListingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn matches(&self, license: &License) -> bool {
        let name_ok = match &self.search {
            Some(text) => license
                .dataset_name
                .to_lowercase()
                .contains(&text.to_lowercase()),
            None => true,
        };
        let category_ok = self.category.map_or(true, |c| c == license.category);
        name_ok && category_ok
    }

    /// Keep matching licenses, preserving order
    pub fn apply(&self, licenses: Vec<License>) -> Vec<License> {
        licenses.into_iter().filter(|l| self.matches(l)).collect()
    }
}

/// Dashboard counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub available: usize,
    pub licensed: usize,
    /// Size of the category catalogue, not how many are in use
    pub categories: usize,
}

impl RegistryStats {
    pub fn from_licenses(licenses: &[License]) -> Self {
        let available = licenses.iter().filter(|l| l.is_available).count();
        Self {
            total: licenses.len(),
            available,
            licensed: licenses.len() - available,
            categories: Category::ALL.len(),
        }
    }
}
