//! Static category taxonomy.
//!
//! Loaded once at startup and shared read-only (`Arc<Taxonomy>`) by every
//! classifier and the fuser. Nothing mutates a `Taxonomy` after
//! construction; prototype derivation produces a new value.

pub mod prototypes;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigurationError;
use crate::domain::{CategoryId, SubcategoryId};

pub use prototypes::derive_prototypes;

/// Upper bound on subcategories per category
pub const MAX_SUBCATEGORIES: usize = 7;

const BUILTIN_YAML: &str = include_str!("default.yaml");

static BUILTIN: OnceLock<Result<Taxonomy, ConfigurationError>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcategoryLabel {
    pub id: SubcategoryId,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype: Option<Vec<f32>>,
}

/// One taxonomy entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub id: CategoryId,

    /// Display name, also used as the zero-shot label
    pub name: String,

    /// Short prose description used to derive a prototype
    #[serde(default)]
    pub description: String,

    /// Ordered subcategories
    #[serde(default)]
    pub subcategories: Vec<SubcategoryLabel>,

    pub keywords: Vec<String>,

    /// Representative texts; preferred source for prototype derivation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype: Option<Vec<f32>>,
}

impl CategoryLabel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(id),
            name: name.into(),
            description: String::new(),
            subcategories: Vec::new(),
            keywords: Vec::new(),
            examples: Vec::new(),
            prototype: None,
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_subcategory(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.subcategories.push(SubcategoryLabel {
            id: SubcategoryId::new(id),
            name: name.into(),
            prototype: None,
        });
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_prototype(mut self, prototype: Vec<f32>) -> Self {
        self.prototype = Some(prototype);
        self
    }

    pub fn subcategory(&self, id: &SubcategoryId) -> Option<&SubcategoryLabel> {
        self.subcategories.iter().find(|s| &s.id == id)
    }

    /// Position of a subcategory in the declared order
    pub fn subcategory_position(&self, id: &SubcategoryId) -> Option<usize> {
        self.subcategories.iter().position(|s| &s.id == id)
    }
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    #[serde(default)]
    expected_categories: Option<usize>,
    categories: Vec<CategoryLabel>,
}

/// Validated, immutable set of categories
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<CategoryLabel>,
    index: HashMap<CategoryId, usize>,
}

impl Taxonomy {
    /// Build and validate a taxonomy.
    ///
    /// `expected` pins the category count when set.
    pub fn new(
        categories: Vec<CategoryLabel>,
        expected: Option<usize>,
    ) -> Result<Self, ConfigurationError> {
        if let Some(expected) = expected {
            if categories.len() != expected {
                return Err(ConfigurationError::CategoryCount {
                    expected,
                    actual: categories.len(),
                });
            }
        }

        let mut index = HashMap::new();
        for (i, category) in categories.iter().enumerate() {
            if index.insert(category.id.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateCategory(
                    category.id.to_string(),
                ));
            }

            if category.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ConfigurationError::EmptyKeywords(category.id.to_string()));
            }

            if category.subcategories.len() > MAX_SUBCATEGORIES {
                return Err(ConfigurationError::TooManySubcategories {
                    category: category.id.to_string(),
                    count: category.subcategories.len(),
                    max: MAX_SUBCATEGORIES,
                });
            }

            let mut seen = HashSet::new();
            for sub in &category.subcategories {
                if !seen.insert(&sub.id) {
                    return Err(ConfigurationError::DuplicateSubcategory {
                        category: category.id.to_string(),
                        subcategory: sub.id.to_string(),
                    });
                }
            }
        }

        Ok(Self { categories, index })
    }

    /// Parse a taxonomy document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let file: TaxonomyFile = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigurationError::TaxonomyParse(e.to_string()))?;
        Self::new(file.categories, file.expected_categories)
    }

    /// Load a taxonomy document from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read taxonomy file: {}", path.display()))?;
        let taxonomy = Self::from_yaml(&content)
            .with_context(|| format!("Invalid taxonomy file: {}", path.display()))?;
        Ok(taxonomy)
    }

    /// The built-in 12-category taxonomy, parsed once per process
    pub fn builtin() -> Result<&'static Taxonomy, ConfigurationError> {
        BUILTIN
            .get_or_init(|| Self::from_yaml(BUILTIN_YAML))
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn categories(&self) -> &[CategoryLabel] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, id: &CategoryId) -> Option<&CategoryLabel> {
        self.index.get(id).map(|&i| &self.categories[i])
    }

    pub fn contains(&self, id: &CategoryId) -> bool {
        self.index.contains_key(id)
    }

    /// Declaration order of a category
    pub fn position(&self, id: &CategoryId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Look a category up by its display name (case-insensitive)
    pub fn by_name(&self, name: &str) -> Option<&CategoryLabel> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    /// First category declaring this subcategory id
    pub fn category_of_subcategory(&self, id: &SubcategoryId) -> Option<&CategoryLabel> {
        self.categories
            .iter()
            .find(|c| c.subcategories.iter().any(|s| &s.id == id))
    }

    /// True when the category exists and every subcategory belongs to it
    pub fn validate_assignment(&self, category: &CategoryId, subcategories: &[SubcategoryId]) -> bool {
        match self.get(category) {
            Some(label) => subcategories.iter().all(|s| label.subcategory(s).is_some()),
            None => false,
        }
    }

    /// Display names of all categories, in declaration order
    pub fn labels(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Check that every category carries a prototype of a common dimension.
    ///
    /// Returns that dimension.
    pub fn require_prototypes(&self) -> Result<usize, ConfigurationError> {
        let mut dimension = None;

        for category in &self.categories {
            let prototype = category
                .prototype
                .as_ref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ConfigurationError::MissingPrototype(category.id.to_string()))?;

            match dimension {
                None => dimension = Some(prototype.len()),
                Some(expected) if expected != prototype.len() => {
                    return Err(ConfigurationError::PrototypeDimension {
                        category: category.id.to_string(),
                        expected,
                        actual: prototype.len(),
                    });
                }
                Some(_) => {}
            }
        }

        dimension.ok_or_else(|| ConfigurationError::CategoryCount {
            expected: 1,
            actual: 0,
        })
    }

    /// Copy of this taxonomy with categories replaced (ids and order unchanged)
    pub(crate) fn with_categories(&self, categories: Vec<CategoryLabel>) -> Self {
        Self {
            categories,
            index: self.index.clone(),
        }
    }
}
