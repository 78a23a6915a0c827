//! Prototype derivation.
//!
//! Categories without a stored prototype get one computed once at
//! startup as the mean embedding of their example texts. Without
//! examples the description plus the top keywords stands in for them.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{CategoryLabel, Taxonomy};
use crate::adapters::{call_with_timeout, Embedder};
use crate::core::error::ConfigurationError;

/// Keywords folded into a synthetic example
const PROMPT_KEYWORDS: usize = 10;

/// Texts a category prototype is derived from
pub fn category_prototype_texts(category: &CategoryLabel) -> Vec<String> {
    if !category.examples.is_empty() {
        return category.examples.clone();
    }

    let keywords: Vec<&str> = category
        .keywords
        .iter()
        .take(PROMPT_KEYWORDS)
        .map(String::as_str)
        .collect();

    let description = if category.description.is_empty() {
        &category.name
    } else {
        &category.description
    };

    vec![format!("{} Keywords: {}", description, keywords.join(", "))]
}

/// Text a subcategory prototype is derived from
pub fn subcategory_prototype_text(category: &CategoryLabel, subcategory_name: &str) -> String {
    format!(
        "{} in the context of {}. {}",
        subcategory_name, category.name, category.description
    )
}

async fn embed_mean(
    embedder: &dyn Embedder,
    category: &CategoryLabel,
    texts: &[String],
    timeout: Duration,
) -> Result<Vec<f32>, ConfigurationError> {
    let mut sum: Vec<f32> = Vec::new();

    for text in texts {
        let vector = call_with_timeout(embedder.name(), timeout, embedder.embed(text))
            .await
            .map_err(|e| {
                warn!(category = %category.id, reason = %e, "Prototype derivation failed");
                ConfigurationError::PrototypeDerivation {
                    category: category.id.to_string(),
                    reason: e.to_string(),
                }
            })?;

        if sum.is_empty() {
            sum = vec![0.0; vector.len()];
        }
        if vector.len() != sum.len() {
            return Err(ConfigurationError::PrototypeDimension {
                category: category.id.to_string(),
                expected: sum.len(),
                actual: vector.len(),
            });
        }
        for (acc, v) in sum.iter_mut().zip(vector) {
            *acc += v;
        }
    }

    let n = texts.len().max(1) as f32;
    Ok(sum.into_iter().map(|v| v / n).collect())
}

/// Return a taxonomy in which every category has a prototype.
///
/// Stored prototypes are kept as-is. When `with_subcategories` is set,
/// missing subcategory prototypes are derived too. Each embedding call
/// is bounded by `timeout`.
pub async fn derive_prototypes(
    taxonomy: &Taxonomy,
    embedder: &dyn Embedder,
    with_subcategories: bool,
    timeout: Duration,
) -> Result<Taxonomy, ConfigurationError> {
    let mut categories = taxonomy.categories().to_vec();
    let mut derived = 0usize;

    for category in categories.iter_mut() {
        if category.prototype.is_none() {
            let texts = category_prototype_texts(category);
            category.prototype = Some(embed_mean(embedder, category, &texts, timeout).await?);
            derived += 1;
            debug!(category = %category.id, texts = texts.len(), "Derived category prototype");
        }

        if with_subcategories {
            let context = category.clone();
            for sub in category.subcategories.iter_mut() {
                if sub.prototype.is_none() {
                    let text = subcategory_prototype_text(&context, &sub.name);
                    sub.prototype = Some(embed_mean(embedder, &context, &[text], timeout).await?);
                }
            }
        }
    }

    let result = taxonomy.with_categories(categories);
    result.require_prototypes()?;

    info!(
        derived,
        categories = result.len(),
        embedder = embedder.name(),
        "Taxonomy prototypes ready"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::HashingEmbedder;

    #[test]
    fn test_prompt_text_uses_description_and_keywords() {
        let label = CategoryLabel::new("money_finance", "Money & Finance")
            .with_description("About money.")
            .with_keywords(&["money", "debt"]);
        let texts = category_prototype_texts(&label);
        assert_eq!(texts, vec!["About money. Keywords: money, debt".to_string()]);
    }

    #[test]
    fn test_examples_take_precedence() {
        let mut label = CategoryLabel::new("a", "A").with_keywords(&["x"]);
        label.examples = vec!["one".to_string(), "two".to_string()];
        assert_eq!(category_prototype_texts(&label).len(), 2);
    }

    #[tokio::test]
    async fn test_derive_fills_every_category() {
        let taxonomy = Taxonomy::builtin().unwrap();
        let embedder = HashingEmbedder::new(32);

        let derived = derive_prototypes(taxonomy, &embedder, true, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(derived.require_prototypes().unwrap(), 32);
        assert!(derived
            .categories()
            .iter()
            .flat_map(|c| c.subcategories.iter())
            .all(|s| s.prototype.is_some()));

        // The source taxonomy is untouched
        assert!(taxonomy.categories()[0].prototype.is_none());
    }

    #[tokio::test]
    async fn test_stored_prototypes_are_kept() {
        let taxonomy = Taxonomy::new(
            vec![CategoryLabel::new("a", "A")
                .with_keywords(&["x"])
                .with_prototype(vec![0.5; 32])],
            None,
        )
        .unwrap();
        let embedder = HashingEmbedder::new(32);
        let derived = derive_prototypes(&taxonomy, &embedder, false, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(derived.categories()[0].prototype, Some(vec![0.5; 32]));
    }
}
