//! Built-in prompt templates.
//!
//! A read-only lookup table consumed by submission: a template supplies
//! the prompt and a cost multiplier. The core never mutates it.

/// A named, curated prompt with a billing multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
    /// Multiplies the quality/size base cost.
    pub cost_multiplier: i64,
    pub is_active: bool,
}

pub const TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        id: "cyberpunk_portrait",
        name: "Cyberpunk portrait",
        description: "Neon-lit close-up portrait in a rainy megacity.",
        prompt: "Close-up portrait of a person lit by neon signs in a rainy \
                 cyberpunk megacity at night, reflections on wet skin, \
                 shallow depth of field, cinematic color grading",
        cost_multiplier: 1,
        is_active: true,
    },
    PromptTemplate {
        id: "watercolor_landscape",
        name: "Watercolor landscape",
        description: "Soft watercolor rendering of a mountain valley.",
        prompt: "Serene mountain valley at golden hour painted in loose \
                 watercolor, soft washes, visible paper texture, muted \
                 earth tones",
        cost_multiplier: 1,
        is_active: true,
    },
    PromptTemplate {
        id: "product_studio",
        name: "Studio product shot",
        description: "Clean e-commerce style product photo on seamless background.",
        prompt: "Professional studio photograph of a single product centered \
                 on a seamless light-gray background, softbox lighting, \
                 subtle reflection, high detail",
        cost_multiplier: 2,
        is_active: true,
    },
];

/// Look up an active template by id.
pub fn template_by_id(id: &str) -> Option<&'static PromptTemplate> {
    TEMPLATES.iter().find(|t| t.id == id && t.is_active)
}

/// All templates currently offered.
pub fn active_templates() -> impl Iterator<Item = &'static PromptTemplate> {
    TEMPLATES.iter().filter(|t| t.is_active)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn table_is_not_empty_and_fields_are_filled() {
        assert!(!TEMPLATES.is_empty());
        for template in TEMPLATES {
            assert!(!template.id.is_empty());
            assert!(!template.name.is_empty());
            assert!(!template.description.is_empty());
            assert!(!template.prompt.is_empty());
            assert!(template.cost_multiplier > 0);
        }
    }

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = TEMPLATES.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), TEMPLATES.len());
    }

    #[test]
    fn lookup_finds_active_templates_only() {
        let template = template_by_id("cyberpunk_portrait").unwrap();
        assert_eq!(template.id, "cyberpunk_portrait");

        assert!(template_by_id("nonexistent_template").is_none());
    }

    #[test]
    fn active_listing_matches_flags() {
        let active: Vec<_> = active_templates().collect();
        assert_eq!(active.len(), TEMPLATES.iter().filter(|t| t.is_active).count());
    }
}
