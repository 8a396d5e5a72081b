//! Prompt templates for the AI-backed stages
//!
//! Templates are configuration data: the engine substitutes placeholders
//! and otherwise treats the text opaquely. Placeholders use the
//! `{{name}}` form so literal braces in template prose stay untouched.

use serde::{Deserialize, Serialize};

/// The template set used by classification, enhancement and the
/// skill-index rewrite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// Stage 2 classification template; placeholders: `{{excerpt}}`, `{{categories}}`
    #[serde(default = "default_classification_template")]
    pub classification: String,
    /// Stage 4 per-chunk template; placeholders: `{{title}}`, `{{chapter}}`, `{{text}}`
    #[serde(default = "default_enhancement_template")]
    pub enhancement: String,
    /// Stage 6 index template; placeholders: `{{skill_name}}`, `{{current}}`, `{{references}}`
    #[serde(default = "default_skill_index_template")]
    pub skill_index: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            classification: default_classification_template(),
            enhancement: default_enhancement_template(),
            skill_index: default_skill_index_template(),
        }
    }
}

impl PromptTemplates {
    /// Build the Stage 2 classification prompt
    pub fn classification_prompt(&self, excerpt: &str, categories: &[&str]) -> String {
        self.classification
            .replace("{{categories}}", &categories.join(", "))
            .replace("{{excerpt}}", excerpt)
    }

    /// Build the Stage 4 chunk-enhancement prompt
    pub fn enhancement_prompt(&self, title: &str, chapter_number: u32, text: &str) -> String {
        self.enhancement
            .replace("{{title}}", title)
            .replace("{{chapter}}", &chapter_number.to_string())
            .replace("{{text}}", text)
    }

    /// Build the Stage 6 skill-index enhancement prompt
    pub fn skill_index_prompt(&self, skill_name: &str, current: &str, references: &str) -> String {
        self.skill_index
            .replace("{{skill_name}}", skill_name)
            .replace("{{current}}", current)
            .replace("{{references}}", references)
    }
}

fn default_classification_template() -> String {
    r#"You are classifying a Canadian tax guide. Read the excerpt below and
respond with ONLY a JSON object of this exact shape:

{
  "primary_category": "<one of: {{categories}}>",
  "confidence": <number 0-1>,
  "secondary_categories": [{"category": "<name>", "confidence": <number 0-1>}],
  "quality": {
    "completeness": <number 0-1>,
    "accuracy": <number 0-1>,
    "relevance": <number 0-1>,
    "clarity": <number 0-1>,
    "practicality": <number 0-1>
  },
  "keywords": ["<keyword>", ...]
}

Excerpt:
{{excerpt}}
"#
    .to_string()
}

fn default_enhancement_template() -> String {
    r#"You are preparing reference material from a Canadian tax guide.
Rewrite the chapter below as clear, well-structured Markdown.

Requirements:
- Start with a level-1 heading for the chapter title.
- Preserve every form number, line number, dollar threshold and deadline exactly.
- Use tables for rate schedules and bullet lists for eligibility rules.
- Add a short "Key points" section at the end.
- Do not invent content that is not in the source text.

Chapter {{chapter}}: {{title}}

Source text:
{{text}}
"#
    .to_string()
}

fn default_skill_index_template() -> String {
    r#"You are writing the index document for a knowledge package named
"{{skill_name}}" built from a Canadian tax guide.

Rewrite the current index below into a high-quality SKILL.md. Keep the
existing YAML front-matter block exactly as it is, then produce a body
with these sections:
- "When to Use" - concrete situations this package answers.
- "Quick Reference" - the most important forms, lines and thresholds,
  with at least two fenced code blocks showing worked examples.
- "Reference Documentation" - a guide to the chapter files with one line
  per chapter.

Mention the specific tax forms covered (for example T1, T4, schedules).

Current index:
{{current}}

Chapter excerpts:
{{references}}
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhancement_prompt_substitution() {
        let templates = PromptTemplates::default();
        let prompt = templates.enhancement_prompt("RRSP Limits", 4, "contribution room");
        assert!(prompt.contains("Chapter 4: RRSP Limits"));
        assert!(prompt.contains("contribution room"));
        assert!(!prompt.contains("{{title}}"));
        assert!(!prompt.contains("{{text}}"));
    }

    #[test]
    fn test_classification_prompt_lists_categories() {
        let templates = PromptTemplates::default();
        let prompt = templates.classification_prompt("text", &["credits", "deductions"]);
        assert!(prompt.contains("credits, deductions"));
        // The JSON shape braces survive substitution
        assert!(prompt.contains("\"primary_category\""));
    }

    #[test]
    fn test_skill_index_prompt_substitution() {
        let templates = PromptTemplates::default();
        let prompt = templates.skill_index_prompt("credits-t1-guide", "# old", "## Chapter 1");
        assert!(prompt.contains("credits-t1-guide"));
        assert!(prompt.contains("# old"));
        assert!(prompt.contains("## Chapter 1"));
    }

    #[test]
    fn test_templates_overridable_via_serde() {
        let yaml = "enhancement: \"Custom {{title}}\"";
        let templates: PromptTemplates = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(templates.enhancement_prompt("X", 1, "t"), "Custom X");
        // Unset fields keep their defaults
        assert!(templates.classification.contains("primary_category"));
    }
}
