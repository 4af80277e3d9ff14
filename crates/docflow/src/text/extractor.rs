//! Document number extraction.
//!
//! Rules run in a fixed order and the first one producing an acceptable
//! candidate wins: the labelled built-ins (invoice, purchase order,
//! delivery note, generic number), then the operator's custom pattern, then
//! a loose fallback for anything that looks like a prefix and digits.

use regex::Regex;

use crate::config::ExtractionSettings;
use crate::error::ConfigError;

/// Label qualifiers like `No.`, `Number` or `#` between label and code.
const QUALIFIER: &str = r"(?:\s*(?:NO\.?|NUMBER|NUM\.?|NR\.?|#))?";
const SEPARATOR: &str = r"[\s:#.\-]*";
/// The code must end on a word boundary so longer tokens are never truncated.
const CODE: &str = r"([A-Z0-9]{4,12})\b";

const BUILTIN_LABELS: &[(&str, &str)] = &[
    ("invoice", r"INVOICE|INV"),
    ("purchase_order", r"PURCHASE\s+ORDER|P\.?O\.?"),
    ("delivery_note", r"DELIVERY\s+NOTE|DN"),
    ("general_number", r"NUMBER|NOMOR|NO\.?"),
];

const FALLBACK_PATTERN: &str = r"\b[A-Z]{2,4}[ _-]?\d{3,8}\b|\b\d{4,8}\b";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    /// Group 1; the code must contain a digit.
    Labelled,
    /// Group 1 when present, else the whole match.
    Custom,
    /// Whole match.
    Fallback,
}

#[derive(Debug)]
struct ExtractionRule {
    name: &'static str,
    regex: Regex,
    kind: RuleKind,
}

impl ExtractionRule {
    /// First acceptable candidate of this rule, scanning all matches.
    fn find(&self, text: &str, min_len: usize, max_len: usize) -> Option<String> {
        for caps in self.regex.captures_iter(text) {
            let raw = match self.kind {
                RuleKind::Labelled => caps.get(1),
                RuleKind::Custom => caps.get(1).or_else(|| caps.get(0)),
                RuleKind::Fallback => caps.get(0),
            };
            let Some(raw) = raw else { continue };

            let candidate = raw.as_str().trim();
            let len = candidate.chars().count();
            if len < min_len || len > max_len {
                continue;
            }
            if self.kind == RuleKind::Labelled && !candidate.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            return Some(candidate.to_string());
        }
        None
    }
}

/// A successful extraction and the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub number: String,
    pub rule: &'static str,
}

#[derive(Debug)]
pub struct DocumentNumberExtractor {
    rules: Vec<ExtractionRule>,
    min_length: usize,
    max_length: usize,
}

impl DocumentNumberExtractor {
    /// Compiles the rule list. Fails only on an invalid custom pattern.
    pub fn new(settings: &ExtractionSettings) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(BUILTIN_LABELS.len() + 2);

        for (name, label) in BUILTIN_LABELS {
            let pattern = format!(r"(?i)\b(?:{}){}{}{}", label, QUALIFIER, SEPARATOR, CODE);
            let regex = Regex::new(&pattern).map_err(|e| ConfigError::InvalidPattern {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            rules.push(ExtractionRule {
                name,
                regex,
                kind: RuleKind::Labelled,
            });
        }

        if let Some(custom) = &settings.custom_pattern {
            let regex = Regex::new(custom).map_err(|e| ConfigError::InvalidPattern {
                name: "custom".to_string(),
                reason: e.to_string(),
            })?;
            rules.push(ExtractionRule {
                name: "custom",
                regex,
                kind: RuleKind::Custom,
            });
        }

        let fallback = Regex::new(FALLBACK_PATTERN).map_err(|e| ConfigError::InvalidPattern {
            name: "fallback".to_string(),
            reason: e.to_string(),
        })?;
        rules.push(ExtractionRule {
            name: "fallback",
            regex: fallback,
            kind: RuleKind::Fallback,
        });

        Ok(Self {
            rules,
            min_length: settings.min_length,
            max_length: settings.max_length,
        })
    }

    /// Returns the document number, or `None` when no rule matches.
    pub fn extract(&self, text: &str) -> Option<String> {
        self.extract_detailed(text).map(|e| e.number)
    }

    pub fn extract_detailed(&self, text: &str) -> Option<Extraction> {
        if text.trim().is_empty() {
            return None;
        }
        self.rules.iter().find_map(|rule| {
            rule.find(text, self.min_length, self.max_length)
                .map(|number| Extraction {
                    number,
                    rule: rule.name,
                })
        })
    }

    /// Rule names in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}
