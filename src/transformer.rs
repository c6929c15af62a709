//! Deterministic Transformer (C7).
//!
//! Rule-based normalization applied in the fixed order below. Purely
//! functional: no I/O, no randomness, no external calls. Order matters —
//! downstream idempotence (`C7(C7(x)) == C7(x)`) depends on it, so rules
//! must not be reordered.

use crate::policy::PunctuationPolicy;
use regex::Regex;

/// Applies punctuation normalization rules in a fixed order, governed by a
/// [`PunctuationPolicy`].
pub struct DeterministicTransformer {
    policy: PunctuationPolicy,
    three_or_more_dots: Regex,
    bang_run: Regex,
    question_run: Regex,
    mixed_run: Regex,
    remnant_run: Regex,
    terminator_then_char: Regex,
    word: Regex,
}

impl DeterministicTransformer {
    pub fn new(policy: PunctuationPolicy) -> Self {
        Self {
            policy,
            three_or_more_dots: Regex::new(r"\.{3,}").expect("valid regex"),
            bang_run: Regex::new(r"!{2,}").expect("valid regex"),
            question_run: Regex::new(r"\?{2,}").expect("valid regex"),
            mixed_run: Regex::new(r"([!?])([!?]){2,}").expect("valid regex"),
            remnant_run: Regex::new(r"\?!\?+|!\?!+").expect("valid regex"),
            terminator_then_char: Regex::new(r"([.!?])(\S)").expect("valid regex"),
            word: Regex::new(r"\b\w+\b").expect("valid regex"),
        }
    }

    /// Normalize `text` per policy, returning the normalized text and the
    /// list of rule ids that were applied (or, for
    /// `enforce_space_after_punctuation`, considered — see that method).
    pub fn apply(&self, text: &str) -> (String, Vec<String>) {
        let mut applied = Vec::new();
        let mut out = text.to_string();

        if self.policy.normalize_quotes {
            let before = out.clone();
            out = Self::normalize_quotes(&out);
            if out != before {
                applied.push("normalize_quotes".to_string());
            }
        }

        if self.policy.normalize_ellipsis {
            let before = out.clone();
            out = out.replace('\u{2026}', "...");
            out = self.three_or_more_dots.replace_all(&out, "...").into_owned();
            if out != before {
                applied.push("normalize_ellipsis".to_string());
            }
        }

        if self.policy.collapse_repeated_terminators {
            let before = out.clone();
            let mut out2 = self.bang_run.replace_all(&out, "!").into_owned();
            out2 = self.question_run.replace_all(&out2, "?").into_owned();
            out2 = self.mixed_run.replace_all(&out2, "$1$2").into_owned();
            out2 = self.remnant_run.replace_all(&out2, "?!").into_owned();
            if out2 != before {
                out = out2;
                applied.push("collapse_repeated_terminators".to_string());
            }
        }

        if self.policy.enforce_space_after_punctuation {
            let out2 = self
                .terminator_then_char
                .replace_all(&out, |caps: &regex::Captures| {
                    let term = &caps[1];
                    let next = &caps[2];
                    if next.chars().next().map(|c| c.is_alphabetic()).unwrap_or(false) {
                        format!("{term} {next}")
                    } else {
                        format!("{term}{next}")
                    }
                })
                .into_owned();
            out = out2;
            // Appended unconditionally, matching the source's behavior of
            // recording this rule as "checked" regardless of whether the
            // text actually changed.
            applied.push("enforce_space_after_punctuation".to_string());
        }

        let words = self.word.find_iter(&out).count().max(1);
        let hundreds = words / 100 + if words % 100 != 0 { 1 } else { 0 };
        let allowed = (self.policy.max_exclamations_per_100_words as usize) * hundreds;
        let chars: Vec<char> = out.chars().collect();
        let exclamation_positions: Vec<usize> = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == '!')
            .map(|(i, _)| i)
            .collect();
        if exclamation_positions.len() > allowed {
            let mut chars = chars;
            for &idx in exclamation_positions[allowed..].iter().rev() {
                chars[idx] = '.';
            }
            out = chars.into_iter().collect();
            applied.push("limit_exclamations".to_string());
        }

        (out, applied)
    }

    fn normalize_quotes(text: &str) -> String {
        text.chars()
            .map(|c| match c {
                '\u{2018}' | '\u{2019}' => '\'',
                '\u{201C}' | '\u{201D}' => '"',
                other => other,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer() -> DeterministicTransformer {
        DeterministicTransformer::new(PunctuationPolicy::default())
    }

    #[test]
    fn normalizes_smart_quotes() {
        let (out, applied) = transformer().apply("\u{201C}great\u{201D}");
        assert_eq!(out, "\"great\"");
        assert!(applied.contains(&"normalize_quotes".to_string()));
    }

    #[test]
    fn normalizes_ellipsis_variants() {
        let (out, applied) = transformer().apply("wait\u{2026} really....");
        assert_eq!(out, "wait... really...");
        assert!(applied.contains(&"normalize_ellipsis".to_string()));
    }

    #[test]
    fn collapses_repeated_terminators() {
        let (out, applied) = transformer().apply("Wow!!! right??!");
        assert!(!out.contains("!!!"));
        assert!(applied.contains(&"collapse_repeated_terminators".to_string()));
    }

    #[test]
    fn enforce_space_rule_is_recorded_even_without_a_change() {
        let (out, applied) = transformer().apply("No punctuation issues here");
        assert_eq!(out, "No punctuation issues here");
        assert!(applied.contains(&"enforce_space_after_punctuation".to_string()));
    }

    #[test]
    fn inserts_space_after_terminator_before_letter() {
        let (out, _) = transformer().apply("Hello.World");
        assert_eq!(out, "Hello. World");
    }

    #[test]
    fn does_not_insert_space_before_non_letter() {
        let (out, _) = transformer().apply("3.14");
        assert_eq!(out, "3.14");
    }

    #[test]
    fn caps_exclamations_per_100_words() {
        let text = "a! ".repeat(5);
        let (out, applied) = transformer().apply(text.trim());
        let bangs = out.matches('!').count();
        assert!(bangs <= 2);
        assert!(applied.contains(&"limit_exclamations".to_string()));
    }

    #[test]
    fn scenario_b_from_spec_produces_expected_output() {
        let (out, applied) = transformer().apply("Wow!!! This is \u{201C}great\u{201D}\u{2026} right??!");
        assert_eq!(out, "Wow! This is \"great\"... right?!");
        for rule in [
            "normalize_quotes",
            "collapse_repeated_terminators",
            "normalize_ellipsis",
            "enforce_space_after_punctuation",
        ] {
            assert!(applied.contains(&rule.to_string()), "missing rule {rule}");
        }
    }

    #[test]
    fn is_idempotent() {
        let t = transformer();
        let input = "Wow!!! This is \u{201C}great\u{201D}\u{2026} right??!";
        let (once, _) = t.apply(input);
        let (twice, _) = t.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_string_is_unchanged() {
        let (out, _) = transformer().apply("");
        assert_eq!(out, "");
    }
}
