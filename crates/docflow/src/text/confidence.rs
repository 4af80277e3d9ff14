/// Floor for any non-empty text.
const MIN_SCORE: f64 = 0.1;

/// Text at least this many characters long gets the full length factor.
const FULL_LENGTH: f64 = 100.0;

/// Heuristic quality score of OCR output in `[0, 1]`.
///
/// The score is the share of letters, digits and whitespace scaled by a
/// length factor `min(len / 100, 1)`, floored at 0.1. Text that is empty
/// after trimming scores exactly 0.0.
pub fn score(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let total = text.chars().count();
    let clean = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();

    let noise_ratio = 1.0 - clean as f64 / total as f64;
    let length_factor = (total as f64 / FULL_LENGTH).min(1.0);

    ((1.0 - noise_ratio) * length_factor).clamp(MIN_SCORE, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_scores_zero() {
        assert_eq!(score(""), 0.0);
        assert_eq!(score(" \n\x0c"), 0.0);
    }

    #[test]
    fn test_invoice_line() {
        let s = score("INVOICE INV-000123 dated 2024-01-01");
        // 32 clean of 35 chars, length factor 0.35
        assert!((s - 0.32).abs() < 1e-9);
        assert!(s > 0.1);
    }

    #[test]
    fn test_long_clean_text_scores_one() {
        let text = "word ".repeat(40);
        assert_eq!(score(&text), 1.0);
    }

    #[test]
    fn test_noise_lowers_score() {
        let clean = "a".repeat(200);
        let noisy = format!("{}{}", "a".repeat(100), "#".repeat(100));
        assert!(score(&noisy) < score(&clean));
        assert!((score(&noisy) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_short_or_garbage_text_is_floored() {
        assert_eq!(score("ab"), MIN_SCORE);
        assert_eq!(score("@@##$$%%"), MIN_SCORE);
    }

    #[test]
    fn test_score_always_in_range() {
        let samples = [
            "x",
            "§§§§",
            "Rechnung Nr. 4711 vom 01.02.2024",
            "ÄÖÜ äöü ß 1234",
            "\t\t\t",
        ];
        for text in samples {
            let s = score(text);
            assert!((0.0..=1.0).contains(&s), "{} scored {}", text, s);
        }
    }
}
