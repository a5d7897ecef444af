//! Recovers a human merchant name from a raw card-statement description.

use once_cell::sync::Lazy;
use regex::Regex;

// Payment-processor tokens such as `SQ *`, `TST* `, `PAYPAL *`.
static PROCESSOR_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.]{2,10}\s?\*\s*").expect("processor prefix pattern")
});

// Card-number fragment: exactly four trailing digits after whitespace.
static CARD_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+\d{4}$").expect("card suffix pattern")
});

/// Strip processor prefixes and trailing card digits, then trim.
///
/// Total: when stripping would leave nothing, the trimmed input is returned.
pub fn normalize(raw_name: &str) -> String {
    let trimmed = raw_name.trim();
    let without_prefix = PROCESSOR_PREFIX.replace(trimmed, "");
    let without_suffix = CARD_SUFFIX.replace(without_prefix.trim_end(), "");
    let result = without_suffix.trim();
    if result.is_empty() {
        trimmed.to_string()
    } else {
        result.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_prefix_and_card_digits() {
        assert_eq!(normalize("SQ *JOES PHARMACY 1234"), "JOES PHARMACY");
    }

    #[test]
    fn test_strips_prefix_without_space() {
        assert_eq!(normalize("TST* Corner Clinic"), "Corner Clinic");
        assert_eq!(normalize("PAYPAL *MEDSUPPLY"), "MEDSUPPLY");
    }

    #[test]
    fn test_only_exact_four_digit_suffix() {
        assert_eq!(normalize("WALGREENS 12345"), "WALGREENS 12345");
        assert_eq!(normalize("WALGREENS 123"), "WALGREENS 123");
        assert_eq!(normalize("WALGREENS#1234"), "WALGREENS#1234");
        assert_eq!(normalize("WALGREENS   9876  "), "WALGREENS");
    }

    #[test]
    fn test_unmatched_input_is_trimmed() {
        assert_eq!(normalize("  Sunrise Home Health  "), "Sunrise Home Health");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_never_empties_a_name() {
        assert_eq!(normalize("SQ *"), "SQ *");
        assert_eq!(normalize(" 1234"), "1234");
    }
}
