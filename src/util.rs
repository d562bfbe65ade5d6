//! String handling and number formatting shared by the parsers and writers.

/// Trait extension utility for [`str`].
pub trait StrExtension {
    /// Returns `true` if `needle` is a prefix of the string regardless of its case.
    fn starts_with_ignore_case(&self, needle: &str) -> bool;

    /// Returns a string slice with the prefix removed regardless of its case.
    fn strip_prefix_ignore_case(&self, prefix: &str) -> Option<&Self>;

    /// Returns `None` for a blank string, the trimmed string otherwise.
    fn non_blank(&self) -> Option<&Self>;
}

impl StrExtension for str {
    fn starts_with_ignore_case(&self, needle: &str) -> bool {
        let n = needle.len();
        self.is_char_boundary(n)
            && self
                .get(..n)
                .is_some_and(|head| needle.eq_ignore_ascii_case(head))
    }

    fn strip_prefix_ignore_case(&self, prefix: &str) -> Option<&Self> {
        self.starts_with_ignore_case(prefix)
            .then(|| self.get(prefix.len()..))
            .flatten()
    }

    fn non_blank(&self) -> Option<&Self> {
        let trimmed = self.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Formats `value` with at most `decimals` fractional digits, trailing zeros removed.
#[must_use]
pub fn format_trimmed(value: f64, decimals: usize) -> String {
    let fixed = format_fixed(value, decimals);
    if !fixed.contains('.') {
        return fixed;
    }
    fixed
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_owned()
}

/// Formats `value` with exactly `decimals` fractional digits and without negative zero.
#[must_use]
pub fn format_fixed(value: f64, decimals: usize) -> String {
    let formatted = format!("{value:.decimals$}");
    if formatted.starts_with('-') && formatted.trim_matches(['-', '0', '.']).is_empty() {
        return formatted.trim_start_matches('-').to_owned();
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_prefix_ignores_case() {
        assert_eq!(
            "OSU FILE FORMAT v14".strip_prefix_ignore_case("osu file format v"),
            Some("14")
        );
        assert_eq!("osu".strip_prefix_ignore_case("osu file"), None);
        assert_eq!("ü".strip_prefix_ignore_case("u"), None);
    }

    #[test]
    fn non_blank() {
        assert_eq!("  a b ".non_blank(), Some("a b"));
        assert_eq!(" \t".non_blank(), None);
    }

    #[test]
    fn trimmed_decimals() {
        assert_eq!(format_trimmed(1000.0, 3), "1000");
        assert_eq!(format_trimmed(333.3333, 3), "333.333");
        assert_eq!(format_trimmed(0.5, 3), "0.5");
        assert_eq!(format_trimmed(-0.0001, 3), "0");
        assert_eq!(format_trimmed(-12.25, 3), "-12.25");
    }

    #[test]
    fn fixed_decimals() {
        assert_eq!(format_fixed(120.0, 6), "120.000000");
        assert_eq!(format_fixed(-0.0000001, 6), "0.000000");
        assert_eq!(format_fixed(-0.05, 3), "-0.050");
    }
}
