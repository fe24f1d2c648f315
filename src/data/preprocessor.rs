// ============================================================
// Layer 4 — Caption Preprocessor
// ============================================================
// Turns a raw caption string into the word list that the
// vocabulary indexes.
//
// Human-written captions are noisy:
//   - "A dog runs." and "a dog runs" must produce the same words
//   - non-breaking / zero-width spaces sneak in from scraping
//   - punctuation clings to words ("dog," "grass.")
//
// Cleaning steps (applied in order):
//   1. Map Unicode whitespace variants and control chars to space
//   2. Lowercase
//   3. Split on whitespace
//   4. Trim non-alphanumeric characters from each word's edges
//   5. Drop words that end up empty
//
// Inner punctuation survives ("t-shirt", "o'clock"), which keeps
// hyphenated words intact.

#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Normalise and split a caption into words.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let normalised: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect::<String>()
            .to_lowercase();

        normalised
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        let p = Preprocessor::new();
        assert_eq!(p.tokens("A dog runs."), vec!["a", "dog", "runs"]);
    }

    #[test]
    fn test_odd_whitespace_is_a_separator() {
        let p = Preprocessor::new();
        assert_eq!(p.tokens("two\u{00A0}dogs\tplay"), vec!["two", "dogs", "play"]);
    }

    #[test]
    fn test_inner_punctuation_is_kept() {
        let p = Preprocessor::new();
        assert_eq!(p.tokens("A boy in a t-shirt ."), vec!["a", "boy", "in", "a", "t-shirt"]);
    }

    #[test]
    fn test_empty_caption() {
        let p = Preprocessor::new();
        assert!(p.tokens("  ... ").is_empty());
    }
}
