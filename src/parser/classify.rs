use crate::config::Lexicon;
use crate::record::Association;

/// Resolve the document's association from the first lexicon phrase found in
/// the uppercased text. Lexicon order decides ties, not position in the text.
pub fn classify(text: &str, lexicon: &Lexicon) -> Association {
    let upper = text.to_uppercase();
    lexicon
        .associations
        .iter()
        .find(|entry| upper.contains(&entry.phrase.to_uppercase()))
        .map(|entry| Association::new(entry.code.clone()))
        .unwrap_or_else(Association::unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(text: &str) -> String {
        classify(text, &Lexicon::default()).to_string()
    }

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(code("Member list - Houston Apartment Association 2024"), "HAA");
        assert_eq!(code("apartment association of greater orlando"), "AAGO");
    }

    #[test]
    fn no_match_is_unknown() {
        assert_eq!(code("Some unrelated export"), "UNKNOWN");
        assert_eq!(code(""), "UNKNOWN");
    }

    #[test]
    fn earlier_lexicon_entry_wins_regardless_of_text_position() {
        // HOUSTON BOMA is declared before BOMA NASHVILLE even though it appears later here
        assert_eq!(code("BOMA Nashville roster, formerly Houston BOMA"), "BOMA-HOU");
        // AAGO is the first entry of the lexicon
        assert_eq!(
            code("Houston Apartment Association\nApartment Association of Greater Orlando"),
            "AAGO"
        );
    }

    #[test]
    fn short_codes_match_inside_words() {
        // FLAPPA is a plain substring test, like every other phrase
        assert_eq!(code("2024 FLAPPA conference attendees"), "FLAPPA");
    }
}
