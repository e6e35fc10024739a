// NER model backend
// The engine talks to a statistical tagger through this seam; the bundled
// "en-small" model is a lexicon + context-cue tagger so the crate works
// offline. Heavier backends implement the same trait under their own id.

use std::collections::HashSet;

use crate::error::DetectionError;

/// Model-native labels (CoNLL/OntoNotes vocabulary). Translation into the
/// masking entity vocabulary happens in the engine, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NerLabel {
    Person,
    Org,
    Gpe,
    Loc,
    Date,
    Money,
    Norp,
    Fac,
    Product,
    Event,
    WorkOfArt,
    Law,
    Language,
    Time,
    Percent,
    Quantity,
    Cardinal,
}

/// One labeled span as produced by a model, byte offsets into the input.
#[derive(Debug, Clone)]
pub struct NerSpan {
    pub text: String,
    pub label: NerLabel,
    pub start: usize,
    pub end: usize,
    pub prob: f64,
}

pub trait NerModel: Send + Sync {
    fn id(&self) -> &str;
    fn predict(&self, text: &str) -> Result<Vec<NerSpan>, DetectionError>;
}

/// Resolve a configured model identifier to a backend.
pub fn load_model(id: &str) -> Result<Box<dyn NerModel>, DetectionError> {
    match id {
        "en-small" | "en_core_small" | "small" => Ok(Box::new(LexiconModel::new())),
        other => Err(DetectionError(format!("unknown NER model: {other}"))),
    }
}

const GIVEN_NAMES: &[&str] = &[
    "john", "jane", "alice", "bob", "charlie", "david", "emma", "james", "mary", "robert",
    "patricia", "michael", "jennifer", "william", "linda", "richard", "elizabeth", "joseph",
    "barbara", "rahul", "priya", "amit", "anita", "raj", "pooja", "vikram", "sneha", "arjun",
    "kavya", "rohan", "neha", "arun", "sanjay",
];

const KNOWN_ORGS: &[&str] = &[
    "google", "microsoft", "apple", "amazon", "facebook", "meta", "netflix", "twitter",
    "linkedin", "instagram", "whatsapp", "tcs", "infosys", "wipro", "hcl", "cognizant",
    "accenture", "deloitte", "kpmg", "ibm", "oracle", "sap", "salesforce", "adobe", "intel",
    "nvidia", "tesla", "spacex", "uber", "lyft", "airbnb", "stripe", "shopify",
];

const ORG_SUFFIXES: &[&str] = &[
    "inc", "corp", "ltd", "llc", "technologies", "labs", "systems", "solutions", "university",
    "college", "institute",
];

const KNOWN_PLACES: &[&str] = &[
    "india", "delhi", "mumbai", "bangalore", "hyderabad", "chennai", "kolkata", "london",
    "paris", "berlin", "tokyo", "seattle", "austin", "boston", "chicago", "california",
    "texas", "washington", "york", "francisco",
];

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

// Capitalized function words that must never join an entity run
const FUNCTION_WORDS: &[&str] = &[
    "i", "i'm", "i'll", "i've", "i'd", "the", "a", "an", "my", "we", "he", "she", "they",
    "it", "you",
];

const PERSON_CUES: &[&str] = &[
    "i'm", "im", "am", "is", "name", "named", "called", "myself", "mr", "ms", "mrs", "dr",
];
const ORG_CUES: &[&str] = &["at", "for", "with", "join", "joined", "company"];
const PLACE_CUES: &[&str] = &["in", "from", "near", "to", "visit", "visiting"];

const STRIP_PUNCT: &[char] = &[
    '.', ',', '!', '?', ';', ':', '\'', '"', '(', ')', '[', ']', '{', '}',
];

struct Word {
    text: String,
    lower: String,
    start: usize,
    end: usize,
    // Raw token ended a sentence; entity runs must not cross it
    ends_sentence: bool,
}

/// Bundled small English tagger.
pub struct LexiconModel {
    given_names: HashSet<&'static str>,
    known_orgs: HashSet<&'static str>,
    org_suffixes: HashSet<&'static str>,
    known_places: HashSet<&'static str>,
    months: HashSet<&'static str>,
    function_words: HashSet<&'static str>,
}

impl LexiconModel {
    pub fn new() -> Self {
        Self {
            given_names: GIVEN_NAMES.iter().copied().collect(),
            known_orgs: KNOWN_ORGS.iter().copied().collect(),
            org_suffixes: ORG_SUFFIXES.iter().copied().collect(),
            known_places: KNOWN_PLACES.iter().copied().collect(),
            months: MONTHS.iter().copied().collect(),
            function_words: FUNCTION_WORDS.iter().copied().collect(),
        }
    }

    fn words(text: &str) -> Vec<Word> {
        let mut words = Vec::new();
        let mut cursor = 0;
        for raw in text.split_whitespace() {
            let start = cursor + text[cursor..].find(raw).unwrap_or(0);
            cursor = start + raw.len();

            let stripped = raw.trim_matches(STRIP_PUNCT);
            if stripped.is_empty() {
                continue;
            }
            let lead = raw.len() - raw.trim_start_matches(STRIP_PUNCT).len();
            words.push(Word {
                text: stripped.to_string(),
                lower: stripped.to_lowercase(),
                start: start + lead,
                end: start + lead + stripped.len(),
                ends_sentence: raw.ends_with(['.', '!', '?']),
            });
        }
        words
    }

    fn is_capitalized(word: &Word) -> bool {
        word.text.chars().next().is_some_and(|c| c.is_uppercase())
    }

    fn is_numeric(word: &Word) -> bool {
        !word.text.is_empty() && word.text.chars().all(|c| c.is_ascii_digit())
    }

    // Lexicon evidence first; context cues only decide otherwise-unknown runs
    fn label_for_run(&self, run: &[&Word], prev: Option<&Word>) -> Option<(NerLabel, f64)> {
        if run.iter().any(|w| self.given_names.contains(w.lower.as_str())) {
            return Some((NerLabel::Person, 0.9));
        }
        let last = run.last()?;
        if self.org_suffixes.contains(last.lower.as_str())
            || run.iter().all(|w| self.known_orgs.contains(w.lower.as_str()))
        {
            return Some((NerLabel::Org, 0.9));
        }
        if run.iter().all(|w| self.known_places.contains(w.lower.as_str())) {
            return Some((NerLabel::Gpe, 0.85));
        }
        if let Some(prev) = prev {
            let cue = prev.lower.as_str();
            if PERSON_CUES.contains(&cue) {
                return Some((NerLabel::Person, 0.9));
            }
            if ORG_CUES.contains(&cue) {
                return Some((NerLabel::Org, 0.9));
            }
            if PLACE_CUES.contains(&cue) {
                return Some((NerLabel::Gpe, 0.85));
            }
        }
        if run.len() >= 2 {
            return Some((NerLabel::Person, 0.7));
        }
        None
    }
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl NerModel for LexiconModel {
    fn id(&self) -> &str {
        "en-small"
    }

    fn predict(&self, text: &str) -> Result<Vec<NerSpan>, DetectionError> {
        let words = Self::words(text);
        let mut spans = Vec::new();
        let mut consumed = vec![false; words.len()];

        // Money: currency sigil + amount, or amount + currency word
        for (i, w) in words.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let is_sigil_amount = (w.text.starts_with('$') || w.text.starts_with('₹'))
                && w.text.chars().any(|c| c.is_ascii_digit());
            if is_sigil_amount {
                consumed[i] = true;
                spans.push(span_of(&words[i..=i], text, NerLabel::Money, 0.85));
                continue;
            }
            if Self::is_numeric(w) {
                if let Some(next) = words.get(i + 1) {
                    if ["dollars", "rupees", "usd", "inr", "euros"].contains(&next.lower.as_str())
                    {
                        consumed[i] = true;
                        consumed[i + 1] = true;
                        spans.push(span_of(&words[i..=i + 1], text, NerLabel::Money, 0.8));
                    }
                }
            }
        }

        // Dates: month name followed by day and optional year
        for i in 0..words.len() {
            if consumed[i] || !self.months.contains(words[i].lower.as_str()) {
                continue;
            }
            let mut last = i;
            if words.get(i + 1).is_some_and(Self::is_numeric) {
                last = i + 1;
                if words.get(i + 2).is_some_and(Self::is_numeric) {
                    last = i + 2;
                }
            }
            for flag in consumed.iter_mut().take(last + 1).skip(i) {
                *flag = true;
            }
            spans.push(span_of(&words[i..=last], text, NerLabel::Date, 0.8));
        }

        // Cardinals: maximal runs of digit-only tokens
        let mut i = 0;
        while i < words.len() {
            if consumed[i] || !Self::is_numeric(&words[i]) {
                i += 1;
                continue;
            }
            let mut j = i;
            while j + 1 < words.len() && !consumed[j + 1] && Self::is_numeric(&words[j + 1]) {
                j += 1;
            }
            for flag in consumed.iter_mut().take(j + 1).skip(i) {
                *flag = true;
            }
            spans.push(span_of(&words[i..=j], text, NerLabel::Cardinal, 0.6));
            i = j + 1;
        }

        // Capitalized runs
        let mut i = 0;
        while i < words.len() {
            let w = &words[i];
            let usable = !consumed[i]
                && Self::is_capitalized(w)
                && !self.function_words.contains(w.lower.as_str());
            if !usable {
                i += 1;
                continue;
            }
            let mut j = i;
            while j + 1 < words.len() && !words[j].ends_sentence {
                let next = &words[j + 1];
                if consumed[j + 1]
                    || !Self::is_capitalized(next)
                    || self.function_words.contains(next.lower.as_str())
                {
                    break;
                }
                j += 1;
            }
            let run: Vec<&Word> = words[i..=j].iter().collect();
            let prev = if i > 0 { Some(&words[i - 1]) } else { None };
            if let Some((label, prob)) = self.label_for_run(&run, prev) {
                spans.push(span_of(&words[i..=j], text, label, prob));
            }
            i = j + 1;
        }

        spans.sort_by_key(|s| (s.start, std::cmp::Reverse(s.end)));
        Ok(spans)
    }
}

fn span_of(words: &[Word], text: &str, label: NerLabel, prob: f64) -> NerSpan {
    let start = words[0].start;
    let end = words[words.len() - 1].end;
    NerSpan {
        text: text[start..end].to_string(),
        label,
        start,
        end,
        prob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predict(text: &str) -> Vec<NerSpan> {
        LexiconModel::new().predict(text).unwrap()
    }

    #[test]
    fn test_person_after_cue() {
        let spans = predict("Hi, I'm Alice and I work at Google.");
        assert!(spans
            .iter()
            .any(|s| s.label == NerLabel::Person && s.text == "Alice"));
        assert!(spans
            .iter()
            .any(|s| s.label == NerLabel::Org && s.text == "Google"));
    }

    #[test]
    fn test_full_name_without_cue() {
        let spans = predict("Please forward this to John Smith tomorrow.");
        assert!(spans
            .iter()
            .any(|s| s.label == NerLabel::Person && s.text == "John Smith"));
    }

    #[test]
    fn test_digit_run_is_single_cardinal() {
        let spans = predict("Aadhaar 1234 5678 9012");
        let card: Vec<_> = spans
            .iter()
            .filter(|s| s.label == NerLabel::Cardinal)
            .collect();
        assert_eq!(card.len(), 1);
        assert_eq!(card[0].text, "1234 5678 9012");
    }

    #[test]
    fn test_month_day_year_date() {
        let spans = predict("born January 15 1990 in Delhi");
        assert!(spans
            .iter()
            .any(|s| s.label == NerLabel::Date && s.text == "January 15 1990"));
        assert!(spans
            .iter()
            .any(|s| s.label == NerLabel::Gpe && s.text == "Delhi"));
    }

    #[test]
    fn test_function_words_break_runs() {
        let spans = predict("The Alice account is closed.");
        assert!(spans.iter().all(|s| s.text != "The Alice"));
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(load_model("en-huge").is_err());
        assert!(load_model("en-small").is_ok());
    }

    #[test]
    fn test_offsets_match_text() {
        let text = "Hi, I'm Alice and I work at Google.";
        for s in predict(text) {
            assert_eq!(&text[s.start..s.end], s.text);
        }
    }
}
