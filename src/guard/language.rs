//! Stop-word heuristic that keeps the chat to its target language
//!
//! Runs before any embedding call. Short or ambiguous questions are let
//! through.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NON_LETTERS: Regex = Regex::new(r"[^\p{L}]+").expect("NON_LETTERS is a valid pattern");
}

const ENGLISH: &[&str] = &[
    "the", "and", "of", "to", "in", "is", "for", "on", "with", "from", "how", "what", "where",
    "when", "can", "do", "does", "a", "an", "please",
];

const SPANISH: &[&str] = &[
    "hola", "gracias", "por", "favor", "como", "que", "donde", "cuando", "para", "con", "sin",
    "del", "la", "el", "los", "las", "un", "una", "unos", "unas", "y", "o", "pero", "porque",
    "quien", "quienes", "cual", "cuanto", "cuantos", "cuanta", "cuantas", "al", "de", "en",
];

const FRENCH: &[&str] = &[
    "bonjour", "merci", "svp", "comment", "quand", "pour", "avec", "sans", "du", "de", "la", "le",
    "les", "un", "une", "des", "et", "ou", "mais", "parce", "qui", "quoi", "quel", "quelle",
    "quels", "quelles", "a", "au", "aux", "en", "aller", "plage",
];

/// A language code and the lowercase stop words that signal it
#[derive(Debug, Clone)]
pub struct StopWords {
    pub language: String,
    words: HashSet<String>,
}

impl StopWords {
    pub fn new<I, S>(language: impl Into<String>, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            language: language.into(),
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn english() -> Self {
        Self::new("en", ENGLISH)
    }

    pub fn spanish() -> Self {
        Self::new("es", SPANISH)
    }

    pub fn french() -> Self {
        Self::new("fr", FRENCH)
    }

    fn hits(&self, tokens: &[&str]) -> usize {
        tokens.iter().filter(|t| self.words.contains(**t)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageVerdict {
    Accept,
    /// Rejected; carries the detected language when one clearly won.
    Reject(Option<String>),
}

impl LanguageVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Classifies questions as target-language or not
#[derive(Debug, Clone)]
pub struct LanguageGate {
    target: StopWords,
    others: Vec<StopWords>,
}

impl Default for LanguageGate {
    /// English target with Spanish and French as the competing languages.
    fn default() -> Self {
        Self::new(
            StopWords::english(),
            vec![StopWords::spanish(), StopWords::french()],
        )
    }
}

impl LanguageGate {
    pub fn new(target: StopWords, others: Vec<StopWords>) -> Self {
        Self { target, others }
    }

    pub fn target_language(&self) -> &str {
        &self.target.language
    }

    pub fn classify(&self, question: &str) -> LanguageVerdict {
        let lowered = question.trim().to_lowercase();
        let letters_only = NON_LETTERS.replace_all(&lowered, " ");
        let tokens: Vec<&str> = letters_only.split_whitespace().collect();
        if tokens.len() <= 2 {
            return LanguageVerdict::Accept;
        }

        let target_hits = self.target.hits(&tokens);
        if target_hits >= 2 {
            return LanguageVerdict::Accept;
        }

        let other_hits: Vec<usize> = self.others.iter().map(|o| o.hits(&tokens)).collect();
        for (i, &hits) in other_hits.iter().enumerate() {
            let beats_rivals = other_hits
                .iter()
                .enumerate()
                .all(|(j, &rival)| i == j || hits > rival);
            if hits >= 2 && hits > target_hits && beats_rivals {
                return LanguageVerdict::Reject(Some(self.others[i].language.clone()));
            }
        }

        if target_hits == 0 {
            if other_hits.iter().any(|&h| h > 0) {
                return LanguageVerdict::Reject(None);
            }
            // Letters outside ASCII with no target stop words at all
            if letters_only.chars().any(|c| !c.is_ascii()) {
                return LanguageVerdict::Reject(None);
            }
        }
        LanguageVerdict::Accept
    }

    pub fn is_target_language(&self, question: &str) -> bool {
        self.classify(question).is_accepted()
    }
}
