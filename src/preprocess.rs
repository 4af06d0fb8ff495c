//! Text normalisation for topic modelling.
//!
//! Lowercases, strips URLs, e-mail addresses, HTML tags, digits and
//! punctuation, then drops short tokens and English stop words.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());
static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static NON_ALPHA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\s]+").unwrap());

#[derive(Debug, Clone)]
pub struct Preprocessor {
    stop_words: HashSet<String>,
    min_length: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().map(|s| s.to_string()).collect(),
            min_length: 3,
        }
    }

    pub fn add_stop_words(&mut self, words: &[&str]) {
        for word in words {
            self.stop_words.insert(word.to_lowercase());
        }
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = len;
        self
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = URL.replace_all(&lowered, " ");
        let cleaned = EMAIL.replace_all(&cleaned, " ");
        let cleaned = HTML_TAG.replace_all(&cleaned, " ");
        let cleaned = NON_ALPHA.replace_all(&cleaned, " ");

        cleaned
            .split_whitespace()
            .filter(|t| t.chars().count() >= self.min_length)
            .filter(|t| !self.stop_words.contains(*t))
            .map(|t| t.to_string())
            .collect()
    }

    pub fn tokenize_corpus<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Vec<String>> {
        texts.iter().map(|t| self.tokenize(t.as_ref())).collect()
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "aren", "around", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "did", "didn", "do", "does", "doesn",
    "doing", "don", "down", "during", "each", "even", "few", "for", "from", "further", "get",
    "got", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "however", "i", "if", "in", "into", "is", "isn", "it", "its",
    "itself", "just", "last", "like", "made", "make", "many", "may", "me", "might", "more",
    "most", "much", "must", "my", "myself", "new", "no", "nor", "not", "now", "of", "off", "on",
    "once", "one", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "per", "said", "same", "say", "says", "she", "should", "since", "so", "some", "still",
    "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "two", "under", "until", "up",
    "us", "use", "used", "very", "was", "wasn", "we", "well", "were", "weren", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "within", "without",
    "would", "year", "years", "yet", "you", "your", "yours", "yourself", "yourselves",
];
