//! Dependency-free intent recognizer: keyword matching, fuzzy (edit-distance)
//! matching, regex rules, and TF-IDF cosine similarity, combined into one
//! weighted score per candidate intent.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use regex::RegexBuilder;
use tracing::trace;

use crate::config::RecognizerConfig;
use crate::errors::DslError;
use crate::lexer::is_stripped_punctuation;
use crate::value::Value;

use super::{IntentPattern, IntentResult, Recognizer, RecognizerContext};

const STOPWORDS: &[&str] = &[
    "的", "了", "是", "在", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这", "那", "什么",
    "吗", "啊", "呢", "吧", "嗯", "哦", "呀", "哈", "请", "请问", "想", "想要", "可以", "能",
    "能不能", "可不可以", "帮", "帮我", "麻烦", "一下", "下", "谢谢", "感谢", "您好", "你好", "喂",
    "嘿",
];

/// Text preprocessing shared by every scoring strategy: lowercase, strip
/// punctuation, collapse whitespace.
pub fn preprocess(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered.chars().filter(|c| !is_stripped_punctuation(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// CJK characters are their own tokens; runs of everything else (already
/// whitespace-collapsed by [`preprocess`]) are single tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let processed = preprocess(text);
    if processed.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in processed.chars() {
        if c == ' ' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Tokenize then drop stopwords — the representation scored by Jaccard
/// (`example_score`) and fed into the TF-IDF vectorizer.
pub fn extract_keywords(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Classic Levenshtein edit distance, swapping operands so `s1` is never
/// shorter than `s2` (keeps the DP row proportional to the shorter string).
pub fn levenshtein_distance(s1: &[char], s2: &[char]) -> usize {
    let (s1, s2) = if s1.len() < s2.len() { (s2, s1) } else { (s1, s2) };
    if s2.is_empty() {
        return s1.len();
    }

    let mut previous_row: Vec<usize> = (0..=s2.len()).collect();
    for (i, c1) in s1.iter().enumerate() {
        let mut current_row = vec![i + 1];
        for (j, c2) in s2.iter().enumerate() {
            let insertions = previous_row[j + 1] + 1;
            let deletions = current_row[j] + 1;
            let substitutions = previous_row[j] + usize::from(c1 != c2);
            current_row.push(insertions.min(deletions).min(substitutions));
        }
        previous_row = current_row;
    }
    *previous_row.last().unwrap()
}

pub fn edit_distance_similarity(s1: &str, s2: &str) -> f64 {
    if s1.is_empty() && s2.is_empty() {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }
    let c1: Vec<char> = s1.chars().collect();
    let c2: Vec<char> = s2.chars().collect();
    let distance = levenshtein_distance(&c1, &c2);
    let max_len = c1.len().max(c2.len());
    1.0 - (distance as f64 / max_len as f64)
}

pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let keys: HashSet<&String> = a.keys().chain(b.keys()).collect();
    let dot: f64 = keys.iter().map(|k| a.get(*k).unwrap_or(&0.0) * b.get(*k).unwrap_or(&0.0)).sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Document-frequency-trained TF-IDF over the keyword/example corpus supplied
/// at construction. `transform` is pure once `fit` has run.
#[derive(Debug, Default)]
struct TfIdfVectorizer {
    document_freq: HashMap<String, usize>,
    total_docs: usize,
}

impl TfIdfVectorizer {
    fn fit(&mut self, documents: &[String]) {
        self.document_freq.clear();
        self.total_docs = documents.len();
        for doc in documents {
            let tokens: HashSet<String> = extract_keywords(doc).into_iter().collect();
            for token in tokens {
                *self.document_freq.entry(token).or_insert(0) += 1;
            }
        }
    }

    fn transform(&self, text: &str) -> HashMap<String, f64> {
        let tokens = extract_keywords(text);
        if tokens.is_empty() {
            return HashMap::new();
        }

        let mut tf: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.clone()).or_insert(0) += 1;
        }
        let max_tf = *tf.values().max().unwrap_or(&1) as f64;

        tf.into_iter()
            .map(|(token, count)| {
                let df = *self.document_freq.get(&token).unwrap_or(&0) as f64;
                let idf = ((self.total_docs as f64 + 1.0) / (df + 1.0)).ln() + 1.0;
                (token, (count as f64 / max_tf) * idf)
            })
            .collect()
    }
}

/// Keyword/fuzzy/regex/similarity matcher over a registered library of
/// [`IntentPattern`]s. Deterministic given the same library and input: patterns
/// are kept in an insertion-ordered map so that a tie in combined score always
/// breaks toward the intent registered first, the same way on every run.
pub struct LocalRecognizer {
    patterns: IndexMap<String, IntentPattern>,
    config: RecognizerConfig,
    tfidf: TfIdfVectorizer,
    intent_vectors: HashMap<String, HashMap<String, f64>>,
}

impl LocalRecognizer {
    pub fn new(patterns: Vec<IntentPattern>) -> Self {
        let mut recognizer = Self {
            patterns: patterns.into_iter().map(|p| (p.intent.clone(), p)).collect(),
            config: RecognizerConfig::default(),
            tfidf: TfIdfVectorizer::default(),
            intent_vectors: HashMap::new(),
        };
        recognizer.train();
        recognizer
    }

    pub fn with_config(mut self, config: RecognizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Built-in demo pattern libraries, keyed by scenario tag. These exist so
    /// the recognizer is usable without any external pattern file; scenario
    /// catalog loading from disk is an embedder concern.
    pub fn for_scenario(tag: &str) -> Result<Self, DslError> {
        let patterns = match tag {
            "default" => default_scenario_patterns(),
            "clinic" => clinic_scenario_patterns(),
            other => return Err(DslError::UnknownScenario(other.to_string())),
        };
        Ok(Self::new(patterns))
    }

    fn train(&mut self) {
        if self.patterns.is_empty() {
            return;
        }

        let mut all_examples = Vec::new();
        for pattern in self.patterns.values() {
            all_examples.extend(pattern.examples.iter().cloned());
            all_examples.extend(pattern.keywords.iter().cloned());
        }
        if !all_examples.is_empty() {
            self.tfidf.fit(&all_examples);
        }

        for (intent, pattern) in &self.patterns {
            let combined = pattern
                .keywords
                .iter()
                .chain(pattern.examples.iter())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            self.intent_vectors.insert(intent.clone(), self.tfidf.transform(&combined));
        }
    }

    fn expand_synonyms(&self, text: &str, pattern: &IntentPattern) -> String {
        let mut expanded = text.to_string();
        for (canonical, variants) in &pattern.synonyms {
            for variant in variants {
                if expanded.contains(variant.as_str()) {
                    expanded = expanded.replace(variant.as_str(), canonical);
                }
            }
        }
        expanded
    }

    fn fuzzy_match(&self, keyword: &str, text: &str) -> bool {
        let tokens = tokenize(text);
        let keyword_len = keyword.chars().count();
        for i in 0..tokens.len() {
            let upper = (i + keyword_len + 2).min(tokens.len() + 1);
            for j in (i + 1)..upper {
                let segment: String = tokens[i..j].concat();
                if edit_distance_similarity(keyword, &segment) >= self.config.fuzzy_threshold {
                    return true;
                }
            }
        }
        false
    }

    fn keyword_match(&self, text: &str, pattern: &IntentPattern) -> (f64, Vec<String>) {
        if pattern.keywords.is_empty() {
            return (0.0, Vec::new());
        }
        let expanded = self.expand_synonyms(text, pattern);
        let mut matched = Vec::new();
        for keyword in &pattern.keywords {
            let keyword_lower = keyword.to_lowercase();
            if expanded.contains(&keyword_lower) || self.fuzzy_match(&keyword_lower, &expanded) {
                matched.push(keyword.clone());
            }
        }
        (matched.len() as f64 / pattern.keywords.len() as f64, matched)
    }

    fn pattern_match(&self, raw_text: &str, pattern: &IntentPattern) -> f64 {
        if pattern.regexes.is_empty() {
            return 0.0;
        }
        let matched = pattern
            .regexes
            .iter()
            .filter(|regex_src| {
                RegexBuilder::new(regex_src)
                    .case_insensitive(true)
                    .build()
                    .map(|re| re.is_match(raw_text))
                    .unwrap_or(false)
            })
            .count();
        matched as f64 / pattern.regexes.len() as f64
    }

    fn similarity_match(&self, processed_text: &str, intent: &str) -> f64 {
        match self.intent_vectors.get(intent) {
            Some(intent_vector) => cosine_similarity(&self.tfidf.transform(processed_text), intent_vector),
            None => 0.0,
        }
    }

    fn example_similarity(&self, processed_text: &str, pattern: &IntentPattern) -> f64 {
        if pattern.examples.is_empty() {
            return 0.0;
        }
        let text_tokens: HashSet<String> = extract_keywords(processed_text).into_iter().collect();
        pattern
            .examples
            .iter()
            .map(|example| {
                let example_tokens: HashSet<String> = extract_keywords(example).into_iter().collect();
                jaccard_similarity(&text_tokens, &example_tokens)
            })
            .fold(0.0, f64::max)
    }
}

impl Recognizer for LocalRecognizer {
    fn recognize(&self, utterance: &str, candidates: &[String], _ctx: RecognizerContext<'_>) -> IntentResult {
        if utterance.trim().is_empty() {
            return IntentResult::silence();
        }

        let processed = preprocess(utterance);
        // `rank` counts down from the registration index so a tie in
        // (combined, priority) always resolves toward the pattern registered
        // first, on every run, regardless of the map's internal layout.
        let scored: Vec<(&str, f64, i32, isize, Vec<String>)> = self
            .patterns
            .iter()
            .enumerate()
            .filter(|(_, (intent, _))| candidates.is_empty() || candidates.contains(*intent))
            .map(|(index, (intent, pattern))| {
                let (keyword_score, matched) = self.keyword_match(&processed, pattern);
                let pattern_score = self.pattern_match(utterance, pattern);
                let similarity_score = self.similarity_match(&processed, intent);
                let example_score = self.example_similarity(&processed, pattern);

                let combined = (keyword_score * self.config.keyword_weight
                    + similarity_score.max(example_score) * self.config.similarity_weight
                    + pattern_score * self.config.pattern_weight)
                    * pattern.weight;

                (intent.as_str(), combined, pattern.priority, -(index as isize), matched)
            })
            .collect();

        let Some((best_intent, best_score, _, _, matched)) = scored.iter().max_by(|a, b| {
            (a.1, a.2, a.3).partial_cmp(&(b.1, b.2, b.3)).unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            return IntentResult::no_match();
        };

        trace!(utterance_len = utterance.len(), best_intent, best_score, "local recognizer scored candidates");

        if *best_score < self.config.min_confidence {
            return IntentResult::no_match();
        }

        IntentResult {
            intent: best_intent.to_string(),
            confidence: best_score.min(1.0),
            entities: HashMap::new(),
            is_silence: false,
        }
        .with_matched(matched.clone())
    }
}

impl IntentResult {
    fn with_matched(self, matched: Vec<String>) -> Self {
        if matched.is_empty() {
            self
        } else {
            let mut entities = self.entities;
            entities.insert(
                "matched_keywords".to_string(),
                Value::List(matched.into_iter().map(Value::String).collect()),
            );
            Self { entities, ..self }
        }
    }
}

fn default_scenario_patterns() -> Vec<IntentPattern> {
    vec![
        IntentPattern::new("affirm")
            .keywords(["yes", "sure", "ok", "okay", "yeah", "好的", "是的", "可以"])
            .examples(["yes please", "that works", "好的谢谢"])
            .weight(1.0),
        IntentPattern::new("deny")
            .keywords(["no", "nope", "不要", "不用", "算了"])
            .examples(["no thanks", "not now", "不用了"])
            .weight(1.0),
        IntentPattern::new("cancel")
            .keywords(["cancel", "stop", "quit", "取消", "退出"])
            .examples(["cancel my order", "I want to cancel", "取消预约"])
            .weight(1.2),
    ]
}

fn clinic_scenario_patterns() -> Vec<IntentPattern> {
    vec![
        IntentPattern::new("book_appointment")
            .keywords(["挂号", "预约", "看病", "book", "appointment"])
            .synonym("挂号", ["挂个号", "预约一下"])
            .examples(["我想挂号", "帮我预约内科", "I'd like to book an appointment"])
            .pattern(r"(挂号|预约).*(科|医生)")
            .weight(1.3)
            .priority(1),
        IntentPattern::new("check_fee")
            .keywords(["费用", "多少钱", "价格", "cost", "price"])
            .examples(["挂号费多少", "how much does it cost"])
            .weight(1.0),
        IntentPattern::new("cancel")
            .keywords(["取消", "不看了", "cancel"])
            .examples(["我要取消挂号", "cancel the appointment"])
            .weight(1.1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(preprocess("Hello,  World!"), "hello world");
    }

    #[test]
    fn tokenize_splits_cjk_chars_individually() {
        assert_eq!(tokenize("你好world"), vec!["你", "好", "world"]);
    }

    #[test]
    fn extract_keywords_drops_stopwords() {
        assert_eq!(extract_keywords("我想取消"), vec!["想", "取消"]);
    }

    #[test]
    fn levenshtein_distance_matches_known_values() {
        let a: Vec<char> = "kitten".chars().collect();
        let b: Vec<char> = "sitting".chars().collect();
        assert_eq!(levenshtein_distance(&a, &b), 3);
    }

    #[test]
    fn edit_distance_similarity_boundaries() {
        assert_eq!(edit_distance_similarity("", ""), 1.0);
        assert_eq!(edit_distance_similarity("a", ""), 0.0);
    }

    #[test]
    fn jaccard_empty_sets() {
        let empty = HashSet::new();
        assert_eq!(jaccard_similarity(&empty, &empty), 1.0);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_near_one() {
        let mut v = HashMap::new();
        v.insert("a".to_string(), 1.0);
        v.insert("b".to_string(), 2.0);
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_utterance_is_silence() {
        let recognizer = LocalRecognizer::for_scenario("default").unwrap();
        let vars = HashMap::new();
        let history = vec![];
        let result = recognizer.recognize(
            "   ",
            &["affirm".to_string()],
            RecognizerContext { variables: &vars, recent_history: &history },
        );
        assert!(result.is_silence);
    }

    #[test]
    fn recognize_is_deterministic_for_same_input() {
        let recognizer = LocalRecognizer::for_scenario("clinic").unwrap();
        let vars = HashMap::new();
        let history = vec![];
        let candidates = vec!["book_appointment".to_string(), "check_fee".to_string(), "cancel".to_string()];
        let first = recognizer.recognize(
            "我想挂号看内科",
            &candidates,
            RecognizerContext { variables: &vars, recent_history: &history },
        );
        let second = recognizer.recognize(
            "我想挂号看内科",
            &candidates,
            RecognizerContext { variables: &vars, recent_history: &history },
        );
        assert_eq!(first, second);
        assert_eq!(first.intent, "book_appointment");
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        assert!(matches!(LocalRecognizer::for_scenario("nope"), Err(DslError::UnknownScenario(_))));
    }

    #[test]
    fn candidate_restriction_excludes_other_intents() {
        let recognizer = LocalRecognizer::for_scenario("default").unwrap();
        let vars = HashMap::new();
        let history = vec![];
        let result = recognizer.recognize(
            "yes please",
            &["deny".to_string()],
            RecognizerContext { variables: &vars, recent_history: &history },
        );
        assert_ne!(result.intent, "affirm");
    }
}
