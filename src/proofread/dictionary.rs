//! Word-list spell checking from Hunspell `.aff`/`.dic` data.
//!
//! Only the subset of Hunspell needed for plain word lookup is understood:
//! `FLAG`, `TRY`, and single-level `PFX`/`SFX` expansion with cross products.
//! Compounding, `REP` tables and morphology are ignored.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::channel::{DictionaryProvider, DictionaryRequest, DictionaryResponse};
use super::{FlaggedSpan, ProofreadError, Proofreader, SpanKind};

pub const SPELLING_MESSAGE: &str = "Possible spelling mistake found.";

const MAX_SUGGESTIONS: usize = 10;

static WORD_PATTERN: OnceLock<Regex> = OnceLock::new();

/// A word found in plain text, with character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub offset: usize,
    pub length: usize,
    pub word: &'a str,
}

/// Split text into words. Apostrophes inside a word keep it together.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let pattern = WORD_PATTERN.get_or_init(|| {
        Regex::new(r"[\p{L}\p{M}]+(?:['’][\p{L}\p{M}]+)*").expect("Invalid word regex")
    });
    let mut tokens = Vec::new();
    let mut chars_before = 0;
    let mut bytes_seen = 0;
    for m in pattern.find_iter(text) {
        chars_before += text[bytes_seen..m.start()].chars().count();
        let length = m.as_str().chars().count();
        tokens.push(Token {
            offset: chars_before,
            length,
            word: m.as_str(),
        });
        chars_before += length;
        bytes_seen = m.end();
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagMode {
    Char,
    Long,
    Num,
}

impl FlagMode {
    fn split(self, flags: &str) -> Vec<String> {
        match self {
            FlagMode::Char => flags.chars().map(String::from).collect(),
            FlagMode::Long => {
                let chars: Vec<char> = flags.chars().collect();
                chars.chunks(2).map(|pair| pair.iter().collect()).collect()
            }
            FlagMode::Num => flags
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AffixSide {
    Prefix,
    Suffix,
}

#[derive(Debug)]
struct AffixRule {
    strip: String,
    add: String,
    condition: Option<Regex>,
}

#[derive(Debug)]
struct AffixClass {
    side: AffixSide,
    cross_product: bool,
    rules: Vec<AffixRule>,
}

impl AffixClass {
    fn apply(&self, word: &str) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|rule| {
                if let Some(condition) = &rule.condition {
                    if !condition.is_match(word) {
                        return None;
                    }
                }
                match self.side {
                    AffixSide::Suffix => {
                        let stem = word.strip_suffix(rule.strip.as_str())?;
                        Some(format!("{}{}", stem, rule.add))
                    }
                    AffixSide::Prefix => {
                        let stem = word.strip_prefix(rule.strip.as_str())?;
                        Some(format!("{}{}", rule.add, stem))
                    }
                }
            })
            .collect()
    }
}

/// Parsed affix file.
#[derive(Debug)]
struct Affixes {
    flag_mode: FlagMode,
    try_chars: Vec<char>,
    classes: HashMap<String, AffixClass>,
}

impl Affixes {
    fn parse(data: &str) -> Result<Self, ProofreadError> {
        let mut affixes = Affixes {
            flag_mode: FlagMode::Char,
            try_chars: Vec::new(),
            classes: HashMap::new(),
        };

        for (line_no, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens[0] {
                "FLAG" => {
                    affixes.flag_mode = match tokens.get(1).copied() {
                        Some("long") => FlagMode::Long,
                        Some("num") => FlagMode::Num,
                        _ => FlagMode::Char,
                    };
                }
                "TRY" => {
                    if let Some(chars) = tokens.get(1) {
                        affixes.try_chars = chars.chars().collect();
                    }
                }
                kind @ ("PFX" | "SFX") => {
                    let side = if kind == "PFX" {
                        AffixSide::Prefix
                    } else {
                        AffixSide::Suffix
                    };
                    affixes.parse_affix_line(side, &tokens, line_no + 1)?;
                }
                _ => {}
            }
        }

        Ok(affixes)
    }

    fn parse_affix_line(
        &mut self,
        side: AffixSide,
        tokens: &[&str],
        line_no: usize,
    ) -> Result<(), ProofreadError> {
        if tokens.len() < 4 {
            return Err(ProofreadError::Dictionary(format!(
                "line {}: truncated affix entry",
                line_no
            )));
        }
        let flag = tokens[1].to_string();

        let is_header = tokens.len() == 4
            && matches!(tokens[2], "Y" | "N")
            && tokens[3].parse::<usize>().is_ok();
        if is_header {
            self.classes.insert(
                flag,
                AffixClass {
                    side,
                    cross_product: tokens[2] == "Y",
                    rules: Vec::new(),
                },
            );
            return Ok(());
        }

        let Some(class) = self.classes.get_mut(&flag) else {
            return Err(ProofreadError::Dictionary(format!(
                "line {}: affix rule for undeclared flag '{}'",
                line_no, flag
            )));
        };

        let strip = match tokens[2] {
            "0" => String::new(),
            s => s.to_string(),
        };
        // Continuation classes (`add/FLAGS`) are not expanded further.
        let add = match tokens[3].split('/').next() {
            Some("0") | None => String::new(),
            Some(s) => s.to_string(),
        };
        let condition = match tokens.get(4).copied() {
            None | Some(".") => None,
            Some(cond) => {
                let pattern = match side {
                    AffixSide::Prefix => format!("^{}", cond),
                    AffixSide::Suffix => format!("{}$", cond),
                };
                Some(Regex::new(&pattern).map_err(|e| {
                    ProofreadError::Dictionary(format!(
                        "line {}: bad affix condition '{}': {}",
                        line_no, cond, e
                    ))
                })?)
            }
        };

        class.rules.push(AffixRule {
            strip,
            add,
            condition,
        });
        Ok(())
    }
}

/// An expanded set of known words.
#[derive(Debug, Clone)]
pub struct WordList {
    words: HashSet<String>,
    alphabet: Vec<char>,
}

impl WordList {
    /// Build a word list from the contents of an `.aff` and a `.dic` file.
    pub fn parse(affix_data: &str, word_list_data: &str) -> Result<Self, ProofreadError> {
        let affixes = Affixes::parse(affix_data)?;
        let mut words = HashSet::new();

        let mut lines = word_list_data.lines().map(str::trim).peekable();
        // The first line is an approximate entry count.
        if lines
            .peek()
            .is_some_and(|first| first.parse::<usize>().is_ok())
        {
            lines.next();
        }

        for line in lines {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // Drop morphological fields.
            let entry = line.split_whitespace().next().unwrap_or(line);
            let (word, flags) = match entry.split_once('/') {
                Some((word, flags)) => (word, affixes.flag_mode.split(flags)),
                None => (entry, Vec::new()),
            };
            if word.is_empty() {
                continue;
            }
            expand(word, &flags, &affixes, &mut words);
        }

        // Candidates are generated in lower case and re-cased afterwards.
        let mut alphabet: Vec<char> = Vec::new();
        for c in affixes.try_chars {
            if !c.is_uppercase() && !alphabet.contains(&c) {
                alphabet.push(c);
            }
        }
        if alphabet.is_empty() {
            alphabet = ('a'..='z').collect();
        }

        Ok(Self { words, alphabet })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Whether `word` is spelled correctly.
    ///
    /// Capitalised and upper-case forms of known lower-case words are accepted,
    /// and upper-case forms of known capitalised words.
    pub fn check(&self, word: &str) -> bool {
        if self.words.contains(word) {
            return true;
        }
        let lower = word.to_lowercase();
        if lower != word && self.words.contains(&lower) {
            return true;
        }
        if word.chars().all(|c| !c.is_lowercase()) && self.words.contains(&capitalize(&lower)) {
            return true;
        }
        false
    }

    /// Known words one edit away from `word`, with its capitalisation applied.
    pub fn suggest(&self, word: &str, limit: usize) -> Vec<String> {
        let lower = word.to_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        let mut seen = HashSet::new();
        let mut suggestions = Vec::new();

        for candidate in edits(&chars, &self.alphabet) {
            if suggestions.len() >= limit {
                break;
            }
            let cased = match_case(word, &candidate);
            let suggestion = if self.check(&cased) {
                cased
            } else if self.words.contains(&candidate) {
                candidate
            } else {
                continue;
            };
            if seen.insert(suggestion.clone()) {
                suggestions.push(suggestion);
            }
        }
        suggestions
    }
}

fn expand(word: &str, flags: &[String], affixes: &Affixes, words: &mut HashSet<String>) {
    words.insert(word.to_string());

    let classes: Vec<&AffixClass> = flags
        .iter()
        .filter_map(|flag| affixes.classes.get(flag))
        .collect();

    let mut suffixed = Vec::new();
    for class in classes.iter().filter(|c| c.side == AffixSide::Suffix) {
        for form in class.apply(word) {
            if class.cross_product {
                suffixed.push(form.clone());
            }
            words.insert(form);
        }
    }
    for class in classes.iter().filter(|c| c.side == AffixSide::Prefix) {
        for form in class.apply(word) {
            words.insert(form);
        }
        if class.cross_product {
            for base in &suffixed {
                for form in class.apply(base) {
                    words.insert(form);
                }
            }
        }
    }
}

/// All strings one transposition, substitution, insertion or deletion away.
fn edits(chars: &[char], alphabet: &[char]) -> Vec<String> {
    let mut out = Vec::new();
    let n = chars.len();

    for i in 0..n.saturating_sub(1) {
        let mut c = chars.to_vec();
        c.swap(i, i + 1);
        out.push(c.into_iter().collect());
    }
    for i in 0..n {
        for &a in alphabet {
            if a != chars[i] {
                let mut c = chars.to_vec();
                c[i] = a;
                out.push(c.into_iter().collect());
            }
        }
    }
    for i in 0..=n {
        for &a in alphabet {
            let mut c = chars.to_vec();
            c.insert(i, a);
            out.push(c.into_iter().collect());
        }
    }
    if n > 1 {
        for i in 0..n {
            let mut c = chars.to_vec();
            c.remove(i);
            out.push(c.into_iter().collect());
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn match_case(original: &str, candidate: &str) -> String {
    let letters = original.chars().filter(|c| c.is_alphabetic()).count();
    if letters > 1 && original.chars().all(|c| !c.is_lowercase()) {
        candidate.to_uppercase()
    } else if original.chars().next().is_some_and(char::is_uppercase) {
        capitalize(candidate)
    } else {
        candidate.to_string()
    }
}

/// Spell checker backed by word lists fetched through a [`DictionaryProvider`].
///
/// Each locale is requested once. A locale the provider has no dictionary for
/// produces no findings; provider failures are retried on the next call.
pub struct DictionaryProofreader {
    provider: Arc<dyn DictionaryProvider>,
    default_locale: String,
    cache: Mutex<HashMap<String, Option<Arc<WordList>>>>,
}

impl DictionaryProofreader {
    pub fn new(provider: Arc<dyn DictionaryProvider>, default_locale: impl Into<String>) -> Self {
        Self {
            provider,
            default_locale: default_locale.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn word_list(&self, locale: &str) -> Result<Option<Arc<WordList>>, ProofreadError> {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(locale) {
            return Ok(entry.clone());
        }

        let response = self
            .provider
            .fetch(DictionaryRequest::GetDictionary {
                locale: locale.to_string(),
            })
            .await?;
        let DictionaryResponse::Dictionary { dictionary } = response;

        let list = match dictionary {
            Some(payload) => {
                let list = WordList::parse(&payload.affix_data, &payload.word_list_data)?;
                debug!(locale, words = list.len(), "loaded dictionary");
                Some(Arc::new(list))
            }
            None => {
                warn!(locale, "no dictionary available, spelling is not checked");
                None
            }
        };
        cache.insert(locale.to_string(), list.clone());
        Ok(list)
    }
}

#[async_trait]
impl Proofreader for DictionaryProofreader {
    async fn analyze(
        &self,
        text: &str,
        locale: Option<&str>,
    ) -> Result<Vec<FlaggedSpan>, ProofreadError> {
        let locale = locale.unwrap_or(&self.default_locale);
        let Some(list) = self.word_list(locale).await? else {
            return Ok(Vec::new());
        };

        Ok(tokenize(text)
            .into_iter()
            .filter(|token| !list.check(token.word))
            .map(|token| FlaggedSpan {
                offset: token.offset,
                length: token.length,
                message: SPELLING_MESSAGE.to_string(),
                replacements: list.suggest(token.word, MAX_SUGGESTIONS),
                kind: SpanKind::Spelling,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::super::channel::DictionaryPayload;
    use super::*;

    const AFF: &str = "\
SET UTF-8
TRY esianrtolcdugmphbyfvkwzESIANRTOLCDUGMPHBYFVKWZ'

# plural
SFX S Y 2
SFX S   y     ies        [^aeiou]y
SFX S   0     s          [^y]

PFX U Y 1
PFX U   0     un         .
";

    const DIC: &str = "\
6
this
is
a
test/S
happy/U
city/S
";

    fn words() -> WordList {
        WordList::parse(AFF, DIC).unwrap()
    }

    #[test]
    fn expands_affixes() {
        let list = words();
        assert!(list.check("tests"));
        assert!(list.check("cities"));
        assert!(!list.check("citys"));
        assert!(list.check("unhappy"));
        assert!(!list.check("unhappys"));
    }

    #[test]
    fn check_accepts_capitalised_forms() {
        let list = words();
        assert!(list.check("This"));
        assert!(list.check("TEST"));
        assert!(!list.check("Ths"));
    }

    #[test]
    fn suggestions_preserve_case() {
        let list = words();
        assert_eq!(list.suggest("Ths", 10), vec!["This"]);
        assert_eq!(list.suggest("tst", 10), vec!["test"]);
        assert!(list.suggest("zzzzzz", 10).is_empty());
    }

    #[test]
    fn long_and_numeric_flags() {
        let aff = "FLAG long\nSFX Aa Y 1\nSFX Aa 0 ed .\n";
        let list = WordList::parse(aff, "1\nwalk/Aa\n").unwrap();
        assert!(list.check("walked"));

        let aff = "FLAG num\nSFX 12 Y 1\nSFX 12 0 ing .\n";
        let list = WordList::parse(aff, "1\nwalk/7,12\n").unwrap();
        assert!(list.check("walking"));
    }

    #[test]
    fn rejects_rules_for_undeclared_flags() {
        let err = WordList::parse("SFX X 0 s .\n", "").unwrap_err();
        assert!(matches!(err, ProofreadError::Dictionary(_)));
    }

    #[test]
    fn tokenize_uses_character_offsets() {
        let tokens = tokenize("Ths is\n\na tst. Don’t café");
        let words: Vec<_> = tokens.iter().map(|t| (t.offset, t.length, t.word)).collect();
        assert_eq!(
            words,
            vec![
                (0, 3, "Ths"),
                (4, 2, "is"),
                (8, 1, "a"),
                (10, 3, "tst"),
                (15, 5, "Don’t"),
                (21, 4, "café"),
            ]
        );
    }

    struct StaticProvider {
        payload: Option<DictionaryPayload>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DictionaryProvider for StaticProvider {
        async fn fetch(
            &self,
            _request: DictionaryRequest,
        ) -> Result<DictionaryResponse, ProofreadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DictionaryResponse::Dictionary {
                dictionary: self.payload.clone(),
            })
        }
    }

    #[tokio::test]
    async fn flags_unknown_words_and_loads_once() {
        let provider = Arc::new(StaticProvider {
            payload: Some(DictionaryPayload {
                affix_data: AFF.to_string(),
                word_list_data: DIC.to_string(),
            }),
            calls: AtomicUsize::new(0),
        });
        let proofreader = DictionaryProofreader::new(provider.clone(), "en_US");

        let spans = proofreader.analyze("Ths is a tst.", None).await.unwrap();
        let summary: Vec<_> = spans
            .iter()
            .map(|s| (s.offset, s.length, s.replacements.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, 3, vec!["This".to_string()]),
                (9, 3, vec!["test".to_string()]),
            ]
        );
        assert_eq!(spans[0].message, SPELLING_MESSAGE);

        proofreader.analyze("this", None).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_dictionary_yields_no_findings() {
        let provider = Arc::new(StaticProvider {
            payload: None,
            calls: AtomicUsize::new(0),
        });
        let proofreader = DictionaryProofreader::new(provider, "xx");
        assert!(proofreader.analyze("anything", None).await.unwrap().is_empty());
    }
}
