//! Sentence-level scene splitting.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{error, info, warn};

/// A terminator run, any closing quotes/brackets, then whitespace or the end.
static SENTENCE_END: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"[.!?…]+["'”’»)\]]*(?:\s+|$)"#));

/// Words that end in a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e",
];

/// Splits text into trimmed, non-empty sentences.
///
/// Empty input and tokenizer failures both give back an empty list.
pub fn split_into_scenes(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        warn!("Received empty text to split into scenes.");
        return Vec::new();
    }

    match sentences(text) {
        Ok(sentences) => {
            let scenes: Vec<String> = sentences
                .into_iter()
                .map(str::trim)
                .filter(|sentence| !sentence.is_empty())
                .map(str::to_string)
                .collect();
            info!("Text successfully split into {} scenes.", scenes.len());
            scenes
        }
        Err(err) => {
            error!("Error splitting the text into scenes: {}", err);
            Vec::new()
        }
    }
}

fn sentences(text: &str) -> Result<Vec<&str>, regex::Error> {
    let boundary = SENTENCE_END.as_ref().map_err(Clone::clone)?;

    let mut out = Vec::new();
    let mut start = 0;
    for found in boundary.find_iter(text) {
        if found.start() < start || is_abbreviation(&text[start..found.start()], found.as_str()) {
            continue;
        }
        let end = found.start() + found.as_str().trim_end().len();
        out.push(&text[start..end]);
        start = found.end();
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    Ok(out)
}

/// Articles that make a following capital letter a grade or a name ("an A."),
/// not an initial.
const ARTICLES: &[&str] = &["a", "an", "the"];

/// Looks at the word right before a lone `.` to decide if it's an abbreviation
/// or an initial rather than a full stop.
fn is_abbreviation(before: &str, terminator: &str) -> bool {
    if !terminator.starts_with('.') || terminator.trim_end().starts_with("..") {
        return false;
    }
    let mut words = before.split_whitespace().rev();
    let Some(word) = words.next() else {
        return false;
    };
    let word = word.trim_start_matches(|c: char| !c.is_alphanumeric());

    let mut chars = word.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        // "I." and lowercase words like "я." end sentences
        if !letter.is_uppercase() || letter == 'I' {
            return false;
        }
        let previous = words.next().map(str::to_lowercase);
        return !previous.is_some_and(|previous| ARTICLES.contains(&previous.as_str()));
    }
    ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}
