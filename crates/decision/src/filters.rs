//! Compiled response-filter tables
//!
//! The banned-pattern list is substantial but finite: compiled once,
//! applied as an ordered table. A spoken assistant must never ask the user
//! questions back, offer generic help, complain about image quality, or
//! narrate its own limitations. All of those read fine in a chat window
//! and terrible out loud.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

/// Pre-canned safe responses for direct questions whose generated answer
/// was filtered to nothing.
pub const SAFE_RESPONSES: &[&str] = &["I'm here.", "Listening.", "I hear you.", "Ready."];

/// Hedge prefixes the orchestrator prepends to low-confidence statements.
/// The content guard scans past them: they are our own phrasing, not model
/// wordiness.
pub const MEDIUM_HEDGES: &[&str] = &["It looks like ", "I think ", "Seems like "];
pub const STRONG_HEDGES: &[&str] = &[
    "I'm not sure, but it looks like ",
    "Hard to tell, but I think ",
    "From what I can see, ",
];

struct BannedPattern {
    name: &'static str,
    regex: Lazy<Regex>,
}

macro_rules! banned {
    ($name:literal, $pattern:literal) => {
        BannedPattern {
            name: $name,
            regex: Lazy::new(|| Regex::new($pattern).unwrap()),
        }
    };
}

/// The content-guard table, in evaluation order.
static BANNED_PATTERNS: Lazy<Vec<BannedPattern>> = Lazy::new(|| {
    vec![
    banned!("question", r"\?\s*$"),
    banned!("help_offer", r"(?i)how can i help"),
    banned!("help_offer", r"(?i)let me know"),
    banned!("help_offer", r"(?i)feel free to ask"),
    banned!("help_offer", r"(?i)is there anything else"),
    banned!("visual_negation", r"(?i)i don'?t see"),
    banned!("visual_negation", r"(?i)i can'?t see"),
    banned!("visual_negation", r"(?i)there'?s no"),
    banned!("visual_negation", r"(?i)no visual"),
    banned!("visual_negation", r"(?i)not visible"),
    banned!("visual_negation", r"(?i)i apologize.*\bsee\b"),
    banned!("visual_negation", r"(?i)can only respond"),
    banned!("visual_negation", r"(?i)no screen content"),
    banned!("visual_negation", r"(?i)nothing to work with"),
    banned!("wordy_opener", r"(?i)i notice that"),
    banned!("wordy_opener", r"(?i)it seems like"),
    banned!("wordy_opener", r"(?i)it looks like"),
    banned!("wordy_opener", r"(?i)it appears that"),
    banned!("wordy_opener", r"(?i)i can see that"),
    banned!("robotic_intro", r"(?i)^\s*(yep|yeah|hey|hi|hello)\b"),
    banned!("self_reference", r"(?i)as an ai"),
    banned!("self_reference", r"(?i)as a language model"),
    banned!("self_reference", r"(?i)i'?m redi"),
    banned!("self_reference", r"(?i)my name is"),
    banned!("quality_complaint", r"(?i)\bblurry\b"),
    banned!("quality_complaint", r"(?i)\bunclear\b"),
    banned!("quality_complaint", r"(?i)hard to see"),
    banned!("quality_complaint", r"(?i)can'?t tell"),
    ]
});

static HELP_OFFER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)how can i help|let me know|feel free to ask|is there anything else").unwrap());

static VISUAL_NEGATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)i don'?t see|i can'?t see|there'?s no|no visual|not visible|no screen content|nothing to work with",
    )
    .unwrap()
});

static ROBOTIC_LEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(yep|yeah|hey|hi|hello)[,.!\s]+").unwrap());

/// Scan `text` against the banned-pattern table. Returns the name of the
/// first matching pattern, or `None` when the text is clean.
///
/// A leading hedge prefix (our own phrasing) is skipped before scanning.
pub fn content_violation(text: &str) -> Option<&'static str> {
    let scanned = strip_hedge_prefix(text);
    BANNED_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(scanned))
        .map(|p| p.name)
}

fn strip_hedge_prefix(text: &str) -> &str {
    for hedge in MEDIUM_HEDGES.iter().chain(STRONG_HEDGES) {
        if let Some(rest) = text.strip_prefix(hedge) {
            return rest;
        }
    }
    text
}

/// Post-filter for direct answers (prompted path), applied before the
/// admission pipeline:
/// 1. drop sentences containing `?` ("Got it." when none survive)
/// 2. replace help offers with a safe response
/// 3. replace visual negations with a describe-what-is-there lead
/// 4. strip robotic leading tokens
/// 5. clamp to 25 words
pub fn clean_direct_answer(text: &str) -> String {
    let mut cleaned = strip_question_sentences(text);

    if HELP_OFFER.is_match(&cleaned) {
        let mut rng = rand::thread_rng();
        cleaned = (*SAFE_RESPONSES.choose(&mut rng).unwrap_or(&SAFE_RESPONSES[0])).to_string();
    }

    if VISUAL_NEGATION.is_match(&cleaned) {
        cleaned = "Let me describe what I can see.".to_string();
    }

    cleaned = ROBOTIC_LEAD.replace(&cleaned, "").to_string();

    clamp_words(&cleaned, 25)
}

fn strip_question_sentences(text: &str) -> String {
    let sentences: Vec<&str> = split_sentences(text);
    let kept: Vec<&str> = sentences
        .iter()
        .copied()
        .filter(|s| !s.contains('?'))
        .collect();
    if kept.is_empty() {
        "Got it.".to_string()
    } else {
        kept.join(" ").trim().to_string()
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn clamp_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.trim().to_string()
    } else {
        let mut clamped = words[..max_words].join(" ");
        if !clamped.ends_with(['.', '!']) {
            clamped.push('.');
        }
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_question_is_banned() {
        assert_eq!(content_violation("do you need water?"), Some("question"));
        assert_eq!(content_violation("water is on the table"), None);
    }

    #[test]
    fn help_offers_are_banned() {
        assert_eq!(
            content_violation("Let me know if you need anything"),
            Some("help_offer")
        );
        assert_eq!(content_violation("How can I help you today"), Some("help_offer"));
    }

    #[test]
    fn visual_negation_is_banned() {
        for text in [
            "I don't see anything",
            "I can't see the screen",
            "there's no visible text",
            "I apologize, I cannot see that",
            "nothing to work with here",
        ] {
            assert!(content_violation(text).is_some(), "{} passed", text);
        }
    }

    #[test]
    fn wordy_openers_are_banned() {
        assert_eq!(content_violation("I notice that you moved"), Some("wordy_opener"));
        assert_eq!(content_violation("it appears that rain"), Some("wordy_opener"));
    }

    #[test]
    fn hedge_prefix_is_our_own_and_passes() {
        assert_eq!(content_violation("It looks like kettle is on the stove."), None);
        assert_eq!(content_violation("I'm not sure, but it looks like rain."), None);
        // A hedge followed by a genuine violation still rejects
        assert_eq!(
            content_violation("It looks like I don't see anything"),
            Some("visual_negation")
        );
    }

    #[test]
    fn robotic_intros_are_banned() {
        assert_eq!(content_violation("Hey, the water boiled"), Some("robotic_intro"));
        assert_eq!(content_violation("yeah that works"), Some("robotic_intro"));
        // Mid-sentence greeting is fine
        assert_eq!(content_violation("she said hello to you"), None);
    }

    #[test]
    fn self_references_are_banned() {
        assert_eq!(content_violation("As an AI, I cannot"), Some("self_reference"));
        assert_eq!(content_violation("I'm Redi, your assistant"), Some("self_reference"));
    }

    #[test]
    fn quality_complaints_are_banned() {
        assert_eq!(content_violation("the image is blurry"), Some("quality_complaint"));
        assert_eq!(content_violation("can't tell from here"), Some("quality_complaint"));
    }

    #[test]
    fn clean_answer_drops_question_sentences() {
        let cleaned = clean_direct_answer("Keep your back straight. Does that make sense?");
        assert_eq!(cleaned, "Keep your back straight.");
    }

    #[test]
    fn all_questions_become_acknowledgment() {
        assert_eq!(clean_direct_answer("Ready? Sure you want this?"), "Got it.");
    }

    #[test]
    fn help_offer_becomes_safe_response() {
        let cleaned = clean_direct_answer("Let me know if you need more.");
        assert!(SAFE_RESPONSES.contains(&cleaned.as_str()));
    }

    #[test]
    fn visual_negation_becomes_describe_lead() {
        let cleaned = clean_direct_answer("I don't see a barbell anywhere.");
        assert_eq!(cleaned, "Let me describe what I can see.");
    }

    #[test]
    fn robotic_lead_is_stripped() {
        assert_eq!(clean_direct_answer("Hey, squat lower."), "squat lower.");
    }

    #[test]
    fn long_answers_clamp_to_25_words() {
        let long = (0..40).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let cleaned = clean_direct_answer(&long);
        assert_eq!(cleaned.split_whitespace().count(), 25);
        assert!(cleaned.ends_with('.'));
    }
}
