/// Low-information vocabulary removed during normalization
///
/// Matching is per whitespace token, so the multi-word entries never match a
/// single token. They stay listed so the vocabulary reads as one set.
pub const FILLER_WORDS: &[&str] = &[
    "um",
    "uh",
    "ah",
    "er",
    "like",
    "you know",
    "i mean",
    "sort of",
    "kind of",
    "basically",
    "actually",
    "literally",
    "right",
    "okay",
    "so",
    "well",
    "just",
    "really",
    "very",
    "quite",
    "somewhat",
    "maybe",
    "i guess",
    "i think",
    "i suppose",
    "you see",
    "you know what i mean",
    "at the end of the day",
    "to be honest",
    "believe me",
    "you know what",
    "or something",
    "or whatever",
    "and stuff",
    "and things",
    "and everything",
    "and all",
    "or something like that",
    "or anything",
    "or so",
    "i don't know",
    "you know what i'm saying",
    "if you will",
    "as it were",
];

/// Characters stripped from token edges before the filler lookup
const EDGE_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '"', '\'', '(', ')', '[', ']', '{', '}',
];

/// Whether a raw token is a filler word
pub fn is_filler(token: &str) -> bool {
    let key = token.to_lowercase();
    let key = key.trim_matches(EDGE_PUNCTUATION);
    FILLER_WORDS.contains(&key)
}

/// Remove filler words from a speaker-tagged transcript
///
/// Lines are `Speaker: utterance`. Blank lines and lines without a colon are
/// dropped, as are lines left with no words after filler removal. Speaker
/// labels and line order are preserved, and cleaning clean text is a no-op.
pub fn clean_transcript(transcript: &str) -> String {
    let mut lines = Vec::new();

    for line in transcript.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((speaker, content)) = line.split_once(':') else {
            continue;
        };

        let words: Vec<&str> = content
            .split_whitespace()
            .filter(|word| !is_filler(word))
            .collect();

        if !words.is_empty() {
            lines.push(format!("{}: {}", speaker, words.join(" ")));
        }
    }

    lines.join("\n")
}
