//! Title-case normalization for artist and album tags.
//!
//! Tags that are entirely upper-case are treated as intentional and left
//! alone. Otherwise every word is title-cased, except stop words (lower-cased
//! unless they open the tag or a bracketed segment) and Roman numerals
//! (upper-cased). Whitespace is preserved byte for byte.

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "in", "nor", "of", "on", "or", "the", "up",
];

const BRACKETS: &[(char, char)] = &[('(', ')'), ('[', ']'), ('{', '}')];

pub fn normalize(tag: &str) -> String {
    if tag.trim().is_empty() || is_all_caps(tag) {
        return tag.to_string();
    }

    let mut out = String::with_capacity(tag.len());
    let mut rest = tag;
    while let Some((open_idx, close_idx)) = find_bracketed(rest) {
        out.push_str(&normalize_segment(&rest[..open_idx]));
        out.push_str(&rest[open_idx..open_idx + 1]);
        out.push_str(&normalize_segment(&rest[open_idx + 1..close_idx]));
        out.push_str(&rest[close_idx..close_idx + 1]);
        rest = &rest[close_idx + 1..];
    }
    out.push_str(&normalize_segment(rest));
    out
}

pub fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase)
}

/// Stop-word membership, case-insensitive.
pub fn is_stop_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

/// Canonical Roman numerals worth upper-casing: values up to 39, plus numerals
/// with a single non-zero place (XL, LXX, CD, MM, ...). Words such as "mix" or
/// "liv" are valid numerals in theory but read as words, so they are excluded.
pub fn is_roman_numeral(word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let upper = word.to_ascii_uppercase();
    if !upper.chars().all(|c| matches!(c, 'I' | 'V' | 'X' | 'L' | 'C' | 'D' | 'M')) {
        return false;
    }
    match roman_places(&upper) {
        Some(places) => {
            let value = places[0] * 1000 + places[1] * 100 + places[2] * 10 + places[3];
            let nonzero = places.iter().filter(|digit| **digit != 0).count();
            value <= 39 || nonzero == 1
        }
        None => false,
    }
}

/// Splits a canonical numeral into its thousands/hundreds/tens/ones digits.
fn roman_places(text: &str) -> Option<[u32; 4]> {
    const ONES: [&str; 10] = ["", "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX"];
    const TENS: [&str; 10] = ["", "X", "XX", "XXX", "XL", "L", "LX", "LXX", "LXXX", "XC"];
    const HUNDREDS: [&str; 10] = ["", "C", "CC", "CCC", "CD", "D", "DC", "DCC", "DCCC", "CM"];
    const THOUSANDS: [&str; 4] = ["", "M", "MM", "MMM"];

    let tables: [&[&str]; 4] = [&THOUSANDS, &HUNDREDS, &TENS, &ONES];
    let mut places = [0u32; 4];
    let mut rest = text;
    for (place, table) in tables.iter().enumerate() {
        let mut best: Option<(usize, &str)> = None;
        for (digit, pattern) in table.iter().enumerate().skip(1) {
            if rest.starts_with(pattern) && best.map_or(true, |(_, b)| pattern.len() > b.len()) {
                best = Some((digit, *pattern));
            }
        }
        if let Some((digit, pattern)) = best {
            places[place] = digit as u32;
            rest = &rest[pattern.len()..];
        }
    }
    if rest.is_empty() {
        Some(places)
    } else {
        None
    }
}

fn find_bracketed(text: &str) -> Option<(usize, usize)> {
    for (idx, ch) in text.char_indices() {
        let close = match BRACKETS.iter().find(|(open, _)| *open == ch) {
            Some((_, close)) => *close,
            None => continue,
        };
        let after = idx + ch.len_utf8();
        if let Some(offset) = text[after..].find(close) {
            return Some((idx, after + offset));
        }
    }
    None
}

fn normalize_segment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut leading = true;
    for (is_space, run) in whitespace_runs(text) {
        if is_space {
            out.push_str(run);
        } else {
            out.push_str(&normalize_word(run, leading));
            leading = false;
        }
    }
    out
}

fn whitespace_runs(text: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        let space = ch.is_whitespace();
        match current {
            Some(kind) if kind == space => {}
            Some(kind) => {
                runs.push((kind, &text[start..idx]));
                start = idx;
                current = Some(space);
            }
            None => current = Some(space),
        }
    }
    if let Some(kind) = current {
        runs.push((kind, &text[start..]));
    }
    runs
}

fn normalize_word(word: &str, leading: bool) -> String {
    if !word.contains(['-', '/']) {
        return normalize_token(word, leading);
    }

    // Compound words: the first part is treated as leading, later parts follow
    // the stop-word rule.
    let mut out = String::with_capacity(word.len());
    for (idx, piece) in word.split_inclusive(['-', '/']).enumerate() {
        let (body, sep) = match piece.char_indices().last() {
            Some((pos, c)) if c == '-' || c == '/' => (&piece[..pos], &piece[pos..]),
            _ => (piece, ""),
        };
        out.push_str(&normalize_token(body, idx == 0));
        out.push_str(sep);
    }
    out
}

fn normalize_token(word: &str, leading: bool) -> String {
    if word.is_empty() {
        return String::new();
    }
    if !leading && is_stop_word(word) {
        return word.to_lowercase();
    }
    if is_roman_numeral(word) {
        return word.to_ascii_uppercase();
    }
    title_case(word)
}

/// Upper-cases the first letter (after any leading punctuation) and lower-cases
/// the rest. Tokens that start with a digit keep their letters lower-case, so
/// "1st" and "80s" are untouched. Letters whose upper case expands to several
/// characters ("ß", "ﬁ") are kept as they are.
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut pending = true;
    for ch in word.chars() {
        if pending && ch.is_alphanumeric() {
            pending = false;
            if ch.is_alphabetic() {
                let mut upper = ch.to_uppercase();
                match (upper.next(), upper.next()) {
                    (Some(single), None) => out.push(single),
                    _ => out.push(ch),
                }
                continue;
            }
        }
        out.extend(ch.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{is_roman_numeral, normalize};

    #[test]
    fn title_cases_with_stop_words_and_numerals() {
        assert_eq!(normalize("shredding the guitar ii"), "Shredding the Guitar II");
        assert_eq!(normalize("your gold teeth II"), "Your Gold Teeth II");
        assert_eq!(normalize("simon and garfunkel"), "Simon and Garfunkel");
    }

    #[test]
    fn all_caps_tags_are_untouched() {
        for tag in ["MFDOOM", "AC/DC", "THE BEST OF 1999", "ABBA GOLD II"] {
            assert_eq!(normalize(tag), tag);
        }
    }

    #[test]
    fn mixed_case_words_are_title_cased() {
        assert_eq!(normalize("hello WORLD"), "Hello World");
        assert_eq!(normalize("tHE wALL"), "The Wall");
    }

    #[test]
    fn first_token_is_always_capitalized() {
        assert_eq!(normalize("a"), "A");
        assert_eq!(normalize("  the big"), "  The Big");
        assert_eq!(normalize("( the end)"), "( The End)");
        assert_eq!(normalize("the the"), "The the");
        assert_eq!(normalize("of monsters and men"), "Of Monsters and Men");
    }

    #[test]
    fn numerals_are_upper_cased_anywhere() {
        assert_eq!(normalize("rocky iv"), "Rocky IV");
        assert_eq!(normalize("Final Fantasy Vii"), "Final Fantasy VII");
        assert_eq!(normalize("ii"), "II");
        assert_eq!(normalize("part xxiv of it"), "Part XXIV of It");
    }

    #[test]
    fn numeral_letter_words_stay_words() {
        assert_eq!(normalize("mix of civil dim lid"), "Mix of Civil Dim Lid");
        assert!(!is_roman_numeral("mix"));
        assert!(!is_roman_numeral("liv"));
        assert!(!is_roman_numeral("iiii"));
        assert!(!is_roman_numeral(""));
        assert!(is_roman_numeral("xl"));
        assert!(is_roman_numeral("MMM"));
        assert!(is_roman_numeral("xxxix"));
    }

    #[test]
    fn whitespace_is_preserved() {
        assert_eq!(normalize("  the   big\tsleep "), "  The   Big\tSleep ");
        assert_eq!(normalize("   "), "   ");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn expanding_upper_case_letters_are_kept() {
        assert_eq!(normalize("ßtraße nach rom"), "ßtraße Nach Rom");
        assert_eq!(normalize("ﬁnal mix"), "ﬁnal Mix");
    }

    #[test]
    fn numeric_tokens_pass_through() {
        assert_eq!(normalize("1999"), "1999");
        assert_eq!(normalize("greatest hits 1980-1990"), "Greatest Hits 1980-1990");
        assert_eq!(normalize("80s anthems vol 2"), "80s Anthems Vol 2");
    }

    #[test]
    fn brackets_start_a_new_phrase() {
        assert_eq!(
            normalize("live at the fillmore (the complete show) [deluxe edition]"),
            "Live at the Fillmore (The Complete Show) [Deluxe Edition]"
        );
        assert_eq!(normalize("song (unclosed paren"), "Song (Unclosed Paren");
    }

    #[test]
    fn compound_words_follow_part_rules() {
        assert_eq!(normalize("rock-and-roll high school"), "Rock-and-Roll High School");
        assert_eq!(normalize("drum/bass vol ii"), "Drum/Bass Vol II");
    }

    #[test]
    fn leading_punctuation_is_skipped() {
        assert_eq!(normalize("'til tuesday"), "'Til Tuesday");
        assert_eq!(normalize("\"heroes\""), "\"Heroes\"");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "shredding the guitar ii",
            "a",
            "tHe wALL (live at THE bbc)",
            "rock-and-roll/the end of an era",
            "  spaced   out  ",
            "DJ shadow",
            "mix tape iii",
            "über café del mar",
            "{weird} [brackets] (here)",
            "ßtraße nach rom",
            "ﬁnal mix",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "input {:?}", sample);
        }
    }
}
