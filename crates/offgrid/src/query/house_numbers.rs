//! House number parsing and matching.
//!
//! A house number is split into typed tokens (numbers, letters, building
//! part designators like `корпус` or `bldg`, ...). Matching compares the
//! simplified token sequences of the query and the feature instead of raw
//! strings, so `12 корп 2`, `12к2` and `12 k2` can all meet.

use once_cell::sync::Lazy;
use offgrid_data::{Feature, Interpolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKind {
    Number,
    Separator,
    GroupSeparator,
    Hyphen,
    Slash,
    String,
    BuildingPart,
    Letter,
    BuildingPartOrLetter,
}

/// Ordered by kind first, then by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HnToken {
    pub kind: TokenKind,
    pub value: String,
    pub prefix: bool,
}

impl HnToken {
    fn new(value: impl Into<String>, kind: TokenKind) -> Self {
        Self {
            kind,
            value: value.into(),
            prefix: false,
        }
    }
}

/// A parsed and simplified house number.
pub type HnParse = Vec<HnToken>;

const BUILDING_PART_SYNONYMS: &[&str] = &[
    "building", "bldg", "bld", "bl", "unit", "block", "blk", "корпус", "корп", "кор", "литер", "лит",
    "строение", "стр", "блок", "бл",
];

const STOP_WORDS: &[&str] = &["дом", "house", "д"];

/// Short designators: `к` (корпус) and `с` (строение).
const SHORT_BUILDING_SYNONYMS: &[char] = &['к', 'с'];

/// Token kind sequences of common house numbers: `N`umber, `S`tring,
/// `B`uilding part, `L`etter.
const PATTERNS: &[&str] = &[
    "BL", "BLN", "BLNSL", "BN", "BNL", "BNSL", "L", "LL", "LN", "LNL", "LNLN", "LNN", "N", "NBL",
    "NBLN", "NBN", "NBNBN", "NBNL", "NL", "NLBN", "NLL", "NLLN", "NLN", "NLNL", "NLS", "NLSN", "NN",
    "NNBN", "NNL", "NNLN", "NNN", "NNS", "NS", "NSN", "NSS", "S", "SL", "SLL", "SLN", "SN", "SNBNSS",
    "SNL", "SNN", "SS", "SSN", "SSS", "SSSS", "NNBNL",
];

/// Words often seen inside house numbers. One-letter words and street
/// designators are left out: they would make too many queries look like
/// house numbers.
const COMMON_STRINGS: &[&str] = &[
    "aa", "ab", "abc", "ac", "ad", "ae", "af", "ag", "ah", "ai", "aj", "ak", "al", "am", "an", "ao",
    "ap", "aq", "ar", "are", "as", "at", "au", "aw", "ax", "ay", "az", "azm", "ba", "bab", "bah",
    "bak", "bb", "bc", "bd", "be", "bedr", "ben", "bf", "bg", "bh", "bij", "bis", "bk", "bl", "bldg",
    "blk", "bloc", "block", "bloco", "blok", "bm", "bmn", "bn", "bo", "boe", "bol", "bor", "bov",
    "box", "bp", "br", "bra", "brc", "bs", "bsa", "bu", "building", "bv", "bwn", "bx", "by", "cab",
    "cat", "cbi", "cbu", "cc", "ccz", "cd", "ce", "centre", "cfn", "cgc", "cjg", "cl", "club",
    "cottage", "cottages", "cso", "cum", "db", "dd", "df", "dia", "dvu", "ec", "ee", "eh", "em",
    "en", "esm", "ev", "fdo", "fer", "ff", "flat", "flats", "floor", "gar", "gara", "gas", "gb",
    "gg", "gr", "grg", "ha", "haus", "hh", "hl", "ho", "house", "hr", "hs", "hv", "ii", "iii",
    "int", "iv", "ix", "jab", "jf", "jj", "jms", "jtg", "ka", "kab", "kk", "kmb", "kmk", "knn",
    "koy", "kp", "kra", "ksn", "kud", "ldo", "ll", "local", "loja", "lot", "lote", "lsb", "lt",
    "mac", "mad", "mah", "mak", "mat", "mb", "mbb", "mbn", "mch", "mei", "mks", "mm", "mny", "mo",
    "mok", "mor", "msb", "mtj", "mtk", "mvd", "na", "ncc", "nij", "nn", "no", "nr", "nst", "nu",
    "nut", "of", "ofof", "old", "one", "oo", "opl", "pa", "pap", "pav", "pb", "pch", "pg", "ph",
    "phd", "pkf", "plot", "po", "pos", "pp", "pr", "pra", "pya", "qq", "quater", "ra", "rbo",
    "rear", "reisach", "rk", "rm", "rosso", "rs", "rw", "sab", "sal", "sav", "sb", "sba", "sbb",
    "sbl", "sbn", "sbx", "sc", "sch", "sco", "seb", "sep", "sf", "sgr", "sir", "sj", "sl", "sm",
    "sn", "snc", "som", "sp", "spi", "spn", "ss", "sta", "stc", "std", "stiege", "suite", "sur",
    "tam", "ter", "terrace", "tf", "th", "the", "tl", "to", "torre", "tr", "traf", "trd", "ts",
    "tt", "tu", "uhm", "unit", "utc", "vii", "wa", "wf", "wink", "wrh", "ws", "wsb", "xx", "za",
    "zh", "zona", "zu", "zw", "א", "ב", "ג", "α", "бб", "бл", "вл", "вх", "лит", "разр", "стр",
    "тп", "уч", "участок", "ა", "丁目", "之", "号", "號", "владение",
];

static STRINGS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut strings: Vec<&'static str> = COMMON_STRINGS
        .iter()
        .chain(BUILDING_PART_SYNONYMS)
        .copied()
        .collect();
    strings.sort_unstable();
    strings.dedup();
    strings
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetStatus {
    Absent,
    Prefix,
    Full,
}

/// Looks `s` up in a sorted list: a full entry, a proper prefix of an
/// entry, or neither.
fn lookup_sorted(sorted: &[&str], s: &str) -> SetStatus {
    let i = sorted.partition_point(|entry| *entry < s);
    match sorted.get(i) {
        Some(entry) if *entry == s => SetStatus::Full,
        Some(entry) if entry.starts_with(s) => SetStatus::Prefix,
        _ => SetStatus::Absent,
    }
}

fn char_kind(c: char) -> TokenKind {
    match c {
        '0'..='9' => TokenKind::Number,
        ' ' | '\t' | '"' | '\\' | '(' | ')' | '.' | '#' | '~' => TokenKind::Separator,
        ',' | '|' | ';' | '+' => TokenKind::GroupSeparator,
        '-' => TokenKind::Hyphen,
        '/' => TokenKind::Slash,
        _ => TokenKind::String,
    }
}

fn is_stop_word(s: &str, is_prefix: bool) -> bool {
    STOP_WORDS
        .iter()
        .any(|w| *w == s || (is_prefix && w.starts_with(s)))
}

fn is_short_building_synonym(c: char) -> bool {
    SHORT_BUILDING_SYNONYMS.contains(&c)
}

fn transform_string(word: &[char], out: &mut Vec<HnToken>) {
    let s: String = word.iter().collect();
    if BUILDING_PART_SYNONYMS.contains(&s.as_str()) {
        out.push(HnToken::new(s, TokenKind::BuildingPart));
    } else if word.len() == 4 && word[..3] == ['л', 'и', 'т'] {
        out.push(HnToken::new("лит", TokenKind::BuildingPart));
        out.push(HnToken::new(word[3], TokenKind::Letter));
    } else if word.len() == 2 && is_short_building_synonym(word[0]) {
        out.push(HnToken::new(word[0], TokenKind::BuildingPart));
        out.push(HnToken::new(word[1], TokenKind::Letter));
    } else if word.len() == 1 {
        let kind = if is_short_building_synonym(word[0]) {
            TokenKind::BuildingPartOrLetter
        } else {
            TokenKind::Letter
        };
        out.push(HnToken::new(s, kind));
    } else {
        out.push(HnToken::new(s, TokenKind::String));
    }
}

/// Splits `s` into typed tokens. Separators are dropped. With `is_prefix`
/// a trailing word is kept as typed and flagged as a prefix.
pub fn tokenize(s: &str, is_prefix: bool) -> Vec<HnToken> {
    let chars: Vec<char> = s.chars().flat_map(char::to_lowercase).collect();
    let mut tokens = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        let kind = char_kind(chars[i]);
        let mut j = i + 1;
        while j < chars.len() && char_kind(chars[j]) == kind {
            j += 1;
        }
        let word = &chars[i..j];
        match kind {
            TokenKind::Separator => {}
            TokenKind::String if j == chars.len() && is_prefix => {
                if word.len() == 1 {
                    tokens.push(HnToken::new(word[0], TokenKind::Letter));
                } else {
                    let mut token = HnToken::new(word.iter().collect::<String>(), TokenKind::String);
                    token.prefix = true;
                    tokens.push(token);
                }
            }
            TokenKind::String => transform_string(word, &mut tokens),
            _ => tokens.push(HnToken::new(word.iter().collect::<String>(), kind)),
        }
        i = j;
    }

    // `к` is a letter at the end or before another designator, and a
    // designator before a number.
    for i in (0..tokens.len()).rev() {
        if tokens[i].kind != TokenKind::BuildingPartOrLetter {
            continue;
        }
        match tokens.get(i + 1).map(|t| t.kind) {
            None | Some(TokenKind::BuildingPart) => tokens[i].kind = TokenKind::Letter,
            Some(TokenKind::Number) => tokens[i].kind = TokenKind::BuildingPart,
            _ => {}
        }
    }
    tokens
}

const fn is_literal(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::String | TokenKind::Letter | TokenKind::BuildingPartOrLetter
    )
}

/// Index ranges of the token groups between group separators.
fn groups(tokens: &[HnToken]) -> Vec<(usize, usize)> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        while i < tokens.len() && tokens[i].kind == TokenKind::GroupSeparator {
            i += 1;
        }
        let mut j = i;
        while j < tokens.len() && tokens[j].kind != TokenKind::GroupSeparator {
            j += 1;
        }
        if i != j {
            result.push((i, j));
        }
        i = j;
    }
    result
}

/// Keeps numbers and letters from the first number on and sorts all but
/// the first; without numbers, sorts everything. A trailing prefix token
/// is dropped.
fn simplify(tokens: &mut HnParse) {
    if tokens.last().is_some_and(|t| t.prefix) {
        tokens.pop();
    }
    let kept: HnParse = match tokens.iter().position(|t| t.kind == TokenKind::Number) {
        Some(first) => tokens[first..]
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Number | TokenKind::Letter))
            .cloned()
            .collect(),
        None => Vec::new(),
    };
    if kept.is_empty() {
        tokens.sort();
    } else {
        *tokens = kept;
        tokens[1..].sort();
    }
}

/// Parses a feature's house number. `12, 14а` yields one parse per group,
/// anything more complex a single parse.
pub fn parse_house_number(s: &str) -> Vec<HnParse> {
    let tokens = tokenize(s, false);
    let groups = groups(&tokens);
    let numbers_sequence = groups.iter().all(|&(i, j)| match j - i {
        1 => tokens[i].kind == TokenKind::Number,
        2 => tokens[i].kind == TokenKind::Number && is_literal(tokens[i + 1].kind),
        _ => false,
    });

    let mut parses: Vec<HnParse> = if numbers_sequence {
        groups.iter().map(|&(i, j)| tokens[i..j].to_vec()).collect()
    } else {
        vec![tokens]
    };
    for parse in &mut parses {
        simplify(parse);
    }
    parses
}

/// Parses the house number part of a query.
pub fn parse_query(query: &str, is_prefix: bool) -> HnParse {
    let mut parse = tokenize(query, is_prefix);
    simplify(&mut parse);
    parse
}

/// True when sorted `needle` is a subsequence of sorted `haystack`.
fn is_subsequence(haystack: &[HnToken], needle: &[HnToken]) -> bool {
    let mut rest = haystack.iter();
    'outer: for n in needle {
        for h in rest.by_ref() {
            if h < n {
                continue;
            }
            if h == n {
                continue 'outer;
            }
            return false;
        }
        return false;
    }
    true
}

pub fn house_numbers_match(house_number: &str, query: &[HnToken]) -> bool {
    let (Some(first_hn), Some(first_query)) = (house_number.chars().next(), query.first()) else {
        return false;
    };
    if let Some(first_q) = first_query.value.chars().next()
        && first_hn.is_ascii_digit()
        && first_q.is_ascii_digit()
        && first_hn != first_q
    {
        return false;
    }

    parse_house_number(house_number).iter().any(|parse| {
        parse.first() == Some(first_query)
            && (is_subsequence(&parse[1..], &query[1..]) || is_subsequence(&query[1..], &parse[1..]))
    })
}

/// Czech and Slovak addresses carry `conscription/street` numbers; either
/// half may be queried.
pub fn house_numbers_match_conscription(house_number: &str, query: &[HnToken]) -> bool {
    match house_number.split_once('/') {
        Some((conscription, street)) => {
            house_numbers_match(conscription, query) || house_numbers_match(street, query)
        }
        None => house_numbers_match(house_number, query),
    }
}

/// Matches a query against an interpolation range `left:right`. Bounds are
/// exclusive.
pub fn house_numbers_match_range(range: &str, query: &[HnToken], interpolation: Interpolation) -> bool {
    let Some(first) = query.first().filter(|t| t.kind == TokenKind::Number) else {
        return false;
    };
    let Ok(value) = first.value.parse::<u64>() else {
        return false;
    };
    let even = value % 2 == 0;
    match interpolation {
        Interpolation::Odd if even => return false,
        Interpolation::Even if !even => return false,
        _ => {}
    }
    let Some((left, right)) = range.split_once(':') else {
        return false;
    };
    match (left.trim().parse::<u64>(), right.trim().parse::<u64>()) {
        (Ok(left), Ok(right)) => left < value && value < right,
        _ => false,
    }
}

/// Full match of a feature's address against a parsed query, choosing
/// range or conscription matching as the feature requires.
pub fn feature_matches(feature: &Feature, query: &[HnToken], conscription: bool) -> bool {
    let Some(hn) = feature.house_number.as_deref() else {
        return false;
    };
    match feature.interpolation {
        Some(interpolation) => house_numbers_match_range(hn, query, interpolation),
        None if conscription => house_numbers_match_conscription(hn, query),
        None => house_numbers_match(hn, query),
    }
}

/// Countries whose house numbers use the conscription form.
pub fn uses_conscription_numbers(country: Option<&str>) -> bool {
    matches!(country, Some("CZ" | "SK"))
}

fn pattern_char(kind: TokenKind) -> Option<char> {
    match kind {
        TokenKind::Number => Some('N'),
        TokenKind::String => Some('S'),
        TokenKind::BuildingPart => Some('B'),
        TokenKind::Letter => Some('L'),
        TokenKind::BuildingPartOrLetter => Some('U'),
        _ => None,
    }
}

fn looks_good(s: &str, is_prefix: bool, patterns: &[&str]) -> bool {
    let mut pattern = String::new();
    for (j, token) in tokenize(s, is_prefix).iter().enumerate() {
        match token.kind {
            TokenKind::String => {
                if is_stop_word(&token.value, token.prefix) {
                    continue;
                }
                match lookup_sorted(&STRINGS, &token.value) {
                    SetStatus::Full => {}
                    SetStatus::Prefix if token.prefix => {}
                    _ => return false,
                }
            }
            TokenKind::Letter if j == 0 && is_stop_word(&token.value, token.prefix) => continue,
            _ => {}
        }
        if let Some(c) = pattern_char(token.kind) {
            pattern.push(c);
        }
    }
    patterns.iter().any(|p| p.starts_with(pattern.as_str()))
}

/// True when `s` looks like a house number, or like the start of one when
/// `is_prefix` is set.
pub fn looks_like_house_number(s: &str, is_prefix: bool) -> bool {
    looks_good(s, is_prefix, PATTERNS)
}
