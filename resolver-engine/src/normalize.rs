//! Normalization library
//!
//! Pure, side-effect-free transforms turning raw source identifiers and
//! names into canonical comparable forms. Everything here is total:
//! invalid input yields "no match", never an error.

use once_cell::sync::Lazy;
use regex::Regex;

/// Already-hyphenated shape: `PREFIX-NUMBER`
static CODE_HYPHENATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9a-z]+)-0*([0-9]+)$").unwrap());

/// Digit-prefixed shape without hyphen: `NNNLETTERS+NUMBER` (e.g. 300mium01359)
static CODE_DIGIT_PREFIXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{3,4}[a-z]+)0*([0-9]+)$").unwrap());

/// Letters-only shape without hyphen: `LETTERS+NUMBER` (e.g. ssis00865)
static CODE_LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([a-z]+)0*([0-9]+)$").unwrap());

/// Underscore-delimited noise tag (e.g. the `h_` in `h_1234abc00123`)
static UNDERSCORE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-z]+_").unwrap());

/// Source-issued numeric tag preceding the letter prefix
static LEADING_NUMERIC_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{3,4}").unwrap());

/// Bracketed maker code embedded in a title, e.g. `[SSIS-865]`
static BRACKETED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([0-9A-Za-z]+-?[0-9A-Za-z]+)\]").unwrap());

/// Normalize a raw maker product code to canonical `PREFIX-NUMBER` form.
///
/// Strips known noise prefixes, then matches one of four shapes:
/// hyphenated, digit-prefixed, letters-only, and the digit-prefixed
/// variant after stripping a single leading digit. Leading zeros in the
/// numeric part are stripped (empty becomes "0"). Returns `None` when no
/// shape matches; never panics.
pub fn normalize_product_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_lowercase();
    if code.is_empty() || code.len() > 32 {
        return None;
    }

    // Underscore-delimited tag, then a source-issued numeric tag before
    // the letter prefix: h_1234abc00123 -> 1234abc00123 -> abc00123
    let mut working = code.clone();
    if UNDERSCORE_TAG.is_match(&working) {
        working = UNDERSCORE_TAG.replace(&working, "").to_string();
        if let Some(tag) = LEADING_NUMERIC_TAG.find(&working) {
            let stripped = &working[tag.end()..];
            if CODE_LETTERS.is_match(stripped) {
                working = stripped.to_string();
            }
        }
    }

    if let Some(result) = match_code_shape(&working) {
        return Some(result);
    }

    // A single leading stray digit used by some sources
    if working.starts_with(|c: char| c.is_ascii_digit()) {
        if let Some(result) = match_code_shape(&working[1..]) {
            return Some(result);
        }
    }

    None
}

/// Try the three structural shapes against an already-cleaned string
fn match_code_shape(code: &str) -> Option<String> {
    for pattern in [&*CODE_HYPHENATED, &*CODE_DIGIT_PREFIXED, &*CODE_LETTERS] {
        if let Some(caps) = pattern.captures(code) {
            let prefix = &caps[1];
            // A code prefix carries at least one letter
            if !prefix.chars().any(|c| c.is_ascii_alphabetic()) {
                continue;
            }
            let number = caps[2].trim_start_matches('0');
            let number = if number.is_empty() { "0" } else { number };
            return Some(format!("{}-{}", prefix.to_uppercase(), number));
        }
    }
    None
}

/// Extract a maker code embedded in a title as `[CODE]`
pub fn extract_bracketed_code(title: &str) -> Option<String> {
    let caps = BRACKETED_CODE.captures(title)?;
    normalize_product_code(&caps[1])
}

/// Punctuation and bracket characters removed from titles, ASCII and
/// full-width forms both
const TITLE_NOISE: &[char] = &[
    '【', '】', '「', '」', '『', '』', '(', ')', '（', '）', '[', ']', '〜', '~', '・', '･',
    '!', '！', '?', '？', '。', '、', ',', '.', ';', ':', '"', '\'', '&', '★', '☆', '※',
];

/// Normalize a title for comparison: strip all whitespace (full- and
/// half-width) and a fixed punctuation set, lowercase the remainder.
pub fn normalize_title(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !TITLE_NOISE.contains(c))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Separator glyphs removed from performer names
const NAME_NOISE: &[char] = &['・', '･', '/', '／', '(', ')', '（', '）'];

/// Normalize a performer name: strip whitespace and separator glyphs,
/// lowercase.
pub fn normalize_performer_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !NAME_NOISE.contains(c))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Readings for kanji common in Japanese personal names. Readings are
/// stored unvoiced; the dakuten fold below makes rendaku variants
/// (田=た vs 山田=やまだ) collapse to the same key.
const NAME_KANJI_READINGS: &[(char, &str)] = &[
    ('山', "やま"),
    ('田', "た"),
    ('川', "かわ"),
    ('中', "なか"),
    ('村', "むら"),
    ('本', "もと"),
    ('木', "き"),
    ('林', "はやし"),
    ('森', "もり"),
    ('原', "はら"),
    ('野', "の"),
    ('井', "い"),
    ('石', "いし"),
    ('松', "まつ"),
    ('高', "たか"),
    ('小', "こ"),
    ('大', "おお"),
    ('上', "うえ"),
    ('下', "した"),
    ('藤', "ふし"),
    ('佐', "さ"),
    ('伊', "い"),
    ('加', "か"),
    ('波', "は"),
    ('瀬', "せ"),
    ('戸', "と"),
    ('辺', "へ"),
    ('部', "へ"),
    ('花', "はな"),
    ('華', "はな"),
    ('子', "こ"),
    ('美', "み"),
    ('愛', "あい"),
    ('奈', "な"),
    ('菜', "な"),
    ('結', "ゆい"),
    ('優', "ゆう"),
    ('友', "とも"),
    ('香', "か"),
    ('里', "り"),
    ('莉', "り"),
    ('絵', "え"),
    ('恵', "え"),
    ('葉', "は"),
    ('音', "ね"),
    ('桜', "さくら"),
    ('咲', "さき"),
    ('春', "はる"),
    ('夏', "なつ"),
    ('雪', "ゆき"),
    ('月', "つき"),
    ('星', "ほし"),
    ('泉', "いすみ"),
    ('沢', "さわ"),
    ('島', "しま"),
    ('岡', "おか"),
    ('谷', "たに"),
    ('橋', "はし"),
    ('葵', "あおい"),
];

/// Fold one katakana char to hiragana; other chars pass through
fn katakana_to_hiragana(c: char) -> char {
    match c {
        'ァ'..='ヶ' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        _ => c,
    }
}

/// Fold voiced kana to their unvoiced base (が->か, ば/ぱ->は, ゔ->う)
fn fold_dakuten(c: char) -> char {
    match c {
        'が' => 'か', 'ぎ' => 'き', 'ぐ' => 'く', 'げ' => 'け', 'ご' => 'こ',
        'ざ' => 'さ', 'じ' => 'し', 'ず' => 'す', 'ぜ' => 'せ', 'ぞ' => 'そ',
        'だ' => 'た', 'ぢ' => 'ち', 'づ' => 'つ', 'で' => 'て', 'ど' => 'と',
        'ば' | 'ぱ' => 'は', 'び' | 'ぴ' => 'ひ', 'ぶ' | 'ぷ' => 'ふ',
        'べ' | 'ぺ' => 'へ', 'ぼ' | 'ぽ' => 'ほ',
        'ゔ' => 'う',
        _ => c,
    }
}

/// Generate the dedup-candidate key for a performer name.
///
/// Collapses script variants so the same name spelled in two writing
/// systems lands on one key: katakana is folded to hiragana, name kanji
/// are replaced by their common readings, the long-vowel mark is dropped
/// and voiced kana are folded to their unvoiced base. Two performers
/// sharing a key are dedup *candidates*, not automatic merges.
pub fn generate_normalized_key(name: &str) -> String {
    let mut folded = String::with_capacity(name.len() * 2);
    for c in name.chars() {
        if c == 'ー' || c == 'ｰ' {
            continue;
        }
        let c = katakana_to_hiragana(c);
        match NAME_KANJI_READINGS.iter().find(|(k, _)| *k == c) {
            Some((_, reading)) => folded.push_str(reading),
            None => folded.push(c),
        }
    }
    let folded: String = folded.chars().map(fold_dakuten).collect();
    normalize_performer_name(&folded)
}

/// Explicit placeholder markers seen in free-text performer labels
const FAKE_NAME_MARKERS: &[&str] = &[
    "素人",
    "非公開",
    "未公開",
    "未公表",
    "名無し",
    "amateur",
    "unpublished",
    "placeholder",
    "anonymous",
];

/// Age marker not part of a proper name: `24歳`, `(24)`, `（24）`, `, 24,`
/// and the like. Delimiters are required; a bare number inside a name
/// (stage names like "AKB48") is not an age marker.
static AGE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[1-6][0-9]\s*歳|\(\s*[1-6][0-9]\s*\)|（\s*[1-6][0-9]\s*）|[,、]\s*[1-6][0-9]\s*[,、])")
        .unwrap()
});

/// True when the string matches placeholder conventions: an embedded age
/// marker or an explicit non-identity label. Such performers are merged
/// into a real identity once one is discovered elsewhere.
pub fn is_fake_performer_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    if FAKE_NAME_MARKERS.iter().any(|m| lowered.contains(m)) {
        return true;
    }
    AGE_MARKER.is_match(&lowered)
}

/// Normalize a performer-name list and intersect as sets. Used for
/// overlap scoring; set semantics (not substring matching) avoid false
/// positives from shared honorifics.
pub fn normalized_name_set(names: &[String]) -> std::collections::HashSet<String> {
    names
        .iter()
        .map(|n| normalize_performer_name(n))
        .filter(|n| !n.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_letters_only_shape() {
        assert_eq!(normalize_product_code("ssis00865").as_deref(), Some("SSIS-865"));
        assert_eq!(normalize_product_code("abp123").as_deref(), Some("ABP-123"));
        assert_eq!(normalize_product_code("ABP00001").as_deref(), Some("ABP-1"));
    }

    #[test]
    fn code_digit_prefixed_shape() {
        assert_eq!(
            normalize_product_code("300mium01359").as_deref(),
            Some("300MIUM-1359")
        );
        assert_eq!(
            normalize_product_code("259luxu1234").as_deref(),
            Some("259LUXU-1234")
        );
    }

    #[test]
    fn code_underscore_tag_stripped() {
        assert_eq!(
            normalize_product_code("h_1234abc00123").as_deref(),
            Some("ABC-123")
        );
        assert_eq!(
            normalize_product_code("h_086mism00123").as_deref(),
            Some("MISM-123")
        );
    }

    #[test]
    fn code_already_hyphenated() {
        assert_eq!(normalize_product_code("SSIS-865").as_deref(), Some("SSIS-865"));
        assert_eq!(normalize_product_code("ssis-00865").as_deref(), Some("SSIS-865"));
        assert_eq!(
            normalize_product_code("300MIUM-1359").as_deref(),
            Some("300MIUM-1359")
        );
    }

    #[test]
    fn code_single_leading_digit_stripped() {
        assert_eq!(normalize_product_code("1start00123").as_deref(), Some("START-123"));
    }

    #[test]
    fn code_invalid_input_is_none() {
        assert_eq!(normalize_product_code("???"), None);
        assert_eq!(normalize_product_code(""), None);
        assert_eq!(normalize_product_code("12345678"), None);
        assert_eq!(normalize_product_code("日本語タイトル"), None);
        assert_eq!(normalize_product_code(&"x".repeat(64)), None);
    }

    #[test]
    fn code_normalization_is_idempotent() {
        for raw in ["ssis00865", "300mium01359", "h_1234abc00123", "abp-0042", "1fset00777"] {
            let once = normalize_product_code(raw).unwrap();
            let twice = normalize_product_code(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn code_zero_numeric_part() {
        assert_eq!(normalize_product_code("abc-000").as_deref(), Some("ABC-0"));
    }

    #[test]
    fn bracketed_code_extraction() {
        assert_eq!(
            extract_bracketed_code("【新作】素敵なタイトル [SSIS-865] 独占配信").as_deref(),
            Some("SSIS-865")
        );
        assert_eq!(extract_bracketed_code("no code here"), None);
    }

    #[test]
    fn title_normalization_strips_space_and_punctuation() {
        assert_eq!(normalize_title("Hello, World!"), "helloworld");
        assert_eq!(normalize_title("【新作】タイトル 第1巻"), "新作タイトル第1巻");
        // Full-width space
        assert_eq!(normalize_title("a\u{3000}b"), "ab");
        // Full-width brackets and punctuation
        assert_eq!(normalize_title("タイトル（限定版）！"), "タイトル限定版");
    }

    #[test]
    fn performer_name_normalization() {
        assert_eq!(normalize_performer_name("Yui Hatano"), "yuihatano");
        assert_eq!(normalize_performer_name("波多野 結衣"), "波多野結衣");
        assert_eq!(normalize_performer_name("A・B"), "ab");
        assert_eq!(normalize_performer_name("山田花子（やまだはなこ）"), "山田花子やまだはなこ");
    }

    #[test]
    fn normalized_key_collapses_scripts() {
        // Kanji and katakana spellings of the same name share a key
        assert_eq!(
            generate_normalized_key("山田花子"),
            generate_normalized_key("ヤマダ ハナコ")
        );
        // Long-vowel mark is ignored
        assert_eq!(
            generate_normalized_key("ユウキ"),
            generate_normalized_key("ゆうき")
        );
        // Different names stay apart
        assert_ne!(
            generate_normalized_key("山田花子"),
            generate_normalized_key("川村美月")
        );
    }

    #[test]
    fn fake_name_detection() {
        assert!(is_fake_performer_name("Woman, 24, office worker"));
        assert!(is_fake_performer_name("素人娘"));
        assert!(is_fake_performer_name("ゆき(仮名・非公開)"));
        assert!(is_fake_performer_name("みさき 26歳"));
        assert!(is_fake_performer_name("ゆか(25)"));
        assert!(is_fake_performer_name("あい（30）"));
        assert!(!is_fake_performer_name("Yui Hatano"));
        assert!(!is_fake_performer_name("山田花子"));
    }

    #[test]
    fn bare_digits_in_a_name_are_not_an_age_marker() {
        assert!(!is_fake_performer_name("AKB48"));
        assert!(!is_fake_performer_name("Especia21"));
        assert!(!is_fake_performer_name("lovely2 unit 16"));
    }

    #[test]
    fn name_set_intersection_uses_set_semantics() {
        let a = normalized_name_set(&["Yui Hatano".to_string(), "山田 花子".to_string()]);
        let b = normalized_name_set(&["yuihatano".to_string()]);
        assert_eq!(a.intersection(&b).count(), 1);
    }
}
