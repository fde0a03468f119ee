/// Deterministic language tag for an inbound customer message. Only the
/// distinctions the response pipeline acts on are modeled; everything
/// non-CJK is treated as English-like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    English,
    ChineseSimplified,
    ChineseTraditional,
}

impl Language {
    /// Instruction line merged into the inference system context.
    pub fn response_instruction(&self) -> &'static str {
        match self {
            Self::English => "Respond in English.",
            Self::ChineseSimplified => "Respond in Simplified Chinese.",
            Self::ChineseTraditional => "Respond in Traditional Chinese.",
        }
    }
}

// Disjoint reference sets: each character appears in exactly one of the two.
const SIMPLIFIED_ONLY: &str =
    "请问营业时间这边东们还会话说谢预订价钱关开点后几号过车门电马区钟应该让见给对长乐书";
const TRADITIONAL_ONLY: &str =
    "請問營業時間這邊東們還會話說謝預訂價錢關開點後幾號過車門電馬區鐘應該讓見給對長樂書";

// High-frequency pairs used only to break a tie between the main sets.
const SIMPLIFIED_TIE_BREAK: &str = "么与习乡买发现";
const TRADITIONAL_TIE_BREAK: &str = "麼與習鄉買發現";

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
    )
}

fn count_in(text: &str, set: &str) -> usize {
    text.chars().filter(|c| set.contains(*c)).count()
}

/// CJK-dominant when the CJK/(CJK+alphabetic) ratio exceeds 0.3 or at least
/// two CJK codepoints are present; then Simplified vs Traditional by the
/// reference-set counts, tie-broken by the smaller distinguishing sets,
/// defaulting to Simplified.
pub fn detect_language(text: &str) -> Language {
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    if cjk == 0 {
        return Language::English;
    }

    let alphabetic = text.chars().filter(|c| c.is_alphabetic() && !is_cjk(*c)).count();
    let ratio = cjk as f64 / (cjk + alphabetic) as f64;
    if ratio <= 0.3 && cjk < 2 {
        return Language::English;
    }

    let simplified = count_in(text, SIMPLIFIED_ONLY);
    let traditional = count_in(text, TRADITIONAL_ONLY);
    if simplified > traditional {
        return Language::ChineseSimplified;
    }
    if traditional > simplified {
        return Language::ChineseTraditional;
    }

    let simplified_tb = count_in(text, SIMPLIFIED_TIE_BREAK);
    let traditional_tb = count_in(text, TRADITIONAL_TIE_BREAK);
    if traditional_tb > simplified_tb {
        Language::ChineseTraditional
    } else {
        Language::ChineseSimplified
    }
}
