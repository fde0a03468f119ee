use serde::{Deserialize, Serialize};

/// How a manager's reply to a pending confirmation is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyIntent {
    Confirm,
    Cancel,
    Ambiguous,
}

/// Confirm/cancel phrase lists are locale-specific data, not logic. The
/// defaults are English; deployments swap them through configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseVocabulary {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
}

impl Default for PhraseVocabulary {
    fn default() -> Self {
        Self {
            confirm: [
                "yes",
                "yes please",
                "confirm",
                "confirmed",
                "ok",
                "okay",
                "go ahead",
                "do it",
                "proceed",
                "i will call them",
                "i'll call them",
            ]
            .iter()
            .map(|phrase| (*phrase).to_owned())
            .collect(),
            cancel: [
                "no",
                "cancel",
                "wait",
                "stop",
                "don't",
                "dont",
                "nevermind",
                "never mind",
                "leave it",
                "forget it",
            ]
            .iter()
            .map(|phrase| (*phrase).to_owned())
            .collect(),
        }
    }
}

impl PhraseVocabulary {
    /// Case-insensitive match against the phrase lists. A reply matching both
    /// lists, or neither, is ambiguous and must re-prompt without changing
    /// state.
    pub fn classify(&self, reply: &str) -> ReplyIntent {
        let tokens = tokenize(reply);
        if tokens.is_empty() {
            return ReplyIntent::Ambiguous;
        }

        let confirms = self.confirm.iter().any(|phrase| contains_phrase(&tokens, phrase));
        let cancels = self.cancel.iter().any(|phrase| contains_phrase(&tokens, phrase));

        match (confirms, cancels) {
            (true, false) => ReplyIntent::Confirm,
            (false, true) => ReplyIntent::Cancel,
            _ => ReplyIntent::Ambiguous,
        }
    }
}

/// Keyword filter deciding whether a customer question is about the business
/// at all. Unknown topics default to on-topic so real questions are never
/// silently redirected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFilter {
    pub business_keywords: Vec<String>,
    pub off_topic_markers: Vec<String>,
}

impl Default for TopicFilter {
    fn default() -> Self {
        Self {
            business_keywords: [
                "open", "close", "closed", "hour", "hours", "book", "booking", "appointment",
                "reserve", "reservation", "price", "cost", "menu", "location", "address",
                "available", "availability", "service", "reschedule", "today", "tomorrow",
                "weekend",
            ]
            .iter()
            .map(|keyword| (*keyword).to_owned())
            .collect(),
            off_topic_markers: [
                "weather forecast",
                "politics",
                "tell me a joke",
                "lottery",
                "homework",
                "crypto",
                "stock market",
                "football score",
            ]
            .iter()
            .map(|marker| (*marker).to_owned())
            .collect(),
        }
    }
}

impl TopicFilter {
    pub fn is_on_topic(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();

        if self.business_keywords.iter().any(|keyword| lowered.contains(keyword.as_str())) {
            return true;
        }
        if self.off_topic_markers.iter().any(|marker| lowered.contains(marker.as_str())) {
            return false;
        }

        // Safe default: treat unrecognized questions as business questions.
        true
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|character: char| !character.is_alphanumeric() && character != '\'')
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Whole-phrase match: the phrase's tokens must appear as a contiguous run in
/// the reply's tokens, so "no" never fires inside "now" or "notice".
fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let phrase_tokens = tokenize(phrase);
    if phrase_tokens.is_empty() || phrase_tokens.len() > tokens.len() {
        return false;
    }
    tokens.windows(phrase_tokens.len()).any(|window| window == phrase_tokens.as_slice())
}

#[cfg(test)]
mod tests {
    use super::{PhraseVocabulary, ReplyIntent, TopicFilter};

    #[test]
    fn plain_yes_and_no_classify() {
        let vocabulary = PhraseVocabulary::default();
        assert_eq!(vocabulary.classify("Yes"), ReplyIntent::Confirm);
        assert_eq!(vocabulary.classify("no"), ReplyIntent::Cancel);
        assert_eq!(vocabulary.classify("CONFIRM."), ReplyIntent::Confirm);
    }

    #[test]
    fn multi_word_phrases_match_inside_longer_replies() {
        let vocabulary = PhraseVocabulary::default();
        assert_eq!(
            vocabulary.classify("ok go ahead, I will call them myself"),
            ReplyIntent::Confirm
        );
        assert_eq!(vocabulary.classify("actually never mind that"), ReplyIntent::Cancel);
    }

    #[test]
    fn unrelated_or_mixed_replies_are_ambiguous() {
        let vocabulary = PhraseVocabulary::default();
        assert_eq!(vocabulary.classify("what bookings?"), ReplyIntent::Ambiguous);
        assert_eq!(vocabulary.classify("yes... no, wait"), ReplyIntent::Ambiguous);
        assert_eq!(vocabulary.classify(""), ReplyIntent::Ambiguous);
    }

    #[test]
    fn phrase_tokens_do_not_fire_inside_other_words() {
        let vocabulary = PhraseVocabulary::default();
        // "no" must not match inside "now"; nothing else matches either.
        assert_eq!(vocabulary.classify("now is a bad time to ask"), ReplyIntent::Ambiguous);
    }

    #[test]
    fn business_keywords_are_on_topic() {
        let filter = TopicFilter::default();
        assert!(filter.is_on_topic("Are you open on Sunday?"));
        assert!(filter.is_on_topic("how much does a booking cost"));
    }

    #[test]
    fn off_topic_markers_redirect_without_business_context() {
        let filter = TopicFilter::default();
        assert!(!filter.is_on_topic("can you tell me a joke"));
        // Off-topic marker alongside a business keyword stays on-topic.
        assert!(filter.is_on_topic("tell me a joke about your opening hours"));
    }

    #[test]
    fn unknown_topics_default_to_on_topic() {
        let filter = TopicFilter::default();
        assert!(filter.is_on_topic("do you cater for gluten free"));
    }
}
