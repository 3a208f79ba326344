use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Russian,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Russian => "Russian",
        }
    }
}

/// Decides which language oracle output should be written in.
///
/// `None` means "undecided"; callers then ask the oracle to match the conversation.
pub trait LanguageClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Option<Language>;
}

/// Classifies by writing system: mostly Cyrillic letters is Russian, mostly Latin is
/// English. Text with too few letters stays undecided.
#[derive(Debug, Clone, Copy)]
pub struct ScriptClassifier {
    pub min_letters: usize,
    pub threshold: f64,
}

impl Default for ScriptClassifier {
    fn default() -> Self {
        Self {
            min_letters: 20,
            threshold: 0.6,
        }
    }
}

impl LanguageClassifier for ScriptClassifier {
    fn classify(&self, text: &str) -> Option<Language> {
        let (mut cyrillic, mut latin) = (0usize, 0usize);
        for ch in text.chars().filter(|c| c.is_alphabetic()) {
            if ('\u{0400}'..='\u{04FF}').contains(&ch) {
                cyrillic += 1;
            } else if ch.is_ascii_alphabetic() {
                latin += 1;
            }
        }

        let letters = cyrillic + latin;
        if letters < self.min_letters {
            return None;
        }

        let cyrillic_share = cyrillic as f64 / letters as f64;
        if cyrillic_share >= self.threshold {
            Some(Language::Russian)
        } else if 1.0 - cyrillic_share >= self.threshold {
            Some(Language::English)
        } else {
            None
        }
    }
}

/// Never decides. Used when classification is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralClassifier;

impl LanguageClassifier for NeutralClassifier {
    fn classify(&self, _text: &str) -> Option<Language> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_classifier() {
        let classifier = ScriptClassifier::default();
        assert_eq!(
            classifier.classify("user: I have a very bad cold, the weather is awful"),
            Some(Language::English)
        );
        assert_eq!(
            classifier.classify("пользователь: У меня очень сильная простуда сегодня"),
            Some(Language::Russian)
        );
        assert_eq!(classifier.classify("ok!"), None);
    }

    #[test]
    fn test_mixed_text_is_undecided() {
        let classifier = ScriptClassifier::default();
        assert_eq!(classifier.classify("hello world again привет мир снова"), None);
    }

    #[test]
    fn test_neutral_classifier() {
        assert_eq!(NeutralClassifier.classify("anything at all here"), None);
    }
}
