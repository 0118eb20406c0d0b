//! Post language detection and normalization
//!
//! Detection is best-effort: it maps the text to a 2-letter ISO 639-1 code
//! or gives up. Callers can always override the result.

use crate::error::{Result, ValidationError};

/// Black-box text -> ISO 639-1 detector
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

/// Detector backed by the `whatlang` trigram model
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        let code = iso639_1(info.lang().code());
        tracing::debug!(
            detected = info.lang().code(),
            confidence = info.confidence(),
            "Detected post language"
        );
        code.map(str::to_string)
    }
}

/// Detector that always answers the same thing (handy for tests and for a
/// fixed preferred language)
#[derive(Debug, Clone, Default)]
pub struct FixedLanguage(pub Option<String>);

impl LanguageDetector for FixedLanguage {
    fn detect(&self, _text: &str) -> Option<String> {
        self.0.clone()
    }
}

/// Trim and lowercase a language code, rejecting anything that is not two
/// ASCII letters
pub fn normalize_language(language: &str) -> Result<String> {
    let cleaned = language.trim().to_lowercase();
    if cleaned.len() == 2 && cleaned.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(cleaned)
    } else {
        Err(ValidationError::InvalidLanguage(language.to_string()).into())
    }
}

fn iso639_1(iso639_3: &str) -> Option<&'static str> {
    let code = match iso639_3 {
        "afr" => "af",
        "aka" => "ak",
        "amh" => "am",
        "ara" => "ar",
        "aze" => "az",
        "bel" => "be",
        "ben" => "bn",
        "bul" => "bg",
        "cat" => "ca",
        "ces" => "cs",
        "cmn" => "zh",
        "dan" => "da",
        "deu" => "de",
        "ell" => "el",
        "eng" => "en",
        "epo" => "eo",
        "est" => "et",
        "fin" => "fi",
        "fra" => "fr",
        "guj" => "gu",
        "heb" => "he",
        "hin" => "hi",
        "hrv" => "hr",
        "hun" => "hu",
        "hye" => "hy",
        "ind" => "id",
        "ita" => "it",
        "jav" => "jv",
        "jpn" => "ja",
        "kan" => "kn",
        "kat" => "ka",
        "khm" => "km",
        "kor" => "ko",
        "lat" => "la",
        "lav" => "lv",
        "lit" => "lt",
        "mal" => "ml",
        "mar" => "mr",
        "mkd" => "mk",
        "mya" => "my",
        "nep" => "ne",
        "nld" => "nl",
        "nob" => "nb",
        "ori" => "or",
        "pan" => "pa",
        "pes" => "fa",
        "pol" => "pl",
        "por" => "pt",
        "ron" => "ro",
        "rus" => "ru",
        "sin" => "si",
        "slk" => "sk",
        "slv" => "sl",
        "sna" => "sn",
        "spa" => "es",
        "srp" => "sr",
        "swe" => "sv",
        "tam" => "ta",
        "tel" => "te",
        "tgl" => "tl",
        "tha" => "th",
        "tuk" => "tk",
        "tur" => "tr",
        "ukr" => "uk",
        "urd" => "ur",
        "uzb" => "uz",
        "vie" => "vi",
        "yid" => "yi",
        "zul" => "zu",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english() {
        let detector = WhatlangDetector;
        assert_eq!(
            detector.detect("hello world, the answer is 42").as_deref(),
            Some("en")
        );
    }

    #[test]
    fn test_detects_portuguese() {
        let detector = WhatlangDetector;
        assert_eq!(
            detector
                .detect("Olá, mundo! Hoje o dia está lindo e eu vou passear na praia com os meus amigos.")
                .as_deref(),
            Some("pt")
        );
    }

    #[test]
    fn test_empty_text_has_no_language() {
        assert_eq!(WhatlangDetector.detect(""), None);
    }

    #[test]
    fn test_fixed_language() {
        assert_eq!(FixedLanguage(Some("pt".into())).detect("hello").as_deref(), Some("pt"));
        assert_eq!(FixedLanguage(None).detect("hello"), None);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language(" PT ").unwrap(), "pt");
        assert_eq!(normalize_language("en").unwrap(), "en");
    }

    #[test]
    fn test_normalize_language_rejects_invalid_codes() {
        for invalid in ["", " ", "N", "xpto", "p1", "ééé"] {
            assert!(normalize_language(invalid).is_err(), "{invalid:?} should be rejected");
        }
    }

    #[test]
    fn test_iso639_mapping() {
        assert_eq!(iso639_1("eng"), Some("en"));
        assert_eq!(iso639_1("cmn"), Some("zh"));
        assert_eq!(iso639_1("xxx"), None);
    }
}
