use crate::{
    Result,
    constants::{CARD_ID_BYTES, MSG_UNKNOWN_CARD},
    error::Error,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use subtle::ConstantTimeEq;

/// Answers collected during a session, keyed by question id.
///
/// Sent verbatim as the JSON body of the clock request.
pub type Answers = BTreeMap<String, String>;

/// A tag scan as produced by the reader.
///
/// Immutable once emitted. The JSON form is what travels over the reader
/// process pipe, one event per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEvent {
    /// Tag identifier as returned by anti-collision.
    pub uid: Vec<u8>,

    /// Secondary data block, present when the admin sector could be read.
    pub sector: Option<Vec<u8>>,
}

impl CardEvent {
    /// Create an event without sector data.
    pub fn new(uid: Vec<u8>) -> Self {
        Self { uid, sector: None }
    }

    /// Attach the sector block read from the tag.
    pub fn with_sector(mut self, sector: Vec<u8>) -> Self {
        self.sector = Some(sector);
        self
    }

    /// Sector bytes rendered as uppercase hex, two digits per byte.
    pub fn sector_hex(&self) -> Option<String> {
        self.sector.as_deref().map(hex::encode_upper)
    }

    /// UID rendered as uppercase hex.
    pub fn uid_hex(&self) -> String {
        hex::encode_upper(&self.uid)
    }

    /// Derive the backend card id from the UID.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardUid` if the UID is empty.
    pub fn card_id(&self) -> Result<CardId> {
        CardId::from_uid(&self.uid)
    }
}

/// Card identifier used in attendance URLs.
///
/// The first four UID bytes, each rendered as two uppercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(String);

impl CardId {
    /// Build the card id from a raw UID.
    ///
    /// UIDs shorter than four bytes use every byte they have.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardUid` if the UID is empty.
    pub fn from_uid(uid: &[u8]) -> Result<Self> {
        if uid.is_empty() {
            return Err(Error::InvalidCardUid("UID is empty".to_string()));
        }
        let head = &uid[..uid.len().min(CARD_ID_BYTES)];
        Ok(CardId(hex::encode_upper(head)))
    }

    /// Get the card id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque bearer token issued by the backend.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Token(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Token {}", self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Set of configured admin card keys.
///
/// Keys are hex strings. A key shorter than the observed sector is padded on
/// the right with `'0'` before comparison; a longer key never matches.
///
/// # Security
/// Comparison runs in constant time over equal-length inputs so the admin
/// marker cannot be probed byte by byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminKeys(Vec<String>);

impl AdminKeys {
    /// Parse a comma-separated list of hex keys.
    ///
    /// Whitespace around entries is ignored, empty entries are skipped and
    /// keys are normalised to uppercase.
    ///
    /// # Errors
    /// Returns `Error::InvalidAdminKey` if an entry contains non-hex characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use timeclock_core::AdminKeys;
    ///
    /// let keys = AdminKeys::parse("12345678, abcd").unwrap();
    /// assert_eq!(keys.len(), 2);
    /// assert!(AdminKeys::parse("12G4").is_err());
    /// ```
    pub fn parse(list: &str) -> Result<Self> {
        let mut keys = Vec::new();
        for entry in list.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if !entry.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::InvalidAdminKey(entry.to_string()));
            }
            keys.push(entry.to_ascii_uppercase());
        }
        Ok(AdminKeys(keys))
    }

    /// Check whether the sector hex matches any configured key.
    ///
    /// ```
    /// use timeclock_core::AdminKeys;
    ///
    /// let keys = AdminKeys::parse("12345678").unwrap();
    /// assert!(keys.matches("1234567800000000"));
    /// assert!(!keys.matches("1234567800000001"));
    /// ```
    pub fn matches(&self, sector_hex: &str) -> bool {
        let observed = sector_hex.to_ascii_uppercase();
        let mut found = false;
        for key in &self.0 {
            if key.len() > observed.len() {
                continue;
            }
            let padded = format!("{key:0<width$}", width = observed.len());
            found |= bool::from(padded.as_bytes().ct_eq(observed.as_bytes()));
        }
        found
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One selectable answer of a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    /// Key sent back to the backend.
    pub key: String,

    /// Label shown on the button.
    pub text: String,
}

/// Survey question attached to a preflight response.
///
/// The backend sends `{"id": 3, "question": "...", "options": {"a": "Yes"}}`.
/// Numeric ids are kept as their decimal string so they can key the answer
/// map; options keep the order the backend sent them in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Question {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,

    #[serde(rename = "question", default)]
    pub text: String,

    #[serde(default, deserialize_with = "options_in_order")]
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Parse a question from one element of the preflight `data` list.
    ///
    /// # Errors
    /// Returns `Error::InvalidQuestion` if the value is not an object or
    /// lacks a usable `id`.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidQuestion(format!("not an object: {value}")));
        }
        Question::deserialize(value).map_err(|e| Error::InvalidQuestion(e.to_string()))
    }

    /// Look up an option by key.
    pub fn option(&self, key: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.key == key)
    }
}

fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid question id: {other}"))),
    }
}

fn options_in_order<'de, D>(deserializer: D) -> std::result::Result<Vec<AnswerOption>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            AnswerOption { key, text }
        })
        .collect())
}

/// Message shown for an HTTP 404 from the attendance endpoint.
///
/// Uses the backend's `detail` field when present.
pub fn unknown_card_message(body: &serde_json::Value) -> String {
    body.get("detail")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(MSG_UNKNOWN_CARD)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(&[0x04, 0xAB, 0xCD, 0xEF], "04ABCDEF")]
    #[case(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07], "01020304")]
    #[case(&[0x0A, 0x0B], "0A0B")]
    #[case(&[0x74, 0xDF, 0xA7, 0xEB, 0xE7], "74DFA7EB")]
    fn test_card_id_from_uid(#[case] uid: &[u8], #[case] expected: &str) {
        let id = CardId::from_uid(uid).unwrap();
        assert_eq!(id.as_str(), expected);
        assert_eq!(id.to_string(), expected);
    }

    #[test]
    fn test_card_id_empty_uid() {
        assert!(matches!(
            CardId::from_uid(&[]),
            Err(Error::InvalidCardUid(_))
        ));
    }

    #[test]
    fn test_card_event_sector_hex() {
        let event = CardEvent::new(vec![1, 2, 3, 4]).with_sector(vec![0x12, 0x34, 0xab]);
        assert_eq!(event.sector_hex().as_deref(), Some("1234AB"));
        assert_eq!(CardEvent::new(vec![1]).sector_hex(), None);
    }

    #[test]
    fn test_card_event_json_line() {
        let event = CardEvent::new(vec![4, 171]).with_sector(vec![0; 2]);
        let line = serde_json::to_string(&event).unwrap();
        assert_eq!(line, r#"{"uid":[4,171],"sector":[0,0]}"#);
        let back: CardEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, event);
    }

    #[rstest]
    #[case("12345678", "1234567800000000", true)]
    #[case("12345678", "12345678", true)]
    #[case("abcd", "ABCD000000", true)]
    #[case("12345678", "1234567800000001", false)]
    #[case("123456789ABC", "12345678", false)]
    #[case("", "00000000", false)]
    fn test_admin_keys_matching(#[case] list: &str, #[case] sector: &str, #[case] expected: bool) {
        let keys = AdminKeys::parse(list).unwrap();
        assert_eq!(keys.matches(sector), expected);
    }

    #[test]
    fn test_admin_keys_multiple_entries() {
        let keys = AdminKeys::parse("11, 22 ,,33").unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.matches("3300"));
        assert!(!keys.matches("4400"));
    }

    #[test]
    fn test_admin_keys_rejects_non_hex() {
        assert!(matches!(
            AdminKeys::parse("1234,xyz"),
            Err(Error::InvalidAdminKey(k)) if k == "xyz"
        ));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new("secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
        assert_eq!(token.authorization(), "Token secret");
    }

    #[test]
    fn test_question_from_value() {
        let value = json!({
            "id": 7,
            "question": "Home office?",
            "options": {"y": "Yes", "n": "No", "m": "Maybe"}
        });
        let question = Question::from_value(&value).unwrap();
        assert_eq!(question.id, "7");
        assert_eq!(question.text, "Home office?");
        let keys: Vec<_> = question.options.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["y", "n", "m"]);
        assert_eq!(question.option("n").unwrap().text, "No");
        assert!(question.option("x").is_none());
    }

    #[test]
    fn test_question_string_id_and_missing_options() {
        let question = Question::from_value(&json!({"id": "q1"})).unwrap();
        assert_eq!(question.id, "q1");
        assert!(question.options.is_empty());
    }

    #[rstest]
    #[case(json!("Kommen"))]
    #[case(json!(42))]
    #[case(json!({"question": "no id"}))]
    #[case(json!({"id": [1]}))]
    fn test_question_invalid(#[case] value: serde_json::Value) {
        assert!(Question::from_value(&value).is_err());
    }

    #[test]
    fn test_unknown_card_message() {
        assert_eq!(
            unknown_card_message(&json!({"detail": "Karte gesperrt"})),
            "Karte gesperrt"
        );
        assert_eq!(unknown_card_message(&json!(null)), MSG_UNKNOWN_CARD);
        assert_eq!(unknown_card_message(&json!({"detail": 5})), MSG_UNKNOWN_CARD);
    }
}
