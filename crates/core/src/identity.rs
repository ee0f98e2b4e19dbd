use serde::{Deserialize, Serialize};

/// Identifier carried in a connection report's `user_email` field.
///
/// The tunnel log writes a free-form `email:` value that may be a numeric
/// log id (reported as `user_<id>`), a plain subscription e-mail, or an id
/// that only exists inside the control plane's raw payload. Resolution tries
/// the strategies in order and never guesses: an identifier that matches no
/// mirror row is counted as an error by the collector, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserIdentifier {
    /// `user_<id>` as emitted by the tailer. Resolved against
    /// `users.short_uuid`, then against the id buried in `raw_data`.
    LogId(String),
    /// Anything else; resolved against `users.email`.
    Email(String),
}

impl UserIdentifier {
    /// Classify a raw `user_email` value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix("user_") {
            Some(id) if !id.is_empty() => Self::LogId(id.to_owned()),
            _ => Self::Email(raw.to_owned()),
        }
    }

    /// The identifier as it appeared on the wire.
    #[must_use]
    pub fn as_wire(&self) -> String {
        match self {
            Self::LogId(id) => format!("user_{id}"),
            Self::Email(email) => email.clone(),
        }
    }
}

impl std::fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_id_parses_as_log_id() {
        assert_eq!(
            UserIdentifier::parse("user_154"),
            UserIdentifier::LogId("154".to_owned())
        );
    }

    #[test]
    fn plain_value_parses_as_email() {
        assert_eq!(
            UserIdentifier::parse("alice@example.com"),
            UserIdentifier::Email("alice@example.com".to_owned())
        );
    }

    #[test]
    fn bare_prefix_is_not_a_log_id() {
        assert_eq!(
            UserIdentifier::parse("user_"),
            UserIdentifier::Email("user_".to_owned())
        );
    }

    #[test]
    fn wire_form_roundtrips() {
        for raw in ["user_42", "bob@example.com"] {
            assert_eq!(UserIdentifier::parse(raw).as_wire(), raw);
        }
    }
}
