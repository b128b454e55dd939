use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} variant: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` over the serde names of a
/// fieldless enum so the store and the wire agree on spelling.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    View,
    Match,
    Unlike,
    Message,
}

string_enum!(NotificationKind, "notification type", {
    Like => "like",
    View => "view",
    Match => "match",
    Unlike => "unlike",
    Message => "message",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

string_enum!(Gender, "gender", {
    Male => "male",
    Female => "female",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Heterosexual,
    Homosexual,
    Bisexual,
}

string_enum!(Preference, "preference", {
    Heterosexual => "heterosexual",
    Homosexual => "homosexual",
    Bisexual => "bisexual",
});

/// Where a user's credentials come from. `Local` is the only provider that
/// carries a password hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
    Facebook,
    #[serde(rename = "42")]
    FortyTwo,
}

string_enum!(AuthProvider, "auth provider", {
    Local => "local",
    Google => "google",
    Facebook => "facebook",
    FortyTwo => "42",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

string_enum!(PresenceStatus, "presence status", {
    Online => "online",
    Offline => "offline",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_name() {
        for kind in [
            NotificationKind::Like,
            NotificationKind::View,
            NotificationKind::Match,
            NotificationKind::Unlike,
            NotificationKind::Message,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
        assert_eq!(serde_json::to_string(&AuthProvider::FortyTwo).unwrap(), "\"42\"");
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let err = "poke".parse::<NotificationKind>().unwrap_err();
        assert_eq!(err.value, "poke");
    }
}
