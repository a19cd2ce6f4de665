//! Wire models shared by the REST collaborators and the socket codec.

use serde::{Deserialize, Serialize};
use sonic_rs::Value;

/// Placeholder the server expects for region/country on client-originated sends.
pub const UNKNOWN_REGION: &str = "未知";

/// Sender id carried only by optimistic local copies; never transmitted.
pub const LOCAL_ECHO_SENDER_ID: &str = "me";

/// Identity record returned by the login profile endpoint.
///
/// Immutable for the lifetime of a connection; a reconnect fetches a fresh copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    #[serde(deserialize_with = "string_or_number::required")]
    pub id: String,
    pub user_name: Option<String>,
    pub user_avatar: Option<String>,
    pub user_profile: Option<String>,
    pub email: Option<String>,
    pub user_role: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub points: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub used_points: i64,
    pub avatar_framer_url: Option<String>,
    #[serde(deserialize_with = "string_or_number::optional")]
    pub title_id: Option<String>,
    pub title_id_list: Option<Value>,
    pub level: Option<i64>,
    pub last_sign_in_date: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub bind_platforms: Vec<Value>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.user_role.as_deref() == Some("admin")
    }

    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or("我")
    }
}

/// Snapshot of the sending user embedded in every chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sender {
    #[serde(deserialize_with = "string_or_number::required")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(deserialize_with = "null_as_default")]
    pub level: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub points: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_admin: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(
        rename = "avatarFramerUrl",
        alias = "avatarFrameUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_frame_url: Option<String>,
    #[serde(
        deserialize_with = "string_or_number::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub title_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_id_list: Option<Value>,
}

impl Sender {
    /// Copy the identity fields of `profile` into an outbound sender snapshot.
    pub fn from_profile(profile: Option<&Profile>) -> Self {
        let Some(profile) = profile else {
            return Self {
                id: "unknown".to_string(),
                name: "我".to_string(),
                level: 1,
                region: UNKNOWN_REGION.to_string(),
                country: UNKNOWN_REGION.to_string(),
                title_id: Some("0".to_string()),
                ..Self::default()
            };
        };
        Self {
            id: if profile.id.is_empty() {
                "unknown".to_string()
            } else {
                profile.id.clone()
            },
            name: profile.display_name().to_string(),
            avatar: profile.user_avatar.clone().unwrap_or_default(),
            level: profile.level.filter(|level| *level > 0).unwrap_or(1),
            points: profile.points,
            is_admin: profile.is_admin(),
            region: UNKNOWN_REGION.to_string(),
            country: UNKNOWN_REGION.to_string(),
            avatar_frame_url: profile.avatar_framer_url.clone(),
            title_id: Some(profile.title_id.clone().unwrap_or_else(|| "0".to_string())),
            title_id_list: profile.title_id_list.clone(),
        }
    }

    pub fn is_local_echo(&self) -> bool {
        self.id == LOCAL_ECHO_SENDER_ID
    }
}

/// One chat-room message, as sent, echoed, or listed by the history endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    #[serde(deserialize_with = "string_or_number::required")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sender: Sender,
    #[serde(deserialize_with = "string_or_number::required")]
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Presence roster entry. The presence protocol is disabled server-side; the type
/// exists so consumers can register user-online handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnlineUser {
    #[serde(deserialize_with = "string_or_number::required")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(deserialize_with = "null_as_default")]
    pub level: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub points: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_admin: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
}

/// `{ code, data, message }` wrapper used by every REST endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    pub code: Option<i64>,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// Explicit `null` reads as the field's default, like a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Ids and timestamps arrive as strings from some endpoints and as numbers from others.
pub(crate) mod string_or_number {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
        Other(IgnoredAny),
    }

    impl Raw {
        fn into_string(self) -> Option<String> {
            match self {
                Raw::Text(text) => Some(text),
                Raw::Signed(n) => Some(n.to_string()),
                Raw::Unsigned(n) => Some(n.to_string()),
                Raw::Float(n) => Some(n.to_string()),
                Raw::Other(_) => None,
            }
        }
    }

    pub fn required<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Raw>::deserialize(deserializer)?;
        Ok(raw.and_then(Raw::into_string).unwrap_or_default())
    }

    pub fn optional<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Raw>::deserialize(deserializer)?;
        Ok(raw.and_then(Raw::into_string))
    }
}
