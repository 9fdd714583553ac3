use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short-lived speech service authorization.
///
/// Both fields are `None` when no valid token could be obtained. Callers must
/// check [`Credential::as_pair`] before using it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub auth_token: Option<String>,
    pub region: Option<String>,
}

impl Credential {
    pub fn new(auth_token: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            auth_token: Some(auth_token.into()),
            region: Some(region.into()),
        }
    }

    /// The "no token" state.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Token and region, only when both are present and non-empty.
    pub fn as_pair(&self) -> Option<(&str, &str)> {
        match (self.auth_token.as_deref(), self.region.as_deref()) {
            (Some(token), Some(region)) if !token.is_empty() && !region.is_empty() => {
                Some((token, region))
            }
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.as_pair().is_some()
    }
}

/// Which pipeline currently holds the avatar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarState {
    #[default]
    Idle,
    Listening,
    Speaking,
}

/// Avatar voice gender; selects the synthesis voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarGender {
    #[default]
    Male,
    Female,
}

impl std::str::FromStr for AvatarGender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(format!("unknown gender '{other}' (expected male or female)")),
        }
    }
}

/// Chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single entry of the chat history sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Tutoring mode; decides which system prompt wraps the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Assessment,
    Training,
    #[default]
    Free,
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "assessment" => Ok(Self::Assessment),
            "training" => Ok(Self::Training),
            "free" => Ok(Self::Free),
            other => Err(format!("unknown chat mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_pair() {
        let cred = Credential::new("tok", "westeurope");
        assert_eq!(cred.as_pair(), Some(("tok", "westeurope")));
        assert!(cred.is_available());
    }

    #[test]
    fn test_unavailable_credential() {
        let cred = Credential::unavailable();
        assert!(cred.auth_token.is_none());
        assert!(cred.region.is_none());
        assert!(cred.as_pair().is_none());

        let half = Credential {
            auth_token: Some("tok".into()),
            region: None,
        };
        assert!(!half.is_available());

        let empty = Credential::new("", "eastus");
        assert!(!empty.is_available());
    }

    #[test]
    fn test_chat_message_serialization() {
        let msg = ChatMessage::system("be kind");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be kind");
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Female".parse::<AvatarGender>().unwrap(), AvatarGender::Female);
        assert!("robot".parse::<AvatarGender>().is_err());
        assert_eq!("training".parse::<ChatMode>().unwrap(), ChatMode::Training);
        assert_eq!(AvatarState::default(), AvatarState::Idle);
    }
}
