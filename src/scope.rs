use serde::{Deserialize, Serialize};
use std::fmt;

/// An authenticated identity as the chat core sees it: a stable id and a
/// display name. Everything else the auth provider knows stays with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub display_name: String,
}

impl Principal {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
        }
    }
}

/// The identity context that prefixes every storage path. A session's path
/// is fixed at creation time; it does not migrate when the scope later
/// signs in or out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserScope {
    User(Principal),
    Guest,
}

impl UserScope {
    pub fn is_guest(&self) -> bool {
        matches!(self, UserScope::Guest)
    }

    pub fn display_name(&self) -> &str {
        match self {
            UserScope::User(p) => &p.display_name,
            UserScope::Guest => "Guest",
        }
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserScope::User(p) => write!(f, "{} ({})", p.display_name, p.uid),
            UserScope::Guest => write!(f, "Guest"),
        }
    }
}
