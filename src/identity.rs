//! Where the channel id and authorization token come from.

/// Supplies the values the endpoint URL is built from.
pub trait IdentitySource: Send + Sync + 'static {
    /// Channel to subscribe to, `None` when it cannot be derived.
    fn channel_id(&self) -> Option<String>;

    fn auth_token(&self) -> String;
}

/// Derives the channel id from a page location such as `http://localhost:8000/42`.
///
/// The location is split on `/`; only when that yields exactly four segments is the
/// fourth one taken as the channel id.
#[derive(Clone, Debug)]
pub struct PageLocation {
    href: String,
    auth_token: String,
}

impl PageLocation {
    pub fn new(href: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            auth_token: auth_token.into(),
        }
    }

    pub fn href(&self) -> &str {
        &self.href
    }
}

impl IdentitySource for PageLocation {
    fn channel_id(&self) -> Option<String> {
        let segments: Vec<&str> = self.href.split('/').collect();
        if segments.len() == 4 {
            Some(segments[3].to_string())
        } else {
            None
        }
    }

    fn auth_token(&self) -> String {
        self.auth_token.clone()
    }
}

/// Fixed identity, for embedding and tests.
#[derive(Clone, Debug)]
pub struct StaticIdentity {
    pub channel_id: Option<String>,
    pub auth_token: String,
}

impl StaticIdentity {
    pub fn new(channel_id: Option<&str>, auth_token: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.map(str::to_string),
            auth_token: auth_token.into(),
        }
    }
}

impl IdentitySource for StaticIdentity {
    fn channel_id(&self) -> Option<String> {
        self.channel_id.clone()
    }

    fn auth_token(&self) -> String {
        self.auth_token.clone()
    }
}
