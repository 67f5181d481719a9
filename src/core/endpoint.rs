use crate::identity::IdentitySource;

/// Path segment used when no channel id could be derived.
pub const MISSING_CHANNEL_SEGMENT: &str = "null";

/// Channel id and token the endpoint URL is built from.
///
/// Resolved once when the manager starts and reused for every reconnect attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointIdentity {
    pub channel_id: Option<String>,
    pub auth_token: String,
}

impl EndpointIdentity {
    pub fn resolve<I>(source: &I) -> Self
    where
        I: IdentitySource + ?Sized,
    {
        Self {
            channel_id: source.channel_id(),
            auth_token: source.auth_token(),
        }
    }

    /// `ws://<host>/ws/<channel>?authorization=<token>`, values inserted verbatim.
    pub fn url(&self, host: &str) -> String {
        let channel = self
            .channel_id
            .as_deref()
            .unwrap_or(MISSING_CHANNEL_SEGMENT);
        format!(
            "ws://{host}/ws/{channel}?authorization={}",
            self.auth_token
        )
    }
}
