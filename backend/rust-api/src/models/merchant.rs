//! Merchant (store owner) and the credential linking them to the payment provider.

use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Bearer credential issued by the provider's OAuth flow. Linking happens elsewhere; we only read it.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Provider-side account id, carried by webhook notifications.
    pub account_id: i64,
}

impl std::fmt::Debug for GatewayCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredential")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Merchant {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub gateway: Option<GatewayCredential>,
}
