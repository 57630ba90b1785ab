//! Member access control.
//!
//! Every call goes through the retry policy; a call that still fails is
//! returned to the caller, which decides whether the transition commits.

use std::sync::Arc;
use tracing::info;

use gatekeeper_common::{GatekeeperError, SessionKey};

use crate::config::RetryConfig;
use crate::platform::Platform;
use crate::retry::with_retry;

pub struct AccessController {
    platform: Arc<dyn Platform>,
    retry: RetryConfig,
}

impl AccessController {
    pub fn new(platform: Arc<dyn Platform>, retry: RetryConfig) -> Self {
        Self { platform, retry }
    }

    /// Mute the member until verification completes
    pub async fn restrict(&self, key: SessionKey) -> Result<(), GatekeeperError> {
        with_retry(&self.retry, "restrict", || {
            self.platform.restrict(key.chat_id, key.user_id)
        })
        .await?;
        info!(session = %key, "Member restricted");
        Ok(())
    }

    /// Restore default permissions
    pub async fn unrestrict(&self, key: SessionKey) -> Result<(), GatekeeperError> {
        with_retry(&self.retry, "unrestrict", || {
            self.platform.unrestrict(key.chat_id, key.user_id)
        })
        .await?;
        info!(session = %key, "Member unrestricted");
        Ok(())
    }

    /// Remove the member from the chat without a lasting ban, so they may rejoin
    pub async fn remove(&self, key: SessionKey) -> Result<(), GatekeeperError> {
        with_retry(&self.retry, "ban", || self.platform.ban(key.chat_id, key.user_id)).await?;
        with_retry(&self.retry, "unban", || {
            self.platform.unban(key.chat_id, key.user_id)
        })
        .await?;
        info!(session = %key, "Member removed");
        Ok(())
    }
}
