use serde::{Deserialize, Serialize};
use tracing::info;

use ripple_net::ProfileUpdate;
use ripple_shared::constants::{DEFAULT_REFRESH_MINUTES, MIN_REFRESH_MINUTES};
use ripple_shared::normalize;

use crate::engine::EngineCommand;
use crate::error::ClientError;
use crate::handle::ClientHandle;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub auto_refresh: bool,
    pub refresh_interval_minutes: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            refresh_interval_minutes: DEFAULT_REFRESH_MINUTES,
        }
    }
}

impl AppSettings {
    /// Clamp the interval to the allowed minimum.
    pub fn normalized(self) -> Self {
        Self {
            refresh_interval_minutes: self.refresh_interval_minutes.max(MIN_REFRESH_MINUTES),
            ..self
        }
    }
}

impl ClientHandle {
    pub async fn get_settings(&self) -> Result<AppSettings, ClientError> {
        self.request(EngineCommand::Settings).await
    }

    /// Apply refresh preferences locally and store them on the profile.
    pub async fn update_settings(&self, settings: AppSettings) -> Result<AppSettings, ClientError> {
        let session = self.session().await?;
        let applied = self
            .request(|reply| EngineCommand::SetAutoRefresh { settings, reply })
            .await?;

        let update = ProfileUpdate {
            auto_refresh: Some(applied.auto_refresh),
            refresh_interval_minutes: Some(applied.refresh_interval_minutes),
            ..ProfileUpdate::default()
        };
        let raw = self.call(&session, self.api.update_profile(&update)).await?;
        self.send(EngineCommand::MergeUser(normalize::user(raw)?))
            .await?;

        info!(
            enabled = applied.auto_refresh,
            minutes = applied.refresh_interval_minutes,
            "Refresh preferences saved"
        );
        self.force_refresh().await?;
        Ok(applied)
    }

    pub async fn set_auto_refresh(
        &self,
        enabled: bool,
        interval_minutes: u32,
    ) -> Result<AppSettings, ClientError> {
        self.update_settings(AppSettings {
            auto_refresh: enabled,
            refresh_interval_minutes: interval_minutes,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, wait_until, Harness};

    #[test]
    fn test_interval_clamped() {
        let settings = AppSettings {
            auto_refresh: true,
            refresh_interval_minutes: 0,
        }
        .normalized();
        assert_eq!(settings.refresh_interval_minutes, MIN_REFRESH_MINUTES);
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_value(AppSettings::default()).unwrap();
        assert_eq!(json["autoRefresh"], true);
        assert_eq!(json["refreshIntervalMinutes"], 5);
    }

    #[tokio::test]
    async fn test_set_auto_refresh_persists_to_profile() {
        let Harness { api, client, .. } = harness().await;
        let applied = client.set_auto_refresh(true, 2).await.unwrap();
        assert_eq!(applied.refresh_interval_minutes, 2);
        assert_eq!(api.calls("update_profile"), 1);

        // The refreshed profile agrees, so the setting sticks.
        wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;
        let settings = client.get_settings().await.unwrap();
        assert_eq!(settings.refresh_interval_minutes, 2);
        let prefs = client.current_user().await.unwrap().unwrap().preferences;
        assert_eq!(prefs.map(|p| p.interval_minutes), Some(2));
    }

    #[tokio::test]
    async fn test_update_settings_requires_session() {
        let (client, _, _, _) = crate::testing::client();
        let err = client.update_settings(AppSettings::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::NoSession));
    }
}
