use tracing::info;

use ripple_net::ProfileUpdate;
use ripple_shared::models::User;
use ripple_shared::normalize;

use crate::engine::EngineCommand;
use crate::error::ClientError;
use crate::handle::ClientHandle;

impl ClientHandle {
    pub async fn follow_user(&self, username: &str) -> Result<(), ClientError> {
        let session = self.session().await?;
        if username == session.username() {
            return Err(ClientError::InvalidInput("cannot follow yourself".into()));
        }
        self.call(&session, self.api.follow_user(username)).await?;
        info!(user = %username, "Followed");
        self.force_refresh().await
    }

    pub async fn unfollow_user(&self, username: &str) -> Result<(), ClientError> {
        let session = self.session().await?;
        self.call(&session, self.api.unfollow_user(username)).await?;
        info!(user = %username, "Unfollowed");
        self.force_refresh().await
    }

    /// Update the profile and return the merged current user. Fields the
    /// server leaves out of its response keep their local values.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, ClientError> {
        let session = self.session().await?;
        let raw = self.call(&session, self.api.update_profile(&update)).await?;
        let user = normalize::user(raw)?;
        self.send(EngineCommand::MergeUser(user.clone())).await?;
        self.force_refresh().await?;

        Ok(self
            .request(EngineCommand::CurrentUser)
            .await?
            .unwrap_or(user))
    }
}
