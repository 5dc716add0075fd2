use tracing::info;

use ripple_net::{PostDraft, PostUpdate};
use ripple_shared::error::NormalizeError;
use ripple_shared::types::PostId;
use ripple_shared::wire::RawPost;

use crate::error::ClientError;
use crate::handle::ClientHandle;

impl ClientHandle {
    pub async fn create_post(&self, draft: PostDraft) -> Result<PostId, ClientError> {
        validate_draft(&draft)?;
        let session = self.session().await?;
        let raw = self.call(&session, self.api.create_post(&draft)).await?;
        let id = created_id(raw)?;
        info!(post = %id, "Post created");
        self.force_refresh().await?;
        Ok(id)
    }

    pub async fn reply_to_post(
        &self,
        parent: &PostId,
        draft: PostDraft,
    ) -> Result<PostId, ClientError> {
        validate_draft(&draft)?;
        let session = self.session().await?;
        let raw = self
            .call(&session, self.api.reply_to_post(parent, &draft))
            .await?;
        let id = created_id(raw)?;
        info!(post = %id, parent = %parent, "Reply created");
        self.force_refresh().await?;
        Ok(id)
    }

    /// Repost `target`, optionally with a comment.
    pub async fn echo_post(
        &self,
        target: &PostId,
        comment: Option<&str>,
    ) -> Result<PostId, ClientError> {
        let session = self.session().await?;
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        let raw = self
            .call(&session, self.api.echo_post(target, comment))
            .await?;
        let id = created_id(raw)?;
        info!(post = %id, target = %target, "Post echoed");
        self.force_refresh().await?;
        Ok(id)
    }

    pub async fn delete_post(&self, id: &PostId) -> Result<(), ClientError> {
        let session = self.session().await?;
        self.call(&session, self.api.delete_post(id)).await?;
        info!(post = %id, "Post deleted");
        self.force_refresh().await
    }

    pub async fn update_post(&self, id: &PostId, update: PostUpdate) -> Result<(), ClientError> {
        if update.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ClientError::InvalidInput("post content is empty".into()));
        }
        let session = self.session().await?;
        self.call(&session, self.api.update_post(id, &update)).await?;
        self.force_refresh().await
    }

    pub async fn vote_poll(&self, id: &PostId, option: usize) -> Result<(), ClientError> {
        let session = self.session().await?;
        self.call(&session, self.api.vote_poll(id, option)).await?;
        self.force_refresh().await
    }
}

fn validate_draft(draft: &PostDraft) -> Result<(), ClientError> {
    if draft.content.trim().is_empty() && draft.media.is_empty() && draft.poll_options.is_none() {
        return Err(ClientError::InvalidInput("post is empty".into()));
    }
    if let Some(options) = &draft.poll_options {
        if options.len() < 2 || options.iter().any(|o| o.trim().is_empty()) {
            return Err(ClientError::InvalidInput(
                "a poll needs at least two non-empty options".into(),
            ));
        }
    }
    Ok(())
}

fn created_id(raw: RawPost) -> Result<PostId, NormalizeError> {
    raw.id
        .filter(|id| !id.is_empty())
        .map(PostId::new)
        .ok_or_else(|| NormalizeError::missing("post", "id"))
}
