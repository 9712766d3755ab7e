use chrono::Utc;
use nem_push_domain::storage::{ChannelRegistration, ChannelStore, StorageError, StorageResult};
use sea_orm::{sea_query::OnConflict, EntityTrait, QueryOrder, Set};

use crate::entity::channels;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl ChannelStore for SeaOrmStorage {
    async fn upsert_channel(&self, channel: ChannelRegistration) -> StorageResult<()> {
        let active = channels::ActiveModel {
            channel_id: Set(channel.channel_id),
            webhook_url: Set(channel.webhook_url),
            registered_at: Set(Utc::now()),
        };
        channels::Entity::insert(active)
            .on_conflict(
                OnConflict::column(channels::Column::ChannelId)
                    .update_columns([channels::Column::WebhookUrl, channels::Column::RegisteredAt])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn remove_channel(&self, channel_id: &str) -> StorageResult<()> {
        channels::Entity::delete_by_id(channel_id.to_string())
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn find_channel(&self, channel_id: &str) -> StorageResult<Option<ChannelRegistration>> {
        let maybe = channels::Entity::find_by_id(channel_id.to_string())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(channel_to_registration))
    }

    async fn load_channels(&self) -> StorageResult<Vec<ChannelRegistration>> {
        let rows = channels::Entity::find()
            .order_by_asc(channels::Column::ChannelId)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(rows.into_iter().map(channel_to_registration).collect())
    }
}

fn channel_to_registration(model: channels::Model) -> ChannelRegistration {
    ChannelRegistration {
        channel_id: model.channel_id,
        webhook_url: model.webhook_url,
    }
}
