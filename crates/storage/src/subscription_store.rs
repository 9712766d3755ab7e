use chrono::Utc;
use nem_push_domain::storage::{
    StorageError, StorageResult, StoredSubscription, SubscriptionStore,
};
use sea_orm::{sea_query::OnConflict, EntityTrait, QueryOrder, Set};

use crate::entity::subscriptions;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl SubscriptionStore for SeaOrmStorage {
    async fn upsert_subscription(&self, subscription: StoredSubscription) -> StorageResult<()> {
        let active = subscriptions::ActiveModel {
            channel_id: Set(subscription.channel_id),
            address: Set(subscription.address),
            name: Set(subscription.name),
            created_at: Set(Utc::now()),
        };
        subscriptions::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    subscriptions::Column::ChannelId,
                    subscriptions::Column::Address,
                ])
                .update_column(subscriptions::Column::Name)
                .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn remove_subscription(&self, channel_id: &str, address: &str) -> StorageResult<()> {
        subscriptions::Entity::delete_by_id((channel_id.to_string(), address.to_string()))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn load_subscriptions(&self) -> StorageResult<Vec<StoredSubscription>> {
        let rows = subscriptions::Entity::find()
            .order_by_asc(subscriptions::Column::CreatedAt)
            .order_by_asc(subscriptions::Column::ChannelId)
            .order_by_asc(subscriptions::Column::Address)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(rows
            .into_iter()
            .map(|model| StoredSubscription {
                channel_id: model.channel_id,
                address: model.address,
                name: model.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "TBCI2A67UQZAKCR6NS4JWAEICEIGEIM72G3MVW5S";

    async fn storage() -> SeaOrmStorage {
        SeaOrmStorage::connect("sqlite::memory:")
            .await
            .expect("storage inits")
    }

    fn row(channel_id: &str, address: &str, name: &str) -> StoredSubscription {
        StoredSubscription {
            channel_id: channel_id.into(),
            address: address.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_channel_and_address() {
        let storage = storage().await;
        storage
            .upsert_subscription(row("c1", ADDRESS, "alice"))
            .await
            .unwrap();
        storage
            .upsert_subscription(row("c1", ADDRESS, "bob"))
            .await
            .unwrap();
        storage
            .upsert_subscription(row("c2", ADDRESS, ""))
            .await
            .unwrap();

        let mut rows = storage.load_subscriptions().await.unwrap();
        rows.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        assert_eq!(rows, vec![row("c1", ADDRESS, "bob"), row("c2", ADDRESS, "")]);
    }

    #[tokio::test]
    async fn remove_deletes_only_the_pair() {
        let storage = storage().await;
        storage
            .upsert_subscription(row("c1", ADDRESS, "alice"))
            .await
            .unwrap();
        storage
            .upsert_subscription(row("c2", ADDRESS, "carol"))
            .await
            .unwrap();

        storage.remove_subscription("c1", ADDRESS).await.unwrap();
        storage.remove_subscription("c1", "TMISSING").await.unwrap();

        assert_eq!(
            storage.load_subscriptions().await.unwrap(),
            vec![row("c2", ADDRESS, "carol")]
        );
    }
}
