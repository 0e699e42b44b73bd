use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{bson, bson::doc, bson::Bson, Client, ClientSession, Collection};

use crate::dbs::mongo::models::MongoMessage;
use crate::error::Result;

#[derive(Clone)]
pub struct MongoMessageRepository {
    collection: Collection<MongoMessage>,
}

impl MongoMessageRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("messages");
        Self { collection }
    }

    pub async fn insert(&self, message: &MongoMessage) -> Result<()> {
        self.collection.insert_one(message).await?;
        Ok(())
    }

    pub async fn find(&self, message_id: &str) -> Result<Option<MongoMessage>> {
        Ok(self.collection.find_one(doc! { "_id": message_id }).await?)
    }

    pub async fn find_in(
        &self,
        session: &mut ClientSession,
        message_id: &str,
    ) -> Result<Option<MongoMessage>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": message_id })
            .session(session)
            .await?)
    }

    /// Messages of a thread; v7 ids sort by creation time
    pub async fn find_by_thread(&self, thread_id: &str) -> Result<Vec<MongoMessage>> {
        let messages = self
            .collection
            .find(doc! { "thread_id": thread_id })
            .sort(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages)
    }

    pub async fn find_children(&self, parent_id: &str) -> Result<Vec<MongoMessage>> {
        let messages = self
            .collection
            .find(doc! { "parent_message_id": parent_id })
            .sort(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages)
    }

    pub async fn set_context(
        &self,
        message_id: &str,
        is_context: bool,
        now: bson::DateTime,
    ) -> Result<Option<MongoMessage>> {
        let updated = self
            .collection
            .find_one_and_update(
                doc! { "_id": message_id },
                doc! { "$set": { "is_context": is_context, "updated_at": now } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    /// Returns the number of matched documents
    pub async fn set_content(
        &self,
        session: &mut ClientSession,
        message_id: &str,
        content: &str,
        now: bson::DateTime,
    ) -> Result<u64> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": message_id },
                doc! { "$set": { "content": content, "updated_at": now } },
            )
            .session(session)
            .await?;
        Ok(result.matched_count)
    }

    /// Count messages outside `ids` whose parent is inside `ids`
    pub async fn count_dangling(&self, session: &mut ClientSession, ids: &[String]) -> Result<u64> {
        let filter = doc! {
            "parent_message_id": { "$in": ids.to_vec() },
            "_id": { "$nin": ids.to_vec() },
        };
        Ok(self.collection.count_documents(filter).session(session).await?)
    }

    pub async fn thread_ids_of(&self, session: &mut ClientSession, ids: &[String]) -> Result<Vec<String>> {
        let values = self
            .collection
            .distinct("thread_id", doc! { "_id": { "$in": ids.to_vec() } })
            .session(session)
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|v| match v {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    pub async fn delete_many(&self, session: &mut ClientSession, ids: &[String]) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! { "_id": { "$in": ids.to_vec() } })
            .session(session)
            .await?;
        Ok(result.deleted_count)
    }
}
