use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{bson, bson::doc, bson::Document, Client, ClientSession, Collection};

use crate::dbs::mongo::models::MongoThread;
use crate::error::Result;

#[derive(Clone)]
pub struct MongoThreadRepository {
    collection: Collection<MongoThread>,
}

impl MongoThreadRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("threads");
        Self { collection }
    }

    pub async fn insert(&self, thread: &MongoThread) -> Result<()> {
        self.collection.insert_one(thread).await?;
        Ok(())
    }

    /// Get a thread unless it is soft-deleted
    pub async fn find_live(&self, thread_id: &str) -> Result<Option<MongoThread>> {
        let filter = doc! { "_id": thread_id, "deleted_at": null };
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn find_live_in(
        &self,
        session: &mut ClientSession,
        thread_id: &str,
    ) -> Result<Option<MongoThread>> {
        let filter = doc! { "_id": thread_id, "deleted_at": null };
        Ok(self.collection.find_one(filter).session(session).await?)
    }

    /// Live threads, most recently updated first
    pub async fn list_live(&self, limit: Option<usize>) -> Result<Vec<MongoThread>> {
        let mut find = self
            .collection
            .find(doc! { "deleted_at": null })
            .sort(doc! { "updated_at": -1, "_id": -1 });

        if let Some(limit) = limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let threads = find.await?.try_collect().await?;
        Ok(threads)
    }

    /// Apply `$set` to a live thread and return the updated document
    pub async fn set_fields(&self, thread_id: &str, fields: Document) -> Result<Option<MongoThread>> {
        let filter = doc! { "_id": thread_id, "deleted_at": null };
        let updated = self
            .collection
            .find_one_and_update(filter, doc! { "$set": fields })
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    pub async fn touch_many(
        &self,
        session: &mut ClientSession,
        thread_ids: Vec<String>,
        now: bson::DateTime,
    ) -> Result<()> {
        if thread_ids.is_empty() {
            return Ok(());
        }
        self.collection
            .update_many(
                doc! { "_id": { "$in": thread_ids } },
                doc! { "$set": { "updated_at": now } },
            )
            .session(session)
            .await?;
        Ok(())
    }
}
