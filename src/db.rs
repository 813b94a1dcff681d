use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Config;
use crate::models::{
    DeleteOutcome, Food, FoodPatch, FoodRequest, InsertOutcome, UpdateOutcome,
};

/// MongoDB's server code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Number of listings returned by the featured query.
pub const FEATURED_LIMIT: i64 = 6;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write.
    #[error("duplicate key")]
    Duplicate,

    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),
}

/// Ordering applied to a food listing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodSort {
    /// Whatever order the store returns.
    Natural,
    NameAsc,
    ExpiryAsc,
    QuantityDesc,
}

impl FoodSort {
    /// Maps the `sortBy` query value, ignoring case. Unknown or missing keys
    /// leave the listing unsorted.
    pub fn from_query(sort_by: Option<&str>) -> Self {
        match sort_by.map(str::to_lowercase).as_deref() {
            Some("foodname") => FoodSort::NameAsc,
            Some("expireddatetime") => FoodSort::ExpiryAsc,
            _ => FoodSort::Natural,
        }
    }

    fn to_document(self) -> Option<Document> {
        match self {
            FoodSort::Natural => None,
            FoodSort::NameAsc => Some(doc! { "foodName": 1 }),
            FoodSort::ExpiryAsc => Some(doc! { "expiredDateTime": 1 }),
            FoodSort::QuantityDesc => Some(doc! { "foodQuantity": -1 }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FoodQuery {
    pub owner: Option<String>,
    pub sort: FoodSort,
    pub limit: Option<i64>,
}

impl FoodQuery {
    pub fn all() -> Self {
        FoodQuery { owner: None, sort: FoodSort::Natural, limit: None }
    }

    pub fn sorted(sort: FoodSort) -> Self {
        FoodQuery { sort, ..FoodQuery::all() }
    }

    pub fn owned_by(email: String) -> Self {
        FoodQuery { owner: Some(email), ..FoodQuery::all() }
    }

    pub fn featured() -> Self {
        FoodQuery { owner: None, sort: FoodSort::QuantityDesc, limit: Some(FEATURED_LIMIT) }
    }
}

/// The document store as the route layer sees it. Handlers receive it as
/// `web::Data<dyn Store>`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Creates the unique `(foodId, requesterEmail)` index on requests.
    async fn ensure_indexes(&self) -> Result<(), StoreError>;

    async fn insert_food(&self, food: Food) -> Result<InsertOutcome, StoreError>;
    async fn find_foods(&self, query: FoodQuery) -> Result<Vec<Food>, StoreError>;
    async fn find_food(&self, id: ObjectId) -> Result<Option<Food>, StoreError>;
    async fn update_food(&self, id: ObjectId, patch: FoodPatch) -> Result<UpdateOutcome, StoreError>;
    async fn delete_food(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the requester already asked for this food.
    async fn insert_request(&self, request: FoodRequest) -> Result<InsertOutcome, StoreError>;
    async fn requests_by_requester(&self, email: &str) -> Result<Vec<FoodRequest>, StoreError>;
    async fn request_for_food(&self, food_id: &str) -> Result<Option<FoodRequest>, StoreError>;
    async fn delete_request(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError>;
    async fn set_request_status(&self, food_id: &str, status: String) -> Result<UpdateOutcome, StoreError>;
}

pub struct MongoStore {
    client: Client,
    foods: Collection<Document>,
    requests: Collection<Document>,
}

pub async fn connect(config: &Config) -> Result<MongoStore, StoreError> {
    let client_options = ClientOptions::parse(&config.database_url).await?;
    let client = Client::with_options(client_options)?;

    let foods = client.database(&config.foods_db).collection("foods");
    let requests = client.database(&config.requests_db).collection("requestedFood");

    Ok(MongoStore { client, foods, requests })
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE
    )
}

/// Replaces an ObjectId `_id` with its hex form so it decodes into a `String` field.
fn decode<T: DeserializeOwned>(mut document: Document) -> Result<T, StoreError> {
    if let Ok(oid) = document.get_object_id("_id") {
        document.insert("_id", oid.to_hex());
    }
    Ok(bson::from_document(document)?)
}

fn bson_to_id(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn insert_outcome(result: mongodb::results::InsertOneResult) -> InsertOutcome {
    InsertOutcome { acknowledged: true, inserted_id: bson_to_id(&result.inserted_id) }
}

fn update_outcome(result: mongodb::results::UpdateResult) -> UpdateOutcome {
    let upserted_id = result.upserted_id.as_ref().map(bson_to_id);
    UpdateOutcome {
        acknowledged: true,
        matched_count: result.matched_count,
        modified_count: result.modified_count,
        upserted_count: u64::from(upserted_id.is_some()),
        upserted_id,
    }
}

fn delete_outcome(result: mongodb::results::DeleteResult) -> DeleteOutcome {
    DeleteOutcome { acknowledged: true, deleted_count: result.deleted_count }
}

/// Serializes a new document, dropping any client-supplied `_id` so the server assigns one.
fn encode_new<T: serde::Serialize>(value: &T) -> Result<Document, StoreError> {
    let mut document = bson::to_document(value)?;
    document.remove("_id");
    Ok(document)
}

async fn collect<T: DeserializeOwned>(cursor: mongodb::Cursor<Document>) -> Result<Vec<T>, StoreError> {
    let documents: Vec<Document> = cursor.try_collect().await?;
    documents.into_iter().map(decode).collect()
}

#[async_trait]
impl Store for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.client.database("admin").run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder()
            .keys(doc! { "foodId": 1, "requesterEmail": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.requests.create_index(index, None).await?;
        Ok(())
    }

    async fn insert_food(&self, food: Food) -> Result<InsertOutcome, StoreError> {
        let result = self.foods.insert_one(encode_new(&food)?, None).await?;
        Ok(insert_outcome(result))
    }

    async fn find_foods(&self, query: FoodQuery) -> Result<Vec<Food>, StoreError> {
        let filter = match query.owner {
            Some(email) => doc! { "email": email },
            None => doc! {},
        };
        let options = FindOptions::builder()
            .sort(query.sort.to_document())
            .limit(query.limit)
            .build();

        let cursor = self.foods.find(filter, options).await?;
        collect(cursor).await
    }

    async fn find_food(&self, id: ObjectId) -> Result<Option<Food>, StoreError> {
        match self.foods.find_one(doc! { "_id": id }, None).await? {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    async fn update_food(&self, id: ObjectId, patch: FoodPatch) -> Result<UpdateOutcome, StoreError> {
        let update = doc! { "$set": bson::to_document(&patch)? };
        let result = self.foods.update_one(doc! { "_id": id }, update, None).await?;
        Ok(update_outcome(result))
    }

    async fn delete_food(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError> {
        let result = self.foods.delete_one(doc! { "_id": id }, None).await?;
        Ok(delete_outcome(result))
    }

    async fn insert_request(&self, request: FoodRequest) -> Result<InsertOutcome, StoreError> {
        match self.requests.insert_one(encode_new(&request)?, None).await {
            Ok(result) => Ok(insert_outcome(result)),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn requests_by_requester(&self, email: &str) -> Result<Vec<FoodRequest>, StoreError> {
        let cursor = self.requests.find(doc! { "requesterEmail": email }, None).await?;
        collect(cursor).await
    }

    async fn request_for_food(&self, food_id: &str) -> Result<Option<FoodRequest>, StoreError> {
        match self.requests.find_one(doc! { "foodId": food_id }, None).await? {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    async fn delete_request(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError> {
        let result = self.requests.delete_one(doc! { "_id": id }, None).await?;
        Ok(delete_outcome(result))
    }

    async fn set_request_status(&self, food_id: &str, status: String) -> Result<UpdateOutcome, StoreError> {
        let update = doc! { "$set": { "status": status } };
        let result = self.requests.update_one(doc! { "foodId": food_id }, update, None).await?;
        Ok(update_outcome(result))
    }
}
