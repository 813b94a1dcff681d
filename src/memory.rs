//! In-process [`Store`] with the observable behaviour of the MongoDB one:
//! insertion order as natural order, stable sorts, and the unique request index.

use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::db::{FoodQuery, FoodSort, Store, StoreError};
use crate::models::{
    Amount, DeleteOutcome, Food, FoodPatch, FoodRequest, InsertOutcome, UpdateOutcome,
};

#[derive(Default)]
pub struct MemoryStore {
    foods: Mutex<Vec<Food>>,
    requests: Mutex<Vec<FoodRequest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_patch(food: &mut Food, patch: FoodPatch) {
    if let Some(v) = patch.food_name {
        food.food_name = Some(v);
    }
    if let Some(v) = patch.food_image {
        food.food_image = Some(v);
    }
    if let Some(v) = patch.food_quantity {
        food.food_quantity = Some(v);
    }
    if let Some(v) = patch.pickup_location {
        food.pickup_location = Some(v);
    }
    if let Some(v) = patch.expired_date_time {
        food.expired_date_time = Some(v);
    }
    if let Some(v) = patch.additional_notes {
        food.additional_notes = Some(v);
    }
    if let Some(v) = patch.food_status {
        food.food_status = Some(v);
    }
}

/// MongoDB's cross-type order: missing first, then numbers by value, then strings.
fn compare_amounts(a: &Option<Amount>, b: &Option<Amount>) -> Ordering {
    fn number(amount: &Amount) -> Option<f64> {
        match amount {
            Amount::Int(i) => Some(*i as f64),
            Amount::Float(f) => Some(*f),
            Amount::Text(_) => None,
        }
    }

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (number(a), number(b), a, b) {
            (Some(x), Some(y), _, _) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None, _, _) => Ordering::Less,
            (None, Some(_), _, _) => Ordering::Greater,
            (None, None, Amount::Text(x), Amount::Text(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

fn updated(matched: bool, modified: bool) -> UpdateOutcome {
    UpdateOutcome {
        acknowledged: true,
        matched_count: u64::from(matched),
        modified_count: u64::from(modified),
        upserted_id: None,
        upserted_count: 0,
    }
}

fn deleted(count: usize) -> DeleteOutcome {
    DeleteOutcome { acknowledged: true, deleted_count: count as u64 }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_food(&self, mut food: Food) -> Result<InsertOutcome, StoreError> {
        let id = ObjectId::new().to_hex();
        food.id = Some(id.clone());
        self.foods.lock().unwrap().push(food);
        Ok(InsertOutcome { acknowledged: true, inserted_id: id })
    }

    async fn find_foods(&self, query: FoodQuery) -> Result<Vec<Food>, StoreError> {
        let mut foods: Vec<Food> = self
            .foods
            .lock()
            .unwrap()
            .iter()
            .filter(|f| query.owner.is_none() || f.email == query.owner)
            .cloned()
            .collect();

        match query.sort {
            FoodSort::Natural => {}
            FoodSort::NameAsc => foods.sort_by(|a, b| a.food_name.cmp(&b.food_name)),
            FoodSort::ExpiryAsc => foods.sort_by(|a, b| a.expired_date_time.cmp(&b.expired_date_time)),
            FoodSort::QuantityDesc => foods.sort_by(|a, b| compare_amounts(&b.food_quantity, &a.food_quantity)),
        }
        if let Some(limit) = query.limit {
            foods.truncate(limit.max(0) as usize);
        }
        Ok(foods)
    }

    async fn find_food(&self, id: ObjectId) -> Result<Option<Food>, StoreError> {
        let id = id.to_hex();
        let foods = self.foods.lock().unwrap();
        Ok(foods.iter().find(|f| f.id.as_deref() == Some(id.as_str())).cloned())
    }

    async fn update_food(&self, id: ObjectId, patch: FoodPatch) -> Result<UpdateOutcome, StoreError> {
        let id = id.to_hex();
        let mut foods = self.foods.lock().unwrap();
        match foods.iter_mut().find(|f| f.id.as_deref() == Some(id.as_str())) {
            Some(food) => {
                let before = food.clone();
                apply_patch(food, patch);
                Ok(updated(true, *food != before))
            }
            None => Ok(updated(false, false)),
        }
    }

    async fn delete_food(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError> {
        let id = id.to_hex();
        let mut foods = self.foods.lock().unwrap();
        let before = foods.len();
        if let Some(pos) = foods.iter().position(|f| f.id.as_deref() == Some(id.as_str())) {
            foods.remove(pos);
        }
        Ok(deleted(before - foods.len()))
    }

    async fn insert_request(&self, mut request: FoodRequest) -> Result<InsertOutcome, StoreError> {
        let mut requests = self.requests.lock().unwrap();
        let taken = requests.iter().any(|r| {
            r.food_id == request.food_id && r.requester_email == request.requester_email
        });
        if taken {
            return Err(StoreError::Duplicate);
        }

        let id = ObjectId::new().to_hex();
        request.id = Some(id.clone());
        requests.push(request);
        Ok(InsertOutcome { acknowledged: true, inserted_id: id })
    }

    async fn requests_by_requester(&self, email: &str) -> Result<Vec<FoodRequest>, StoreError> {
        let requests = self.requests.lock().unwrap();
        Ok(requests
            .iter()
            .filter(|r| r.requester_email.as_deref() == Some(email))
            .cloned()
            .collect())
    }

    async fn request_for_food(&self, food_id: &str) -> Result<Option<FoodRequest>, StoreError> {
        let requests = self.requests.lock().unwrap();
        Ok(requests.iter().find(|r| r.food_id.as_deref() == Some(food_id)).cloned())
    }

    async fn delete_request(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError> {
        let id = id.to_hex();
        let mut requests = self.requests.lock().unwrap();
        let before = requests.len();
        if let Some(pos) = requests.iter().position(|r| r.id.as_deref() == Some(id.as_str())) {
            requests.remove(pos);
        }
        Ok(deleted(before - requests.len()))
    }

    async fn set_request_status(&self, food_id: &str, status: String) -> Result<UpdateOutcome, StoreError> {
        let mut requests = self.requests.lock().unwrap();
        match requests.iter_mut().find(|r| r.food_id.as_deref() == Some(food_id)) {
            Some(request) => {
                let modified = request.status.as_deref() != Some(status.as_str());
                request.status = Some(status);
                Ok(updated(true, modified))
            }
            None => Ok(updated(false, false)),
        }
    }
}
