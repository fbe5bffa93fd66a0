use crate::media::MediaUploader;
use crate::models::{ProductInput, ProductRecord};
use futures::TryStreamExt;
use mongodb::bson::{Document, doc, from_document, oid::ObjectId, to_document};
use mongodb::{Client, Collection};
use thiserror::Error;
use tracing::warn;

const COLLECTION: &str = "products";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid product id")]
    InvalidId,
    #[error("product not found")]
    NotFound,
    #[error("database request failed: {0}")]
    Backend(String),
}

/// CRUD access to the products collection. Holds a handle into the
/// process-wide database client plus the uploader used to normalize
/// inline images before insert.
#[derive(Clone)]
pub struct ProductStore {
    collection: Collection<Document>,
    uploader: MediaUploader,
}

impl ProductStore {
    pub fn new(client: &Client, db_name: &str, uploader: MediaUploader) -> Self {
        let collection = client.database(db_name).collection::<Document>(COLLECTION);
        Self {
            collection,
            uploader,
        }
    }

    /// All products, `_id` rewritten to its canonical string form.
    /// Backend failures are logged and surface as an empty listing.
    pub async fn list(&self) -> Vec<ProductRecord> {
        let cursor = match self.collection.find(doc! {}).await {
            Ok(cursor) => cursor,
            Err(err) => {
                warn!(target = "catalog.store", error = %err, "product_list_failed");
                return Vec::new();
            }
        };
        let docs: Vec<Document> = match cursor.try_collect().await {
            Ok(docs) => docs,
            Err(err) => {
                warn!(target = "catalog.store", error = %err, "product_cursor_failed");
                return Vec::new();
            }
        };
        docs.into_iter()
            .filter_map(|doc| {
                let record = record_from_document(doc);
                if record.is_none() {
                    warn!(target = "catalog.store", "skipped malformed product document");
                }
                record
            })
            .collect()
    }

    /// Insert a product, normalizing an inline data-URI image to a hosted
    /// URL first. Returns the new id in canonical string form.
    pub async fn create(&self, mut product: ProductInput) -> Result<String, StoreError> {
        if product.image.starts_with("data:image") {
            match self.uploader.upload(&product.image).await {
                Some(url) => product.image = url,
                None => {
                    return Err(StoreError::Backend("image upload failed".into()));
                }
            }
        }
        let document =
            to_document(&product).map_err(|err| StoreError::Backend(err.to_string()))?;
        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|err| {
                warn!(target = "catalog.store", error = %err, "product_insert_failed");
                StoreError::Backend(err.to_string())
            })?;
        result
            .inserted_id
            .as_object_id()
            .map(|oid| oid.to_hex())
            .ok_or_else(|| StoreError::Backend("insert returned no object id".into()))
    }

    pub async fn get(&self, id: &str) -> Result<ProductRecord, StoreError> {
        let oid = parse_product_id(id)?;
        match self.collection.find_one(doc! { "_id": oid }).await {
            Ok(Some(document)) => record_from_document(document)
                .ok_or_else(|| StoreError::Backend("malformed product document".into())),
            Ok(None) => Err(StoreError::NotFound),
            Err(err) => {
                warn!(target = "catalog.store", id, error = %err, "product_lookup_failed");
                Err(StoreError::Backend(err.to_string()))
            }
        }
    }

    /// Full-document replace. Success means a document matched the id;
    /// a same-value replace that modifies nothing still succeeds.
    pub async fn update(&self, id: &str, product: &ProductInput) -> Result<(), StoreError> {
        let oid = parse_product_id(id)?;
        let replacement =
            to_document(product).map_err(|err| StoreError::Backend(err.to_string()))?;
        let result = self
            .collection
            .replace_one(doc! { "_id": oid }, replacement)
            .await
            .map_err(|err| {
                warn!(target = "catalog.store", id, error = %err, "product_replace_failed");
                StoreError::Backend(err.to_string())
            })?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Remove a product and hand back the post-deletion listing.
    pub async fn delete(&self, id: &str) -> Result<Vec<ProductRecord>, StoreError> {
        let oid = parse_product_id(id)?;
        let result = self
            .collection
            .delete_one(doc! { "_id": oid })
            .await
            .map_err(|err| {
                warn!(target = "catalog.store", id, error = %err, "product_delete_failed");
                StoreError::Backend(err.to_string())
            })?;
        if result.deleted_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(self.list().await)
    }
}

fn parse_product_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId)
}

fn record_from_document(mut document: Document) -> Option<ProductRecord> {
    let id = document.remove("_id")?.as_object_id()?.to_hex();
    let product = from_document::<ProductInput>(document).ok()?;
    Some(ProductRecord { id, product })
}
