//! Key-value account backend on MongoDB.
//!
//! Each account is one document keyed by `name`. Listing is a keyset scan
//! ordered by `name`: each page asks for `name > last_seen` until a short page
//! comes back, and every page is accumulated before returning.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneOptions, FindOptions};
use mongodb::{Client, Collection};

use super::store::AccountStore;
use super::{Account, AccountFilter, AccountKind};
use crate::error::StoreError;

/// Attributes fetched for every account, in projection order.
pub const PROJECTED_ATTRIBUTES: &[&str] = &[
    "name",
    "kind",
    "available",
    "to_cleanup",
    "guid",
    "service_uuid",
    "envtype",
    "owner",
    "owner_email",
    "zone",
    "hosted_zone_id",
    "account_id",
    "region",
    "comment",
    "updated_at",
    "aws_access_key_id",
    "aws_secret_access_key",
    "conan_status",
    "conan_timestamp",
    "conan_hostname",
];

pub struct MongoAccountStore {
    collection: Collection<Document>,
    page_size: i64,
}

impl MongoAccountStore {
    pub fn new(collection: Collection<Document>, page_size: i64) -> Self {
        Self {
            collection,
            page_size: page_size.max(1),
        }
    }

    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        page_size: i64,
    ) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        tracing::info!(database, collection, "connected to mongodb account store");
        Ok(Self::new(
            client.database(database).collection::<Document>(collection),
            page_size,
        ))
    }
}

#[async_trait]
impl AccountStore for MongoAccountStore {
    fn backend(&self) -> &'static str {
        "keyvalue"
    }

    async fn scan(&self, kind: AccountKind, filter: &AccountFilter) -> Result<Vec<Account>, StoreError> {
        let base = build_filter(kind, filter);
        let accounts = scan_pages(self.page_size, |after| {
            let query = page_filter(&base, after.as_deref());
            let options = FindOptions::builder()
                .projection(projection())
                .sort(doc! { "name": 1 })
                .limit(self.page_size)
                .build();
            let collection = self.collection.clone();
            async move {
                let cursor = collection.find(query, options).await?;
                let documents: Vec<Document> = cursor.try_collect().await?;
                Ok::<_, StoreError>(documents)
            }
        })
        .await?;

        tracing::debug!(kind = %kind, count = accounts.len(), "scanned mongodb accounts");
        Ok(accounts)
    }

    async fn get(&self, kind: AccountKind, name: &str) -> Result<Option<Account>, StoreError> {
        let options = FindOneOptions::builder().projection(projection()).build();
        let found = self
            .collection
            .find_one(doc! { "name": name, "kind": kind.as_str() }, options)
            .await?;
        found.map(|document| decode_account(&document)).transpose()
    }

    async fn mark_for_cleanup(&self, kind: AccountKind, name: &str) -> Result<bool, StoreError> {
        // Only the first call flips the flag and bumps updated_at.
        let result = self
            .collection
            .update_one(
                doc! { "name": name, "kind": kind.as_str(), "to_cleanup": { "$ne": true } },
                doc! { "$set": { "to_cleanup": true, "updated_at": mongodb::bson::DateTime::now() } },
                None,
            )
            .await?;
        if result.matched_count > 0 {
            return Ok(true);
        }

        let existing = self
            .collection
            .count_documents(doc! { "name": name, "kind": kind.as_str() }, None)
            .await?;
        Ok(existing > 0)
    }
}

/// Keyset page loop. `fetch_page` gets the last name seen (`None` for the
/// first page) and returns up to `page_size` documents ordered by name. Pages
/// are accumulated until a short one comes back. Undecodable documents are
/// skipped but still move the cursor forward.
pub async fn scan_pages<F, Fut>(page_size: i64, mut fetch_page: F) -> Result<Vec<Account>, StoreError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<Document>, StoreError>>,
{
    let page_size = page_size.max(1);
    let mut accounts = Vec::new();
    let mut last_seen: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch_page(last_seen.clone()).await?;
        pages += 1;
        let page_len = page.len() as i64;
        let before = last_seen.clone();

        for document in page {
            if let Ok(name) = document.get_str("name") {
                last_seen = Some(name.to_string());
            }
            match decode_account(&document) {
                Ok(account) => accounts.push(account),
                Err(e) => {
                    tracing::warn!(name = ?last_seen, error = %e, "skipping undecodable account document");
                }
            }
        }

        if page_len < page_size {
            break;
        }
        if last_seen == before {
            tracing::warn!(pages, "full page without a string name, stopping scan");
            break;
        }
    }

    tracing::debug!(pages, count = accounts.len(), "accumulated account pages");
    Ok(accounts)
}

pub fn projection() -> Document {
    let mut projection: Document = PROJECTED_ATTRIBUTES
        .iter()
        .map(|attr| (attr.to_string(), Bson::Int32(1)))
        .collect();
    projection.insert("_id", 0);
    projection
}

pub fn build_filter(kind: AccountKind, filter: &AccountFilter) -> Document {
    let mut query = doc! { "kind": kind.as_str() };
    if let Some(uuid) = &filter.service_uuid {
        query.insert("service_uuid", uuid.as_str());
    }
    if let Some(available) = filter.available {
        query.insert("available", available);
    }
    query
}

/// Continuation filter for the next page. The first page only asks for
/// string names so the `$gt` cursor always advances.
pub fn page_filter(base: &Document, after: Option<&str>) -> Document {
    let mut query = base.clone();
    match after {
        Some(last) => query.insert("name", doc! { "$gt": last }),
        None => query.insert("name", doc! { "$type": "string" }),
    };
    query
}

pub fn decode_account(document: &Document) -> Result<Account, StoreError> {
    let name = document
        .get_str("name")
        .map_err(|e| StoreError::Decode(format!("account name: {e}")))?;
    let kind: AccountKind = document
        .get_str("kind")
        .map_err(|e| StoreError::Decode(format!("account {name} kind: {e}")))?
        .parse()
        .map_err(|e| StoreError::Decode(format!("account {name}: {e}")))?;

    let mut account = Account::new(name, kind);
    account.available = document.get_bool("available").unwrap_or(false);
    account.to_cleanup = document.get_bool("to_cleanup").unwrap_or(false);
    account.owner = opt_string(document, "owner");
    account.owner_email = opt_string(document, "owner_email");
    account.service_uuid = opt_string(document, "service_uuid");
    account.guid = opt_string(document, "guid");
    account.envtype = opt_string(document, "envtype");
    account.region = opt_string(document, "region");
    account.zone = opt_string(document, "zone");
    account.hosted_zone_id = opt_string(document, "hosted_zone_id");
    account.account_id = opt_string(document, "account_id");
    account.comment = opt_string(document, "comment");
    account.aws_access_key_id = opt_string(document, "aws_access_key_id");
    account.aws_secret_access_key = opt_string(document, "aws_secret_access_key");
    account.conan_status = opt_string(document, "conan_status");
    account.conan_timestamp = opt_string(document, "conan_timestamp");
    account.conan_hostname = opt_string(document, "conan_hostname");
    account.updated_at = opt_datetime(document, "updated_at");
    account.attach_sort_key();
    Ok(account)
}

fn opt_string(document: &Document, key: &str) -> Option<String> {
    match document.get(key)? {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(n) => Some(n.to_string()),
        Bson::Int64(n) => Some(n.to_string()),
        Bson::Null => None,
        other => Some(other.to_string()),
    }
}

fn opt_datetime(document: &Document, key: &str) -> Option<DateTime<Utc>> {
    match document.get(key)? {
        Bson::DateTime(dt) => DateTime::from_timestamp_millis(dt.timestamp_millis()),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_covers_fixed_attribute_list() {
        let projection = projection();
        for attr in PROJECTED_ATTRIBUTES {
            assert_eq!(projection.get_i32(attr).unwrap(), 1, "missing {attr}");
        }
        assert_eq!(projection.get_i32("_id").unwrap(), 0);
    }

    #[test]
    fn build_filter_includes_optional_terms() {
        let plain = build_filter(AccountKind::Aws, &AccountFilter::default());
        assert_eq!(plain, doc! { "kind": "aws" });

        let filtered = build_filter(
            AccountKind::Ocp,
            &AccountFilter {
                service_uuid: Some("svc-9".into()),
                available: Some(true),
            },
        );
        assert_eq!(
            filtered,
            doc! { "kind": "ocp", "service_uuid": "svc-9", "available": true }
        );
    }

    #[test]
    fn page_filter_continues_after_last_name() {
        let base = doc! { "kind": "aws" };
        assert_eq!(
            page_filter(&base, None),
            doc! { "kind": "aws", "name": { "$type": "string" } }
        );
        assert_eq!(
            page_filter(&base, Some("sandbox10")),
            doc! { "kind": "aws", "name": { "$gt": "sandbox10" } }
        );
    }

    #[test]
    fn decode_account_reads_projected_fields() {
        let updated = mongodb::bson::DateTime::from_millis(1_700_000_000_000);
        let document = doc! {
            "name": "acct-042",
            "kind": "aws",
            "available": false,
            "to_cleanup": true,
            "owner": "jdoe",
            "service_uuid": "svc-1",
            "account_id": 123456789012_i64,
            "comment": Bson::Null,
            "updated_at": updated,
        };
        let account = decode_account(&document).unwrap();
        assert_eq!(account.name, "acct-042");
        assert_eq!(account.kind, AccountKind::Aws);
        assert!(!account.available);
        assert!(account.to_cleanup);
        assert_eq!(account.owner.as_deref(), Some("jdoe"));
        assert_eq!(account.account_id.as_deref(), Some("123456789012"));
        assert_eq!(account.comment, None);
        assert_eq!(account.name_int, Some(42));
        assert_eq!(
            account.updated_at.unwrap().timestamp_millis(),
            1_700_000_000_000
        );
    }

    #[test]
    fn decode_account_without_digits_keeps_record() {
        let account = decode_account(&doc! { "name": "acct-xyz", "kind": "ocp" }).unwrap();
        assert_eq!(account.name_int, None);
        assert_eq!(account.kind, AccountKind::Ocp);
    }

    #[test]
    fn decode_account_rejects_missing_name_or_kind() {
        assert!(matches!(
            decode_account(&doc! { "kind": "aws" }),
            Err(StoreError::Decode(_))
        ));
        assert!(matches!(
            decode_account(&doc! { "name": "sandbox1", "kind": "gcp" }),
            Err(StoreError::Decode(_))
        ));
    }

    fn numbered(count: usize) -> Vec<Document> {
        (1..=count)
            .map(|i| doc! { "name": format!("sandbox{i:03}"), "kind": "aws" })
            .collect()
    }

    /// Serves `documents` (sorted by name) the way the keyset query does.
    fn next_page(documents: &[Document], page_size: usize, after: Option<&str>) -> Vec<Document> {
        documents
            .iter()
            .filter(|d| match after {
                Some(last) => d.get_str("name").is_ok_and(|name| name > last),
                None => true,
            })
            .take(page_size)
            .cloned()
            .collect()
    }

    async fn scan_fake(documents: &[Document], page_size: usize) -> (Vec<Account>, usize) {
        let mut calls = 0;
        let accounts = scan_pages(page_size as i64, |after| {
            calls += 1;
            let page = next_page(documents, page_size, after.as_deref());
            futures::future::ready(Ok(page))
        })
        .await
        .unwrap();
        (accounts, calls)
    }

    fn assert_unique(accounts: &[Account]) {
        let mut names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), accounts.len(), "duplicate accounts in scan");
    }

    #[tokio::test]
    async fn scan_pages_collects_partial_last_page() {
        let (accounts, calls) = scan_fake(&numbered(10), 4).await;
        assert_eq!(accounts.len(), 10);
        assert_eq!(calls, 3);
        assert_unique(&accounts);
        assert_eq!(accounts.last().unwrap().name, "sandbox010");
    }

    #[tokio::test]
    async fn scan_pages_stops_after_empty_page_when_pages_are_exactly_full() {
        let (accounts, calls) = scan_fake(&numbered(8), 4).await;
        assert_eq!(accounts.len(), 8);
        assert_eq!(calls, 3);
        assert_unique(&accounts);
    }

    #[tokio::test]
    async fn scan_pages_on_empty_collection_queries_once() {
        let (accounts, calls) = scan_fake(&[], 4).await;
        assert!(accounts.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn scan_pages_skips_bad_document_but_advances_past_it() {
        let mut documents = numbered(9);
        // No kind: fails to decode but still has a name to continue from.
        documents[3] = doc! { "name": "sandbox004" };
        let (accounts, calls) = scan_fake(&documents, 4).await;
        assert_eq!(accounts.len(), 8);
        assert_eq!(calls, 3);
        assert_unique(&accounts);
        assert!(accounts.iter().all(|a| a.name != "sandbox004"));
    }

    #[tokio::test]
    async fn scan_pages_propagates_page_errors() {
        let result = scan_pages(4, |_| {
            futures::future::ready(Err(StoreError::Backend("connection reset".into())))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
