//! Relational account backend on SQLite.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::store::AccountStore;
use super::{Account, AccountFilter, AccountKind};
use crate::db::{dt_to_ms, ms_to_dt, Migration, SqliteHandle};
use crate::error::StoreError;

const ACCOUNT_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "accounts",
    sql: r#"
        CREATE TABLE IF NOT EXISTS accounts (
          name TEXT PRIMARY KEY,
          kind TEXT NOT NULL,
          available INTEGER NOT NULL DEFAULT 1,
          to_cleanup INTEGER NOT NULL DEFAULT 0,
          owner TEXT,
          owner_email TEXT,
          service_uuid TEXT,
          guid TEXT,
          envtype TEXT,
          region TEXT,
          zone TEXT,
          hosted_zone_id TEXT,
          account_id TEXT,
          comment TEXT,
          aws_access_key_id TEXT,
          aws_secret_access_key TEXT,
          conan_status TEXT,
          conan_timestamp TEXT,
          conan_hostname TEXT,
          updated_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_accounts_kind_service ON accounts(kind, service_uuid);
    "#,
}];

const ACCOUNT_COLUMNS: &str = "name, kind, available, to_cleanup, owner, owner_email, service_uuid, \
     guid, envtype, region, zone, hosted_zone_id, account_id, comment, aws_access_key_id, \
     aws_secret_access_key, conan_status, conan_timestamp, conan_hostname, updated_at_ms";

#[derive(Clone)]
pub struct SqliteAccountStore {
    db: SqliteHandle,
}

impl SqliteAccountStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self {
            db: SqliteHandle::open(path, ACCOUNT_MIGRATIONS)?,
        })
    }

    /// Out-of-band creation. The primary key rejects a second record with the same name.
    pub async fn insert(&self, account: Account) -> Result<(), StoreError> {
        self.db
            .call(move |conn| {
                let updated_at = account.updated_at.unwrap_or_else(Utc::now);
                conn.execute(
                    &format!(
                        "INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES \
                         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
                    ),
                    params![
                        account.name,
                        account.kind.as_str(),
                        account.available,
                        account.to_cleanup,
                        account.owner,
                        account.owner_email,
                        account.service_uuid,
                        account.guid,
                        account.envtype,
                        account.region,
                        account.zone,
                        account.hosted_zone_id,
                        account.account_id,
                        account.comment,
                        account.aws_access_key_id,
                        account.aws_secret_access_key,
                        account.conan_status,
                        account.conan_timestamp,
                        account.conan_hostname,
                        dt_to_ms(updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    fn backend(&self) -> &'static str {
        "relational"
    }

    async fn scan(&self, kind: AccountKind, filter: &AccountFilter) -> Result<Vec<Account>, StoreError> {
        let filter = filter.clone();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts
                     WHERE kind = ?1
                       AND (?2 IS NULL OR service_uuid = ?2)
                       AND (?3 IS NULL OR available = ?3)
                     ORDER BY name"
                ))?;
                let rows = stmt.query_map(
                    params![kind.as_str(), filter.service_uuid, filter.available],
                    |row| Ok(map_row_to_account(row)),
                )?;

                let mut accounts = Vec::new();
                for row in rows {
                    match row? {
                        Ok(account) => accounts.push(account),
                        Err(e) => tracing::warn!(error = %e, "skipping undecodable account row"),
                    }
                }
                Ok(accounts)
            })
            .await
    }

    async fn get(&self, kind: AccountKind, name: &str) -> Result<Option<Account>, StoreError> {
        let name = name.to_string();
        self.db
            .call(move |conn| {
                let found = conn
                    .query_row(
                        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE name = ?1 AND kind = ?2"),
                        params![name, kind.as_str()],
                        |row| Ok(map_row_to_account(row)),
                    )
                    .optional()?;
                found.transpose()
            })
            .await
    }

    async fn mark_for_cleanup(&self, kind: AccountKind, name: &str) -> Result<bool, StoreError> {
        let name = name.to_string();
        self.db
            .call(move |conn| {
                // changes() counts matched rows, so a repeat call still reports the record.
                let changed = conn.execute(
                    "UPDATE accounts
                     SET updated_at_ms = CASE WHEN to_cleanup = 0 THEN ?3 ELSE updated_at_ms END,
                         to_cleanup = 1
                     WHERE name = ?1 AND kind = ?2",
                    params![name, kind.as_str(), dt_to_ms(Utc::now())],
                )?;
                Ok(changed > 0)
            })
            .await
    }
}

/// Decode failures are reported per row so one bad record does not fail a scan.
fn map_row_to_account(row: &Row) -> Result<Account, StoreError> {
    let name: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let kind: AccountKind = kind
        .parse()
        .map_err(|e| StoreError::Decode(format!("account {name}: {e}")))?;

    let mut account = Account::new(name, kind);
    account.available = row.get(2)?;
    account.to_cleanup = row.get(3)?;
    account.owner = row.get(4)?;
    account.owner_email = row.get(5)?;
    account.service_uuid = row.get(6)?;
    account.guid = row.get(7)?;
    account.envtype = row.get(8)?;
    account.region = row.get(9)?;
    account.zone = row.get(10)?;
    account.hosted_zone_id = row.get(11)?;
    account.account_id = row.get(12)?;
    account.comment = row.get(13)?;
    account.aws_access_key_id = row.get(14)?;
    account.aws_secret_access_key = row.get(15)?;
    account.conan_status = row.get(16)?;
    account.conan_timestamp = row.get(17)?;
    account.conan_hostname = row.get(18)?;
    account.updated_at = Some(ms_to_dt(row.get(19)?)?);
    account.attach_sort_key();
    Ok(account)
}
