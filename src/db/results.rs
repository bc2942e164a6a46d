use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::buybox::{BuyBoxSnapshot, ScanFailure, WorkItem};
use crate::models::scan::{FailureRecord, FilterType};

/// Bulk-insert a batch of Buy Box results in one statement
pub async fn insert_results(
    pool: &PgPool,
    job_id: Uuid,
    records: &[BuyBoxSnapshot],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO buybox_results (job_id, asin, sku, marketplace_id, buybox_price, \
         listing_price, shipping_price, currency, is_winner, offer_count, raw_response, captured_at) ",
    );
    builder.push_values(records, |mut b, r| {
        b.push_bind(job_id)
            .push_bind(&r.asin)
            .push_bind(&r.sku)
            .push_bind(&r.marketplace_id)
            .push_bind(r.buybox_price)
            .push_bind(r.listing_price)
            .push_bind(r.shipping_price)
            .push_bind(&r.currency)
            .push_bind(r.is_winner)
            .push_bind(r.offer_count)
            .push_bind(&r.raw)
            .push_bind(r.captured_at);
    });

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Insert a single result (fallback path when the bulk insert fails)
pub async fn insert_result(
    pool: &PgPool,
    job_id: Uuid,
    record: &BuyBoxSnapshot,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO buybox_results (job_id, asin, sku, marketplace_id, buybox_price,
            listing_price, shipping_price, currency, is_winner, offer_count, raw_response, captured_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(job_id)
    .bind(&record.asin)
    .bind(&record.sku)
    .bind(&record.marketplace_id)
    .bind(record.buybox_price)
    .bind(record.listing_price)
    .bind(record.shipping_price)
    .bind(&record.currency)
    .bind(record.is_winner)
    .bind(record.offer_count)
    .bind(&record.raw)
    .bind(record.captured_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Append an item failure to the audit trail
pub async fn record_failure(
    pool: &PgPool,
    job_id: Uuid,
    failure: &ScanFailure,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO buybox_failures (job_id, asin, sku, reason, error_code, attempt_number, raw_error)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(job_id)
    .bind(&failure.asin)
    .bind(&failure.sku)
    .bind(&failure.reason)
    .bind(&failure.error_code)
    .bind(i32::try_from(failure.attempt).unwrap_or(i32::MAX))
    .bind(&failure.raw_error)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_failures(pool: &PgPool, job_id: Uuid) -> Result<Vec<FailureRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT asin, sku, reason, error_code, attempt_number, raw_error, created_at
        FROM buybox_failures
        WHERE job_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(FailureRecord {
                asin: r.try_get("asin")?,
                sku: r.try_get("sku")?,
                reason: r.try_get("reason")?,
                error_code: r.try_get("error_code")?,
                attempt_number: r.try_get("attempt_number")?,
                raw_error: r.try_get("raw_error")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn list_results(pool: &PgPool, job_id: Uuid) -> Result<Vec<BuyBoxSnapshot>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT asin, sku, marketplace_id, buybox_price, listing_price, shipping_price,
               currency, is_winner, offer_count, captured_at
        FROM buybox_results
        WHERE job_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(BuyBoxSnapshot {
                asin: r.try_get("asin")?,
                sku: r.try_get("sku")?,
                marketplace_id: r.try_get("marketplace_id")?,
                buybox_price: r.try_get("buybox_price")?,
                listing_price: r.try_get("listing_price")?,
                shipping_price: r.try_get("shipping_price")?,
                currency: r.try_get("currency")?,
                is_winner: r.try_get("is_winner")?,
                offer_count: r.try_get("offer_count")?,
                captured_at: r.try_get("captured_at")?,
                raw: None,
            })
        })
        .collect()
}

/// Build the work list from the SKU/ASIN mapping, one item per ASIN.
pub async fn select_work_items(
    pool: &PgPool,
    filter: FilterType,
    limit: Option<i64>,
) -> Result<Vec<WorkItem>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT ON (asin) asin, seller_sku
        FROM sku_asin_mapping
        WHERE asin <> '' AND ($1 OR active)
        ORDER BY asin, seller_sku
        LIMIT $2
        "#,
    )
    .bind(filter == FilterType::All)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| Ok(WorkItem::new(r.try_get::<String, _>("asin")?, r.try_get::<String, _>("seller_sku")?)))
        .collect()
}

/// Map custom ASINs to their SKU; ASINs without a mapping use themselves as key.
pub async fn lookup_skus(pool: &PgPool, asins: &[String]) -> Result<Vec<WorkItem>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT ON (asin) asin, seller_sku
        FROM sku_asin_mapping
        WHERE asin = ANY($1)
        ORDER BY asin, active DESC, seller_sku
        "#,
    )
    .bind(asins)
    .fetch_all(pool)
    .await?;

    let mut skus = HashMap::with_capacity(rows.len());
    for r in rows {
        skus.insert(r.try_get::<String, _>("asin")?, r.try_get::<String, _>("seller_sku")?);
    }

    Ok(asins
        .iter()
        .map(|asin| {
            let sku = skus.get(asin).cloned().unwrap_or_else(|| asin.clone());
            WorkItem::new(asin.clone(), sku)
        })
        .collect())
}
