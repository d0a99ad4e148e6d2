use async_trait::async_trait;
use serde_json::Value;
use sqlx::{query, PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::platform::{Metadata, Product, ProductUpsert, ProductVariant, VariantUpsert};
use crate::services::platform::ProductService;

pub struct PgProductService {
    pool: PgPool,
}

impl PgProductService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_variants(&self, product_ids: &[String]) -> Result<Vec<(String, ProductVariant)>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = query(
            r#"
            SELECT id, product_id, title, sku, barcode, metadata
            FROM product_variant
            WHERE product_id = ANY($1)
            ORDER BY created_at
            "#,
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let product_id: String = row.try_get("product_id")?;
                Ok((
                    product_id,
                    ProductVariant {
                        id: row.try_get("id")?,
                        title: row.try_get("title")?,
                        sku: row.try_get("sku")?,
                        barcode: row.try_get("barcode")?,
                        metadata: metadata_from_value(row.try_get("metadata")?),
                    },
                ))
            })
            .collect()
    }

    async fn upsert_one(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        upsert: ProductUpsert,
    ) -> Result<()> {
        let product_id = match upsert.id {
            Some(id) => {
                query(
                    r#"
                    UPDATE product
                    SET title = $2,
                        description = $3,
                        external_id = $4,
                        status = $5,
                        thumbnail = $6,
                        metadata = COALESCE(metadata, '{}'::jsonb) || $7,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(&id)
                .bind(&upsert.title)
                .bind(&upsert.description)
                .bind(&upsert.external_id)
                .bind(&upsert.status)
                .bind(&upsert.thumbnail)
                .bind(Value::Object(upsert.metadata))
                .execute(&mut **tx)
                .await?;
                id
            }
            None => {
                let id = format!("prod_{}", Uuid::new_v4().simple());
                query(
                    r#"
                    INSERT INTO product (
                        id, title, description, external_id, status, thumbnail,
                        metadata, created_at, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
                    "#,
                )
                .bind(&id)
                .bind(&upsert.title)
                .bind(&upsert.description)
                .bind(&upsert.external_id)
                .bind(&upsert.status)
                .bind(&upsert.thumbnail)
                .bind(Value::Object(upsert.metadata))
                .execute(&mut **tx)
                .await?;
                id
            }
        };

        query("DELETE FROM product_image WHERE product_id = $1")
            .bind(&product_id)
            .execute(&mut **tx)
            .await?;
        for (rank, url) in upsert.images.iter().enumerate() {
            query(
                r#"
                INSERT INTO product_image (id, product_id, url, rank)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(format!("img_{}", Uuid::new_v4().simple()))
            .bind(&product_id)
            .bind(url)
            .bind(rank as i32)
            .execute(&mut **tx)
            .await?;
        }

        for variant in upsert.variants {
            self.upsert_variant(tx, &product_id, variant).await?;
        }

        Ok(())
    }

    async fn upsert_variant(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: &str,
        variant: VariantUpsert,
    ) -> Result<()> {
        match variant.id {
            Some(id) => {
                query(
                    r#"
                    UPDATE product_variant
                    SET title = $2,
                        sku = $3,
                        barcode = $4,
                        metadata = COALESCE(metadata, '{}'::jsonb) || $5,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(&id)
                .bind(&variant.title)
                .bind(&variant.sku)
                .bind(&variant.barcode)
                .bind(Value::Object(variant.metadata))
                .execute(&mut **tx)
                .await?;
            }
            None => {
                query(
                    r#"
                    INSERT INTO product_variant (
                        id, product_id, title, sku, barcode, metadata,
                        created_at, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
                    "#,
                )
                .bind(format!("variant_{}", Uuid::new_v4().simple()))
                .bind(product_id)
                .bind(&variant.title)
                .bind(&variant.sku)
                .bind(&variant.barcode)
                .bind(Value::Object(variant.metadata))
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ProductService for PgProductService {
    async fn list_products_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<Vec<Product>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = query(
            r#"
            SELECT id, title, external_id, status, metadata
            FROM product
            WHERE external_id = ANY($1)
            "#,
        )
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut products: Vec<Product> = rows
            .into_iter()
            .map(|row| {
                Ok(Product {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    external_id: row.try_get("external_id")?,
                    status: row.try_get("status")?,
                    variants: Vec::new(),
                    metadata: metadata_from_value(row.try_get("metadata")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let product_ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
        let mut variants_by_product: HashMap<String, Vec<ProductVariant>> = HashMap::new();
        for (product_id, variant) in self.load_variants(&product_ids).await? {
            variants_by_product
                .entry(product_id)
                .or_default()
                .push(variant);
        }

        for product in &mut products {
            if let Some(variants) = variants_by_product.remove(&product.id) {
                product.variants = variants;
            }
        }

        Ok(products)
    }

    async fn upsert_products(&self, upserts: Vec<ProductUpsert>) -> Result<Vec<Product>> {
        let external_ids: Vec<String> = upserts
            .iter()
            .map(|upsert| upsert.external_id.clone())
            .collect();

        // One transaction for the whole batch: all-or-nothing.
        let mut tx = self.pool.begin().await?;
        for upsert in upserts {
            self.upsert_one(&mut tx, upsert).await?;
        }
        tx.commit().await?;

        self.list_products_by_external_ids(&external_ids).await
    }
}

fn metadata_from_value(value: Option<Value>) -> Metadata {
    value
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}
