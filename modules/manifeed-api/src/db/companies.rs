use serde::Serialize;
use sqlx::{PgConnection, PgPool};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CompanyRead {
    pub id: i32,
    pub name: String,
    pub enabled: bool,
}

pub async fn get_company_read_by_id(
    pool: &PgPool,
    company_id: i32,
) -> Result<Option<CompanyRead>, sqlx::Error> {
    sqlx::query_as("SELECT id, name, enabled FROM rss_company WHERE id = $1")
        .bind(company_id)
        .fetch_optional(pool)
        .await
}

pub async fn set_company_enabled(
    pool: &PgPool,
    company_id: i32,
    enabled: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE rss_company SET enabled = $1 WHERE id = $2")
        .bind(enabled)
        .bind(company_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Catalog-sourced company attributes applied during sync.
#[derive(Debug, Clone)]
pub struct CompanyUpsert {
    pub name: String,
    pub host: Option<String>,
    pub icon_url: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub fetchprotection: i16,
}

/// Insert or refresh a company by name. The operator-controlled `enabled`
/// flag is left untouched on update.
pub async fn upsert_company(
    conn: &mut PgConnection,
    company: &CompanyUpsert,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO rss_company (name, host, icon_url, country, language, fetchprotection)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (name) DO UPDATE SET
            host = EXCLUDED.host,
            icon_url = EXCLUDED.icon_url,
            country = EXCLUDED.country,
            language = EXCLUDED.language,
            fetchprotection = EXCLUDED.fetchprotection
        RETURNING id
        "#,
    )
    .bind(&company.name)
    .bind(&company.host)
    .bind(&company.icon_url)
    .bind(&company.country)
    .bind(&company.language)
    .bind(company.fetchprotection)
    .fetch_one(conn)
    .await
}

pub async fn get_company_id_by_name(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM rss_company WHERE name = $1")
        .bind(name)
        .fetch_optional(conn)
        .await
}
