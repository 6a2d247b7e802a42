use anyhow::{Context, Result};
use facnet_schemas::{Code, Context as CtxEntity, Establishment, Rule};
use sqlx::{PgPool, Row};

pub async fn get_codes(pool: &PgPool) -> Result<Vec<Code>> {
    let rows = sqlx::query(
        "select code, description, tariff_value, leaf, top_level, level1_group, active from codes",
    )
    .fetch_all(pool)
    .await
    .context("get_codes failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(Code {
                code: row.try_get("code")?,
                description: row.try_get("description")?,
                tariff_value: row.try_get("tariff_value")?,
                leaf: row.try_get("leaf")?,
                top_level: row.try_get("top_level")?,
                level1_group: row.try_get("level1_group")?,
                active: row.try_get("active")?,
            })
        })
        .collect()
}

pub async fn upsert_code(pool: &PgPool, code: &Code) -> Result<()> {
    sqlx::query(
        r#"
        insert into codes (code, description, tariff_value, leaf, top_level, level1_group, active)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (code) do update set
            description = excluded.description,
            tariff_value = excluded.tariff_value,
            leaf = excluded.leaf,
            top_level = excluded.top_level,
            level1_group = excluded.level1_group,
            active = excluded.active
        "#,
    )
    .bind(&code.code)
    .bind(&code.description)
    .bind(code.tariff_value)
    .bind(&code.leaf)
    .bind(&code.top_level)
    .bind(&code.level1_group)
    .bind(code.active)
    .execute(pool)
    .await
    .context("upsert_code failed")?;
    Ok(())
}

pub async fn get_contexts(pool: &PgPool) -> Result<Vec<CtxEntity>> {
    let rows = sqlx::query("select code, description from contexts")
        .fetch_all(pool)
        .await
        .context("get_contexts failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(CtxEntity {
                code: row.try_get("code")?,
                description: row.try_get("description")?,
            })
        })
        .collect()
}

pub async fn get_establishments(pool: &PgPool) -> Result<Vec<Establishment>> {
    let rows = sqlx::query("select numero, name, ep33 from establishments")
        .fetch_all(pool)
        .await
        .context("get_establishments failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(Establishment {
                numero: row.try_get("numero")?,
                name: row.try_get("name")?,
                ep33: row.try_get("ep33")?,
            })
        })
        .collect()
}

pub async fn upsert_establishment(pool: &PgPool, establishment: &Establishment) -> Result<()> {
    sqlx::query(
        r#"
        insert into establishments (numero, name, ep33)
        values ($1, $2, $3)
        on conflict (numero) do update set
            name = excluded.name,
            ep33 = excluded.ep33
        "#,
    )
    .bind(&establishment.numero)
    .bind(&establishment.name)
    .bind(establishment.ep33)
    .execute(pool)
    .await
    .context("upsert_establishment failed")?;
    Ok(())
}

pub async fn get_rules(pool: &PgPool) -> Result<Vec<Rule>> {
    let rows = sqlx::query("select id, name, rule_type, condition, threshold, enabled from rules where enabled")
        .fetch_all(pool)
        .await
        .context("get_rules failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(Rule {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                rule_type: row.try_get("rule_type")?,
                condition: row.try_get("condition")?,
                threshold: row.try_get("threshold")?,
                enabled: row.try_get("enabled")?,
            })
        })
        .collect()
}

pub async fn upsert_rule(pool: &PgPool, rule: &Rule) -> Result<()> {
    sqlx::query(
        r#"
        insert into rules (id, name, rule_type, condition, threshold, enabled)
        values ($1, $2, $3, $4, $5, $6)
        on conflict (id) do update set
            name = excluded.name,
            rule_type = excluded.rule_type,
            condition = excluded.condition,
            threshold = excluded.threshold,
            enabled = excluded.enabled
        "#,
    )
    .bind(&rule.id)
    .bind(&rule.name)
    .bind(&rule.rule_type)
    .bind(&rule.condition)
    .bind(rule.threshold)
    .bind(rule.enabled)
    .execute(pool)
    .await
    .context("upsert_rule failed")?;
    Ok(())
}
