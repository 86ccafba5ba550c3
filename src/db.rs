use anyhow::Context;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CompanyRecord, HistoryRecord, LeadRecord, MeetingRecord, Stage};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn seed_stamp(year: i32, month: u32, day: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .context("invalid seed timestamp")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let companies = vec![
        (
            Uuid::parse_str("7a1f3f60-11b3-4de2-9c41-0a4f1f2b9ad1")?,
            "Grupo Andino",
            "Manufacturing",
            "51-200",
            "Bogotá",
            3,
        ),
        (
            Uuid::parse_str("b2c9dfd1-4a57-4a0a-9e38-5b8f12f7c333")?,
            "Finanzas Sur",
            "Finance",
            "11-50",
            "Santiago",
            1,
        ),
        (
            Uuid::parse_str("e4d0a5db-6f2e-4d7e-8c0a-92b5f7d62e84")?,
            "TecnoNorte",
            "Technology",
            "201-500",
            "Monterrey",
            2,
        ),
    ];

    for (id, name, industry, size_bracket, location, project_count) in companies {
        sqlx::query(
            r#"
            INSERT INTO pipeline_forecast.companies
            (id, name, industry, size_bracket, location, project_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE
            SET industry = EXCLUDED.industry,
                size_bracket = EXCLUDED.size_bracket,
                location = EXCLUDED.location,
                project_count = EXCLUDED.project_count
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(industry)
        .bind(size_bracket)
        .bind(location)
        .bind(project_count)
        .execute(pool)
        .await?;
    }

    // (source_key, owner, stage, estimated_value, probability,
    //  evaluated_probability, outcome, scored)
    let leads: Vec<(&str, &str, &str, Option<f64>, Option<i32>, Option<i32>, Option<i16>, bool)> = vec![
        ("seed-l01", "ana", "Negociación", Some(48_000.0), Some(60), None, None, false),
        ("seed-l02", "ana", "Prospección", Some(15_000.0), None, None, None, false),
        ("seed-l03", "ana", "Cerrado Ganado", Some(30_000.0), None, Some(80), Some(1), true),
        ("seed-l04", "ana", "Cerrado Perdido", Some(22_000.0), None, Some(20), Some(0), true),
        ("seed-l05", "bruno", "Negociación", Some(90_000.0), Some(40), None, None, false),
        ("seed-l06", "bruno", "Cerrado Ganado", Some(55_000.0), None, Some(90), Some(1), true),
        ("seed-l07", "bruno", "Cerrado Perdido", Some(12_000.0), None, None, None, true),
    ];

    let mut seed_day = 1u32;
    for (source_key, owner, stage, value, probability, evaluated, outcome, scored) in leads {
        let scored_at = if scored {
            Some(seed_stamp(2026, 2, seed_day)?)
        } else {
            None
        };
        seed_day += 1;

        sqlx::query(
            r#"
            INSERT INTO pipeline_forecast.leads
            (id, owner, stage, estimated_value, probability,
             evaluated_probability, outcome, scored_at, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(stage)
        .bind(value)
        .bind(probability)
        .bind(evaluated)
        .bind(outcome)
        .bind(scored_at)
        .bind(seed_stamp(2026, 1, seed_day)?)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    // seed-l07 closed before the scoring columns existed; its commitment
    // lives only in the audit trail.
    let legacy_lead: Option<Uuid> = sqlx::query(
        "SELECT id FROM pipeline_forecast.leads WHERE source_key = 'seed-l07'",
    )
    .fetch_optional(pool)
    .await?
    .map(|row| row.get("id"));

    if let Some(lead_id) = legacy_lead {
        let changes = [
            ("1f0c2d3e-0001-4a6b-8c1d-9e2f3a4b5c01", None::<&str>, Some("30"), 3u32),
            ("1f0c2d3e-0002-4a6b-8c1d-9e2f3a4b5c02", Some("30"), Some("45"), 9),
        ];
        for (id, old_value, new_value, day) in changes {
            sqlx::query(
                r#"
                INSERT INTO pipeline_forecast.lead_history
                (id, lead_id, field_name, old_value, new_value, created_at)
                VALUES ($1, $2, 'probabilidad', $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(Uuid::parse_str(id)?)
            .bind(lead_id)
            .bind(old_value)
            .bind(new_value)
            .bind(seed_stamp(2026, 1, day)?)
            .execute(pool)
            .await?;
        }
    }

    let meetings = vec![
        ("2b1c0d9e-0001-4f3a-a2b1-6c5d4e3f2a01", "Grupo Andino", "seed-l03", false, NaiveDate::from_ymd_opt(2026, 1, 12)),
        ("2b1c0d9e-0002-4f3a-a2b1-6c5d4e3f2a02", "Grupo Andino", "seed-l03", true, NaiveDate::from_ymd_opt(2026, 1, 20)),
        ("2b1c0d9e-0003-4f3a-a2b1-6c5d4e3f2a03", "Finanzas Sur", "seed-l04", false, NaiveDate::from_ymd_opt(2026, 1, 15)),
        ("2b1c0d9e-0004-4f3a-a2b1-6c5d4e3f2a04", "TecnoNorte", "seed-l06", false, NaiveDate::from_ymd_opt(2026, 1, 22)),
        ("2b1c0d9e-0005-4f3a-a2b1-6c5d4e3f2a05", "TecnoNorte", "seed-l01", true, NaiveDate::from_ymd_opt(2026, 2, 3)),
    ];

    for (id, company, lead_key, postponed, scheduled_at) in meetings {
        let scheduled_at = scheduled_at.context("invalid seed date")?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_forecast.meetings
            (id, company_id, lead_id, scheduled_at, postponed)
            SELECT $1, c.id, l.id, $2, $3
            FROM pipeline_forecast.companies c,
                 pipeline_forecast.leads l
            WHERE c.name = $4 AND l.source_key = $5
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(scheduled_at)
        .bind(postponed)
        .bind(company)
        .bind(lead_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn fetch_leads(pool: &PgPool, owner: Option<&str>) -> anyhow::Result<Vec<LeadRecord>> {
    let mut query = String::from(
        "SELECT id, owner, stage, estimated_value, probability, \
         evaluated_probability, outcome, scored_at \
         FROM pipeline_forecast.leads",
    );
    if owner.is_some() {
        query.push_str(" WHERE owner = $1");
    }

    let mut rows = sqlx::query(&query);
    if let Some(value) = owner {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut leads = Vec::new();

    for row in records {
        let stage_raw: String = row.get("stage");
        leads.push(LeadRecord {
            id: row.get("id"),
            owner: row.get("owner"),
            stage: Stage::from_raw(&stage_raw),
            stage_raw,
            estimated_value: row.get("estimated_value"),
            probability: row.get("probability"),
            evaluated_probability: row.get("evaluated_probability"),
            outcome: row.get("outcome"),
            scored_at: row.get("scored_at"),
        });
    }

    Ok(leads)
}

/// Probability audit rows, newest first, optionally scoped to one owner's
/// leads. Only `probabilidad` changes matter to the scorer.
pub async fn fetch_probability_history(
    pool: &PgPool,
    owner: Option<&str>,
) -> anyhow::Result<Vec<HistoryRecord>> {
    let mut query = String::from(
        "SELECT h.lead_id, h.field_name, h.old_value, h.new_value, h.created_at \
         FROM pipeline_forecast.lead_history h \
         JOIN pipeline_forecast.leads l ON l.id = h.lead_id \
         WHERE h.field_name = 'probabilidad'",
    );
    if owner.is_some() {
        query.push_str(" AND l.owner = $1");
    }
    query.push_str(" ORDER BY h.created_at DESC");

    let mut rows = sqlx::query(&query);
    if let Some(value) = owner {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut history = Vec::new();

    for row in records {
        history.push(HistoryRecord {
            lead_id: row.get("lead_id"),
            field_name: row.get("field_name"),
            old_value: row.get("old_value"),
            new_value: row.get("new_value"),
            created_at: row.get("created_at"),
        });
    }

    Ok(history)
}

pub async fn fetch_meetings(pool: &PgPool) -> anyhow::Result<Vec<MeetingRecord>> {
    let records = sqlx::query(
        "SELECT c.name, c.industry, c.size_bracket, c.location, \
         m.scheduled_at, m.postponed, m.lead_id \
         FROM pipeline_forecast.meetings m \
         JOIN pipeline_forecast.companies c ON c.id = m.company_id",
    )
    .fetch_all(pool)
    .await?;

    let mut meetings = Vec::new();
    for row in records {
        meetings.push(MeetingRecord {
            company_name: row.get("name"),
            industry: row.get("industry"),
            size_bracket: row.get("size_bracket"),
            location: row.get("location"),
            scheduled_at: row.get("scheduled_at"),
            postponed: row.get("postponed"),
            lead_id: row.get("lead_id"),
        });
    }

    Ok(meetings)
}

pub async fn fetch_companies(pool: &PgPool) -> anyhow::Result<Vec<CompanyRecord>> {
    let records = sqlx::query(
        "SELECT name, industry, project_count FROM pipeline_forecast.companies",
    )
    .fetch_all(pool)
    .await?;

    let mut companies = Vec::new();
    for row in records {
        companies.push(CompanyRecord {
            name: row.get("name"),
            industry: row.get("industry"),
            project_count: row.get("project_count"),
        });
    }

    Ok(companies)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        owner: String,
        stage: String,
        estimated_value: Option<f64>,
        probability: Option<i32>,
        evaluated_probability: Option<i32>,
        outcome: Option<i16>,
        scored_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_forecast.leads
            (id, owner, stage, estimated_value, probability,
             evaluated_probability, outcome, scored_at, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.owner)
        .bind(&row.stage)
        .bind(row.estimated_value)
        .bind(row.probability)
        .bind(row.evaluated_probability)
        .bind(row.outcome)
        .bind(row.scored_at)
        .bind(Utc::now())
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
