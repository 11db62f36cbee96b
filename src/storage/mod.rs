use crate::models::Show;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS shows (
    theatre     VARCHAR  NOT NULL,
    name        VARCHAR  NOT NULL,
    image_url   VARCHAR  NOT NULL,
    link_url    VARCHAR  NOT NULL,
    start_date  DATE     NOT NULL,
    end_date    DATE     NOT NULL,
    scraped_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (theatre, name, start_date, end_date)
);

CREATE SEQUENCE IF NOT EXISTS scrape_run_ids START 1;

CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('scrape_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    venues_succeeded    INTEGER DEFAULT 0,
    venues_failed       INTEGER DEFAULT 0,
    shows_inserted      INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS venue_runs (
    run_id          INTEGER  NOT NULL,
    venue           VARCHAR  NOT NULL,
    status          VARCHAR  NOT NULL,
    pages           INTEGER  NOT NULL DEFAULT 0,
    shows_found     INTEGER  NOT NULL DEFAULT 0,
    shows_inserted  INTEGER  NOT NULL DEFAULT 0,
    error_msg       VARCHAR,
    finished_at     TIMESTAMP NOT NULL,
    PRIMARY KEY (run_id, venue)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_shows_start ON shows (start_date);
CREATE INDEX IF NOT EXISTS idx_shows_end   ON shows (end_date);
"#;

const DROP_ALL: &str = r#"
DROP TABLE IF EXISTS venue_runs;
DROP TABLE IF EXISTS scrape_runs;
DROP SEQUENCE IF EXISTS scrape_run_ids;
DROP TABLE IF EXISTS shows;
DROP TABLE IF EXISTS schema_version;
"#;

const SHOW_COLUMNS: &str = "name, theatre, image_url, link_url, start_date, end_date";

fn show_from_row(r: &duckdb::Row<'_>) -> duckdb::Result<Show> {
    Ok(Show {
        name: r.get(0)?,
        theatre: r.get(1)?,
        image_url: r.get(2)?,
        link_url: r.get(3)?,
        start_date: r.get(4)?,
        end_date: r.get(5)?,
    })
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

// ── Run log types ─────────────────────────────────────────────────────────────

/// Outcome of one venue within a run, as recorded in `venue_runs`.
#[derive(Debug, Clone)]
pub struct VenueRunRecord<'a> {
    pub venue: &'a str,
    pub pages: usize,
    pub shows_found: usize,
    pub shows_inserted: usize,
    pub error: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastRun {
    pub id: i64,
    pub started_at: NaiveDateTime,
    pub status: String,
    pub venues_succeeded: i64,
    pub venues_failed: i64,
    pub shows_inserted: i64,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Drop every table and recreate the schema.
    pub fn reset(&self) -> Result<()> {
        info!("Resetting database");
        self.conn.execute_batch(DROP_ALL).context("Dropping schema failed")?;
        self.run_migrations()
    }

    // ── Shows ─────────────────────────────────────────────────────────────────

    /// Insert shows not already stored. Returns how many rows were new; the
    /// rest were duplicates of the (theatre, name, start, end) key.
    pub fn insert_shows(&self, shows: &[Show]) -> Result<usize> {
        if shows.is_empty() {
            return Ok(0);
        }

        let before = self.show_count()?;
        let scraped_at = Utc::now().naive_utc();
        let mut seen = HashSet::new();

        let tx = self.conn.unchecked_transaction()?;
        for show in shows.iter().filter(|s| seen.insert(s.key())) {
            tx.execute(
                r#"INSERT OR IGNORE INTO shows
                       (theatre, name, image_url, link_url, start_date, end_date, scraped_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    show.theatre,
                    show.name,
                    show.image_url,
                    show.link_url,
                    show.start_date,
                    show.end_date,
                    scraped_at,
                ],
            )
            .with_context(|| format!("insert show {} / {}", show.theatre, show.name))?;
        }
        tx.commit()?;

        Ok((self.show_count()? - before).max(0) as usize)
    }

    /// Shows running at any point during the month, earliest first.
    pub fn shows_for_month(&self, year: i32, month: u32) -> Result<Vec<Show>> {
        let (first, last) = month_bounds(year, month)
            .with_context(|| format!("invalid month {year}-{month:02}"))?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SHOW_COLUMNS} FROM shows
             WHERE start_date <= ? AND end_date >= ?
             ORDER BY start_date, theatre, name"
        ))?;
        let shows = stmt
            .query_map(params![last, first], show_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(shows)
    }

    /// Distinct (year, month) pairs touched by a stored start or end date.
    pub fn months(&self) -> Result<Vec<(i32, u32)>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT DISTINCT y, m FROM (
                   SELECT CAST(year(start_date) AS INTEGER) AS y, CAST(month(start_date) AS INTEGER) AS m FROM shows
                   UNION
                   SELECT CAST(year(end_date) AS INTEGER), CAST(month(end_date) AS INTEGER) FROM shows
               ) ORDER BY y, m"#,
        )?;
        let months = stmt
            .query_map([], |r| Ok((r.get::<_, i32>(0)?, r.get::<_, i32>(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?
            .into_iter()
            .map(|(y, m)| (y, m as u32))
            .collect();
        Ok(months)
    }

    pub fn show_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM shows")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn counts_by_venue(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT theatre, COUNT(*) FROM shows GROUP BY theatre ORDER BY theatre")?;
        let counts = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(counts)
    }

    pub fn date_span(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let mut s = self.conn.prepare("SELECT MIN(start_date), MAX(end_date) FROM shows")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO scrape_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn record_venue_run(&self, run_id: i64, record: &VenueRunRecord<'_>) -> Result<()> {
        self.conn
            .execute(
                r#"INSERT OR REPLACE INTO venue_runs
                       (run_id, venue, status, pages, shows_found, shows_inserted, error_msg, finished_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    run_id,
                    record.venue,
                    if record.error.is_none() { "success" } else { "error" },
                    record.pages as i64,
                    record.shows_found as i64,
                    record.shows_inserted as i64,
                    record.error,
                    Utc::now().naive_utc(),
                ],
            )
            .with_context(|| format!("record venue run {}", record.venue))?;
        Ok(())
    }

    pub fn finish_scrape_run(
        &self,
        run_id: i64,
        succeeded: usize,
        failed: usize,
        shows_inserted: usize,
    ) -> Result<()> {
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               venues_succeeded = ?, venues_failed = ?, shows_inserted = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if failed == 0 { "success" } else { "partial" },
                succeeded as i64,
                failed as i64,
                shows_inserted as i64,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<LastRun>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, started_at, status, venues_succeeded, venues_failed, shows_inserted
               FROM scrape_runs ORDER BY id DESC LIMIT 1"#,
        )?;
        let mut rows = stmt.query_map([], |r| {
            Ok(LastRun {
                id: r.get(0)?,
                started_at: r.get(1)?,
                status: r.get(2)?,
                venues_succeeded: r.get(3)?,
                venues_failed: r.get(4)?,
                shows_inserted: r.get(5)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }

    /// Venues that failed in a run, with their errors.
    pub fn run_errors(&self, run_id: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT venue, error_msg FROM venue_runs
               WHERE run_id = ? AND error_msg IS NOT NULL
               ORDER BY venue"#,
        )?;
        let errors = stmt
            .query_map(params![run_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(errors)
    }
}

/// "2019-09" style label.
pub fn month_label(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// Parse a "YYYY-MM" month argument.
pub fn parse_month(text: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", text.trim()), "%Y-%m-%d")
        .with_context(|| format!("expected a month as YYYY-MM, got {text:?}"))?;
    Ok((date.year(), date.month()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
