use super::core::Database;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            -- External input tables, immutable after ingest
            CREATE TABLE IF NOT EXISTS patents (
                patent_id TEXT PRIMARY KEY,
                grant_date TEXT NOT NULL,
                kind TEXT NOT NULL,
                codes TEXT NOT NULL, -- JSON array, ordered, deduplicated
                shard INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_patents_shard ON patents (shard);
            CREATE INDEX IF NOT EXISTS idx_patents_grant_date ON patents (grant_date);

            CREATE TABLE IF NOT EXISTS patent_abstracts (
                patent_id TEXT PRIMARY KEY,
                abstract TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS patent_assignees (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patent_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                UNIQUE(patent_id, position)
            );
            CREATE INDEX IF NOT EXISTS idx_patent_assignees_patent_id ON patent_assignees (patent_id);

            -- Firm registry, owned by the external reference dataset
            CREATE TABLE IF NOT EXISTS firms (
                firm_id TEXT PRIMARY KEY,
                canonical_name TEXT NOT NULL,
                aliases TEXT NOT NULL, -- JSON array
                valid_from TEXT,
                valid_to TEXT
            );

            CREATE TABLE IF NOT EXISTS firm_financials (
                firm_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                market_cap REAL,
                valuation REAL,
                PRIMARY KEY (firm_id, year)
            );

            -- Stage outputs, each fully recomputed by its stage
            CREATE TABLE IF NOT EXISTS classifications (
                patent_id TEXT PRIMARY KEY,
                is_ai BOOLEAN NOT NULL,
                category TEXT NOT NULL,
                evidence TEXT NOT NULL -- JSON array of evidence strings
            );
            CREATE INDEX IF NOT EXISTS idx_classifications_is_ai ON classifications (is_ai);

            CREATE TABLE IF NOT EXISTS resolutions (
                patent_id TEXT PRIMARY KEY,
                assignee_name TEXT NOT NULL,
                firm_id TEXT,
                method TEXT NOT NULL,
                confidence REAL NOT NULL,
                similarity REAL,
                runner_up TEXT,
                runner_up_score REAL
            );
            CREATE INDEX IF NOT EXISTS idx_resolutions_firm_id ON resolutions (firm_id);
            CREATE INDEX IF NOT EXISTS idx_resolutions_method ON resolutions (method);

            CREATE TABLE IF NOT EXISTS panel (
                firm_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                n_infrastructure INTEGER NOT NULL,
                n_algorithm INTEGER NOT NULL,
                n_application INTEGER NOT NULL,
                n_unknown INTEGER NOT NULL,
                n_total INTEGER NOT NULL,
                first_grant TEXT NOT NULL,
                last_grant TEXT NOT NULL,
                market_cap REAL,
                valuation REAL,
                PRIMARY KEY (firm_id, year)
            );

            -- Per-run audit counters, read by the stats surface
            CREATE TABLE IF NOT EXISTS run_stats (
                stage TEXT NOT NULL,
                name TEXT NOT NULL,
                value INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (stage, name)
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
