//! `psql` command construction.
//!
//! Builds the three database commands the pipeline needs: run a SQL
//! statement, stream a data file into the target table with `COPY ... FROM
//! STDIN`, and count the rows of a relation. When a container is
//! configured, `psql` runs inside it via `docker exec -i`.

use std::path::Path;

use traj_import_models::{DatabaseConfig, ImportTarget};
use traj_import_runner::CommandSpec;

/// Builds [`CommandSpec`]s for one database.
#[derive(Debug, Clone, Copy)]
pub struct PsqlClient<'a> {
    db: &'a DatabaseConfig,
}

impl<'a> PsqlClient<'a> {
    #[must_use]
    pub const fn new(db: &'a DatabaseConfig) -> Self {
        Self { db }
    }

    fn base(&self) -> CommandSpec {
        let spec = match &self.db.container {
            Some(container) => CommandSpec::new(&self.db.docker).args([
                "exec",
                "-i",
                container.as_str(),
                self.db.psql.as_str(),
            ]),
            None => CommandSpec::new(&self.db.psql),
        };
        spec.args(["-U", self.db.user.as_str(), "-d", self.db.name.as_str()])
    }

    /// Runs a single SQL statement.
    #[must_use]
    pub fn execute_sql(&self, sql: &str) -> CommandSpec {
        self.base().arg("-c").arg(sql)
    }

    /// Deletes every row of `table`.
    #[must_use]
    pub fn clear_table(&self, table: &str) -> CommandSpec {
        self.execute_sql(&format!("DELETE FROM {table};"))
    }

    /// Streams `file` into the target table, stopping at the first error.
    #[must_use]
    pub fn copy_from_file(&self, target: &ImportTarget, file: &Path) -> CommandSpec {
        self.base()
            .args(["-q", "-v", "ON_ERROR_STOP=1", "-c"])
            .arg(copy_statement(target))
            .stdin_file(file)
    }

    /// Prints the row count of `relation` as a bare number.
    #[must_use]
    pub fn count_rows(&self, relation: &str) -> CommandSpec {
        self.base()
            .args(["-t", "-A", "-c"])
            .arg(format!("SELECT count(1) FROM {relation};"))
    }
}

/// The `COPY` statement that loads one data file into `target`.
#[must_use]
pub fn copy_statement(target: &ImportTarget) -> String {
    format!(
        "COPY {}({}) FROM STDIN WITH (FORMAT {}, DELIMITER {}, NULL {});",
        target.table,
        target.columns.join(","),
        target.format,
        quote_literal(&target.delimiter.to_string()),
        quote_literal(&target.null_token),
    )
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parses the output of [`PsqlClient::count_rows`], ignoring all
/// whitespace.
#[must_use]
pub fn parse_count(stdout: &str) -> Option<u64> {
    let digits: String = stdout.split_whitespace().collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use traj_import_models::WireFormat;

    use super::*;

    #[test]
    fn builds_default_copy_statement() {
        assert_eq!(
            copy_statement(&ImportTarget::default()),
            "COPY performance_wa(fid,geom,dtg,taxi_id) FROM STDIN WITH (FORMAT text, DELIMITER '|', NULL '');"
        );
    }

    #[test]
    fn escapes_quotes_in_literals() {
        let target = ImportTarget {
            table: "t".to_string(),
            columns: vec!["a".to_string()],
            format: WireFormat::Csv,
            delimiter: ',',
            null_token: "it's null".to_string(),
        };
        assert_eq!(
            copy_statement(&target),
            "COPY t(a) FROM STDIN WITH (FORMAT csv, DELIMITER ',', NULL 'it''s null');"
        );
    }

    #[test]
    fn copy_runs_through_container_with_stdin() {
        let db = DatabaseConfig::default();
        let spec = PsqlClient::new(&db)
            .copy_from_file(&ImportTarget::default(), Path::new("/data/part-0001.tbl"));
        assert_eq!(spec.program, "docker");
        assert_eq!(
            &spec.args[..8],
            [
                "exec",
                "-i",
                "my-postgis-container",
                "psql",
                "-U",
                "postgres",
                "-d",
                "postgres"
            ]
        );
        assert!(spec.args.contains(&"ON_ERROR_STOP=1".to_string()));
        assert_eq!(spec.stdin, Some(PathBuf::from("/data/part-0001.tbl")));
    }

    #[test]
    fn runs_psql_locally_without_container() {
        let db = DatabaseConfig {
            container: None,
            ..DatabaseConfig::default()
        };
        let spec = PsqlClient::new(&db).clear_table("performance_wa");
        assert_eq!(spec.program, "psql");
        assert_eq!(
            spec.args,
            [
                "-U",
                "postgres",
                "-d",
                "postgres",
                "-c",
                "DELETE FROM performance_wa;"
            ]
        );
        assert!(spec.stdin.is_none());
    }

    #[test]
    fn count_query_is_tuples_only() {
        let db = DatabaseConfig::default();
        let spec = PsqlClient::new(&db).count_rows("performance");
        assert!(spec.args.contains(&"-t".to_string()));
        assert_eq!(
            spec.args.last().map(String::as_str),
            Some("SELECT count(1) FROM performance;")
        );
    }

    #[test]
    fn parses_counts() {
        assert_eq!(parse_count("  980001\n"), Some(980_001));
        assert_eq!(parse_count("9 800 01"), Some(980_001));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("ERROR"), None);
    }
}
