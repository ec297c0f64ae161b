use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info};

use crate::record::BookRecord;

const INSERT_BOOK: &str = "INSERT INTO books (title, authors, price, rating) VALUES (?1, ?2, ?3, ?4)";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS books (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            title   TEXT NOT NULL,
            authors TEXT,
            price   TEXT,
            rating  TEXT
        );
        ",
    )?;
    Ok(())
}

// ── Load ──

/// An insert failed. Rows before `index` are committed; nothing after it was attempted.
#[derive(Debug, Error)]
#[error("insert of record {index} ({title:?}) failed after {written} rows were written: {source}")]
pub struct InsertFailure {
    pub index: usize,
    pub title: String,
    pub written: usize,
    #[source]
    pub source: rusqlite::Error,
}

/// Insert records one at a time, each in its own implicit transaction, stopping at the first error.
pub fn load<'a, I>(conn: &Connection, records: I) -> Result<usize, InsertFailure>
where
    I: IntoIterator<Item = &'a BookRecord>,
{
    let mut written = 0usize;

    for (index, book) in records.into_iter().enumerate() {
        let outcome = conn.prepare_cached(INSERT_BOOK).and_then(|mut stmt| {
            stmt.execute(rusqlite::params![
                book.title,
                book.author,
                book.price,
                book.rating.as_str(),
            ])
        });

        if let Err(source) = outcome {
            return Err(InsertFailure {
                index,
                title: book.title.clone(),
                written,
                source,
            });
        }
        debug!("Inserted {:?}", book.title);
        written += 1;
    }

    info!("Loaded {} books", written);
    Ok(written)
}

// ── Stats ──

pub fn count_books(conn: &Connection) -> Result<usize> {
    let n: usize = conn.query_row("SELECT COUNT(*) FROM books", [], |r| r.get(0))?;
    Ok(n)
}

pub struct RatingCount {
    pub rating: String,
    pub count: usize,
}

pub fn count_by_rating(conn: &Connection) -> Result<Vec<RatingCount>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(rating, ''), COUNT(*)
         FROM books
         GROUP BY rating
         ORDER BY CASE rating
             WHEN 'One' THEN 1 WHEN 'Two' THEN 2 WHEN 'Three' THEN 3
             WHEN 'Four' THEN 4 WHEN 'Five' THEN 5 ELSE 6 END",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RatingCount {
                rating: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Rating;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    /// Make inserts of the given title fail, standing in for a constraint violation.
    fn reject_title(conn: &Connection, title: &str) {
        conn.execute_batch(&format!(
            "CREATE TRIGGER reject_title BEFORE INSERT ON books
             WHEN NEW.title = '{}'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            title
        ))
        .unwrap();
    }

    fn titles(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("SELECT title FROM books ORDER BY id").unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = memory_db();
        init_schema(&conn).unwrap();
        assert_eq!(count_books(&conn).unwrap(), 0);
    }

    #[test]
    fn loads_in_order_with_text_columns() {
        let conn = memory_db();
        let books = vec![
            BookRecord::new("Olio", "£23.88", Rating::One),
            BookRecord::new("Sapiens", "£54.23", Rating::Five),
        ];
        assert_eq!(load(&conn, &books).unwrap(), 2);

        let row: (String, String, String, String) = conn
            .query_row(
                "SELECT title, authors, price, rating FROM books WHERE id = 2",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(
            row,
            (
                "Sapiens".to_string(),
                "Various".to_string(),
                "£54.23".to_string(),
                "Five".to_string()
            )
        );
        assert_eq!(titles(&conn), vec!["Olio", "Sapiens"]);
    }

    #[test]
    fn empty_input_writes_nothing() {
        let conn = memory_db();
        assert_eq!(load(&conn, &Vec::<BookRecord>::new()).unwrap(), 0);
        assert_eq!(count_books(&conn).unwrap(), 0);
    }

    #[test]
    fn stops_at_first_failed_insert() {
        let conn = memory_db();
        reject_title(&conn, "Bad");
        let books = vec![
            BookRecord::new("Good", "£1.00", Rating::One),
            BookRecord::new("Bad", "£2.00", Rating::Two),
            BookRecord::new("Never", "£3.00", Rating::Three),
        ];

        let err = load(&conn, &books).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.written, 1);
        assert_eq!(err.title, "Bad");

        // first row stays committed, third never attempted
        assert_eq!(titles(&conn), vec!["Good"]);
    }

    #[test]
    fn earlier_rows_survive_lost_table() {
        let conn = memory_db();
        let first = vec![BookRecord::new("Kept", "£1.00", Rating::Four)];
        load(&conn, &first).unwrap();

        conn.execute_batch("ALTER TABLE books RENAME TO books_old").unwrap();
        let err = load(&conn, &first).unwrap_err();
        assert_eq!(err.written, 0);
        assert_eq!(err.index, 0);

        let kept: usize = conn
            .query_row("SELECT COUNT(*) FROM books_old", [], |r| r.get(0))
            .unwrap();
        assert_eq!(kept, 1);
    }

    #[test]
    fn rating_breakdown_in_star_order() {
        let conn = memory_db();
        let books = vec![
            BookRecord::new("a", "£1", Rating::Five),
            BookRecord::new("b", "£1", Rating::One),
            BookRecord::new("c", "£1", Rating::Five),
        ];
        load(&conn, &books).unwrap();
        let counts = count_by_rating(&conn).unwrap();
        let pairs: Vec<(&str, usize)> = counts.iter().map(|c| (c.rating.as_str(), c.count)).collect();
        assert_eq!(pairs, vec![("One", 1), ("Five", 2)]);
    }
}
