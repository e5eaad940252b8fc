use super::{like_pattern, Repository};
use crate::core::error::{LeafError, Result};
use crate::core::utils::PageRequest;
use crate::db::manager::DatabaseManager;
use crate::db::models::Book;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row};
use std::sync::Arc;

const BOOK_COLUMNS: &str = "id, title, author, category, isbn, description, cover_url, \
     publication_year, pages, available, posted_by, created_at";

fn map_book(row: &Row) -> rusqlite::Result<Book> {
    map_book_at(row, 0)
}

/// Map the book columns starting at `o`, for joined queries
pub(crate) fn map_book_at(row: &Row, o: usize) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(o)?,
        title: row.get(o + 1)?,
        author: row.get(o + 2)?,
        category: row.get(o + 3)?,
        isbn: row.get(o + 4)?,
        description: row.get(o + 5)?,
        cover_url: row.get(o + 6)?,
        publication_year: row.get(o + 7)?,
        pages: row.get(o + 8)?,
        available: row.get(o + 9)?,
        posted_by: row.get(o + 10)?,
        created_at: row.get(o + 11)?,
    })
}

/// Book column list qualified with a table alias
pub(crate) fn book_columns(alias: &str) -> String {
    BOOK_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a book inside an open connection or transaction
pub fn find_book(conn: &Connection, id: &str) -> Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS),
        [id],
        map_book,
    )
    .optional()
    .map_err(LeafError::DatabaseError)
}

pub fn set_available(conn: &Connection, book_id: &str, available: bool) -> Result<()> {
    conn.execute(
        "UPDATE books SET available = ? WHERE id = ?",
        rusqlite::params![available, book_id],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

pub fn count_posted_by(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM books WHERE posted_by = ?",
        [user_id],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

/// Book search parameters
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub available_only: bool,
}

impl BookFilter {
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(like_pattern(term));
            let n = params.len();
            conditions.push(format!(
                "(title LIKE ?{n} ESCAPE '\\' OR author LIKE ?{n} ESCAPE '\\' \
                 OR description LIKE ?{n} ESCAPE '\\')"
            ));
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            params.push(category.to_string());
            conditions.push(format!("category = ?{}", params.len()));
        }
        if self.available_only {
            conditions.push("available = 1".to_string());
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), params)
        }
    }
}

/// Repository for Book entities
pub struct BookRepository {
    db: Arc<DatabaseManager>,
}

impl BookRepository {
    /// Create a new BookRepository
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        let isbn = isbn.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM books WHERE isbn = ?", BOOK_COLUMNS),
                    [&isbn],
                    map_book,
                )
                .optional()
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// Newest-first search with total count
    pub async fn search(&self, filter: BookFilter, page: PageRequest) -> Result<(Vec<Book>, i64)> {
        self.db
            .execute(move |conn| {
                let (clause, params) = filter.where_clause();

                let total: i64 = conn
                    .query_row(
                        &format!("SELECT COUNT(*) FROM books {}", clause),
                        rusqlite::params_from_iter(params.iter()),
                        |row| row.get(0),
                    )
                    .map_err(LeafError::DatabaseError)?;

                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM books {} ORDER BY created_at DESC, title LIMIT {} OFFSET {}",
                        BOOK_COLUMNS,
                        clause,
                        page.limit(),
                        page.offset()
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let books = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), map_book)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;

                Ok((books, total))
            })
            .await
    }

    /// Sorted distinct categories
    pub async fn categories(&self) -> Result<Vec<String>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare("SELECT DISTINCT category FROM books ORDER BY category")
                    .map_err(LeafError::DatabaseError)?;
                let categories = stmt
                    .query_map([], |row| row.get(0))
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<String>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(categories)
            })
            .await
    }

    pub async fn find_by_poster(&self, user_id: &str) -> Result<Vec<Book>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM books WHERE posted_by = ? ORDER BY created_at DESC",
                        BOOK_COLUMNS
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let books = stmt
                    .query_map([&user_id], map_book)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(books)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64> {
        self.db
            .execute(|conn| {
                conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
                    .map_err(LeafError::DatabaseError)
            })
            .await
    }

    pub async fn count_by_poster(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| count_posted_by(conn, &user_id))
            .await
    }

    /// Whether the book is currently lent out under an agreed, unreturned loan
    pub async fn has_active_loan(&self, book_id: &str) -> Result<bool> {
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM borrowed_books \
                     WHERE book_id = ? AND is_agreed = 1 AND is_returned = 0)",
                    [&book_id],
                    |row| row.get(0),
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }
}

#[async_trait]
impl Repository<Book> for BookRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Book>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_book(conn, &id)).await
    }

    async fn find_all(&self) -> Result<Vec<Book>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {} FROM books ORDER BY title", BOOK_COLUMNS))
                    .map_err(LeafError::DatabaseError)?;
                let books = stmt
                    .query_map([], map_book)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(books)
            })
            .await
    }

    async fn create(&self, book: &Book) -> Result<()> {
        let book = book.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO books (id, title, author, category, isbn, description, cover_url, \
                     publication_year, pages, available, posted_by, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![
                        &book.id,
                        &book.title,
                        &book.author,
                        &book.category,
                        &book.isbn,
                        &book.description,
                        &book.cover_url,
                        book.publication_year,
                        book.pages,
                        book.available,
                        &book.posted_by,
                        &book.created_at,
                    ],
                )
                .map_err(|e| LeafError::on_unique_violation(e, "A book with this ISBN already exists"))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, book: &Book) -> Result<()> {
        let book = book.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE books SET title = ?, author = ?, category = ?, isbn = ?, description = ?, \
                     cover_url = ?, publication_year = ?, pages = ?, available = ? WHERE id = ?",
                    rusqlite::params![
                        &book.title,
                        &book.author,
                        &book.category,
                        &book.isbn,
                        &book.description,
                        &book.cover_url,
                        book.publication_year,
                        book.pages,
                        book.available,
                        &book.id,
                    ],
                )
                .map_err(|e| LeafError::on_unique_violation(e, "A book with this ISBN already exists"))?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("DELETE FROM books WHERE id = ?", [&id])
                    .map_err(LeafError::DatabaseError)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::{book_fixture, db, insert_book, insert_user};

    #[tokio::test]
    async fn test_search_by_title_author_and_category() {
        let db = db();
        let repo = BookRepository::new(db.clone());
        insert_user(&db, "u1", "alice").await;
        insert_book(&db, "b1", "Dune", Some("u1")).await;
        insert_book(&db, "b2", "Emma", Some("u1")).await;
        let mut poetry = book_fixture("b3", "Odes", None);
        poetry.category = "Poetry".into();
        poetry.author = "Keats".into();
        repo.create(&poetry).await.unwrap();

        let page = PageRequest::new(None, None, 12);
        let (found, total) = repo
            .search(
                BookFilter {
                    search: Some("dun".into()),
                    ..Default::default()
                },
                page,
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, "b1");

        let (found, _) = repo
            .search(
                BookFilter {
                    search: Some("keats".into()),
                    category: Some("Poetry".into()),
                    available_only: true,
                },
                page,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert_eq!(repo.categories().await.unwrap(), vec!["Fiction", "Poetry"]);
    }

    #[tokio::test]
    async fn test_duplicate_isbn_is_conflict() {
        let db = db();
        let repo = BookRepository::new(db.clone());
        insert_book(&db, "b1", "Dune", None).await;

        let mut copy = book_fixture("b2", "Dune again", None);
        copy.isbn = "isbn-b1".into();
        assert!(matches!(
            repo.create(&copy).await.unwrap_err(),
            LeafError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_available_only_hides_lent_books() {
        let db = db();
        let repo = BookRepository::new(db.clone());
        insert_book(&db, "b1", "Dune", None).await;
        db.execute(|conn| set_available(conn, "b1", false)).await.unwrap();

        let (found, total) = repo
            .search(
                BookFilter {
                    available_only: true,
                    ..Default::default()
                },
                PageRequest::new(None, None, 12),
            )
            .await
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(total, 0);
    }
}
