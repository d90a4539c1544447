use keyspan::{Database, FilterIndex, IndexDefinition, IndexedCollection, SearchIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub genre: String,
    pub year: i32,
    pub title: String,
}

pub fn book(genre: &str, year: i32, title: &str) -> Book {
    Book {
        genre: genre.to_string(),
        year,
        title: title.to_string(),
    }
}

pub fn book_indexes() -> Vec<IndexDefinition<u64, Book>> {
    vec![
        FilterIndex::new("genre", |_: &u64, b: &Book| b.genre.clone())
            .unwrap()
            .into(),
        FilterIndex::new("year", |_: &u64, b: &Book| b.year)
            .unwrap()
            .into(),
        SearchIndex::new("title", |_: &u64, b: &Book| Some(b.title.clone()))
            .unwrap()
            .into(),
    ]
}

pub fn seeded_catalog(db: &Database) -> IndexedCollection<u64, Book> {
    let books = db.open_indexed("books", book_indexes()).unwrap();
    db.transaction(|tx| {
        books.add(tx, 1, book("fiction", 1999, "The Silent River"))?;
        books.add(tx, 2, book("history", 2005, "River Empires"))?;
        books.add(tx, 3, book("fiction", 2012, "Glass Mountain"))?;
        books.add(tx, 4, book("science", 2012, "Silent Spring Revisited"))?;
        Ok(())
    })
    .unwrap();
    books
}
