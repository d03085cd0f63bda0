use super::*;

use serde_json::json;

use crate::storage::MemoryStorage;

fn storage() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStorage::new())
}

// =============================================================================
// Book
// =============================================================================

#[test]
fn book_decodes_from_bare_id() {
    let book: Book = serde_json::from_value(json!({ "id": "b1" })).unwrap();
    assert_eq!(book, Book::new("b1"));
}

#[test]
fn book_encodes_camel_case_and_skips_empty_fields() {
    let mut book = Book::new("b1").with_title("Dune");
    book.published_date = Some("1965".into());
    let value = serde_json::to_value(&book).unwrap();
    assert_eq!(value, json!({ "id": "b1", "title": "Dune", "publishedDate": "1965" }));
}

#[test]
fn book_keeps_unknown_fields() {
    let raw = json!({ "id": "b2", "title": "Emma", "pageCount": 474, "categories": ["Fiction"] });
    let book: Book = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(book.extra.get("pageCount"), Some(&json!(474)));
    assert_eq!(serde_json::to_value(&book).unwrap(), raw);
}

#[test]
fn book_display_includes_title_and_authors() {
    let book = Book::new("b3").with_title("Good Omens").with_authors(vec!["Pratchett".into(), "Gaiman".into()]);
    assert_eq!(book.to_string(), "b3  Good Omens (Pratchett, Gaiman)");
    assert_eq!(Book::new("b4").to_string(), "b4");
}

// =============================================================================
// ListKind
// =============================================================================

#[test]
fn list_kind_parses_and_maps_to_keys() {
    assert_eq!("liked".parse::<ListKind>().unwrap().key(), LIKED_BOOKS_KEY);
    assert_eq!("readlist".parse::<ListKind>().unwrap().key(), READLIST_BOOKS_KEY);
    assert!("wishlist".parse::<ListKind>().unwrap_err().contains("unknown list"));
    assert_eq!(ListKind::Readlist.to_string(), "readlist");
}

// =============================================================================
// Library
// =============================================================================

#[test]
fn open_starts_empty_and_persists_both_keys() {
    let storage = storage();
    let library = Library::open(&storage).unwrap();
    assert!(library.liked().get().is_empty());
    assert!(library.readlist().get().is_empty());
    assert_eq!(storage.get(LIKED_BOOKS_KEY).unwrap().as_deref(), Some("[]"));
    assert_eq!(storage.get(READLIST_BOOKS_KEY).unwrap().as_deref(), Some("[]"));
}

#[test]
fn lists_are_independent() {
    let storage = storage();
    let library = Library::open(&storage).unwrap();
    add_book(library.liked(), Book::new("b1")).unwrap();

    assert_eq!(library.list(ListKind::Liked).get().len(), 1);
    assert!(library.list(ListKind::Readlist).get().is_empty());
}

#[test]
fn reopen_restores_lists() {
    let storage = storage();
    {
        let library = Library::open(&storage).unwrap();
        add_book(library.readlist(), Book::new("b5").with_title("Middlemarch")).unwrap();
    }
    let library = Library::open(&storage).unwrap();
    assert_eq!(library.readlist().get(), vec![Book::new("b5").with_title("Middlemarch")]);
}

#[test]
fn corrupt_readlist_fails_open() {
    let storage = storage();
    storage.set(READLIST_BOOKS_KEY, "not json").unwrap();
    let err = Library::open(&storage).unwrap_err();
    assert!(matches!(err, StoreError::Deserialization { ref key, .. } if key == READLIST_BOOKS_KEY));
}

#[test]
fn add_book_skips_duplicate_ids() {
    let list = Reactive::new(Vec::new());
    assert!(add_book(&list, Book::new("b1")).unwrap());
    assert!(!add_book(&list, Book::new("b1").with_title("Other")).unwrap());
    assert_eq!(list.get(), vec![Book::new("b1")]);
}

#[test]
fn remove_book_reports_change() {
    let list = Reactive::new(vec![Book::new("b1"), Book::new("b2")]);
    assert!(remove_book(&list, "b1").unwrap());
    assert!(!remove_book(&list, "b1").unwrap());
    assert_eq!(list.get(), vec![Book::new("b2")]);
}
