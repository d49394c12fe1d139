// collection_tests.rs
// End-to-end collection behaviour over the in-memory store

use serde_json::{json, Value};
use songodb_core::storage::MemoryStore;
use songodb_core::{
    Collection, FindOptions, Namespace, ObjectStore, ScanOptions, SortSpec, UpdateOptions,
};
use std::sync::Arc;

fn setup_collection(name: &str) -> Collection<MemoryStore> {
    let namespace = Namespace::new("test", "db", name).unwrap();
    Collection::new(namespace, Arc::new(MemoryStore::new()))
}

async fn seed(coll: &Collection<MemoryStore>, docs: Vec<Value>) {
    let result = coll.insert_many(docs).await.unwrap();
    assert!(result.errors.is_empty());
}

fn ids(docs: &[Value]) -> Vec<String> {
    docs.iter().map(|d| d["_id"].as_str().unwrap().to_string()).collect()
}

// ========== UPDATE TESTS ==========

#[tokio::test]
async fn test_max_only_modifies_improved_documents() {
    let coll = setup_collection("max");
    seed(
        &coll,
        vec![
            json!({"_id": "1", "i": 1, "foo": "foo"}),
            json!({"_id": "2", "i": 2, "foo": "bar"}),
            json!({"_id": "3", "i": 3, "foo": "bar"}),
        ],
    )
    .await;

    let result = coll
        .update_many(&json!({"foo": "bar"}), &json!({"$max": {"i": 3}}), &UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(result.matched_count, 2);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.upserted_count, 0);

    let found = coll
        .find(&json!({}), &FindOptions::new().with_sort(SortSpec::ascending("_id")))
        .await
        .unwrap();
    let values: Vec<i64> = found.docs.iter().map(|d| d["i"].as_i64().unwrap()).collect();
    assert_eq!(values, vec![1, 3, 3]);
}

#[tokio::test]
async fn test_set_twice_is_idempotent() {
    let coll = setup_collection("idempotent");
    seed(
        &coll,
        (0..5).map(|i| json!({"_id": format!("d{}", i), "i": i})).collect(),
    )
    .await;

    let update = json!({"$set": {"status": "done"}});
    let first = coll.update_many(&json!({}), &update, &UpdateOptions::new()).await.unwrap();
    assert_eq!(first.matched_count, 5);
    assert_eq!(first.modified_count, 5);

    let second = coll.update_many(&json!({}), &update, &UpdateOptions::new()).await.unwrap();
    assert_eq!(second.matched_count, 5);
    assert_eq!(second.modified_count, 0);
}

#[tokio::test]
async fn test_update_only_writes_changed_documents() {
    let coll = setup_collection("changed");
    seed(
        &coll,
        vec![
            json!({"_id": "1", "i": 1, "name": "daniel"}),
            json!({"_id": "2", "i": 2, "name": "daniel"}),
        ],
    )
    .await;
    let result = coll
        .update_many(&json!({"name": "daniel"}), &json!({"$set": {"i": 2}}), &UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(result.matched_count, 2);
    assert_eq!(result.modified_count, 1);
}

#[tokio::test]
async fn test_upsert_inserts_when_nothing_matches() {
    let coll = setup_collection("upsert");
    seed(&coll, vec![json!({"_id": "1", "name": "obj1", "i": 1})]).await;

    let result = coll
        .update_many(
            &json!({"name": "obj4"}),
            &json!({"$set": {"i": 4}}),
            &UpdateOptions::new().upsert(),
        )
        .await
        .unwrap();
    assert_eq!(result.upserted_count, 1);
    assert_eq!(result.matched_count, 0);
    assert_eq!(result.modified_count, 0);

    let id = result.upserted_id.unwrap().id;
    let found = coll.find(&json!({"i": 4}), &FindOptions::new()).await.unwrap();
    assert_eq!(found.docs.len(), 1);
    assert_eq!(found.docs[0]["_id"], id.to_value());
}

#[tokio::test]
async fn test_upsert_applies_set_on_insert() {
    let coll = setup_collection("set_on_insert");
    let result = coll
        .update_many(
            &json!({"name": "x"}),
            &json!({"$set": {"a": 1}, "$setOnInsert": {"created": true}}),
            &UpdateOptions::new().upsert(),
        )
        .await
        .unwrap();
    assert_eq!(result.upserted_count, 1);

    let doc = coll.find_one(&json!({"a": 1}), &FindOptions::new()).await.unwrap().unwrap();
    assert_eq!(doc["created"], json!(true));

    // On an existing match $setOnInsert does nothing
    let again = coll
        .update_many(
            &json!({"a": 1}),
            &json!({"$setOnInsert": {"created": false}}),
            &UpdateOptions::new().upsert(),
        )
        .await
        .unwrap();
    assert_eq!(again.matched_count, 1);
    assert_eq!(again.modified_count, 0);
    assert_eq!(again.upserted_count, 0);
}

#[tokio::test]
async fn test_update_without_upsert_reports_zero() {
    let coll = setup_collection("no_upsert");
    let result = coll
        .update_many(&json!({"name": "nobody"}), &json!({"$set": {"i": 1}}), &UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(result.matched_count, 0);
    assert_eq!(result.upserted_count, 0);
    assert!(coll.store().is_empty());
}

#[tokio::test]
async fn test_update_cannot_change_id() {
    let coll = setup_collection("immutable_id");
    seed(&coll, vec![json!({"_id": "a", "i": 1})]).await;
    let err = coll
        .update_many(&json!({}), &json!({"$set": {"_id": "b"}}), &UpdateOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}

// ========== REPLACE TESTS ==========

#[tokio::test]
async fn test_replace_overwrites_first_match_only() {
    let coll = setup_collection("replace");
    seed(
        &coll,
        vec![
            json!({"_id": "1", "group": "g", "v": 1}),
            json!({"_id": "2", "group": "g", "v": 2}),
            json!({"_id": "3", "group": "h", "v": 3}),
        ],
    )
    .await;

    let result = coll
        .replace_one(&json!({"group": "g"}), &json!({"replaced": true}), &UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(result.matched_count, 2);
    assert_eq!(result.modified_count, 1);

    let replaced = coll.find(&json!({"replaced": true}), &FindOptions::new()).await.unwrap();
    assert_eq!(replaced.docs, vec![json!({"_id": "1", "replaced": true})]);
    let untouched = coll.find(&json!({"group": "g"}), &FindOptions::new()).await.unwrap();
    assert_eq!(ids(&untouched.docs), vec!["2".to_string()]);
}

#[tokio::test]
async fn test_replace_by_id_uses_point_lookup() {
    let coll = setup_collection("replace_id");
    seed(&coll, vec![json!({"_id": "1", "v": 1}), json!({"_id": "2", "v": 2})]).await;
    let result = coll
        .replace_one(&json!({"_id": "2"}), &json!({"v": 20}), &UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.explain.execution_stats.total_docs_examined, 1);
    let doc = coll.find_one(&json!({"_id": "2"}), &FindOptions::new()).await.unwrap();
    assert_eq!(doc, Some(json!({"_id": "2", "v": 20})));
}

// ========== DELETE TESTS ==========

#[tokio::test]
async fn test_delete_by_filter() {
    let coll = setup_collection("delete_filter");
    seed(
        &coll,
        vec![json!({"_id": "1", "i": 1}), json!({"_id": "2", "i": 2}), json!({"_id": "3", "i": 3})],
    )
    .await;

    let result = coll
        .delete(&json!({"i": {"$gte": 2}}), &ScanOptions::new())
        .await
        .unwrap();
    assert_eq!(result.deleted_count, 2);
    assert!(result.errors.is_empty());
    assert_eq!(result.explain.execution_stats.total_docs_examined, 3);

    let left = coll.find(&json!({}), &FindOptions::new()).await.unwrap();
    assert_eq!(ids(&left.docs), vec!["1".to_string()]);
}

#[tokio::test]
async fn test_delete_one_counts_existing_key_only() {
    let coll = setup_collection("delete_one");
    seed(&coll, vec![json!({"_id": "1"})]).await;
    let hit = coll.delete(&json!({"_id": "1"}), &ScanOptions::new()).await.unwrap();
    assert_eq!(hit.deleted_count, 1);
    let miss = coll.delete(&json!({"_id": "1"}), &ScanOptions::new()).await.unwrap();
    assert_eq!(miss.deleted_count, 0);
}

#[tokio::test]
async fn test_delete_many_is_bounded_by_one_page() {
    let coll = setup_collection("delete_page");
    seed(&coll, (0..10).map(|i| json!({"_id": format!("{:02}", i), "x": 1})).collect()).await;
    let result = coll
        .delete(&json!({"x": 1}), &ScanOptions::new().with_page_size(4))
        .await
        .unwrap();
    assert_eq!(result.deleted_count, 4);
    assert!(result.explain.is_truncated());
    assert_eq!(coll.store().len(), 6);
}

#[tokio::test]
async fn test_drop_removes_more_than_one_page() {
    let coll = setup_collection("drop");
    let docs: Vec<Value> = (0..2345).map(|i| json!({"_id": format!("doc{}", i)})).collect();
    seed(&coll, docs).await;
    let neighbour = Namespace::new("test", "db", "drop2").unwrap();
    coll.store().put_one(&format!("{}keep", neighbour.prefix()), &json!({"_id": "keep"})).await.unwrap();

    let result = coll.delete(&Value::Null, &ScanOptions::new()).await.unwrap();
    assert_eq!(result.deleted_count, 2345);
    assert_eq!(coll.store().keys(), vec!["test/db/drop2/keep".to_string()]);
}

// ========== FIND TESTS ==========

#[tokio::test]
async fn test_sort_by_first_name() {
    let coll = setup_collection("sort");
    seed(
        &coll,
        vec![
            json!({"_id": "a", "first": "Jane"}),
            json!({"_id": "b", "first": "John"}),
            json!({"_id": "c", "first": "Joe"}),
        ],
    )
    .await;
    let options = FindOptions::from_json(&json!({"sort": [["first", 1]]})).unwrap();
    let found = coll.find(&json!({}), &options).await.unwrap();
    let names: Vec<&str> = found.docs.iter().map(|d| d["first"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Jane", "Joe", "John"]);
}

#[tokio::test]
async fn test_find_pages_with_continuation_token() {
    let coll = setup_collection("paging");
    seed(&coll, (0..7).map(|i| json!({"_id": format!("{}", i)})).collect()).await;

    let mut options = FindOptions::new().with_scan(ScanOptions::new().with_page_size(3));
    let mut seen = Vec::new();
    loop {
        let page = coll.find(&json!({}), &options).await.unwrap();
        assert!(page.docs.len() <= 3);
        seen.extend(ids(&page.docs));
        if !page.explain.is_truncated() {
            break;
        }
        options.scan.continuation_token = page.explain.next_continuation_token().map(str::to_string);
    }
    assert_eq!(seen, (0..7).map(|i| i.to_string()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_skip_and_limit_apply_within_page() {
    let coll = setup_collection("skip_limit");
    seed(&coll, (0..6).map(|i| json!({"_id": format!("{}", i), "n": i})).collect()).await;
    let options = FindOptions::from_json(&json!({"pageSize": 4, "skip": 1, "limit": 2, "sort": [["n", -1]]})).unwrap();
    let found = coll.find(&json!({}), &options).await.unwrap();
    // Page holds n = 0..3; sorted descending then skip 1, limit 2
    let ns: Vec<i64> = found.docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![2, 1]);
    assert_eq!(found.explain.execution_stats.n_returned, 2);
    assert_eq!(found.explain.execution_stats.total_docs_examined, 4);
}

#[tokio::test]
async fn test_point_lookup_matches_scan() {
    let coll = setup_collection("point");
    seed(&coll, vec![json!({"_id": "x", "v": 1}), json!({"_id": "y", "v": 2})]).await;

    let point = coll.find(&json!({"_id": "x"}), &FindOptions::new()).await.unwrap();
    let scanned = coll
        .find(&json!({"$and": [{"_id": "x"}]}), &FindOptions::new())
        .await
        .unwrap();
    assert_eq!(point.docs, scanned.docs);
    assert_eq!(point.explain.execution_stats.total_docs_examined, 1);
    assert_eq!(scanned.explain.execution_stats.total_docs_examined, 2);

    let missing = coll.find(&json!({"_id": "nope"}), &FindOptions::new()).await.unwrap();
    assert!(missing.docs.is_empty());
    assert_eq!(missing.explain.execution_stats.total_docs_examined, 0);
}

#[tokio::test]
async fn test_point_lookup_of_unaddressable_id_matches_scan() {
    let coll = setup_collection("unaddressable");
    seed(&coll, vec![json!({"_id": "x", "v": 1})]).await;

    for id in ["a/b", "", "..", "$x"] {
        let point = coll.find(&json!({"_id": id}), &FindOptions::new()).await.unwrap();
        let scanned = coll
            .find(&json!({"_id": {"$eq": id}}), &FindOptions::new())
            .await
            .unwrap();
        assert!(point.docs.is_empty(), "id {:?}", id);
        assert_eq!(point.docs, scanned.docs);

        let updated = coll
            .update_many(&json!({"_id": id}), &json!({"$set": {"i": 1}}), &UpdateOptions::new())
            .await
            .unwrap();
        assert_eq!(updated.matched_count, 0);
        assert_eq!(updated.modified_count, 0);

        let deleted = coll.delete(&json!({"_id": id}), &ScanOptions::new()).await.unwrap();
        assert_eq!(deleted.deleted_count, 0);
    }

    let upserted = coll
        .update_many(
            &json!({"_id": "a/b"}),
            &json!({"$set": {"i": 1}}),
            &UpdateOptions::new().upsert(),
        )
        .await
        .unwrap();
    assert_eq!(upserted.upserted_count, 1);

    let replaced = coll
        .replace_one(&json!({"_id": ""}), &json!({"v": 2}), &UpdateOptions::new().upsert())
        .await
        .unwrap();
    assert_eq!(replaced.upserted_count, 1);
    assert_eq!(coll.store().len(), 3);
}

#[tokio::test]
async fn test_invalid_filter_is_client_error() {
    let coll = setup_collection("invalid");
    let err = coll.find(&json!({"a": {"$near": 1}}), &FindOptions::new()).await.unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(err.code(), "InvalidArgument");
}
