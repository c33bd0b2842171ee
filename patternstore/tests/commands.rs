//! End-to-end command tests against the in-memory backend.

use patternstore::{
    bson::{Bson, doc, oid::ObjectId},
    error::ErrorKind,
    memory::InMemoryStore,
    prelude::*,
};
use serde_json::{Value, json};

const COLLECTION: &str = "test";

fn processor() -> PatternProcessor<InMemoryStore> {
    PatternProcessor::new(InMemoryStore::new())
}

async fn act(processor: &PatternProcessor<InMemoryStore>, pattern: Value) -> Value {
    processor
        .act(pattern)
        .await
        .unwrap_or_else(|err| panic!("pattern failed: {err}"))
}

async fn create(processor: &PatternProcessor<InMemoryStore>, data: Value) -> String {
    let created = act(processor, json!({ "cmd": "create", "collection": COLLECTION, "data": data })).await;

    created["_id"]
        .as_str()
        .expect("create returns a string id")
        .to_string()
}

async fn names(processor: &PatternProcessor<InMemoryStore>, query: Value) -> Vec<String> {
    let found = act(processor, json!({ "cmd": "find", "collection": COLLECTION, "query": query })).await;

    found["result"]
        .as_array()
        .expect("find returns a result array")
        .iter()
        .map(|document| document["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn extended_data() -> Value {
    json!({
        "date": { "$date": "2017-03-13T16:21:18.123Z" },
        "objectId": { "$oid": "58c6c65ed78c6a977a0041a8" },
        "ref": { "$ref": "test", "$id": { "$oid": "58c6c65ed78c6a977a0041a8" } },
    })
}

#[tokio::test]
async fn create_then_find_by_id_returns_the_document() {
    let processor = processor();
    let id = create(&processor, json!({ "name": "peter" })).await;

    let found = act(&processor, json!({ "cmd": "findById", "collection": COLLECTION, "id": id })).await;

    assert_eq!(found, json!({ "_id": { "$oid": id }, "name": "peter" }));
}

#[tokio::test]
async fn extended_values_survive_storage() {
    let processor = processor();
    let id = create(&processor, extended_data()).await;

    let stored = processor
        .store()
        .collection(COLLECTION)
        .find_one(doc! { "_id": ObjectId::parse_str(&id).unwrap() })
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(stored.get("date"), Some(Bson::DateTime(_))));
    assert!(matches!(stored.get("objectId"), Some(Bson::ObjectId(_))));
    assert!(matches!(
        stored.get_document("ref").ok().and_then(|reference| reference.get("$id")),
        Some(Bson::ObjectId(_))
    ));

    let found = act(&processor, json!({ "cmd": "findById", "collection": COLLECTION, "id": id })).await;

    for (field, value) in extended_data().as_object().unwrap() {
        assert_eq!(&found[field], value, "field {field}");
    }
}

#[tokio::test]
async fn create_batch_returns_distinct_ids_in_order() {
    let processor = processor();

    let created = act(
        &processor,
        json!({ "cmd": "create", "collection": COLLECTION, "data": [{ "name": "peter" }, { "name": "parker" }] }),
    )
    .await;

    let ids = created["_ids"].as_array().unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    let second = act(&processor, json!({ "cmd": "findById", "collection": COLLECTION, "id": ids[1] })).await;
    assert_eq!(second["name"], json!("parker"));
}

#[tokio::test]
async fn update_merges_into_every_match_and_returns_the_first() {
    let processor = processor();
    let first = create(&processor, json!({ "name": "peter", "age": 1 })).await;
    create(&processor, json!({ "name": "peter", "age": 2 })).await;
    create(&processor, json!({ "name": "olaf", "age": 3 })).await;

    let updated = act(
        &processor,
        json!({
            "cmd": "update",
            "collection": COLLECTION,
            "query": { "name": "peter" },
            "data": { "$set": { "name": "nadja" } },
        }),
    )
    .await;

    assert_eq!(updated, json!({ "_id": { "$oid": first }, "name": "nadja", "age": 1 }));
    assert_eq!(names(&processor, json!({})).await, vec!["nadja", "nadja", "olaf"]);
}

#[tokio::test]
async fn update_applies_increments_once_per_document() {
    let processor = processor();
    create(&processor, json!({ "name": "a", "n": 1 })).await;
    create(&processor, json!({ "name": "b", "n": 1 })).await;

    act(
        &processor,
        json!({ "cmd": "update", "collection": COLLECTION, "data": { "$inc": { "n": 1 } } }),
    )
    .await;

    let found = act(&processor, json!({ "cmd": "find", "collection": COLLECTION })).await;
    let counters = found["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|document| document["n"].clone())
        .collect::<Vec<_>>();

    assert_eq!(counters, vec![json!(2), json!(2)]);
}

#[tokio::test]
async fn failed_update_writes_nothing() {
    let processor = processor();
    create(&processor, json!({ "name": "a", "n": 1 })).await;
    create(&processor, json!({ "name": "b", "n": "x" })).await;

    let err = processor
        .act(json!({ "cmd": "update", "collection": COLLECTION, "data": { "$inc": { "n": 1 } } }))
        .await
        .unwrap_err();

    let found = act(&processor, json!({ "cmd": "find", "collection": COLLECTION, "query": { "name": "a" } })).await;

    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    assert_eq!(found["result"][0]["n"], json!(1));
}

#[tokio::test]
async fn overflowing_increments_fail_without_writing() {
    let processor = processor();
    let id = create(&processor, json!({ "n": { "$numberLong": "9223372036854775807" } })).await;

    let err = processor
        .act(json!({
            "cmd": "updateById",
            "collection": COLLECTION,
            "id": id,
            "data": { "$inc": { "n": { "$numberLong": "1" } } },
        }))
        .await
        .unwrap_err();
    let found = act(&processor, json!({ "cmd": "findById", "collection": COLLECTION, "id": id })).await;

    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    assert_eq!(found["n"], json!({ "$numberLong": "9223372036854775807" }));
}

#[tokio::test]
async fn update_with_plain_fields_merges_instead_of_replacing() {
    let processor = processor();
    let id = create(&processor, json!({ "name": "jacob", "age": 40 })).await;

    let updated = act(
        &processor,
        json!({ "cmd": "updateById", "collection": COLLECTION, "id": id, "data": { "name": "jakob" } }),
    )
    .await;

    assert_eq!(updated["name"], json!("jakob"));
    assert_eq!(updated["age"], json!(40));
}

#[tokio::test]
async fn update_by_id_with_extended_values() {
    let processor = processor();
    let id = create(&processor, json!({ "name": "jacob" })).await;

    let updated = act(
        &processor,
        json!({ "cmd": "updateById", "collection": COLLECTION, "id": id, "data": { "$set": extended_data() } }),
    )
    .await;

    assert_eq!(updated["name"], json!("jacob"));
    assert_eq!(updated["date"], json!({ "$date": "2017-03-13T16:21:18.123Z" }));
}

#[tokio::test]
async fn update_without_data_reads_the_first_match() {
    let processor = processor();
    create(&processor, json!({ "name": "jens" })).await;

    let found = act(
        &processor,
        json!({ "cmd": "update", "collection": COLLECTION, "query": { "name": "jens" } }),
    )
    .await;

    assert_eq!(found["name"], json!("jens"));
}

#[tokio::test]
async fn update_without_a_match_is_not_found() {
    let processor = processor();

    let err = processor
        .act(json!({
            "cmd": "update",
            "collection": COLLECTION,
            "query": { "name": "nobody" },
            "data": { "$set": { "name": "somebody" } },
        }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn queries_accept_extended_json_text() {
    let processor = processor();
    create(&processor, json!({ "name": "dated", "date": { "$date": "2017-03-13T16:21:18.123Z" } })).await;
    create(&processor, json!({ "name": "undated" })).await;

    let query = json!({ "date": { "$date": "2017-03-13T16:21:18.123Z" } }).to_string();

    assert_eq!(names(&processor, Value::String(query.clone())).await, vec!["dated"]);

    let removed = act(&processor, json!({ "cmd": "remove", "collection": COLLECTION, "query": query })).await;
    assert_eq!(removed, json!({ "deletedCount": 1 }));
}

#[tokio::test]
async fn find_matches_regular_expressions() {
    let processor = processor();
    create(&processor, json!({ "name": "Jacob" })).await;
    create(&processor, json!({ "name": "nadja" })).await;

    let query = json!({ "name": { "$regex": "^jac", "$options": "i" } });

    assert_eq!(names(&processor, query.clone()).await, vec!["Jacob"]);
    assert_eq!(names(&processor, Value::String(query.to_string())).await, vec!["Jacob"]);
}

#[tokio::test]
async fn find_by_reference() {
    let processor = processor();
    create(&processor, extended_data()).await;
    create(&processor, json!({ "ref": { "$ref": "test", "$id": { "$oid": "58c6c65ed78c6a977a0041a9" } } })).await;

    let found = act(
        &processor,
        json!({
            "cmd": "find",
            "collection": COLLECTION,
            "query": { "ref": { "$ref": "test", "$id": { "$oid": "58c6c65ed78c6a977a0041a8" } } },
        }),
    )
    .await;

    assert_eq!(found["result"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn find_paginates_and_echoes_the_window() {
    let processor = processor();
    for index in 0..15 {
        create(&processor, json!({ "name": format!("jens-{index:02}") })).await;
    }

    let page = act(
        &processor,
        json!({ "cmd": "find", "collection": COLLECTION, "query": {}, "options": { "limit": 10, "offset": 2 } }),
    )
    .await;

    let result = page["result"].as_array().unwrap();
    assert_eq!(result.len(), 10);
    assert_eq!(result[0]["name"], json!("jens-02"));
    assert_eq!(page["limit"], json!(10));
    assert_eq!(page["offset"], json!(2));

    let tail = act(
        &processor,
        json!({ "cmd": "find", "collection": COLLECTION, "options": { "limit": 10, "offset": 12 } }),
    )
    .await;
    assert_eq!(tail["result"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn find_without_options_has_no_window() {
    let processor = processor();
    create(&processor, json!({ "name": "jens" })).await;

    let found = act(&processor, json!({ "cmd": "find", "collection": COLLECTION })).await;

    assert_eq!(found, json!({ "result": [found["result"][0].clone()] }));
}

#[tokio::test]
async fn zero_limit_means_no_limit() {
    let processor = processor();
    for name in ["a", "b", "c"] {
        create(&processor, json!({ "name": name })).await;
    }

    let page = act(
        &processor,
        json!({ "cmd": "find", "collection": COLLECTION, "options": { "limit": 0, "offset": 1 } }),
    )
    .await;

    assert_eq!(page["result"].as_array().unwrap().len(), 2);
    assert_eq!(page.get("limit"), None);
    assert_eq!(page["offset"], json!(1));
}

#[tokio::test]
async fn max_limit_caps_and_defaults_the_window() {
    let processor = PatternProcessor::builder(InMemoryStore::new()).max_limit(2).build();
    for name in ["a", "b", "c"] {
        act(&processor, json!({ "cmd": "create", "collection": COLLECTION, "data": { "name": name } })).await;
    }

    let capped = act(
        &processor,
        json!({ "cmd": "find", "collection": COLLECTION, "options": { "limit": 50 } }),
    )
    .await;
    let defaulted = act(&processor, json!({ "cmd": "find", "collection": COLLECTION })).await;

    assert_eq!(capped["limit"], json!(2));
    assert_eq!(capped["result"].as_array().unwrap().len(), 2);
    assert_eq!(defaulted["limit"], json!(2));
}

#[tokio::test]
async fn absent_query_matches_everything() {
    let processor = processor();
    for name in ["a", "b", "c"] {
        create(&processor, json!({ "name": name })).await;
    }

    assert_eq!(names(&processor, Value::Null).await, vec!["a", "b", "c"]);

    let replaced = act(
        &processor,
        json!({ "cmd": "replace", "collection": COLLECTION, "data": { "$set": { "seen": true } } }),
    )
    .await;
    assert_eq!(replaced, json!({ "matchedCount": 3, "modifiedCount": 3, "upsertedCount": 0 }));

    let removed = act(&processor, json!({ "cmd": "remove", "collection": COLLECTION })).await;
    assert_eq!(removed, json!({ "deletedCount": 3 }));
}

#[tokio::test]
async fn remove_counts_exactly_the_matches() {
    let processor = processor();
    for name in ["olaf", "olaf", "sven"] {
        create(&processor, json!({ "name": name })).await;
    }

    let removed = act(
        &processor,
        json!({ "cmd": "remove", "collection": COLLECTION, "query": { "name": "olaf" } }),
    )
    .await;

    assert_eq!(removed, json!({ "deletedCount": 2 }));
    assert_eq!(names(&processor, json!({})).await, vec!["sven"]);

    let nothing = act(
        &processor,
        json!({ "cmd": "remove", "collection": COLLECTION, "query": { "name": "nobody" } }),
    )
    .await;

    assert_eq!(nothing, json!({ "deletedCount": 0 }));
    assert_eq!(names(&processor, json!({})).await, vec!["sven"]);
}

#[tokio::test]
async fn remove_by_id_returns_the_deleted_document() {
    let processor = processor();
    let id = create(&processor, json!({ "name": "olaf" })).await;

    let removed = act(&processor, json!({ "cmd": "removeById", "collection": COLLECTION, "id": id })).await;
    let err = processor
        .act(json!({ "cmd": "findById", "collection": COLLECTION, "id": id }))
        .await
        .unwrap_err();

    assert_eq!(removed["name"], json!("olaf"));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn replace_with_operators_and_upsert() {
    let processor = processor();
    create(&processor, json!({ "name": "nadine" })).await;

    let matched = act(
        &processor,
        json!({
            "cmd": "replace",
            "collection": COLLECTION,
            "query": { "name": "nadine" },
            "data": { "$set": { "name": "nadja" } },
        }),
    )
    .await;
    let upserted = act(
        &processor,
        json!({
            "cmd": "replace",
            "collection": COLLECTION,
            "query": { "name": "colin" },
            "data": { "$set": { "age": 3 } },
        }),
    )
    .await;

    assert_eq!(matched, json!({ "matchedCount": 1, "modifiedCount": 1, "upsertedCount": 0 }));
    assert_eq!(upserted, json!({ "matchedCount": 0, "modifiedCount": 0, "upsertedCount": 1 }));
    assert_eq!(names(&processor, json!({ "age": 3 })).await, vec!["colin"]);
}

#[tokio::test]
async fn replace_with_plain_fields_replaces_whole_documents() {
    let processor = processor();
    let id = create(&processor, json!({ "name": "jacob", "age": 40 })).await;

    act(
        &processor,
        json!({
            "cmd": "replace",
            "collection": COLLECTION,
            "query": { "_id": { "$oid": id } },
            "data": extended_data(),
        }),
    )
    .await;

    let found = act(&processor, json!({ "cmd": "findById", "collection": COLLECTION, "id": id })).await;

    assert_eq!(found["name"], Value::Null);
    assert_eq!(found["objectId"], json!({ "$oid": "58c6c65ed78c6a977a0041a8" }));
}

#[tokio::test]
async fn replace_by_id_returns_the_new_document() {
    let processor = processor();
    let id = create(&processor, json!({ "name": "nadja", "age": 760 })).await;

    let replaced = act(
        &processor,
        json!({ "cmd": "replaceById", "collection": COLLECTION, "id": id, "data": { "name": "nadja" } }),
    )
    .await;

    assert_eq!(replaced, json!({ "_id": { "$oid": id }, "name": "nadja" }));
}

#[tokio::test]
async fn replace_by_id_inserts_missing_documents() {
    let processor = processor();
    let id = ObjectId::new().to_hex();

    let replaced = act(
        &processor,
        json!({ "cmd": "replaceById", "collection": COLLECTION, "id": id, "data": { "name": "guillermo" } }),
    )
    .await;

    assert_eq!(replaced, json!({ "_id": { "$oid": id }, "name": "guillermo" }));
}

#[tokio::test]
async fn drop_collection_reports_what_it_removed() {
    let processor = processor();
    for name in ["a", "b"] {
        create(&processor, json!({ "name": name })).await;
    }

    let dropped = act(&processor, json!({ "cmd": "dropCollection", "collection": COLLECTION })).await;
    let again = act(&processor, json!({ "cmd": "dropCollection", "collection": COLLECTION })).await;

    assert_eq!(dropped, json!({ "deletedCount": 2 }));
    assert_eq!(again, json!({ "deletedCount": 0 }));
}

#[tokio::test]
async fn invalid_patterns_fail_with_their_kind() {
    let processor = processor();

    let cases = [
        (json!({ "cmd": "findById", "collection": COLLECTION, "id": "not-an-id" }), ErrorKind::InvalidIdentifier),
        (json!({ "cmd": "upsert", "collection": COLLECTION }), ErrorKind::UnknownCommand),
        (json!({ "cmd": "find" }), ErrorKind::CollectionRequired),
        (
            json!({ "cmd": "create", "collection": COLLECTION, "data": { "at": { "$date": "someday" } } }),
            ErrorKind::MalformedExtendedValue,
        ),
        (
            json!({ "cmd": "find", "collection": COLLECTION, "options": { "limit": -1 } }),
            ErrorKind::InvalidRequest,
        ),
        (
            json!({ "cmd": "update", "collection": COLLECTION, "data": { "$set": { "a": 1 }, "b": 2 } }),
            ErrorKind::InvalidRequest,
        ),
    ];

    for (pattern, kind) in cases {
        let err = processor.act(pattern.clone()).await.unwrap_err();
        assert_eq!(err.kind(), kind, "pattern {pattern}");
    }
}

#[tokio::test]
async fn store_failures_are_reported_as_such() {
    let processor = processor();
    let id = create(&processor, json!({ "name": "peter" })).await;

    let response = processor
        .respond(json!({ "cmd": "create", "collection": COLLECTION, "data": { "_id": { "$oid": id } } }))
        .await;

    assert_eq!(response["error"]["kind"], json!("StoreFailure"));
    assert!(response["error"]["message"].as_str().unwrap().contains(&id));
}

#[tokio::test]
async fn processors_share_across_tasks() {
    let processor = std::sync::Arc::new(processor());

    let tasks = (0..8)
        .map(|index| {
            let processor = processor.clone();
            tokio::spawn(async move {
                processor
                    .act(json!({ "cmd": "create", "collection": COLLECTION, "data": { "n": index } }))
                    .await
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let count = processor
        .store()
        .collection(COLLECTION)
        .count(doc! {})
        .await
        .unwrap();

    assert_eq!(count, 8);
}

#[tokio::test]
async fn boxed_backends_behave_the_same() {
    let processor = StoreConfig::default().build_processor().await.unwrap();

    let created = processor
        .act(json!({ "cmd": "create", "collection": COLLECTION, "data": { "name": "boxed" } }))
        .await
        .unwrap();
    let found = processor
        .act(json!({ "cmd": "findById", "collection": COLLECTION, "id": created["_id"] }))
        .await
        .unwrap();

    assert_eq!(found["name"], json!("boxed"));
    processor.shutdown().await.unwrap();
}
