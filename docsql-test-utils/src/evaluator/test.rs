use super::*;
use bson::doc;

fn catalog() -> Catalog {
    Catalog::new()
        .with_collection(
            "Customers",
            vec![
                doc! {"_id": 1, "Name": "Ada", "Region": "north"},
                doc! {"_id": 2, "Name": "Brian", "Region": "south"},
                doc! {"_id": 3, "Name": "Cleo"},
            ],
        )
        .with_collection(
            "Orders",
            vec![
                doc! {"_id": 10, "CustomerId": 1, "Total": 5.5},
                doc! {"_id": 11, "CustomerId": 1, "Total": 2.0},
                doc! {"_id": 12, "CustomerId": 2, "Total": 7.0},
            ],
        )
}

fn names(documents: &[Document]) -> Vec<&str> {
    documents.iter().filter_map(|d| d.get_str("Name").ok()).collect()
}

macro_rules! test_match {
    ($func_name:ident, expected = $expected:expr, filter = $filter:expr) => {
        #[test]
        fn $func_name() {
            let found = catalog()
                .aggregate("Customers", &[doc! {"$match": $filter}])
                .unwrap();
            assert_eq!($expected, names(&found));
        }
    };
}

test_match!(equality, expected = vec!["Brian"], filter = doc! {"Region": "south"});
test_match!(
    null_matches_missing,
    expected = vec!["Cleo"],
    filter = doc! {"Region": null}
);
test_match!(
    ne_matches_missing,
    expected = vec!["Brian", "Cleo"],
    filter = doc! {"Region": {"$ne": "north"}}
);
test_match!(
    ordering_skips_other_types,
    expected = vec!["Brian"],
    filter = doc! {"Region": {"$gt": "o"}}
);
test_match!(
    nor_negates,
    expected = vec!["Ada", "Cleo"],
    filter = doc! {"$nor": [{"Region": "south"}]}
);
test_match!(
    expr_missing_is_not_null,
    expected = Vec::<&str>::new(),
    filter = doc! {"$expr": {"$eq": ["$Region", null]}}
);
test_match!(
    expr_missing_sorts_below_every_value,
    expected = vec!["Cleo"],
    filter = doc! {"$expr": {"$lt": ["$Region", null]}}
);
test_match!(
    expr_if_null_replaces_missing,
    expected = vec!["Cleo"],
    filter = doc! {"$expr": {"$eq": [{"$ifNull": ["$Region", null]}, null]}}
);
test_match!(
    regex_match_with_options,
    expected = vec!["Ada"],
    filter = doc! {"$expr": {"$regexMatch": {"input": "$Name", "regex": "^a", "options": "i"}}}
);

#[test]
fn lookup_binds_let_variables() {
    let found = catalog()
        .aggregate(
            "Customers",
            &[
                doc! {"$lookup": {
                    "from": "Orders",
                    "as": "Spent",
                    "let": {"id": "$_id"},
                    "pipeline": [
                        {"$match": {"$expr": {"$eq": ["$CustomerId", "$$id"]}}},
                        {"$group": {"_id": null, "agg": {"$sum": "$Total"}}},
                    ],
                }},
                doc! {"$unwind": {"path": "$Spent", "preserveNullAndEmptyArrays": true}},
                doc! {"$project": {"_id": 0, "Name": 1, "Spent": {"$ifNull": ["$Spent.agg", 0]}}},
            ],
        )
        .unwrap();
    assert_eq!(
        vec![
            doc! {"Name": "Ada", "Spent": 7.5},
            doc! {"Name": "Brian", "Spent": 7.0},
            doc! {"Name": "Cleo", "Spent": 0},
        ],
        found
    );
}

#[test]
fn missing_values_add_no_field() {
    let found = catalog()
        .aggregate(
            "Customers",
            &[
                doc! {"$match": {"Name": "Cleo"}},
                doc! {"$project": {"_id": 0, "Name": 1, "Region": "$Region", "Tags": ["$Region"]}},
                doc! {"$addFields": {"Zone": "$Zone"}},
            ],
        )
        .unwrap();
    assert_eq!(vec![doc! {"Name": "Cleo", "Tags": [Bson::Null]}], found);
}

#[test]
fn group_on_missing_key_is_null() {
    let found = catalog()
        .aggregate(
            "Customers",
            &[doc! {"$group": {"_id": "$Region", "n": {"$sum": 1}}}],
        )
        .unwrap();
    assert_eq!(
        vec![
            doc! {"_id": "north", "n": 1},
            doc! {"_id": "south", "n": 1},
            doc! {"_id": Bson::Null, "n": 1},
        ],
        found
    );
}

#[test]
fn unwind_without_preserve_drops_empty_matches() {
    let found = catalog()
        .aggregate(
            "Customers",
            &[
                doc! {"$lookup": {
                    "from": "Orders",
                    "as": "O",
                    "let": {"id": "$_id"},
                    "pipeline": [{"$match": {"$expr": {"$eq": ["$CustomerId", "$$id"]}}}],
                }},
                doc! {"$unwind": {"path": "$O", "preserveNullAndEmptyArrays": false}},
            ],
        )
        .unwrap();
    assert_eq!(vec!["Ada", "Ada", "Brian"], names(&found));
}

#[test]
fn group_keeps_arrival_order() {
    let found = catalog()
        .aggregate(
            "Orders",
            &[doc! {"$group": {
                "_id": {"c": "$CustomerId"},
                "n": {"$sum": 1},
                "top": {"$max": "$Total"},
            }}],
        )
        .unwrap();
    assert_eq!(
        vec![
            doc! {"_id": {"c": 1}, "n": 2, "top": 5.5},
            doc! {"_id": {"c": 2}, "n": 1, "top": 7.0},
        ],
        found
    );
}

#[test]
fn sort_skip_and_limit() {
    let found = catalog()
        .aggregate(
            "Customers",
            &[
                doc! {"$sort": {"Name": -1}},
                doc! {"$skip": 1_i64},
                doc! {"$limit": 1_i64},
            ],
        )
        .unwrap();
    assert_eq!(vec!["Brian"], names(&found));
}

#[test]
fn unknown_operators_are_reported() {
    assert_eq!(
        Err(Error::UnsupportedOperator("$soundex".to_string())),
        catalog().aggregate(
            "Customers",
            &[doc! {"$project": {"x": {"$soundex": "$Name"}}}]
        )
    );
    assert_eq!(
        Err(Error::UnsupportedStage("$facet".to_string())),
        catalog().aggregate("Customers", &[doc! {"$facet": {}}])
    );
}
