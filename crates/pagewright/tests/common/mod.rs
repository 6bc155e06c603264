#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common fixtures for integration tests.
//!
//! A small people/teams/orders schema backed by an in-memory SQLite
//! database, queried through the real planner and executor.

#![allow(dead_code)]

use std::sync::Arc;

use serde::Deserialize;

use pagewright::{
    Entity, EntitySchema, EnumType, PageService, SchemaProvider, SchemaRegistry, SqliteExecutor,
    ValueType,
};

/// Schema and seed data.
///
/// Rows 1 and 2 are active. Only row 2 carries both tags `x` and `y`.
pub const FIXTURE_SQL: &str = "
    CREATE TABLE team (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE person (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        age INTEGER,
        active BOOLEAN NOT NULL,
        created_at INTEGER NOT NULL,
        score REAL,
        team_id INTEGER REFERENCES team (id)
    );
    CREATE TABLE person_tag (person_id INTEGER NOT NULL REFERENCES person (id), tag TEXT NOT NULL);
    CREATE TABLE purchase (
        id INTEGER PRIMARY KEY,
        person_id INTEGER NOT NULL REFERENCES person (id),
        amount REAL NOT NULL
    );

    INSERT INTO team (id, name) VALUES (1, 'Red');
    INSERT INTO team (id, name) VALUES (2, 'Blue');

    INSERT INTO person VALUES (1, 'Jordan', 'ACTIVE', 34, 1, 100, 4.5, 1);
    INSERT INTO person VALUES (2, 'Joanna', 'ACTIVE', 28, 1, 200, 3.0, 2);
    INSERT INTO person VALUES (3, 'Johan', 'INACTIVE', 41, 0, 150, NULL, 1);

    INSERT INTO person_tag VALUES (1, 'x');
    INSERT INTO person_tag VALUES (2, 'x');
    INSERT INTO person_tag VALUES (2, 'y');
    INSERT INTO person_tag VALUES (3, 'y');

    INSERT INTO purchase VALUES (1, 1, 10.0);
    INSERT INTO purchase VALUES (2, 1, 25.5);
    INSERT INTO purchase VALUES (3, 2, 7.0);
";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub age: Option<i64>,
    pub active: bool,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    pub score: Option<f64>,
}

impl Entity for Person {
    const NAME: &'static str = "person";
}

pub fn status_type() -> EnumType {
    EnumType::new("status", ["ACTIVE", "INACTIVE"])
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            EntitySchema::new("person", "person")
                .scalar("name", ValueType::Text)
                .scalar("status", ValueType::Enum(status_type()))
                .scalar("age", ValueType::Integer)
                .scalar("active", ValueType::Boolean)
                .scalar_column("createdAt", "created_at", ValueType::Integer)
                .scalar("score", ValueType::Float)
                .to_one("team", "team", "team_id")
                .to_many("orders", "order", "person_id")
                .element_collection("tags", "person_tag", "person_id", "tag", ValueType::Text),
        )
        .with(
            EntitySchema::new("team", "team")
                .scalar("name", ValueType::Text)
                .to_many("members", "person", "team_id"),
        )
        .with(EntitySchema::new("order", "purchase").scalar("amount", ValueType::Float))
}

pub fn schemas() -> Arc<dyn SchemaProvider> {
    let registry = registry();
    assert!(registry.validate().is_empty(), "{:?}", registry.validate());
    Arc::new(registry)
}

/// A person page service over a freshly seeded database.
pub async fn person_service() -> PageService<Person, SqliteExecutor> {
    pagewright_test_utils::init_tracing();
    let pool = pagewright_test_utils::seeded_pool(FIXTURE_SQL).await.unwrap();
    PageService::new(schemas(), SqliteExecutor::new(pool))
}

pub fn ids(people: &[Person]) -> Vec<i64> {
    people.iter().map(|p| p.id).collect()
}
