//! Throwaway databases for manager tests.
//!
//! Each `TestDb` creates a fresh database on the server named by
//! `DATABASE_URL`, runs the embedded migrations into it and drops it again
//! when the value goes out of scope. Without `DATABASE_URL` the database
//! tests return early.

use bigdecimal::BigDecimal;
use diesel::{Connection, PgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::{build_pool, run_migrations};
use crate::handlers::{NewPropertyInput, NewReservationInput, PropertyManager};
use crate::{DateRange, DbPool};

pub struct TestDb {
    server_url: String,
    name: String,
    pub pool: DbPool,
}

impl TestDb {
    pub async fn new() -> Option<Self> {
        let Ok(server_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL is not set, skipping database test");
            return None;
        };

        let name = format!("rentals_test_{}", Uuid::new_v4().simple());
        let mut conn = PgConnection::establish(&server_url).expect("connect to test server");
        diesel::sql_query(format!("CREATE DATABASE {}", name))
            .execute(&mut conn)
            .expect("create test database");

        let url = with_database(&server_url, &name);
        run_migrations(&url).expect("migrate test database");
        let pool = build_pool(&url, 16).await.expect("connect test pool");

        Some(Self {
            server_url,
            name,
            pool,
        })
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if let Ok(mut conn) = PgConnection::establish(&self.server_url) {
            let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", self.name))
                .execute(&mut conn);
        }
    }
}

/// Swaps the database name in a postgres URL, keeping any query string.
fn with_database(url: &str, name: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let host_start = base.find("://").map(|i| i + 3).unwrap_or(0);
    let server = match base[host_start..].find('/') {
        Some(i) => &base[..host_start + i],
        None => base,
    };

    match query {
        Some(query) => format!("{}/{}?{}", server, name, query),
        None => format!("{}/{}", server, name),
    }
}

pub fn stay(check_in: &str, check_out: &str) -> DateRange {
    DateRange::new(check_in.parse().unwrap(), check_out.parse().unwrap()).unwrap()
}

pub async fn seed_property(pool: &DbPool, slug: &str, max_guests: i32) -> Uuid {
    let detail = PropertyManager::new(pool.clone())
        .create(NewPropertyInput {
            slug: slug.to_string(),
            name: format!("Stay at {}", slug),
            description: String::new(),
            address: "1 Harbour Road".to_string(),
            address_en: None,
            max_guests,
            bedrooms: 2,
            bathrooms: 1,
            price_per_night: "120.00".parse::<BigDecimal>().unwrap(),
            is_visible: true,
            amenity_ids: Vec::new(),
        })
        .await
        .expect("seed property");
    detail.property.id
}

pub fn booking(property_id: Uuid, range: DateRange) -> NewReservationInput {
    NewReservationInput {
        property_id,
        guest_name: "Mina Park".to_string(),
        guest_email: "mina@example.com".to_string(),
        guest_phone: None,
        guest_count: 2,
        range,
        special_requests: None,
    }
}

#[test]
fn database_name_is_replaced() {
    assert_eq!(
        with_database("postgres://u:p@localhost:5432/rentals", "t1"),
        "postgres://u:p@localhost:5432/t1"
    );
    assert_eq!(
        with_database("postgres://u@db/rentals?sslmode=disable", "t1"),
        "postgres://u@db/t1?sslmode=disable"
    );
    assert_eq!(with_database("postgres://u@db", "t1"), "postgres://u@db/t1");
}
