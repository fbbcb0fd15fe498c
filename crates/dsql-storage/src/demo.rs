//! Small users/orders/products dataset used by the CLI demo and tests.

use crate::memory::MemoryRowStore;
use dsql_core::SchemaRegistry;
use std::collections::BTreeMap;

pub const USERS_COLUMNS: [&str; 5] = ["user_id", "name", "age", "email", "city"];
pub const ORDERS_COLUMNS: [&str; 6] = [
    "order_id",
    "user_id",
    "product",
    "amount",
    "order_date",
    "status",
];
pub const PRODUCTS_COLUMNS: [&str; 4] = ["product_id", "name", "price", "category"];

const USERS: &[[&str; 5]] = &[
    ["1", "John Doe", "30", "john.doe@email.com", "New York"],
    ["2", "Jane Smith", "25", "jane.smith@email.com", "California"],
    ["3", "Bob Johnson", "35", "bob.johnson@email.com", "Texas"],
    ["4", "Alice Brown", "32", "alice.brown@email.com", "Seattle"],
    ["5", "Charlie Davis", "28", "charlie.davis@email.com", "Boston"],
    ["6", "Eve Wilson", "41", "eve.wilson@email.com", "Chicago"],
    ["7", "Frank Miller", "22", "frank.miller@email.com", "Denver"],
    ["8", "Grace Lee", "37", "grace.lee@email.com", "Austin"],
];

const ORDERS: &[[&str; 6]] = &[
    ["ORD001", "1", "Laptop Pro", "1299.99", "2024-01-15", "completed"],
    ["ORD002", "2", "Wireless Mouse", "29.99", "2024-01-16", "completed"],
    ["ORD003", "3", "Mechanical Keyboard", "89.99", "2024-01-17", "pending"],
    ["ORD004", "1", "USB-C Hub", "49.99", "2024-01-20", "completed"],
    ["ORD005", "4", "Monitor 27in", "349.00", "2024-02-02", "shipped"],
    ["ORD006", "6", "Desk Lamp", "24.50", "2024-02-11", "completed"],
    ["ORD007", "8", "Laptop Pro", "1299.99", "2024-02-14", "cancelled"],
    ["ORD008", "5", "Webcam HD", "79.99", "2024-03-01", "pending"],
];

const PRODUCTS: &[[&str; 4]] = &[
    ["1", "Laptop Pro", "1299.99", "Electronics"],
    ["2", "Wireless Mouse", "29.99", "Electronics"],
    ["3", "Mechanical Keyboard", "89.99", "Electronics"],
    ["4", "Desk Lamp", "24.50", "Appliances"],
    ["5", "Yoga Mat", "19.99", "Sports"],
    ["6", "Monitor 27in", "349.00", "Accessories"],
];

fn to_rows<const N: usize>(rows: &[[&str; N]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|r| r.iter().map(|v| v.to_string()).collect())
        .collect()
}

fn to_columns(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Column layout of the demo tables
pub fn schemas() -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert("users".to_string(), to_columns(&USERS_COLUMNS));
    map.insert("orders".to_string(), to_columns(&ORDERS_COLUMNS));
    map.insert("products".to_string(), to_columns(&PRODUCTS_COLUMNS));
    map
}

/// Fill `store` with the demo rows and register their schemas
pub fn load(store: &MemoryRowStore, registry: &SchemaRegistry) {
    for (table, columns) in schemas() {
        registry.register(table, columns);
    }
    store.insert_table("users", to_rows(USERS));
    store.insert_table("orders", to_rows(ORDERS));
    store.insert_table("products", to_rows(PRODUCTS));
}
