// SQL column lists shared by the repositories

/// SQL query fragments for the docs table
pub mod doc_queries {
    pub const SELECT_ALL_COLUMNS: &str = "id, path, db_name, content, created_at, updated_at";
}

/// SQL query fragments for the dsns table
pub mod dsn_queries {
    pub const SELECT_ALL_COLUMNS: &str = "id, name, driver, dsn, created_at, updated_at";
}
