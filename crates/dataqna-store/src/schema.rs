//! Table definitions for the metadata database
//!
//! Embeddings are stored as JSON arrays of floats.

pub const CREATE_TABLE_EMBEDDINGS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS table_details_embeddings (
        source_type VARCHAR NOT NULL,
        table_schema VARCHAR NOT NULL,
        table_name VARCHAR NOT NULL,
        content VARCHAR NOT NULL,
        embedding VARCHAR NOT NULL
    );
";

pub const CREATE_COLUMN_EMBEDDINGS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS tablecolumn_details_embeddings (
        source_type VARCHAR NOT NULL,
        table_schema VARCHAR NOT NULL,
        table_name VARCHAR NOT NULL,
        column_name VARCHAR NOT NULL,
        content VARCHAR NOT NULL,
        embedding VARCHAR NOT NULL
    );
";

pub const CREATE_EXAMPLE_EMBEDDINGS_SQL: &str = "
    CREATE TABLE IF NOT EXISTS example_prompt_sql_embeddings (
        table_schema VARCHAR NOT NULL,
        example_user_question VARCHAR NOT NULL,
        example_generated_sql VARCHAR NOT NULL,
        embedding VARCHAR NOT NULL
    );
";

pub const CREATE_AUDIT_LOG_SQL: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        request_id VARCHAR PRIMARY KEY,
        started_at VARCHAR NOT NULL,
        logged_at VARCHAR NOT NULL,
        source_type VARCHAR,
        user_database VARCHAR NOT NULL,
        models VARCHAR NOT NULL,
        user_question VARCHAR NOT NULL,
        generated_sql VARCHAR,
        found_in_vector VARCHAR NOT NULL,
        process_step VARCHAR NOT NULL,
        error_msg VARCHAR,
        full_log VARCHAR NOT NULL,
        events VARCHAR NOT NULL
    );
";

/// All statements, in creation order
pub const ALL_TABLE_CREATION_SQL: &[&str] = &[
    CREATE_TABLE_EMBEDDINGS_SQL,
    CREATE_COLUMN_EMBEDDINGS_SQL,
    CREATE_EXAMPLE_EMBEDDINGS_SQL,
    CREATE_AUDIT_LOG_SQL,
];
