use libsql::Connection;

use crate::error::Result;

/// Create all tables and indexes. The embedding dimensionality is baked into
/// the vector column at creation time; changing it afterwards requires a full
/// re-ingest, which is why startup refuses on a mismatch.
pub async fn init_schema(conn: &Connection, dimensions: usize) -> Result<()> {
    let ddl = format!(
        r#"
        -- Registered accounts. Anonymous tenants never appear here.
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            created_at TEXT NOT NULL
        );

        -- Graph store: typed nodes with JSON properties.
        -- Labels: User, Document, Chunk, Entity.
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            tenant_key TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{{}}',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_graph_nodes_label_tenant
            ON graph_nodes(label, tenant_key);
        CREATE INDEX IF NOT EXISTS idx_graph_nodes_tenant ON graph_nodes(tenant_key);

        -- Graph store: typed edges. Types: OWNS, CONTAINS, APPEARS_IN, RELATES_TO.
        CREATE TABLE IF NOT EXISTS graph_edges (
            id TEXT PRIMARY KEY,
            src TEXT NOT NULL,
            dst TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            tenant_key TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{{}}',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_graph_edges_src ON graph_edges(src, edge_type);
        CREATE INDEX IF NOT EXISTS idx_graph_edges_dst ON graph_edges(dst, edge_type);
        CREATE INDEX IF NOT EXISTS idx_graph_edges_tenant ON graph_edges(tenant_key);

        -- Vector store: two collections ('documents', 'memory') share one table.
        CREATE TABLE IF NOT EXISTS vector_points (
            id TEXT NOT NULL,
            collection TEXT NOT NULL,
            tenant_key TEXT NOT NULL,
            document_id TEXT,
            position INTEGER,
            text TEXT NOT NULL,
            metadata TEXT,
            embedding F32_BLOB({dimensions}),
            created_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        );

        CREATE INDEX IF NOT EXISTS idx_vector_points_tenant
            ON vector_points(collection, tenant_key);
        CREATE INDEX IF NOT EXISTS idx_vector_points_document
            ON vector_points(collection, document_id);
        CREATE INDEX IF NOT EXISTS idx_vector_points_created
            ON vector_points(collection, created_at);

        -- TTL'd key-value entries: blocklist:, refresh:, task: namespaces.
        CREATE TABLE IF NOT EXISTS kv_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_kv_entries_expires ON kv_entries(expires_at);

        -- Durable workflow snapshots, one row per thread.
        CREATE TABLE IF NOT EXISTS checkpoints (
            thread_id TEXT PRIMARY KEY,
            node TEXT NOT NULL,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Instance metadata (embedding dimensionality, schema markers).
        CREATE TABLE IF NOT EXISTS instance_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#
    );

    conn.execute_batch(&ddl).await?;
    Ok(())
}
