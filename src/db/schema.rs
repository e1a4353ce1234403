use rusqlite::Connection;

/// Initialize the database schema.
///
/// The unique index on `payments.gateway_transaction_id` and the unique
/// constraint on `financial_movements(reference_id, reference_type)` are the
/// backstops for the idempotency guarantees: both the direct-confirm path and
/// the webhook path race on these constraints, and the loser re-reads the
/// winner's row instead of erroring.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        -- Users (minimal identity; profile CRUD lives elsewhere)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

        -- Memberships (mutated only through the activation hook)
        CREATE TABLE IF NOT EXISTS memberships (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            plan_name TEXT NOT NULL,
            billing_period_days INTEGER NOT NULL DEFAULT 30,
            status TEXT NOT NULL CHECK (status IN ('pending', 'active', 'expired', 'cancelled')),
            start_date INTEGER NOT NULL,
            end_date INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships(user_id);
        CREATE INDEX IF NOT EXISTS idx_memberships_status ON memberships(status);

        -- Payments (append-only ledger semantics: status-transitioned, never deleted)
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            gateway_transaction_id TEXT,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            rail TEXT NOT NULL CHECK (rail IN ('cash', 'card_in_person', 'transfer', 'card_gateway')),
            purpose TEXT NOT NULL CHECK (purpose IN ('membership', 'daily_entry', 'store_order', 'other')),
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed', 'cancelled', 'refunded')),
            user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
            membership_id TEXT REFERENCES memberships(id) ON DELETE SET NULL,
            reference_id TEXT,
            reference_type TEXT,
            anonymous_client TEXT,
            transfer_proof TEXT,
            validated_by TEXT,
            validated_at INTEGER,
            created_by TEXT,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        -- Nullable-unique: the idempotency key for gateway-confirmed payments.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_gateway_txn
            ON payments(gateway_transaction_id) WHERE gateway_transaction_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status);
        CREATE INDEX IF NOT EXISTS idx_payments_rail_status ON payments(rail, status, created_at);
        CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);
        CREATE INDEX IF NOT EXISTS idx_payments_reference ON payments(reference_type, reference_id);

        -- Store products (stock_quantity guarded by the reservation unit)
        CREATE TABLE IF NOT EXISTS store_products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sku TEXT NOT NULL UNIQUE,
            price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
            stock_quantity INTEGER NOT NULL CHECK (stock_quantity >= 0),
            min_stock INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_store_products_sku ON store_products(sku);

        -- Store orders (totals fixed at creation; tax/shipping caller-supplied)
        CREATE TABLE IF NOT EXISTS store_orders (
            id TEXT PRIMARY KEY,
            user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'shipped', 'delivered', 'cancelled')),
            payment_status TEXT NOT NULL CHECK (payment_status IN ('pending', 'paid')),
            subtotal_cents INTEGER NOT NULL,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            tax_cents INTEGER NOT NULL DEFAULT 0,
            shipping_cents INTEGER NOT NULL DEFAULT 0,
            total_cents INTEGER NOT NULL,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_store_orders_user ON store_orders(user_id);
        CREATE INDEX IF NOT EXISTS idx_store_orders_status ON store_orders(status);

        -- Order items (immutable product snapshots)
        CREATE TABLE IF NOT EXISTS store_order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES store_orders(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL REFERENCES store_products(id),
            product_name TEXT NOT NULL,
            product_sku TEXT NOT NULL,
            unit_price_cents INTEGER NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0)
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON store_order_items(order_id);

        -- Cart items (cleared when the owning client's order payment completes)
        CREATE TABLE IF NOT EXISTS cart_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL REFERENCES store_products(id) ON DELETE CASCADE,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            created_at INTEGER NOT NULL,
            UNIQUE(user_id, product_id)
        );
        CREATE INDEX IF NOT EXISTS idx_cart_items_user ON cart_items(user_id);

        -- Financial movements (append-only ledger for reporting)
        CREATE TABLE IF NOT EXISTS financial_movements (
            id TEXT PRIMARY KEY,
            movement_type TEXT NOT NULL CHECK (movement_type IN ('income', 'expense')),
            category TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            description TEXT,
            reference_id TEXT NOT NULL,
            reference_type TEXT NOT NULL,
            occurred_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(reference_id, reference_type)
        );
        CREATE INDEX IF NOT EXISTS idx_movements_category ON financial_movements(category, occurred_at);

        -- Webhook events (replay defense around the payment-level idempotency key)
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(provider, event_id)
        );
        "#,
    )?;
    Ok(())
}
