use sqlx::PgPool;

/// Initialize PostgreSQL schema for the ledger
///
/// Every statement is idempotent, so this runs on each startup.
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing ledger schema...");

    for (name, statement) in [
        ("accounts", CREATE_ACCOUNTS_TABLE),
        ("accounts owner index", CREATE_ACCOUNTS_OWNER_INDEX),
        ("ledger_transactions", CREATE_TRANSACTIONS_TABLE),
        ("ledger_transactions index", CREATE_TRANSACTIONS_ACCOUNT_INDEX),
        ("append-only guard", CREATE_IMMUTABLE_FUNCTION),
        ("append-only trigger drop", DROP_IMMUTABLE_TRIGGER),
        ("append-only trigger", CREATE_IMMUTABLE_TRIGGER),
        ("transfers", CREATE_TRANSFERS_TABLE),
        ("transfers receiver index", CREATE_TRANSFERS_RECEIVER_INDEX),
        ("transfers sender index", CREATE_TRANSFERS_SENDER_INDEX),
        ("transfers expiry index", CREATE_TRANSFERS_EXPIRY_INDEX),
    ] {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            tracing::error!(step = name, error = %e, "Schema initialization failed");
            e
        })?;
    }

    tracing::info!("Ledger schema ready");
    Ok(())
}

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_number VARCHAR(19) PRIMARY KEY,
    owner_id       BIGINT      NOT NULL,
    balance        BIGINT      NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_ACCOUNTS_OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts (owner_id)";

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_transactions (
    seq            BIGSERIAL   PRIMARY KEY,
    transaction_id UUID        NOT NULL UNIQUE,
    account_number VARCHAR(19) NOT NULL REFERENCES accounts (account_number),
    amount         BIGINT      NOT NULL CHECK (amount > 0),
    kind           SMALLINT    NOT NULL,
    side           SMALLINT    NOT NULL,
    created_at     TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_TRANSACTIONS_ACCOUNT_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_ledger_account_time \
     ON ledger_transactions (account_number, created_at DESC)";

const CREATE_IMMUTABLE_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION ledger_transactions_immutable() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'ledger_transactions is append-only';
END;
$$ LANGUAGE plpgsql
"#;

const DROP_IMMUTABLE_TRIGGER: &str =
    "DROP TRIGGER IF EXISTS trg_ledger_transactions_immutable ON ledger_transactions";

const CREATE_IMMUTABLE_TRIGGER: &str = r#"
CREATE TRIGGER trg_ledger_transactions_immutable
    BEFORE UPDATE OR DELETE ON ledger_transactions
    FOR EACH ROW EXECUTE FUNCTION ledger_transactions_immutable()
"#;

const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    transaction_id          UUID        PRIMARY KEY
                                        REFERENCES ledger_transactions (transaction_id),
    sender_id               BIGINT      NOT NULL,
    receiver_id             BIGINT      NOT NULL,
    sender_account          VARCHAR(19) NOT NULL REFERENCES accounts (account_number),
    amount                  BIGINT      NOT NULL CHECK (amount > 0),
    status                  SMALLINT    NOT NULL,
    expires_at              TIMESTAMPTZ NOT NULL,
    accepted_account        VARCHAR(19) REFERENCES accounts (account_number),
    accepted_transaction_id UUID        UNIQUE REFERENCES ledger_transactions (transaction_id),
    settled_at              TIMESTAMPTZ,
    created_at              TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_TRANSFERS_RECEIVER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transfers_receiver ON transfers (receiver_id, created_at DESC)";

const CREATE_TRANSFERS_SENDER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transfers_sender ON transfers (sender_id, created_at DESC)";

const CREATE_TRANSFERS_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transfers_pending_expiry ON transfers (status, expires_at)";
