//! `PostgreSQL`-backed store.
//!
//! Reservation takes a row lock (`SELECT ... FOR UPDATE`) for its
//! check-then-increment; order transitions and ticket consumption are
//! conditional updates on the status/`is_used` columns, so the database is
//! the single serialization point across request handlers.

use crate::error::CoreError;
use crate::store::Store;
use crate::types::{
    AttemptId, EventId, Order, OrderId, OrderStatus, PaymentMethod, PaymentMethodId, Ticket,
    TicketId, TicketStatus, TicketType, TicketTypeId, UserId, ValidationAttempt,
    ValidationMethod, ValidationOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Schema bootstrap, applied by [`PostgresStore::migrate`].
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS ticket_types (
    id              UUID PRIMARY KEY,
    event_id        UUID NOT NULL,
    name            TEXT NOT NULL,
    unit_price_cents BIGINT NOT NULL,
    total_quantity  BIGINT NOT NULL,
    sold_count      BIGINT NOT NULL DEFAULT 0,
    sale_starts_at  TIMESTAMPTZ,
    sale_ends_at    TIMESTAMPTZ,
    CHECK (sold_count >= 0 AND sold_count <= total_quantity)
);

CREATE TABLE IF NOT EXISTS payment_methods (
    id       UUID PRIMARY KEY,
    event_id UUID NOT NULL,
    kind     JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id               UUID PRIMARY KEY,
    event_id         UUID NOT NULL,
    ticket_type_id   UUID NOT NULL REFERENCES ticket_types(id),
    buyer_id         UUID NOT NULL,
    buyer_name       TEXT NOT NULL,
    quantity         BIGINT NOT NULL CHECK (quantity >= 1),
    payment_method_id UUID NOT NULL,
    reservation_id   UUID NOT NULL,
    status           TEXT NOT NULL,
    payment_details  JSONB,
    proof_key        TEXT,
    rejection_reason TEXT,
    verified_by      UUID,
    verified_at      TIMESTAMPTZ,
    ticket_code      TEXT,
    created_at       TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS tickets (
    id               UUID PRIMARY KEY,
    order_id         UUID NOT NULL REFERENCES orders(id),
    event_id         UUID NOT NULL,
    ticket_type_id   UUID NOT NULL,
    holder_id        UUID NOT NULL,
    ticket_number    TEXT NOT NULL UNIQUE,
    reference        TEXT NOT NULL,
    holder_name      TEXT NOT NULL,
    ticket_type_name TEXT NOT NULL,
    status           TEXT NOT NULL,
    is_used          BOOLEAN NOT NULL DEFAULT FALSE,
    used_at          TIMESTAMPTZ,
    validated_by     UUID,
    issued_at        TIMESTAMPTZ NOT NULL,
    UNIQUE (event_id, reference)
);

CREATE TABLE IF NOT EXISTS validation_attempts (
    id           UUID PRIMARY KEY,
    ticket_id    UUID,
    event_id     UUID NOT NULL,
    validator_id UUID NOT NULL,
    outcome      TEXT NOT NULL,
    method       TEXT NOT NULL,
    note         TEXT NOT NULL,
    recorded_at  TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_order ON tickets (order_id);
CREATE INDEX IF NOT EXISTS idx_attempts_event ON validation_attempts (event_id, recorded_at);
";

const TICKET_COLUMNS: &str = "id, order_id, event_id, ticket_type_id, holder_id, ticket_number, \
     reference, holder_name, ticket_type_name, status, is_used, used_at, validated_by, issued_at";

/// `PostgreSQL` [`Store`] implementation.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to the database and returns a store over a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] when the connection cannot be
    /// established.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the schema. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] when the DDL fails.
    pub async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        tracing::info!("Ticketing schema applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_ticket_type(&self, ticket_type: TicketType) -> Result<(), CoreError> {
        sqlx::query(
            r"
            INSERT INTO ticket_types (
                id, event_id, name, unit_price_cents, total_quantity, sold_count,
                sale_starts_at, sale_ends_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(*ticket_type.id.as_uuid())
        .bind(*ticket_type.event_id.as_uuid())
        .bind(&ticket_type.name)
        .bind(to_db_u64(ticket_type.unit_price.cents())?)
        .bind(i64::from(ticket_type.total_quantity))
        .bind(i64::from(ticket_type.sold_count))
        .bind(ticket_type.sale_starts_at)
        .bind(ticket_type.sale_ends_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn ticket_type(&self, id: TicketTypeId) -> Result<TicketType, CoreError> {
        let row = sqlx::query(
            r"
            SELECT id, event_id, name, unit_price_cents, total_quantity, sold_count,
                   sale_starts_at, sale_ends_at
            FROM ticket_types WHERE id = $1
            ",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CoreError::not_found("ticket type", id))?;
        row_to_ticket_type(&row)
    }

    async fn reserve(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Row lock: concurrent reservations for this ticket type serialize
        // here, and the counts below are re-read inside the same transaction
        // that writes them.
        let row = sqlx::query(
            r"
            SELECT total_quantity, sold_count, sale_starts_at, sale_ends_at
            FROM ticket_types WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CoreError::not_found("ticket type", id))?;

        let total = from_db_u32(row.try_get::<i64, _>("total_quantity").map_err(db_err)?)?;
        let sold = from_db_u32(row.try_get::<i64, _>("sold_count").map_err(db_err)?)?;
        let starts: Option<DateTime<Utc>> = row.try_get("sale_starts_at").map_err(db_err)?;
        let ends: Option<DateTime<Utc>> = row.try_get("sale_ends_at").map_err(db_err)?;

        if starts.is_some_and(|s| now < s) || ends.is_some_and(|e| now >= e) {
            return Err(CoreError::Validation(
                "ticket sales are not open for this ticket type".to_string(),
            ));
        }
        if total.saturating_sub(sold) < quantity {
            return Err(CoreError::Oversold);
        }

        sqlx::query("UPDATE ticket_types SET sold_count = sold_count + $2 WHERE id = $1")
            .bind(*id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn release(&self, id: TicketTypeId, quantity: u32) -> Result<(), CoreError> {
        let result = sqlx::query(
            r"
            UPDATE ticket_types
            SET sold_count = GREATEST(sold_count - $2, 0)
            WHERE id = $1
            ",
        )
        .bind(*id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("ticket type", id));
        }
        Ok(())
    }

    async fn insert_payment_method(&self, method: PaymentMethod) -> Result<(), CoreError> {
        let kind = serde_json::to_value(&method.kind)
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        sqlx::query("INSERT INTO payment_methods (id, event_id, kind) VALUES ($1, $2, $3)")
            .bind(*method.id.as_uuid())
            .bind(*method.event_id.as_uuid())
            .bind(kind)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, CoreError> {
        let row = sqlx::query("SELECT id, event_id, kind FROM payment_methods WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| CoreError::not_found("payment method", id))?;
        let kind: serde_json::Value = row.try_get("kind").map_err(db_err)?;
        Ok(PaymentMethod {
            id: PaymentMethodId::from_uuid(row.try_get("id").map_err(db_err)?),
            event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
            kind: serde_json::from_value(kind).map_err(|e| CoreError::Storage(e.to_string()))?,
        })
    }

    async fn insert_order(&self, order: Order) -> Result<(), CoreError> {
        let details = order
            .payment_details
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        sqlx::query(
            r"
            INSERT INTO orders (
                id, event_id, ticket_type_id, buyer_id, buyer_name, quantity,
                payment_method_id, reservation_id, status, payment_details, proof_key,
                rejection_reason, verified_by, verified_at, ticket_code, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ",
        )
        .bind(*order.id.as_uuid())
        .bind(*order.event_id.as_uuid())
        .bind(*order.ticket_type_id.as_uuid())
        .bind(*order.buyer_id.as_uuid())
        .bind(&order.buyer_name)
        .bind(i64::from(order.quantity))
        .bind(*order.payment_method_id.as_uuid())
        .bind(*order.reservation_id.as_uuid())
        .bind(order.status.as_str())
        .bind(details)
        .bind(&order.proof_key)
        .bind(&order.rejection_reason)
        .bind(order.verified_by.map(|v| *v.as_uuid()))
        .bind(order.verified_at)
        .bind(&order.ticket_code)
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Order, CoreError> {
        let row = sqlx::query(
            r"
            SELECT id, event_id, ticket_type_id, buyer_id, buyer_name, quantity,
                   payment_method_id, reservation_id, status, payment_details, proof_key,
                   rejection_reason, verified_by, verified_at, ticket_code, created_at
            FROM orders WHERE id = $1
            ",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CoreError::not_found("order", id))?;
        row_to_order(&row)
    }

    async fn update_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        cas_order(&mut tx, &order, expected).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn approve_order(
        &self,
        order: Order,
        expected: OrderStatus,
        tickets: Vec<Ticket>,
    ) -> Result<(), CoreError> {
        // Status CAS and ticket inserts commit together or not at all.
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        cas_order(&mut tx, &order, expected).await?;
        for ticket in &tickets {
            sqlx::query(
                r"
                INSERT INTO tickets (
                    id, order_id, event_id, ticket_type_id, holder_id, ticket_number,
                    reference, holder_name, ticket_type_name, status, is_used,
                    used_at, validated_by, issued_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ",
            )
            .bind(*ticket.id.as_uuid())
            .bind(*ticket.order_id.as_uuid())
            .bind(*ticket.event_id.as_uuid())
            .bind(*ticket.ticket_type_id.as_uuid())
            .bind(*ticket.holder_id.as_uuid())
            .bind(&ticket.ticket_number)
            .bind(&ticket.reference)
            .bind(&ticket.holder_name)
            .bind(&ticket.ticket_type_name)
            .bind(ticket.status.as_str())
            .bind(ticket.is_used)
            .bind(ticket.used_at)
            .bind(ticket.validated_by.map(|v| *v.as_uuid()))
            .bind(ticket.issued_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn reject_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError> {
        // Status CAS and inventory decrement commit together or not at all.
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        cas_order(&mut tx, &order, expected).await?;
        let result = sqlx::query(
            r"
            UPDATE ticket_types
            SET sold_count = GREATEST(sold_count - $2, 0)
            WHERE id = $1
            ",
        )
        .bind(*order.ticket_type_id.as_uuid())
        .bind(i64::from(order.quantity))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("ticket type", order.ticket_type_id));
        }
        tx.commit().await.map_err(db_err)
    }

    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn ticket_by_reference(
        &self,
        event_id: EventId,
        reference: &str,
    ) -> Result<Option<Ticket>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_id = $1 AND reference = $2"
        ))
        .bind(*event_id.as_uuid())
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, CoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE order_id = $1 ORDER BY ticket_number"
        ))
        .bind(*order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_ticket).collect()
    }

    async fn use_ticket(
        &self,
        id: TicketId,
        validator: UserId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, CoreError> {
        // Compare-and-set on is_used: of two simultaneous scans, exactly one
        // update matches the predicate.
        let row = sqlx::query(&format!(
            r"
            UPDATE tickets
            SET is_used = TRUE, status = 'used', used_at = $2, validated_by = $3
            WHERE id = $1 AND is_used = FALSE AND status = 'active'
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(*id.as_uuid())
        .bind(now)
        .bind(*validator.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row_to_ticket(&row),
            None => {
                // Lost the race or the ticket never existed; look again to
                // tell the two apart.
                match self.ticket(id).await? {
                    Some(ticket) => Err(CoreError::StateConflict(format!(
                        "ticket {} is not active",
                        ticket.ticket_number
                    ))),
                    None => Err(CoreError::not_found("ticket", id)),
                }
            }
        }
    }

    async fn cancel_ticket(&self, id: TicketId) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'cancelled' WHERE id = $1 AND is_used = FALSE",
        )
        .bind(*id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return match self.ticket(id).await? {
                Some(ticket) => Err(CoreError::StateConflict(format!(
                    "ticket {} is already used and cannot be cancelled",
                    ticket.ticket_number
                ))),
                None => Err(CoreError::not_found("ticket", id)),
            };
        }
        Ok(())
    }

    async fn append_attempt(&self, attempt: ValidationAttempt) -> Result<(), CoreError> {
        sqlx::query(
            r"
            INSERT INTO validation_attempts (
                id, ticket_id, event_id, validator_id, outcome, method, note, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(*attempt.id.as_uuid())
        .bind(attempt.ticket_id.map(|t| *t.as_uuid()))
        .bind(*attempt.event_id.as_uuid())
        .bind(*attempt.validator_id.as_uuid())
        .bind(attempt.outcome.as_str())
        .bind(attempt.method.as_str())
        .bind(&attempt.note)
        .bind(attempt.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn attempts_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<ValidationAttempt>, CoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, ticket_id, event_id, validator_id, outcome, method, note, recorded_at
            FROM validation_attempts WHERE event_id = $1 ORDER BY recorded_at
            ",
        )
        .bind(*event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_attempt).collect()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn to_db_u64(value: u64) -> Result<i64, CoreError> {
    i64::try_from(value).map_err(|_| CoreError::Storage(format!("value out of range: {value}")))
}

fn from_db_u32(value: i64) -> Result<u32, CoreError> {
    u32::try_from(value).map_err(|_| CoreError::Storage(format!("count out of range: {value}")))
}

fn from_db_u64(value: i64) -> Result<u64, CoreError> {
    u64::try_from(value).map_err(|_| CoreError::Storage(format!("amount out of range: {value}")))
}

fn row_to_ticket_type(row: &PgRow) -> Result<TicketType, CoreError> {
    Ok(TicketType {
        id: TicketTypeId::from_uuid(row.try_get("id").map_err(db_err)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
        unit_price: crate::types::Money::from_cents(from_db_u64(
            row.try_get::<i64, _>("unit_price_cents").map_err(db_err)?,
        )?),
        total_quantity: from_db_u32(row.try_get::<i64, _>("total_quantity").map_err(db_err)?)?,
        sold_count: from_db_u32(row.try_get::<i64, _>("sold_count").map_err(db_err)?)?,
        sale_starts_at: row.try_get("sale_starts_at").map_err(db_err)?,
        sale_ends_at: row.try_get("sale_ends_at").map_err(db_err)?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order, CoreError> {
    let details: Option<serde_json::Value> = row.try_get("payment_details").map_err(db_err)?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id").map_err(db_err)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
        ticket_type_id: TicketTypeId::from_uuid(row.try_get("ticket_type_id").map_err(db_err)?),
        buyer_id: UserId::from_uuid(row.try_get("buyer_id").map_err(db_err)?),
        buyer_name: row.try_get("buyer_name").map_err(db_err)?,
        quantity: from_db_u32(row.try_get::<i64, _>("quantity").map_err(db_err)?)?,
        payment_method_id: PaymentMethodId::from_uuid(
            row.try_get("payment_method_id").map_err(db_err)?,
        ),
        reservation_id: crate::types::ReservationId::from_uuid(
            row.try_get("reservation_id").map_err(db_err)?,
        ),
        status: OrderStatus::parse(row.try_get::<String, _>("status").map_err(db_err)?.as_str())?,
        payment_details: details
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| CoreError::Storage(e.to_string()))?,
        proof_key: row.try_get("proof_key").map_err(db_err)?,
        rejection_reason: row.try_get("rejection_reason").map_err(db_err)?,
        verified_by: row
            .try_get::<Option<Uuid>, _>("verified_by")
            .map_err(db_err)?
            .map(UserId::from_uuid),
        verified_at: row.try_get("verified_at").map_err(db_err)?,
        ticket_code: row.try_get("ticket_code").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_ticket(row: &PgRow) -> Result<Ticket, CoreError> {
    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(db_err)?),
        order_id: OrderId::from_uuid(row.try_get("order_id").map_err(db_err)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
        ticket_type_id: TicketTypeId::from_uuid(row.try_get("ticket_type_id").map_err(db_err)?),
        holder_id: UserId::from_uuid(row.try_get("holder_id").map_err(db_err)?),
        ticket_number: row.try_get("ticket_number").map_err(db_err)?,
        reference: row.try_get("reference").map_err(db_err)?,
        holder_name: row.try_get("holder_name").map_err(db_err)?,
        ticket_type_name: row.try_get("ticket_type_name").map_err(db_err)?,
        status: TicketStatus::parse(row.try_get::<String, _>("status").map_err(db_err)?.as_str())?,
        is_used: row.try_get("is_used").map_err(db_err)?,
        used_at: row.try_get("used_at").map_err(db_err)?,
        validated_by: row
            .try_get::<Option<Uuid>, _>("validated_by")
            .map_err(db_err)?
            .map(UserId::from_uuid),
        issued_at: row.try_get("issued_at").map_err(db_err)?,
    })
}

fn row_to_attempt(row: &PgRow) -> Result<ValidationAttempt, CoreError> {
    Ok(ValidationAttempt {
        id: AttemptId::from_uuid(row.try_get("id").map_err(db_err)?),
        ticket_id: row
            .try_get::<Option<Uuid>, _>("ticket_id")
            .map_err(db_err)?
            .map(TicketId::from_uuid),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_err)?),
        validator_id: UserId::from_uuid(row.try_get("validator_id").map_err(db_err)?),
        outcome: ValidationOutcome::parse(
            row.try_get::<String, _>("outcome").map_err(db_err)?.as_str(),
        )?,
        method: ValidationMethod::parse(
            row.try_get::<String, _>("method").map_err(db_err)?.as_str(),
        )?,
        note: row.try_get("note").map_err(db_err)?,
        recorded_at: row.try_get("recorded_at").map_err(db_err)?,
    })
}

async fn cas_order(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order: &Order,
    expected: OrderStatus,
) -> Result<(), CoreError> {
    let details = order
        .payment_details
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| CoreError::Storage(e.to_string()))?;
    let result = sqlx::query(
        r"
        UPDATE orders
        SET status = $3, payment_details = $4, proof_key = $5, rejection_reason = $6,
            verified_by = $7, verified_at = $8, ticket_code = $9
        WHERE id = $1 AND status = $2
        ",
    )
    .bind(*order.id.as_uuid())
    .bind(expected.as_str())
    .bind(order.status.as_str())
    .bind(details)
    .bind(&order.proof_key)
    .bind(&order.rejection_reason)
    .bind(order.verified_by.map(|v| *v.as_uuid()))
    .bind(order.verified_at)
    .bind(&order.ticket_code)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        let stored: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(*order.id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        return Err(match stored {
            Some(status) => CoreError::StateConflict(format!(
                "order {} is in status {status}, expected {expected}",
                order.id
            )),
            None => CoreError::not_found("order", order.id),
        });
    }
    Ok(())
}
