use sqlx::SqliteConnection;

use crate::db_types::{OrderId, Paise, Payment, PaymentMethod, PaymentStatus, UserId};

pub async fn fetch_payment_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payment_by_gateway_id(
    gateway_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE gateway_payment_id = $1")
        .bind(gateway_payment_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payment_for_registration(
    registration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE registration_id = $1")
        .bind(registration_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn insert_gateway_payment(
    registration_id: i64,
    order_id: &OrderId,
    amount: Paise,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        INSERT INTO payments (registration_id, order_id, amount, status, method)
        VALUES ($1, $2, $3, 'PENDING', 'GATEWAY')
        RETURNING *
        "#,
    )
    .bind(registration_id)
    .bind(order_id.as_str())
    .bind(amount)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

/// Points the registration's payment at a new gateway order. Only payments that have not captured funds are
/// affected. Returns `None` if there is no such payment.
pub async fn replace_gateway_order(
    registration_id: i64,
    order_id: &OrderId,
    amount: Paise,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        UPDATE payments SET
            order_id = $1,
            amount = $2,
            status = 'PENDING',
            method = 'GATEWAY',
            gateway_payment_id = NULL,
            gateway_signature = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE registration_id = $3 AND status IN ('PENDING', 'FAILED')
        RETURNING *
        "#,
    )
    .bind(order_id.as_str())
    .bind(amount)
    .bind(registration_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Marks the payment for `order_id` as SUCCESS, if its current status is `from`.
pub async fn capture(
    order_id: &OrderId,
    from: PaymentStatus,
    gateway_payment_id: &str,
    signature: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        UPDATE payments SET
            status = 'SUCCESS',
            gateway_payment_id = $1,
            gateway_signature = COALESCE($2, gateway_signature),
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $3 AND status = $4
        RETURNING *
        "#,
    )
    .bind(gateway_payment_id)
    .bind(signature)
    .bind(order_id.as_str())
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Marks a PENDING payment for `order_id` as FAILED.
pub async fn fail(
    order_id: &OrderId,
    gateway_payment_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        UPDATE payments SET
            status = 'FAILED',
            gateway_payment_id = COALESCE($1, gateway_payment_id),
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $2 AND status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(gateway_payment_id)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Marks the PENDING payment of a registration as FAILED.
pub async fn fail_pending_for_registration(
    registration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        UPDATE payments SET status = 'FAILED', updated_at = CURRENT_TIMESTAMP
        WHERE registration_id = $1 AND status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(registration_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Marks the payment with the given gateway payment id as REFUNDED, if its current status is `from`.
pub async fn refund(
    gateway_payment_id: &str,
    from: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        UPDATE payments SET status = 'REFUNDED', updated_at = CURRENT_TIMESTAMP
        WHERE gateway_payment_id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(gateway_payment_id)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

pub struct ManualPaymentRecord<'a> {
    pub registration_id: i64,
    pub order_id: &'a str,
    pub gateway_payment_id: &'a str,
    pub signature: &'a str,
    pub amount: Paise,
    pub method: PaymentMethod,
    pub reference: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub confirmed_by: &'a UserId,
}

/// Creates the registration's payment as a successful manual payment, or overwrites the existing one.
pub async fn upsert_manual_payment(
    record: ManualPaymentRecord<'_>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        INSERT INTO payments (
            registration_id, order_id, gateway_payment_id, gateway_signature, amount, status, method, reference, notes,
            confirmed_by
        )
        VALUES ($1, $2, $3, $4, $5, 'SUCCESS', $6, $7, $8, $9)
        ON CONFLICT (registration_id) DO UPDATE SET
            order_id = excluded.order_id,
            gateway_payment_id = excluded.gateway_payment_id,
            gateway_signature = excluded.gateway_signature,
            amount = excluded.amount,
            status = 'SUCCESS',
            method = excluded.method,
            reference = excluded.reference,
            notes = excluded.notes,
            confirmed_by = excluded.confirmed_by,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(record.registration_id)
    .bind(record.order_id)
    .bind(record.gateway_payment_id)
    .bind(record.signature)
    .bind(record.amount)
    .bind(record.method)
    .bind(record.reference)
    .bind(record.notes)
    .bind(record.confirmed_by.as_str())
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

pub async fn delete_for_registration(
    registration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("DELETE FROM payments WHERE registration_id = $1 RETURNING *")
        .bind(registration_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn total_revenue(conn: &mut SqliteConnection) -> Result<Paise, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as("SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status = 'SUCCESS'")
        .fetch_one(conn)
        .await?;
    Ok(Paise::from(total))
}
