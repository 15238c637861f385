//! Purchase order persistence

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use common::error::DatabaseResult;
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow, types::Json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::get_enum;
use crate::models::order::{
    NewOrder, Order, OrderCounts, OrderSearchQuery, OrderStatus, Party, Product,
    UpdateOrderRequest,
};

const ORDER_COLUMNS: &str = "id, order_number, order_date, invoice_number, client_name, \
                             company_name, gst_number, contact, address, zip_code, products, \
                             estimated_dispatch_date, generated_by_user_id, generated_by_username, \
                             generated_by_employee_id, order_through_username, \
                             order_through_employee_id, status, is_deleted, deleted_at, \
                             created_at, updated_at";

/// Order repository
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new order in `pending` status
    pub async fn create(&self, order: &NewOrder) -> DatabaseResult<Order> {
        info!("Creating order {}", order.order_number);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (
                order_number, order_date, invoice_number, client_name, company_name,
                gst_number, contact, address, zip_code, products, estimated_dispatch_date,
                generated_by_user_id, generated_by_username, generated_by_employee_id,
                order_through_username, order_through_employee_id, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, 'pending')
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&order.order_number)
        .bind(order.order_date)
        .bind(&order.invoice_number)
        .bind(&order.client_name)
        .bind(&order.company_name)
        .bind(&order.gst_number)
        .bind(&order.contact)
        .bind(&order.address)
        .bind(&order.zip_code)
        .bind(Json(&order.products))
        .bind(order.estimated_dispatch_date)
        .bind(order.generated_by.user_id)
        .bind(&order.generated_by.username)
        .bind(&order.generated_by.employee_id)
        .bind(&order.order_through.username)
        .bind(&order.order_through.employee_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(map_order(&row)?)
    }

    /// Find an order by ID, deleted or not
    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Order>> {
        Self::fetch_by_id(&self.pool, id).await
    }

    /// Find an order by ID on any executor
    pub async fn fetch_by_id<'e, E>(executor: E, id: Uuid) -> DatabaseResult<Option<Order>>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row.as_ref().map(map_order).transpose()?)
    }

    /// Apply the provided fields of `changes`; absent fields keep their value
    pub async fn update(
        &self,
        id: Uuid,
        changes: &UpdateOrderRequest,
    ) -> DatabaseResult<Option<Order>> {
        let generated_by = changes.generated_by.clone().unwrap_or_default();
        let order_through = changes.order_through.clone().unwrap_or_default();

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET
                order_number = COALESCE($2, order_number),
                order_date = COALESCE($3, order_date),
                invoice_number = COALESCE($4, invoice_number),
                client_name = COALESCE(NULLIF($5, ''), client_name),
                company_name = COALESCE($6, company_name),
                gst_number = COALESCE($7, gst_number),
                contact = COALESCE(NULLIF($8, ''), contact),
                address = COALESCE(NULLIF($9, ''), address),
                zip_code = COALESCE(NULLIF($10, ''), zip_code),
                products = $11,
                estimated_dispatch_date = COALESCE($12, estimated_dispatch_date),
                generated_by_username = COALESCE($13, generated_by_username),
                generated_by_employee_id = COALESCE($14, generated_by_employee_id),
                order_through_username = COALESCE($15, order_through_username),
                order_through_employee_id = COALESCE($16, order_through_employee_id),
                status = COALESCE($17, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.order_number)
        .bind(changes.order_date)
        .bind(&changes.invoice_number)
        .bind(&changes.client_name)
        .bind(&changes.company_name)
        .bind(&changes.gst_number)
        .bind(&changes.contact)
        .bind(&changes.address)
        .bind(&changes.zip_code)
        .bind(Json(&changes.products))
        .bind(changes.estimated_dispatch_date)
        .bind(&generated_by.username)
        .bind(&generated_by.employee_id)
        .bind(&order_through.username)
        .bind(&order_through.employee_id)
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_order).transpose()?)
    }

    /// Active orders, newest first, optionally filtered by status
    pub async fn list_active(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE is_deleted = FALSE AND ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_order).collect::<Result<_, _>>()?)
    }

    /// Number of active orders, optionally filtered by status
    pub async fn count_active(&self, status: Option<OrderStatus>) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE is_deleted = FALSE AND ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Free-text and date-range search. Soft-deleted orders are included.
    pub async fn search(&self, query: &OrderSearchQuery) -> DatabaseResult<Vec<Order>> {
        let pattern = query
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));
        let from = query.start_date.map(start_of_day);
        let until = query.end_date.map(end_of_day);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::TEXT IS NULL
                   OR client_name ILIKE $1
                   OR company_name ILIKE $1
                   OR order_number ILIKE $1
                   OR generated_by_username ILIKE $1
                   OR EXISTS (
                       SELECT 1 FROM jsonb_array_elements(products) AS product
                       WHERE product->>'name' ILIKE $1
                   ))
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
            ORDER BY created_at DESC
            "#
        ))
        .bind(pattern)
        .bind(query.status.map(|s| s.as_str()))
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_order).collect::<Result<_, _>>()?)
    }

    /// Active orders generated by `user_id`, newest first
    pub async fn list_generated_by(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<Order>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE generated_by_user_id = $1 AND is_deleted = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE generated_by_user_id = $1 AND is_deleted = FALSE
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let orders = rows.iter().map(map_order).collect::<Result<_, _>>()?;
        Ok((orders, total))
    }

    /// Move an active order to the recycle bin; `None` if it is missing or already there
    pub async fn soft_delete(&self, id: Uuid) -> DatabaseResult<Option<Order>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET is_deleted = TRUE, deleted_at = NOW(), status = 'rejected', updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_order).transpose()?)
    }

    /// Bring orders back from the recycle bin. Only ids currently in the bin are touched.
    pub async fn restore(&self, ids: &[Uuid]) -> DatabaseResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET is_deleted = FALSE, deleted_at = NULL, updated_at = NOW()
            WHERE id = ANY($1) AND is_deleted = TRUE
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_order).collect::<Result<_, _>>()?)
    }

    /// Number of the given ids that sit in the recycle bin
    pub async fn count_in_bin(&self, ids: &[Uuid]) -> DatabaseResult<i64> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE id = ANY($1) AND is_deleted = TRUE")
                .bind(ids)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Recycle bin contents, most recently deleted first
    pub async fn recycle_bin(&self) -> DatabaseResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE is_deleted = TRUE ORDER BY deleted_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_order).collect::<Result<_, _>>()?)
    }

    /// Permanently delete orders that are in the recycle bin, returning how many went
    pub async fn purge(&self, ids: &[Uuid]) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ANY($1) AND is_deleted = TRUE")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Permanently delete orders soft-deleted before `cutoff`
    pub async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> DatabaseResult<u64> {
        let result =
            sqlx::query("DELETE FROM orders WHERE is_deleted = TRUE AND deleted_at <= $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Dashboard counters; `rejected` counts the recycle bin
    pub async fn counts(&self) -> DatabaseResult<OrderCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE is_deleted = FALSE) AS total,
                COUNT(*) FILTER (WHERE is_deleted = FALSE AND status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE is_deleted = FALSE AND status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE is_deleted = FALSE AND status = 'delayed') AS delayed,
                COUNT(*) FILTER (WHERE is_deleted = TRUE) AS rejected
            FROM orders
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderCounts {
            total_po_count: row.try_get("total")?,
            pending_po_count: row.try_get("pending")?,
            completed_po_count: row.try_get("completed")?,
            delayed_po_count: row.try_get("delayed")?,
            rejected_po_count: row.try_get("rejected")?,
        })
    }

    /// Order number of the most recently created order
    pub async fn last_order_number(&self) -> DatabaseResult<Option<String>> {
        let number = sqlx::query_scalar(
            "SELECT order_number FROM orders ORDER BY created_at DESC, order_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(number)
    }

    /// Next free `NN/QESPL/MON/YY` number for the month of `date`.
    ///
    /// `None` when the highest stored sequence of that month leaves no room
    /// for another one.
    pub async fn next_order_number(&self, date: DateTime<Utc>) -> DatabaseResult<Option<String>> {
        let suffix = order_number_suffix(date);
        let pattern = format!(r"^\d{{2,}}/{}$", suffix);

        let last: Option<String> = sqlx::query_scalar(
            r#"
            SELECT order_number FROM orders
            WHERE order_number ~ $1
            ORDER BY split_part(order_number, '/', 1)::NUMERIC DESC
            LIMIT 1
            "#,
        )
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await?;

        let Some(sequence) = next_sequence(last.as_deref()) else {
            warn!(
                "Order sequence for {} is exhausted (last {:?})",
                suffix, last
            );
            return Ok(None);
        };
        debug!("Next order sequence for {}: {}", suffix, sequence);

        Ok(Some(format_order_number(sequence, date)))
    }
}

/// `QESPL/<MON>/<YY>` for the month of `date`
fn order_number_suffix(date: DateTime<Utc>) -> String {
    format!(
        "QESPL/{}/{:02}",
        date.format("%b").to_string().to_uppercase(),
        date.year() % 100
    )
}

fn format_order_number(sequence: u64, date: DateTime<Utc>) -> String {
    format!("{:02}/{}", sequence, order_number_suffix(date))
}

/// Leading sequence of a generated order number
fn order_sequence(order_number: &str) -> Option<u64> {
    order_number.split('/').next()?.parse().ok()
}

/// Sequence following `last`, starting at 1
fn next_sequence(last: Option<&str>) -> Option<u64> {
    match last {
        None => Some(1),
        Some(number) => order_sequence(number)?.checked_add(1),
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}

fn map_order(row: &PgRow) -> Result<Order, sqlx::Error> {
    let Json(products): Json<Vec<Product>> = row.try_get("products")?;

    Ok(Order {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        order_date: row.try_get("order_date")?,
        invoice_number: row.try_get("invoice_number")?,
        client_name: row.try_get("client_name")?,
        company_name: row.try_get("company_name")?,
        gst_number: row.try_get("gst_number")?,
        contact: row.try_get("contact")?,
        address: row.try_get("address")?,
        zip_code: row.try_get("zip_code")?,
        products,
        estimated_dispatch_date: row.try_get("estimated_dispatch_date")?,
        generated_by: Party {
            user_id: row.try_get("generated_by_user_id")?,
            username: row.try_get("generated_by_username")?,
            employee_id: row.try_get("generated_by_employee_id")?,
        },
        order_through: Party {
            user_id: None,
            username: row.try_get("order_through_username")?,
            employee_id: row.try_get("order_through_employee_id")?,
        },
        status: get_enum(row, "status")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
