//! Purchase order models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Fulfilment status of a purchase order
    OrderStatus as "order status" {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Delayed => "delayed",
        Rejected => "rejected",
    }
}

/// Order line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub remark: Option<String>,
}

/// Person an order was generated by or placed through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub employee_id: Option<String>,
}

/// Purchase order entity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub order_date: Option<DateTime<Utc>>,
    pub invoice_number: Option<String>,
    pub client_name: String,
    pub company_name: Option<String>,
    pub gst_number: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub products: Vec<Product>,
    pub estimated_dispatch_date: Option<DateTime<Utc>>,
    pub generated_by: Party,
    pub order_through: Party,
    pub status: OrderStatus,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /order/api/order-create-api`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_number: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub client_name: String,
    pub company_name: Option<String>,
    pub gst_number: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    #[serde(default)]
    pub products: Vec<Product>,
    pub estimated_dispatch_date: Option<DateTime<Utc>>,
    pub generated_by: Option<Party>,
    pub order_through: Option<Party>,
}

/// Body of `PUT /order/api/update-order/:id`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub order_number: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    pub invoice_number: Option<String>,
    pub client_name: Option<String>,
    pub company_name: Option<String>,
    pub gst_number: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    #[serde(default)]
    pub products: Vec<Product>,
    pub estimated_dispatch_date: Option<DateTime<Utc>>,
    pub generated_by: Option<Party>,
    pub order_through: Option<Party>,
    pub status: Option<OrderStatus>,
}

/// Validated insert payload
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub invoice_number: Option<String>,
    pub client_name: String,
    pub company_name: Option<String>,
    pub gst_number: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub products: Vec<Product>,
    pub estimated_dispatch_date: Option<DateTime<Utc>>,
    pub generated_by: Party,
    pub order_through: Party,
}

/// Query for `GET /order/api/get-all-orders`
#[derive(Debug, Clone, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub status: Option<OrderStatus>,
}

/// Query for `GET /order/api/get-order-login-user`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Query for `GET /order/api/search-order`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSearchQuery {
    pub query: Option<String>,
    pub status: Option<OrderStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Batch body for restore / permanent delete
#[derive(Debug, Clone, Deserialize)]
pub struct OrderIdsRequest {
    #[serde(default)]
    pub ids: Vec<Uuid>,
}

/// Pagination block of the order listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_orders: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(current_page: i64, total_orders: i64, limit: i64) -> Self {
        let total_pages = (total_orders + limit - 1) / limit;
        Pagination {
            current_page,
            total_pages,
            total_orders,
            limit,
        }
    }

    /// Row offset of the current page; `None` when it does not fit in an `i64`
    pub fn offset(&self) -> Option<i64> {
        page_offset(self.current_page, self.limit)
    }
}

/// Row offset of a 1-based `page` of `limit` rows
pub fn page_offset(page: i64, limit: i64) -> Option<i64> {
    page.checked_sub(1)?.checked_mul(limit)
}

/// Response of `GET /order/api/get-all-orders`
#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// Dashboard counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCounts {
    pub total_po_count: i64,
    pub pending_po_count: i64,
    pub completed_po_count: i64,
    pub delayed_po_count: i64,
    /// Orders sitting in the recycle bin
    pub rejected_po_count: i64,
}
