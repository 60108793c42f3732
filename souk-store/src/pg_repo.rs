use async_trait::async_trait;
use chrono::{DateTime, Utc};
use souk_catalog::StockItem;
use souk_core::repository::{MarketStore, MarketTx};
use souk_core::{CoreError, CoreResult};
use souk_shared::{
    CancellationReason, CancellationRequest, CartItem, CartOrder, CartOrderItem, ClaimedOrder,
    ClientProfile, DeliveryAgentProfile, GlobalOrder, Id, NewCartItem, NewCartOrder, NewClaim,
    NewGlobalOrder, NewNotification, NewOrderLine, NewStrike, Notification, Offender,
    ProductRef, ShoppingCart, Strike, Subject, VendorProfile,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::error;

const LIVE_CLAIM_CONSTRAINT: &str = "claimed_orders_live_claim_per_order";
const OPEN_CART_ITEM_CONSTRAINT: &str = "cart_items_open_product_per_cart";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn begin(&self) -> CoreResult<Box<dyn MarketTx>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgMarketTx { tx }))
    }
}

/// Row locks taken through `FOR UPDATE` are held until commit or drop.
pub struct PgMarketTx {
    tx: Transaction<'static, Postgres>,
}

fn map_db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            match db.constraint() {
                Some(LIVE_CLAIM_CONSTRAINT) => {
                    return CoreError::conflict("order already has a live delivery claim");
                }
                Some(OPEN_CART_ITEM_CONSTRAINT) => {
                    return CoreError::validation("this product already exists in your shopping cart");
                }
                _ => {}
            }
        }
    }
    error!("Database error: {:?}", err);
    CoreError::InternalError(err.to_string())
}

fn expect_one(affected: u64, what: &str, id: Id) -> CoreResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(CoreError::integrity(format!("cannot update missing {} {}", what, id)))
    }
}

macro_rules! profile_row {
    ($ty:ident, $row:expr) => {{
        let row: &PgRow = $row;
        Ok::<_, CoreError>($ty {
            id: get(row, "id")?,
            user_id: get(row, "user_id")?,
            full_name: get(row, "full_name")?,
            city: get(row, "city")?,
            is_banned: get(row, "is_banned")?,
        })
    }};
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> CoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(map_db_error)
}

fn product_ref(row: &PgRow) -> CoreResult<ProductRef> {
    let kind: String = get(row, "product_kind")?;
    Ok(ProductRef::from_parts(&kind, get(row, "product_id")?)?)
}

fn map_cart_item(row: &PgRow) -> CoreResult<CartItem> {
    Ok(CartItem {
        id: get(row, "id")?,
        shopping_cart_id: get(row, "shopping_cart_id")?,
        product: product_ref(row)?,
        quantity: get(row, "quantity")?,
        size: get(row, "size")?,
        unit_price_cents: get(row, "unit_price_cents")?,
        total_price_cents: get(row, "total_price_cents")?,
        is_ordered: get(row, "is_ordered")?,
        is_active: get(row, "is_active")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn map_cart(row: &PgRow) -> CoreResult<ShoppingCart> {
    Ok(ShoppingCart {
        id: get(row, "id")?,
        client_id: get(row, "client_id")?,
        created_at: get(row, "created_at")?,
    })
}

fn map_stock(row: &PgRow, reference: ProductRef) -> CoreResult<StockItem> {
    Ok(StockItem {
        reference,
        vendor_id: get(row, "vendor_id")?,
        title: get(row, "title")?,
        price_cents: get(row, "price_cents")?,
        quantity: get(row, "quantity")?,
        in_stock: get(row, "in_stock")?,
        is_active: get(row, "is_active")?,
    })
}

fn map_global_order(row: &PgRow) -> CoreResult<GlobalOrder> {
    let payment: String = get(row, "payment_method")?;
    Ok(GlobalOrder {
        id: get(row, "id")?,
        shopping_cart_id: get(row, "shopping_cart_id")?,
        client_id: get(row, "client_id")?,
        total_price_cents: get(row, "total_price_cents")?,
        payment_method: payment.parse()?,
        address: get(row, "address")?,
        city: get(row, "city")?,
        country: get(row, "country")?,
        delivery_option: get(row, "delivery_option")?,
        created_at: get(row, "created_at")?,
    })
}

fn map_cart_order(row: &PgRow) -> CoreResult<CartOrder> {
    let payment: String = get(row, "payment_method")?;
    let status: String = get(row, "order_status")?;
    Ok(CartOrder {
        id: get(row, "id")?,
        global_order_id: get(row, "global_order_id")?,
        client_id: get(row, "client_id")?,
        vendor_id: get(row, "vendor_id")?,
        total_payed_cents: get(row, "total_payed_cents")?,
        payment_method: payment.parse()?,
        delivery_option: get(row, "delivery_option")?,
        order_status: status.parse()?,
        is_canceled: get(row, "is_canceled")?,
        is_active: get(row, "is_active")?,
        order_date: get(row, "order_date")?,
    })
}

fn map_order_line(row: &PgRow) -> CoreResult<CartOrderItem> {
    Ok(CartOrderItem {
        id: get(row, "id")?,
        order_id: get(row, "order_id")?,
        client_id: get(row, "client_id")?,
        cart_item_id: get(row, "cart_item_id")?,
        total_payed_cents: get(row, "total_payed_cents")?,
        is_canceled: get(row, "is_canceled")?,
        is_canceled_by_vendor: get(row, "is_canceled_by_vendor")?,
        is_active: get(row, "is_active")?,
        created_at: get(row, "created_at")?,
    })
}

fn map_claim(row: &PgRow) -> CoreResult<ClaimedOrder> {
    let status: String = get(row, "delivery_status")?;
    Ok(ClaimedOrder {
        id: get(row, "id")?,
        delivery_agent_id: get(row, "delivery_agent_id")?,
        order_id: get(row, "order_id")?,
        is_confirmed_by_vendor: get(row, "is_confirmed_by_vendor")?,
        expiration_date_time: get(row, "expiration_date_time")?,
        is_failed: get(row, "is_failed")?,
        delivery_status: status.parse()?,
        is_active: get(row, "is_active")?,
        created_at: get(row, "created_at")?,
    })
}

fn map_cancellation_request(row: &PgRow) -> CoreResult<CancellationRequest> {
    let reason: String = get(row, "reason")?;
    Ok(CancellationRequest {
        id: get(row, "id")?,
        claimed_order_id: get(row, "claimed_order_id")?,
        reason: reason.parse()?,
        is_approved: get(row, "is_approved")?,
        is_active: get(row, "is_active")?,
        created_at: get(row, "created_at")?,
    })
}

fn map_strike(row: &PgRow) -> CoreResult<Strike> {
    let kind: String = get(row, "offender_kind")?;
    Ok(Strike {
        id: get(row, "id")?,
        offender: Offender::from_parts(&kind, get(row, "offender_id")?)?,
        reason: get(row, "reason")?,
        is_active: get(row, "is_active")?,
        created_at: get(row, "created_at")?,
    })
}

fn map_notification(row: &PgRow) -> CoreResult<Notification> {
    let kind: Option<String> = get(row, "subject_kind")?;
    let subject_id: Option<Id> = get(row, "subject_id")?;
    let subject = match (kind, subject_id) {
        (Some(kind), Some(id)) => Some(Subject { kind: kind.parse()?, id }),
        _ => None,
    };
    let category: String = get(row, "category")?;
    Ok(Notification {
        id: get(row, "id")?,
        user_id: get(row, "user_id")?,
        message: get(row, "message")?,
        subject,
        category: category.parse()?,
        is_read: get(row, "is_read")?,
        created_at: get(row, "created_at")?,
    })
}

fn stock_table(product: ProductRef) -> &'static str {
    match product {
        ProductRef::Physical(_) => "products",
        ProductRef::Food(_) => "food_products",
    }
}

#[async_trait]
impl MarketTx for PgMarketTx {
    async fn client(&mut self, id: Id) -> CoreResult<Option<ClientProfile>> {
        let row = sqlx::query("SELECT id, user_id, full_name, city, is_banned FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(|r| profile_row!(ClientProfile, r)).transpose()
    }

    async fn vendor(&mut self, id: Id) -> CoreResult<Option<VendorProfile>> {
        let row = sqlx::query("SELECT id, user_id, full_name, city, is_banned FROM vendors WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(|r| profile_row!(VendorProfile, r)).transpose()
    }

    async fn delivery_agent(&mut self, id: Id) -> CoreResult<Option<DeliveryAgentProfile>> {
        let row = sqlx::query(
            "SELECT id, user_id, full_name, city, is_banned FROM delivery_agents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.as_ref().map(|r| profile_row!(DeliveryAgentProfile, r)).transpose()
    }

    async fn delivery_agents_in_city(&mut self, city: &str) -> CoreResult<Vec<DeliveryAgentProfile>> {
        let rows = sqlx::query(
            "SELECT id, user_id, full_name, city, is_banned FROM delivery_agents WHERE city = $1 ORDER BY id",
        )
        .bind(city)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(|r| profile_row!(DeliveryAgentProfile, r)).collect()
    }

    async fn register_client(&mut self, profile: &ClientProfile) -> CoreResult<ShoppingCart> {
        sqlx::query(
            "INSERT INTO clients (id, user_id, full_name, city, is_banned) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(profile.id)
        .bind(profile.user_id)
        .bind(&profile.full_name)
        .bind(&profile.city)
        .bind(profile.is_banned)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        let row = sqlx::query(
            "INSERT INTO shopping_carts (client_id) VALUES ($1) RETURNING id, client_id, created_at",
        )
        .bind(profile.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_cart(&row)
    }

    async fn stock_item(&mut self, product: ProductRef) -> CoreResult<Option<StockItem>> {
        let sql = format!(
            "SELECT vendor_id, title, price_cents, quantity, in_stock, is_active FROM {} WHERE id = $1 FOR UPDATE",
            stock_table(product)
        );
        let row = sqlx::query(&sql)
            .bind(product.id())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(|r| map_stock(r, product)).transpose()
    }

    async fn write_stock(&mut self, item: &StockItem) -> CoreResult<()> {
        let sql = format!(
            "UPDATE {} SET quantity = $2, in_stock = $3 WHERE id = $1",
            stock_table(item.reference)
        );
        let result = sqlx::query(&sql)
            .bind(item.reference.id())
            .bind(item.quantity)
            .bind(item.in_stock)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        expect_one(result.rows_affected(), item.reference.kind(), item.reference.id())
    }

    async fn cart_for_client(&mut self, client_id: Id) -> CoreResult<Option<ShoppingCart>> {
        let row = sqlx::query("SELECT id, client_id, created_at FROM shopping_carts WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_cart).transpose()
    }

    async fn cart_items(&mut self, cart_id: Id) -> CoreResult<Vec<CartItem>> {
        let rows = sqlx::query("SELECT * FROM cart_items WHERE shopping_cart_id = $1 ORDER BY id FOR UPDATE")
            .bind(cart_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        rows.iter().map(map_cart_item).collect()
    }

    async fn cart_item(&mut self, id: Id) -> CoreResult<Option<CartItem>> {
        let row = sqlx::query("SELECT * FROM cart_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_cart_item).transpose()
    }

    async fn insert_cart_item(&mut self, item: &NewCartItem) -> CoreResult<CartItem> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_items
                (shopping_cart_id, product_kind, product_id, quantity, size, unit_price_cents, total_price_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(item.shopping_cart_id)
        .bind(item.product.kind())
        .bind(item.product.id())
        .bind(item.quantity)
        .bind(&item.size)
        .bind(item.unit_price_cents)
        .bind(item.total_price_cents())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_cart_item(&row)
    }

    async fn mark_cart_item_ordered(&mut self, id: Id) -> CoreResult<()> {
        let result = sqlx::query("UPDATE cart_items SET is_ordered = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        expect_one(result.rows_affected(), "cart item", id)
    }

    async fn delete_cart_item(&mut self, id: Id) -> CoreResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn deactivate_open_cart_items(&mut self, product: ProductRef) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items SET is_active = FALSE, updated_at = NOW()
            WHERE product_kind = $1 AND product_id = $2 AND NOT is_ordered AND is_active
            "#,
        )
        .bind(product.kind())
        .bind(product.id())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn insert_global_order(&mut self, order: &NewGlobalOrder) -> CoreResult<GlobalOrder> {
        let row = sqlx::query(
            r#"
            INSERT INTO global_orders
                (shopping_cart_id, client_id, total_price_cents, payment_method, address, city, country, delivery_option)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(order.shopping_cart_id)
        .bind(order.client_id)
        .bind(order.total_price_cents)
        .bind(order.payment_method.as_str())
        .bind(&order.address)
        .bind(&order.city)
        .bind(&order.country)
        .bind(order.delivery_option)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_global_order(&row)
    }

    async fn global_orders_for_client(&mut self, client_id: Id) -> CoreResult<Vec<GlobalOrder>> {
        let rows = sqlx::query("SELECT * FROM global_orders WHERE client_id = $1 ORDER BY id")
            .bind(client_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        rows.iter().map(map_global_order).collect()
    }

    async fn insert_cart_order(&mut self, order: &NewCartOrder) -> CoreResult<CartOrder> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_orders
                (global_order_id, client_id, vendor_id, total_payed_cents, payment_method, delivery_option)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(order.global_order_id)
        .bind(order.client_id)
        .bind(order.vendor_id)
        .bind(order.total_payed_cents)
        .bind(order.payment_method.as_str())
        .bind(order.delivery_option)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_cart_order(&row)
    }

    async fn cart_order(&mut self, id: Id) -> CoreResult<Option<CartOrder>> {
        let row = sqlx::query("SELECT * FROM cart_orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_cart_order).transpose()
    }

    async fn update_cart_order(&mut self, order: &CartOrder) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE cart_orders
            SET total_payed_cents = $2, order_status = $3, is_canceled = $4, is_active = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.total_payed_cents)
        .bind(order.order_status.as_str())
        .bind(order.is_canceled)
        .bind(order.is_active)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        expect_one(result.rows_affected(), "order", order.id)
    }

    async fn insert_order_line(&mut self, line: &NewOrderLine) -> CoreResult<CartOrderItem> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_order_items (order_id, client_id, cart_item_id, total_payed_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(line.order_id)
        .bind(line.client_id)
        .bind(line.cart_item_id)
        .bind(line.total_payed_cents)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_order_line(&row)
    }

    async fn order_line(&mut self, id: Id) -> CoreResult<Option<CartOrderItem>> {
        let row = sqlx::query("SELECT * FROM cart_order_items WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_order_line).transpose()
    }

    async fn order_lines(&mut self, order_id: Id) -> CoreResult<Vec<CartOrderItem>> {
        let rows = sqlx::query("SELECT * FROM cart_order_items WHERE order_id = $1 ORDER BY id FOR UPDATE")
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        rows.iter().map(map_order_line).collect()
    }

    async fn update_order_line(&mut self, line: &CartOrderItem) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE cart_order_items
            SET is_canceled = $2, is_canceled_by_vendor = $3, is_active = $4
            WHERE id = $1
            "#,
        )
        .bind(line.id)
        .bind(line.is_canceled)
        .bind(line.is_canceled_by_vendor)
        .bind(line.is_active)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        expect_one(result.rows_affected(), "order line", line.id)
    }

    async fn count_undelivered_lines_since(&mut self, client_id: Id, since: DateTime<Utc>) -> CoreResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS open_lines
            FROM cart_order_items l
            JOIN cart_orders o ON o.id = l.order_id
            WHERE l.client_id = $1 AND l.created_at >= $2 AND o.order_status <> 'delivered'
            "#,
        )
        .bind(client_id)
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        get(&row, "open_lines")
    }

    async fn insert_claim(&mut self, claim: &NewClaim) -> CoreResult<ClaimedOrder> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO claimed_orders (delivery_agent_id, order_id, expiration_date_time, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(claim.delivery_agent_id)
        .bind(claim.order_id)
        .bind(claim.expiration_or_default(now))
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_claim(&row)
    }

    async fn claim(&mut self, id: Id) -> CoreResult<Option<ClaimedOrder>> {
        let row = sqlx::query("SELECT * FROM claimed_orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_claim).transpose()
    }

    async fn update_claim(&mut self, claim: &ClaimedOrder) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE claimed_orders
            SET is_confirmed_by_vendor = $2, expiration_date_time = $3, is_failed = $4,
                delivery_status = $5, is_active = $6
            WHERE id = $1
            "#,
        )
        .bind(claim.id)
        .bind(claim.is_confirmed_by_vendor)
        .bind(claim.expiration_date_time)
        .bind(claim.is_failed)
        .bind(claim.delivery_status.as_str())
        .bind(claim.is_active)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        expect_one(result.rows_affected(), "claim", claim.id)
    }

    async fn live_claim_for_order(&mut self, order_id: Id) -> CoreResult<Option<ClaimedOrder>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM claimed_orders
            WHERE order_id = $1 AND NOT is_failed
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.as_ref().map(map_claim).transpose()
    }

    async fn active_claim_for_agent(&mut self, agent_id: Id) -> CoreResult<Option<ClaimedOrder>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM claimed_orders
            WHERE delivery_agent_id = $1 AND is_active AND NOT is_failed
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.as_ref().map(map_claim).transpose()
    }

    async fn has_failed_claim(&mut self, agent_id: Id, order_id: Id) -> CoreResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM claimed_orders
                WHERE delivery_agent_id = $1 AND order_id = $2 AND is_failed
            ) AS failed
            "#,
        )
        .bind(agent_id)
        .bind(order_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        get(&row, "failed")
    }

    async fn overdue_claims(&mut self, now: DateTime<Utc>) -> CoreResult<Vec<ClaimedOrder>> {
        // Rows another sweep already holds are skipped, not waited on.
        let rows = sqlx::query(
            r#"
            SELECT * FROM claimed_orders
            WHERE is_active AND NOT is_failed AND NOT is_confirmed_by_vendor
              AND expiration_date_time <= $1
            ORDER BY expiration_date_time
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(map_claim).collect()
    }

    async fn insert_cancellation_request(
        &mut self,
        claim_id: Id,
        reason: CancellationReason,
    ) -> CoreResult<CancellationRequest> {
        let row = sqlx::query(
            r#"
            INSERT INTO cancellation_requests (claimed_order_id, reason)
            VALUES ($1, $2)
            ON CONFLICT (claimed_order_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(claim_id)
        .bind(reason.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        match row {
            Some(row) => map_cancellation_request(&row),
            None => Err(CoreError::conflict(format!(
                "claim {} already has a cancellation request",
                claim_id
            ))),
        }
    }

    async fn cancellation_request(&mut self, id: Id) -> CoreResult<Option<CancellationRequest>> {
        let row = sqlx::query("SELECT * FROM cancellation_requests WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_cancellation_request).transpose()
    }

    async fn cancellation_request_for_claim(&mut self, claim_id: Id) -> CoreResult<Option<CancellationRequest>> {
        let row = sqlx::query("SELECT * FROM cancellation_requests WHERE claimed_order_id = $1")
            .bind(claim_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_cancellation_request).transpose()
    }

    async fn update_cancellation_request(&mut self, request: &CancellationRequest) -> CoreResult<()> {
        let result = sqlx::query("UPDATE cancellation_requests SET is_approved = $2, is_active = $3 WHERE id = $1")
            .bind(request.id)
            .bind(request.is_approved)
            .bind(request.is_active)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        expect_one(result.rows_affected(), "cancellation request", request.id)
    }

    async fn insert_strike(&mut self, strike: &NewStrike) -> CoreResult<Strike> {
        let row = sqlx::query(
            "INSERT INTO strikes (offender_kind, offender_id, reason) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(strike.offender.kind())
        .bind(strike.offender.id())
        .bind(&strike.reason)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_strike(&row)
    }

    async fn strikes_for(&mut self, offender: Offender) -> CoreResult<Vec<Strike>> {
        let rows = sqlx::query("SELECT * FROM strikes WHERE offender_kind = $1 AND offender_id = $2 ORDER BY id")
            .bind(offender.kind())
            .bind(offender.id())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        rows.iter().map(map_strike).collect()
    }

    async fn insert_notification(&mut self, notification: &NewNotification) -> CoreResult<Notification> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, message, subject_kind, subject_id, category)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(notification.user_id)
        .bind(&notification.message)
        .bind(notification.subject.map(|s| s.kind.as_str()))
        .bind(notification.subject.map(|s| s.id))
        .bind(notification.category.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        map_notification(&row)
    }

    async fn notification(&mut self, id: Id) -> CoreResult<Option<Notification>> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(map_notification).transpose()
    }

    async fn notifications_for_user(&mut self, user_id: Id) -> CoreResult<Vec<Notification>> {
        let rows = sqlx::query("SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at, id")
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        rows.iter().map(map_notification).collect()
    }

    async fn mark_notification_read(&mut self, id: Id) -> CoreResult<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        expect_one(result.rows_affected(), "notification", id)
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_table_per_kind() {
        assert_eq!(stock_table(ProductRef::Physical(1)), "products");
        assert_eq!(stock_table(ProductRef::Food(1)), "food_products");
    }

    #[test]
    fn test_non_database_errors_are_internal() {
        let err = map_db_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::InternalError(_)));
    }

    #[test]
    fn test_expect_one() {
        assert!(expect_one(1, "order", 4).is_ok());
        assert_eq!(
            expect_one(0, "order", 4).unwrap_err(),
            CoreError::IntegrityError("cannot update missing order 4".to_string())
        );
    }
}
