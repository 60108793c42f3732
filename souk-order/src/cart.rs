use souk_catalog::StockLedger;
use souk_core::identity::Principal;
use souk_core::repository::MarketTx;
use souk_core::{CoreError, CoreResult};
use souk_shared::{CartItem, ClientProfile, Id, NewCartItem, ProductRef, ShoppingCart};
use tracing::info;

use crate::context::MarketContext;
use crate::outbox::Pending;

/// Client-side shopping cart maintenance.
pub struct CartService {
    ctx: MarketContext,
}

impl CartService {
    pub fn new(ctx: MarketContext) -> Self {
        Self { ctx }
    }

    pub async fn add_cart_item(
        &self,
        principal: &Principal,
        product: ProductRef,
        quantity: i32,
        size: Option<String>,
    ) -> CoreResult<CartItem> {
        let client_id = principal.require_client("add items to a cart")?;
        let mut tx = self.ctx.begin().await?;

        let client = load_client(tx.as_mut(), client_id).await?;
        if client.is_banned {
            return Err(CoreError::validation("banned clients cannot add items to a cart"));
        }
        let cart = client_cart(tx.as_mut(), client_id).await?;

        let stock = tx
            .stock_item(product)
            .await?
            .ok_or_else(|| CoreError::not_found(product.kind(), product.id()))?;
        if quantity < 1 {
            return Err(CoreError::validation("quantity must be at least 1"));
        }
        if !stock.is_active || !stock.in_stock {
            return Err(CoreError::validation(format!("{} is not available", stock.title)));
        }
        if StockLedger::check_available(&stock, quantity).is_err() {
            return Err(CoreError::validation("request quantity exceed available stock"));
        }

        let unordered = tx
            .cart_items(cart.id)
            .await?
            .into_iter()
            .filter(|i| !i.is_ordered)
            .count();
        if unordered >= self.ctx.rules.max_unordered_cart_items {
            return Err(CoreError::validation(format!(
                "a cart cannot hold more than {} items",
                self.ctx.rules.max_unordered_cart_items
            )));
        }

        let item = tx
            .insert_cart_item(&NewCartItem {
                shopping_cart_id: cart.id,
                product,
                quantity,
                size,
                unit_price_cents: stock.price_cents,
            })
            .await?;

        self.ctx.finish(tx, Pending::new()).await?;
        info!("Client {} added {} x{} to cart {}", client_id, product, quantity, cart.id);
        Ok(item)
    }

    pub async fn remove_cart_item(&self, principal: &Principal, item_id: Id) -> CoreResult<()> {
        let client_id = principal.require_client("remove cart items")?;
        let mut tx = self.ctx.begin().await?;

        let cart = client_cart(tx.as_mut(), client_id).await?;
        let item = tx
            .cart_item(item_id)
            .await?
            .ok_or_else(|| CoreError::not_found("cart item", item_id))?;
        if item.shopping_cart_id != cart.id {
            return Err(CoreError::permission("you cannot remove another client's cart item"));
        }
        if item.is_ordered {
            return Err(CoreError::validation("an ordered cart item cannot be removed"));
        }

        tx.delete_cart_item(item_id).await?;
        self.ctx.finish(tx, Pending::new()).await?;
        info!("Client {} removed cart item {}", client_id, item_id);
        Ok(())
    }

    /// Active, unordered items in the caller's cart.
    pub async fn view_cart(&self, principal: &Principal) -> CoreResult<Vec<CartItem>> {
        let client_id = principal.require_client("view a cart")?;
        let mut tx = self.ctx.begin().await?;
        let cart = client_cart(tx.as_mut(), client_id).await?;
        let items = tx.cart_items(cart.id).await?;
        Ok(items.into_iter().filter(CartItem::is_open).collect())
    }
}

pub(crate) async fn load_client(tx: &mut dyn MarketTx, client_id: Id) -> CoreResult<ClientProfile> {
    tx.client(client_id)
        .await?
        .ok_or_else(|| CoreError::not_found("client", client_id))
}

pub(crate) async fn client_cart(tx: &mut dyn MarketTx, client_id: Id) -> CoreResult<ShoppingCart> {
    tx.cart_for_client(client_id)
        .await?
        .ok_or_else(|| CoreError::integrity(format!("client {} has no shopping cart", client_id)))
}
