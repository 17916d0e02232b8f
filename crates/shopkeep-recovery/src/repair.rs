// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in repair handlers backed by the transactional store.
//!
//! Each handler validates its payload up front (a malformed payload is a
//! permanent failure) and then applies its repair through the
//! [`TransactionExecutor`], so repairs get the executor's timeout and
//! retries. All repairs are idempotent: re-running one after it succeeded
//! leaves the store unchanged.
//!
//! | Task type | Payload | Repair |
//! |---|---|---|
//! | `order-recovery` | `order_id` | pending/processing order -> `cancelled` |
//! | `payment-recovery` | `payment_id` | pending payment -> `failed`, its order -> `payment_failed` |
//! | `inventory-recovery` | `product_id`, `quantity`, `reservation_id?` | restock `quantity` once per reservation |
//! | `refund-recovery` | `refund_id` | requested/processing refund -> `refunded` |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use shopkeep_core::{ShopkeepError, StoreTxn};
use shopkeep_txn::{TransactionExecutor, TransactionOptions, TransactionResult};

use crate::handler::{HandlerRegistry, RepairHandler};
use crate::task::TaskType;

pub const ORDERS: &str = "orders";
pub const PAYMENTS: &str = "payments";
pub const PRODUCTS: &str = "products";
pub const REFUNDS: &str = "refunds";
pub const INVENTORY_RELEASES: &str = "inventory_releases";

/// Register the four built-in handlers on `registry`.
pub fn register_builtin_handlers(
    registry: &mut HandlerRegistry,
    executor: &TransactionExecutor,
    options: &TransactionOptions,
) {
    let handler = |kind| {
        Arc::new(StoreRepair {
            kind,
            executor: executor.clone(),
            options: options.clone(),
        }) as Arc<dyn RepairHandler>
    };
    registry.register(TaskType::OrderRecovery, handler(RepairKind::CancelOrder));
    registry.register(TaskType::PaymentRecovery, handler(RepairKind::FailPayment));
    registry.register(TaskType::InventoryRecovery, handler(RepairKind::Restock));
    registry.register(TaskType::RefundRecovery, handler(RepairKind::CompleteRefund));
}

#[derive(Debug, Clone, Copy)]
enum RepairKind {
    CancelOrder,
    FailPayment,
    Restock,
    CompleteRefund,
}

struct StoreRepair {
    kind: RepairKind,
    executor: TransactionExecutor,
    options: TransactionOptions,
}

#[async_trait]
impl RepairHandler for StoreRepair {
    async fn repair(&self, payload: &Value) -> Result<(), ShopkeepError> {
        let result = match self.kind {
            RepairKind::CancelOrder => {
                let order_id = required_str(payload, "order_id")?;
                self.executor
                    .execute(
                        |txn| Box::pin(cancel_order(txn, order_id.clone())),
                        &self.options,
                    )
                    .await
            }
            RepairKind::FailPayment => {
                let payment_id = required_str(payload, "payment_id")?;
                self.executor
                    .execute(
                        |txn| Box::pin(fail_payment(txn, payment_id.clone())),
                        &self.options,
                    )
                    .await
            }
            RepairKind::Restock => {
                let product_id = required_str(payload, "product_id")?;
                let quantity = payload
                    .get("quantity")
                    .and_then(Value::as_u64)
                    .filter(|q| *q > 0)
                    .ok_or_else(|| {
                        ShopkeepError::InvalidArgument(
                            "inventory-recovery payload needs a positive integer `quantity`"
                                .to_string(),
                        )
                    })?;
                let reservation_id = optional_str(payload, "reservation_id")?;
                self.executor
                    .execute(
                        |txn| {
                            Box::pin(restock(
                                txn,
                                product_id.clone(),
                                quantity,
                                reservation_id.clone(),
                            ))
                        },
                        &self.options,
                    )
                    .await
            }
            RepairKind::CompleteRefund => {
                let refund_id = required_str(payload, "refund_id")?;
                self.executor
                    .execute(
                        |txn| Box::pin(complete_refund(txn, refund_id.clone())),
                        &self.options,
                    )
                    .await
            }
        };
        into_outcome(result)
    }
}

fn into_outcome(result: TransactionResult) -> Result<(), ShopkeepError> {
    if result.success {
        return Ok(());
    }
    Err(result
        .error
        .unwrap_or_else(|| ShopkeepError::execution("repair transaction failed")))
}

/// A string field, also accepting numbers (ids are often numeric).
fn optional_str(payload: &Value, field: &str) -> Result<Option<String>, ShopkeepError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ShopkeepError::InvalidArgument(format!(
            "payload field `{field}` must be a non-empty string or number, got {other}"
        ))),
    }
}

fn required_str(payload: &Value, field: &str) -> Result<String, ShopkeepError> {
    optional_str(payload, field)?.ok_or_else(|| {
        ShopkeepError::InvalidArgument(format!("payload is missing required field `{field}`"))
    })
}

async fn load(
    txn: &mut dyn StoreTxn,
    collection: &str,
    key: &str,
) -> Result<Value, ShopkeepError> {
    txn.get(collection, key)
        .await?
        .ok_or_else(|| ShopkeepError::execution(format!("{collection}/{key} not found")))
}

fn status_of(doc: &Value) -> &str {
    doc.get("status").and_then(Value::as_str).unwrap_or("")
}

fn with_status(mut doc: Value, status: &str) -> Value {
    if let Some(fields) = doc.as_object_mut() {
        fields.insert("status".to_string(), json!(status));
        fields.insert("recovered_at".to_string(), json!(chrono::Utc::now()));
    }
    doc
}

async fn cancel_order(txn: &mut dyn StoreTxn, order_id: String) -> Result<(), ShopkeepError> {
    let order = load(txn, ORDERS, &order_id).await?;
    let status = status_of(&order).to_owned();
    match status.as_str() {
        "pending" | "processing" => {
            txn.put(ORDERS, &order_id, with_status(order, "cancelled"))
                .await?;
            info!(order_id = %order_id, "order cancelled by recovery");
        }
        status => debug!(order_id = %order_id, status, "order already settled"),
    }
    Ok(())
}

async fn fail_payment(txn: &mut dyn StoreTxn, payment_id: String) -> Result<(), ShopkeepError> {
    let payment = load(txn, PAYMENTS, &payment_id).await?;
    if status_of(&payment) != "pending" {
        debug!(payment_id = %payment_id, status = status_of(&payment), "payment already settled");
        return Ok(());
    }
    let order_id = optional_str(&payment, "order_id")?;
    txn.put(PAYMENTS, &payment_id, with_status(payment, "failed"))
        .await?;

    if let Some(order_id) = order_id {
        if let Some(order) = txn.get(ORDERS, &order_id).await? {
            txn.put(ORDERS, &order_id, with_status(order, "payment_failed"))
                .await?;
        }
    }
    info!(payment_id = %payment_id, "payment marked failed by recovery");
    Ok(())
}

async fn restock(
    txn: &mut dyn StoreTxn,
    product_id: String,
    quantity: u64,
    reservation_id: Option<String>,
) -> Result<(), ShopkeepError> {
    if let Some(reservation_id) = &reservation_id {
        if txn.get(INVENTORY_RELEASES, reservation_id).await?.is_some() {
            debug!(reservation_id = %reservation_id, "reservation already released");
            return Ok(());
        }
    }

    let mut product = load(txn, PRODUCTS, &product_id).await?;
    let stock = product.get("stock").and_then(Value::as_u64).unwrap_or(0);
    let restocked = stock.saturating_add(quantity);
    if let Some(fields) = product.as_object_mut() {
        fields.insert("stock".to_string(), json!(restocked));
    }
    txn.put(PRODUCTS, &product_id, product).await?;

    if let Some(reservation_id) = &reservation_id {
        txn.put(
            INVENTORY_RELEASES,
            reservation_id,
            json!({
                "product_id": product_id,
                "quantity": quantity,
                "released_at": chrono::Utc::now(),
            }),
        )
        .await?;
    }
    info!(product_id = %product_id, quantity, stock = restocked, "inventory restocked by recovery");
    Ok(())
}

async fn complete_refund(txn: &mut dyn StoreTxn, refund_id: String) -> Result<(), ShopkeepError> {
    let refund = load(txn, REFUNDS, &refund_id).await?;
    let status = status_of(&refund).to_owned();
    match status.as_str() {
        "requested" | "processing" => {
            txn.put(REFUNDS, &refund_id, with_status(refund, "refunded"))
                .await?;
            info!(refund_id = %refund_id, "refund completed by recovery");
        }
        status => debug!(refund_id = %refund_id, status, "refund already settled"),
    }
    Ok(())
}
