use serde::{Deserialize, Serialize};

use crate::domain::{OrderId, Sku, UserId};

/// Body of `POST <base>/getXsollaPaymentToken`. Field names are fixed by the cloud function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub data: PurchaseRequestData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequestData {
    pub uid: UserId,
    pub email: String,
    pub sku: Sku,
    #[serde(rename = "returnUrl")]
    pub return_url: String,
}

impl PurchaseRequest {
    pub fn new(uid: UserId, email: impl Into<String>, sku: Sku, return_url: impl Into<String>) -> Self {
        Self {
            data: PurchaseRequestData {
                uid,
                email: email.into(),
                sku,
                return_url: return_url.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseToken {
    pub token: String,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Available,
    UnavailableMissing,
    UnavailableOther,
}

impl DependencyStatus {
    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}
