use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// key: ephemeral-operation
/// A request to run once a valid ephemeral key exists. The id correlates listener callbacks
/// back to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn retrieve_key(id: impl Into<String>) -> Self {
        Self::new(id, OperationKind::RetrieveKey)
    }

    pub fn is_retrieve_key(&self) -> bool {
        matches!(self.kind, OperationKind::RetrieveKey)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationScope {
    Key,
    Customer,
    Issuing,
}

impl OperationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationScope::Key => "key",
            OperationScope::Customer => "customer",
            OperationScope::Issuing => "issuing",
        }
    }
}

/// Closed set of operations the manager routes. The payloads are opaque to the manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    RetrieveKey,
    AddSource {
        source_id: String,
        source_type: String,
    },
    DeleteSource {
        source_id: String,
    },
    AttachPaymentMethod {
        payment_method_id: String,
    },
    DetachPaymentMethod {
        payment_method_id: String,
    },
    GetPaymentMethods {
        payment_method_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ending_before: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        starting_after: Option<String>,
    },
    UpdateDefaultSource {
        source_id: String,
        source_type: String,
    },
    UpdateShipping {
        shipping_information: ShippingInformation,
    },
    RetrievePin {
        card_id: String,
        verification_id: String,
        user_one_time_code: String,
    },
    UpdatePin {
        card_id: String,
        new_pin: String,
        verification_id: String,
        user_one_time_code: String,
    },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::RetrieveKey => "retrieve_key",
            OperationKind::AddSource { .. } => "add_source",
            OperationKind::DeleteSource { .. } => "delete_source",
            OperationKind::AttachPaymentMethod { .. } => "attach_payment_method",
            OperationKind::DetachPaymentMethod { .. } => "detach_payment_method",
            OperationKind::GetPaymentMethods { .. } => "get_payment_methods",
            OperationKind::UpdateDefaultSource { .. } => "update_default_source",
            OperationKind::UpdateShipping { .. } => "update_shipping",
            OperationKind::RetrievePin { .. } => "retrieve_pin",
            OperationKind::UpdatePin { .. } => "update_pin",
        }
    }

    pub fn scope(&self) -> OperationScope {
        match self {
            OperationKind::RetrieveKey => OperationScope::Key,
            OperationKind::RetrievePin { .. } | OperationKind::UpdatePin { .. } => {
                OperationScope::Issuing
            }
            OperationKind::AddSource { .. }
            | OperationKind::DeleteSource { .. }
            | OperationKind::AttachPaymentMethod { .. }
            | OperationKind::DetachPaymentMethod { .. }
            | OperationKind::GetPaymentMethods { .. }
            | OperationKind::UpdateDefaultSource { .. }
            | OperationKind::UpdateShipping { .. } => OperationScope::Customer,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// key: operation-id-factory
/// Source of unique operation ids, including the ids of internal key retrievals.
pub trait OperationIdFactory: Send + Sync {
    fn create(&self) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UuidOperationIdFactory;

impl OperationIdFactory for UuidOperationIdFactory {
    fn create(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
