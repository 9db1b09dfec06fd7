pub mod business_orders;
pub mod gateway_notifications;
pub mod gateway_orders;
pub mod retry_tasks;

use telebirr_sdk::objects::GatewayFlow as SdkGatewayFlow;

/// Integration flow for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `telebirr_sdk::objects::GatewayFlow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "gateway_flow")]
pub enum GatewayFlow {
    B2b,
    C2b,
}

impl From<GatewayFlow> for SdkGatewayFlow {
    fn from(value: GatewayFlow) -> Self {
        match value {
            GatewayFlow::B2b => SdkGatewayFlow::B2b,
            GatewayFlow::C2b => SdkGatewayFlow::C2b,
        }
    }
}

impl From<SdkGatewayFlow> for GatewayFlow {
    fn from(value: SdkGatewayFlow) -> Self {
        match value {
            SdkGatewayFlow::B2b => GatewayFlow::B2b,
            SdkGatewayFlow::C2b => GatewayFlow::C2b,
        }
    }
}

impl std::fmt::Display for GatewayFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkGatewayFlow::from(*self).fmt(f)
    }
}
