use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::handlers::checkout::{QuoteOutcome, QuoteRequest};
use crate::handlers::health::{HealthStatus, ReadyStatus};
use crate::handlers::payments::{CreatePaymentRequest, CustomerPayload, PaymentCreatedResponse};
use crate::models::order::{
    CartSnapshot, CustomerInfo, ItemDetails, ItemKind, OrderData, OrderItem, OrderOption,
    OrderOrigin, OrderSource, PaymentType, PendingOrder, PostalAddress, ShippingMethod,
};
use crate::services::aggregator::PriceQuote;
use crate::services::reconciliation::ReturnView;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Atelier Checkout API",
        description = "Order checkout and payment orchestration: price quotes, \
                       server-side price validation and hosted payment creation."
    ),
    paths(
        crate::handlers::payments::create_payment,
        crate::handlers::payments::payment_return,
        crate::handlers::checkout::quote,
        crate::handlers::health::health,
        crate::handlers::health::ready,
    ),
    components(schemas(
        CreatePaymentRequest,
        CustomerPayload,
        PaymentCreatedResponse,
        QuoteRequest,
        QuoteOutcome,
        PriceQuote,
        ReturnView,
        HealthStatus,
        ReadyStatus,
        ErrorResponse,
        OrderSource,
        OrderData,
        OrderItem,
        OrderOption,
        ItemDetails,
        ItemKind,
        OrderOrigin,
        ShippingMethod,
        PaymentType,
        CartSnapshot,
        CustomerInfo,
        PostalAddress,
        PendingOrder,
    )),
    tags(
        (name = "payments", description = "Payment creation and return reconciliation"),
        (name = "checkout", description = "Price quotes"),
        (name = "health", description = "Probes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_builds_and_lists_paths() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        let paths = json["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/v1/payments"));
        assert!(paths.contains_key("/api/v1/payments/return"));
        assert!(paths.contains_key("/api/v1/checkout/quote"));
        assert!(paths.contains_key("/health"));
    }
}
