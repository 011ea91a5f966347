//! Domain types shared by the engine, the stores and the event loop.

pub mod consumption_stats;
pub mod delivery;
pub mod draft;
pub mod reference;
pub mod stock_declaration;
pub mod variance_event;
pub mod working_copy;

pub use consumption_stats::{
    BaseStats, ConsumptionStats, DeclarationRef, DeliveryRef, Spike, SpikeEvent, StockSource,
    StockStats,
};
pub use delivery::{AcceptanceState, Delivery, DeliveryItem};
pub use draft::{
    AvgType, DraftItem, SystemDraft, TRIGGER_DELIVERY_ACCEPTED, TRIGGER_MANUAL,
    TRIGGER_STOCK_DECLARED,
};
pub use reference::{Customer, Product, RoutePlan};
pub use stock_declaration::{DeclarationItem, StockDeclaration};
pub use variance_event::{
    TriggerType, VarianceDirection, VarianceEvent, VarianceKey, VarianceSeverity, VarianceStatus,
    VarianceTrigger,
};
pub use working_copy::{WorkingCopy, WorkingCopyStatus};
