pub mod availability;
pub mod notifications;
pub mod profesionales;
pub mod reclamos;
pub mod scheduling;
pub mod tenant_config;
