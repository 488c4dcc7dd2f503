mod client;
mod dispatcher;

pub use client::{
    DeliveryClient, DeliveryError, OutboundMessage, SmtpClientConfig, SmtpDeliveryClient,
};
pub use dispatcher::{DispatchMessage, DispatchOutcome, dispatch};
