//! Voucher redemption: the action-dispatched endpoint and the client-side
//! state machine that drives it.

pub mod client;
pub mod endpoint;
pub mod session;

pub use client::{HttpVoucherApi, RedemptionDriver};
pub use endpoint::{VoucherRequest, VoucherService};
pub use session::{Step, VoucherMode, VoucherSession};
