pub mod availability;
pub mod coordinator;
pub mod ledger;
pub mod metrics;
pub mod payment;
pub mod timer;
pub mod webhook;

pub use coordinator::{ReservationCoordinator, ReservationReceipt};
pub use ledger::{ReservationLedger, Resolution};
pub use metrics::BookingMetrics;
pub use payment::{InitiatorSettings, PaymentInitiator};
pub use timer::{CancelHandle, CancellationTimer, ManualScheduler, Scheduler, TokioScheduler};
pub use webhook::{WebhookDisposition, WebhookEvent, WebhookResolver, WebhookScheme};
