//! Bill-payment workflow: five steps from category choice to a completed
//! payment, with an optional detour through the gateway's hosted page.

mod bill_payment;
pub mod redirect;
pub mod state;

pub use bill_payment::BillPaymentWorkflow;
pub use redirect::{BrowserDecision, CallbackMatcher};
pub use state::{Fetch, Loading, SelectionChain, Slot, WorkflowState, WorkflowStep};
