//! Observable state of the bill-payment workflow.

use crate::types::{BillPackage, Biller, Category, PaymentGateway, VerifiedCustomer};

/// Workflow stage, numbered the way the UI shows it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowStep {
    #[default]
    Selection = 1,
    Verification = 2,
    Review = 3,
    ExternalRedirect = 4,
    Success = 5,
}

impl WorkflowStep {
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// The step reached by backing out of this one
    pub fn previous(&self) -> Option<WorkflowStep> {
        match self {
            WorkflowStep::Selection | WorkflowStep::Success => None,
            WorkflowStep::Verification => Some(WorkflowStep::Selection),
            WorkflowStep::Review => Some(WorkflowStep::Verification),
            WorkflowStep::ExternalRedirect => Some(WorkflowStep::Review),
        }
    }
}

/// The five ordered selection slots.
///
/// A slot only holds a value while every slot before it does. Changing a slot
/// to a different value (or clearing it) clears everything after it;
/// re-selecting the current value keeps downstream slots intact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionChain {
    category: Option<Category>,
    biller: Option<Biller>,
    package: Option<BillPackage>,
    customer: Option<VerifiedCustomer>,
    gateway: Option<PaymentGateway>,
}

/// Position in the [`SelectionChain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    Category,
    Biller,
    Package,
    Customer,
    Gateway,
}

impl SelectionChain {
    pub fn category(&self) -> Option<&Category> {
        self.category.as_ref()
    }

    pub fn biller(&self) -> Option<&Biller> {
        self.biller.as_ref()
    }

    pub fn package(&self) -> Option<&BillPackage> {
        self.package.as_ref()
    }

    pub fn customer(&self) -> Option<&VerifiedCustomer> {
        self.customer.as_ref()
    }

    pub fn gateway(&self) -> Option<&PaymentGateway> {
        self.gateway.as_ref()
    }

    /// Number of leading slots that are filled
    pub fn depth(&self) -> usize {
        [
            self.category.is_some(),
            self.biller.is_some(),
            self.package.is_some(),
            self.customer.is_some(),
            self.gateway.is_some(),
        ]
        .iter()
        .take_while(|filled| **filled)
        .count()
    }

    /// True when no slot is filled past a gap
    pub fn is_consistent(&self) -> bool {
        let filled = [
            self.category.is_some(),
            self.biller.is_some(),
            self.package.is_some(),
            self.customer.is_some(),
            self.gateway.is_some(),
        ];
        filled.iter().filter(|f| **f).count() == self.depth()
    }

    /// Clear every slot strictly after `slot`
    pub fn clear_after(&mut self, slot: Slot) {
        if slot < Slot::Biller {
            self.biller = None;
        }
        if slot < Slot::Package {
            self.package = None;
        }
        if slot < Slot::Customer {
            self.customer = None;
        }
        if slot < Slot::Gateway {
            self.gateway = None;
        }
    }

    /// Clear `slot` and everything after it
    pub fn clear_from(&mut self, slot: Slot) {
        match slot {
            Slot::Category => self.category = None,
            Slot::Biller => self.biller = None,
            Slot::Package => self.package = None,
            Slot::Customer => self.customer = None,
            Slot::Gateway => self.gateway = None,
        }
        self.clear_after(slot);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Set the category. Returns `true` if it changed.
    pub fn set_category(&mut self, category: Category) -> bool {
        if self.category.as_ref().is_some_and(|c| c.id == category.id) {
            return false;
        }
        self.category = Some(category);
        self.clear_after(Slot::Category);
        true
    }

    /// Set the biller. Returns `None` when there is no category to attach it to.
    pub fn set_biller(&mut self, biller: Biller) -> Option<bool> {
        self.category.as_ref()?;
        if self.biller.as_ref().is_some_and(|b| b.id == biller.id) {
            return Some(false);
        }
        self.biller = Some(biller);
        self.clear_after(Slot::Biller);
        Some(true)
    }

    /// Set the package. Returns `None` when no biller is selected.
    pub fn set_package(&mut self, package: BillPackage) -> Option<bool> {
        self.biller.as_ref()?;
        if self.package.as_ref().is_some_and(|p| p.id == package.id) {
            return Some(false);
        }
        self.package = Some(package);
        self.clear_after(Slot::Package);
        Some(true)
    }

    /// Record a verified customer. Returns `None` when no package is selected.
    pub fn set_customer(&mut self, customer: VerifiedCustomer) -> Option<()> {
        self.package.as_ref()?;
        self.customer = Some(customer);
        self.clear_after(Slot::Customer);
        Some(())
    }

    /// Choose the gateway. Returns `None` before verification.
    pub fn set_gateway(&mut self, gateway: PaymentGateway) -> Option<()> {
        self.customer.as_ref()?;
        self.gateway = Some(gateway);
        Some(())
    }
}

/// The workflow's network operations, each with its own loading flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    Categories,
    Gateways,
    Billers,
    Packages,
    Verify,
    Pay,
}

impl Fetch {
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Per-fetch loading flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Loading {
    pub categories: bool,
    pub gateways: bool,
    pub billers: bool,
    pub packages: bool,
    pub verifying: bool,
    pub paying: bool,
}

impl Loading {
    pub fn is(&self, fetch: Fetch) -> bool {
        match fetch {
            Fetch::Categories => self.categories,
            Fetch::Gateways => self.gateways,
            Fetch::Billers => self.billers,
            Fetch::Packages => self.packages,
            Fetch::Verify => self.verifying,
            Fetch::Pay => self.paying,
        }
    }

    pub fn set(&mut self, fetch: Fetch, on: bool) {
        let flag = match fetch {
            Fetch::Categories => &mut self.categories,
            Fetch::Gateways => &mut self.gateways,
            Fetch::Billers => &mut self.billers,
            Fetch::Packages => &mut self.packages,
            Fetch::Verify => &mut self.verifying,
            Fetch::Pay => &mut self.paying,
        };
        *flag = on;
    }

    pub fn any(&self) -> bool {
        self.categories
            || self.gateways
            || self.billers
            || self.packages
            || self.verifying
            || self.paying
    }
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub step: WorkflowStep,
    pub selection: SelectionChain,

    pub categories: Vec<Category>,
    pub billers: Vec<Biller>,
    pub packages: Vec<BillPackage>,
    pub gateways: Vec<PaymentGateway>,

    /// Account / meter number as typed
    pub account_number: String,
    /// Manual amount as typed; only used when the package has no fixed price
    pub manual_amount: String,

    pub payment_url: Option<String>,
    pub transaction_reference: Option<String>,

    pub loading: Loading,
    pub error: Option<String>,
}

impl WorkflowState {
    /// Amount that will be charged, once verification has resolved it
    pub fn amount(&self) -> Option<f64> {
        self.selection.customer().map(|c| c.amount)
    }

    /// Whether the chosen package needs a manual amount
    pub fn needs_manual_amount(&self) -> bool {
        self.selection
            .package()
            .is_some_and(|p| p.fixed_amount().is_none())
    }
}
