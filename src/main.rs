use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use billpay::api::bills::BillsApi;
use billpay::api::payments::PaymentsApi;
use billpay::api::user::UserApi;
use billpay::config::Config;
use billpay::history::{recent_transactions, Subscriptions, TransactionHistory};
use billpay::logging;
use billpay::session::{Navigation, RouteDecision, Session};
use billpay::types::{Id, Transaction, TransactionStatus};
use billpay::validation::{PasswordChangeForm, ProfileForm, SignupForm};
use billpay::workflow::{BillPaymentWorkflow, BrowserDecision, WorkflowStep};

#[derive(Parser)]
#[command(name = "billpay")]
#[command(about = "Pay bills and manage subscriptions from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with username and password
    Login {
        username: String,

        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign in with a Google ID token
    GoogleLogin { id_token: String },

    /// Create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Email a password reset link
    ResetPassword { email: String },

    /// Sign out and forget stored credentials
    Logout,

    /// Show the signed-in user
    Whoami {
        /// Re-read the profile from the server
        #[arg(short, long)]
        refresh: bool,
    },

    /// Update profile fields
    Profile {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        date_of_birth: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },

    /// Change the account password (all values prompted)
    ChangePassword,

    /// List bill categories
    Categories,

    /// List billers in a category
    Billers {
        /// Category slug
        category: String,
    },

    /// List a biller's packages
    Packages {
        /// Biller code or slug
        biller: String,
    },

    /// Pay a bill
    Pay {
        /// Category slug, name or id
        #[arg(long)]
        category: String,

        /// Biller code, slug, name or id
        #[arg(long)]
        biller: String,

        /// Package name or id
        #[arg(long)]
        package: String,

        /// Account or meter number
        #[arg(long)]
        account: String,

        /// Amount, for packages without a fixed price
        #[arg(long)]
        amount: Option<String>,

        /// Payment gateway name or id
        #[arg(long)]
        gateway: Option<String>,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show transaction history
    Transactions {
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// pending, completed, failed, cancelled, expired
        #[arg(short, long)]
        status: Option<String>,

        #[arg(long)]
        search: Option<String>,

        /// Only the five most recent
        #[arg(long)]
        recent: bool,
    },

    /// List or manage subscriptions
    Subscriptions {
        /// Cancel the subscription with this id
        #[arg(long, conflicts_with = "reactivate")]
        cancel: Option<String>,

        /// Reactivate the subscription with this id
        #[arg(long)]
        reactivate: Option<String>,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the user config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let _logging_handle = logging::init_logging(&config, cli.debug)?;

    if let Commands::Config { save } = cli.command {
        return cmd_config(&config, save);
    }

    let session = billpay::connect(&config).context("Failed to start session")?;

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            let user = session.login(&username, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Commands::GoogleLogin { id_token } => {
            let user = session.google_login(&id_token).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Commands::Signup {
            name,
            email,
            phone,
            password,
        } => {
            let (password, confirm_password) = match password {
                Some(p) => (p.clone(), p),
                None => (prompt("Password: ")?, prompt("Confirm password: ")?),
            };
            let form = SignupForm {
                name,
                email,
                phone,
                password,
                confirm_password,
            };
            session.signup(&form).await?;
            println!("Account created. You can now sign in.");
        }
        Commands::ResetPassword { email } => {
            session.reset_password(&email).await?;
            println!("If that address is registered, a reset link is on its way.");
        }
        Commands::Logout => {
            session.logout();
            println!("Signed out");
        }
        Commands::Whoami { refresh } => {
            require_signed_in(&session)?;
            if refresh {
                UserApi::new(Arc::clone(&session)).profile().await?;
            }
            let user = session
                .user()
                .ok_or_else(|| anyhow!("Signed in, but no user details are stored"))?;
            println!("{} <{}>", user.name, user.email);
            if let Some(phone) = user.phone {
                println!("Phone: {}", phone);
            }
        }
        Commands::Profile {
            name,
            phone,
            date_of_birth,
            address,
        } => {
            require_signed_in(&session)?;
            let form = ProfileForm {
                name,
                phone,
                date_of_birth,
                address,
            };
            let profile = UserApi::new(Arc::clone(&session))
                .update_profile(&form)
                .await?;
            println!("Profile updated: {}", profile.display_name());
        }
        Commands::ChangePassword => {
            require_signed_in(&session)?;
            let form = PasswordChangeForm {
                current_password: prompt("Current password: ")?,
                new_password: prompt("New password: ")?,
                confirm_password: prompt("Confirm new password: ")?,
            };
            UserApi::new(Arc::clone(&session))
                .change_password(&form)
                .await?;
            println!("Password changed");
        }
        Commands::Categories => {
            require_signed_in(&session)?;
            for category in BillsApi::new(Arc::clone(&session)).categories().await? {
                println!("{:<24} {}", category.slug, category.name);
            }
        }
        Commands::Billers { category } => {
            require_signed_in(&session)?;
            for biller in BillsApi::new(Arc::clone(&session))
                .billers(&category)
                .await?
            {
                println!("{:<24} {}", biller.package_key(), biller.name);
            }
        }
        Commands::Packages { biller } => {
            require_signed_in(&session)?;
            for package in BillsApi::new(Arc::clone(&session))
                .packages(&biller)
                .await?
            {
                let price = match package.fixed_amount() {
                    Some(amount) => format!("₦{:.2}", amount),
                    None => "any amount".to_string(),
                };
                println!("{:<8} {:<32} {}", package.id, package.name, price);
            }
        }
        Commands::Pay {
            category,
            biller,
            package,
            account,
            amount,
            gateway,
            yes,
        } => {
            require_signed_in(&session)?;
            let order = PayArgs {
                category,
                biller,
                package,
                account,
                amount,
                gateway,
                yes,
            };
            cmd_pay(&config, &session, order).await?;
        }
        Commands::Transactions {
            page,
            status,
            search,
            recent,
        } => {
            require_signed_in(&session)?;
            cmd_transactions(&config, &session, page, status, search, recent).await?;
        }
        Commands::Subscriptions { cancel, reactivate } => {
            require_signed_in(&session)?;
            cmd_subscriptions(&session, cancel, reactivate).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn require_signed_in(session: &Session) -> Result<()> {
    match session.route_decision() {
        RouteDecision::Proceed => Ok(()),
        RouteDecision::RedirectToLogin => bail!("Not signed in. Run `billpay login` first."),
        RouteDecision::Wait => bail!("Session is still loading"),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Case-insensitive match against any of an item's keys
fn pick<'a, T>(items: &'a [T], wanted: &str, keys: impl Fn(&T) -> Vec<String>) -> Option<&'a T> {
    let wanted = wanted.trim();
    items
        .iter()
        .find(|item| keys(item).iter().any(|k| k.eq_ignore_ascii_case(wanted)))
}

struct PayArgs {
    category: String,
    biller: String,
    package: String,
    account: String,
    amount: Option<String>,
    gateway: Option<String>,
    yes: bool,
}

async fn cmd_pay(config: &Config, session: &Arc<Session>, args: PayArgs) -> Result<()> {
    let workflow = BillPaymentWorkflow::new(Arc::clone(session), &config.workflow);
    let mut navigation = session.navigation();

    workflow.enter().await?;

    let state = workflow.state();
    let category = pick(&state.categories, &args.category, |c| {
        vec![c.slug.clone(), c.name.clone(), c.id.to_string()]
    })
    .cloned()
    .ok_or_else(|| anyhow!("No category matching '{}'", args.category))?;
    workflow.select_category(category).await?;

    let state = workflow.state();
    let biller = pick(&state.billers, &args.biller, |b| {
        vec![b.package_key(), b.name.clone(), b.id.to_string()]
    })
    .cloned()
    .ok_or_else(|| anyhow!("No biller matching '{}'", args.biller))?;
    workflow.select_biller(biller).await?;

    let state = workflow.state();
    let package = pick(&state.packages, &args.package, |p| {
        vec![p.name.clone(), p.id.to_string()]
    })
    .cloned()
    .ok_or_else(|| anyhow!("No package matching '{}'", args.package))?;
    workflow.select_package(package)?;
    workflow.proceed_to_verification()?;

    workflow.set_account_number(args.account);
    if let Some(amount) = args.amount {
        workflow.set_manual_amount(amount);
    }
    workflow.verify_customer().await?;

    if let Some(wanted) = args.gateway.as_deref() {
        let state = workflow.state();
        let gateway = pick(&state.gateways, wanted, |g| {
            vec![g.name.clone(), g.id.to_string()]
        })
        .cloned()
        .ok_or_else(|| anyhow!("No payment gateway matching '{}'", wanted))?;
        workflow.select_gateway(gateway)?;
    }

    let state = workflow.state();
    println!("Review payment");
    println!("{}", "─".repeat(60));
    if let Some(c) = state.selection.category() {
        println!("  Category: {}", c.name);
    }
    if let Some(b) = state.selection.biller() {
        println!("  Biller:   {}", b.name);
    }
    if let Some(p) = state.selection.package() {
        println!("  Package:  {}", p.name);
    }
    if let Some(customer) = state.selection.customer() {
        println!("  Account:  {}", customer.account_number);
        if let Some(name) = &customer.details.customer_name {
            println!("  Customer: {}", name);
        }
        println!("  Amount:   ₦{:.2}", customer.amount);
    }
    if let Some(g) = state.selection.gateway() {
        println!("  Gateway:  {}", g.name);
    }
    println!();

    if !args.yes && !prompt("Confirm? [y/N] ")?.trim().eq_ignore_ascii_case("y") {
        println!("Cancelled");
        return Ok(());
    }

    workflow.confirm_payment().await?;

    let redirected = workflow.step() == WorkflowStep::ExternalRedirect;
    if redirected {
        let url = workflow.state().payment_url.unwrap_or_default();
        println!("Complete the payment in your browser:");
        println!("  {}", url);
        println!();
        println!("Paste the address you land on when done (empty line to abandon):");
        loop {
            let line = prompt("> ")?;
            if line.trim().is_empty() {
                workflow.close_browser();
                println!("Payment page closed. Check your transaction history before retrying.");
                return Ok(());
            }
            if workflow.handle_browser_url(&line) == BrowserDecision::Intercept {
                break;
            }
            println!("That is not the completion page; keep going or press enter to abandon.");
        }
    }

    let state = workflow.state();
    if state.step == WorkflowStep::Success {
        println!(
            "Payment submitted. Reference: {}",
            state.transaction_reference.unwrap_or_default()
        );
    }

    // Follow the workflow's request to show the transaction list
    if !redirected {
        return Ok(());
    }
    if let Ok(Ok(Navigation::TransactionList)) = tokio::time::timeout(
        config.workflow.redirect_settle() * 2,
        navigation.recv(),
    )
    .await
    {
        println!();
        let payments = PaymentsApi::new(Arc::clone(session));
        print_transactions(&recent_transactions(&payments, &config.history).await?);
    }

    Ok(())
}

async fn cmd_transactions(
    config: &Config,
    session: &Arc<Session>,
    page: u32,
    status: Option<String>,
    search: Option<String>,
    recent: bool,
) -> Result<()> {
    if recent {
        let payments = PaymentsApi::new(Arc::clone(session));
        print_transactions(&recent_transactions(&payments, &config.history).await?);
        return Ok(());
    }

    let history = TransactionHistory::new(Arc::clone(session), &config.history);
    let status = match status.as_deref() {
        Some(raw) => match TransactionStatus::parse(raw) {
            TransactionStatus::Unknown => bail!("Unknown status filter '{}'", raw),
            parsed => Some(parsed),
        },
        None => None,
    };

    // Each of these reloads page 1
    let mut loaded = false;
    if status.is_some() {
        history.toggle_status_filter(status).await?;
        loaded = true;
    }
    if let Some(query) = search {
        history.search(&query).await?;
        loaded = true;
    }
    if !loaded {
        history.load().await?;
    }
    // Page count is only known after the first load
    if page > 1 {
        history.go_to_page(page).await?;
    }

    let state = history.state();
    print_transactions(&state.transactions);
    println!();
    println!("Page {} of {}", state.page, state.total_pages);
    Ok(())
}

fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions");
        return;
    }
    for tx in transactions {
        let when = tx
            .created()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let amount = tx
            .amount
            .map(|a| format!("₦{:.2}", a))
            .unwrap_or_default();
        println!(
            "{:<16} {:<24} {:>12} {:<10} {}",
            when,
            tx.biller.as_deref().unwrap_or("-"),
            amount,
            tx.status.as_filter(),
            tx.reference
        );
    }
}

async fn cmd_subscriptions(
    session: &Arc<Session>,
    cancel: Option<String>,
    reactivate: Option<String>,
) -> Result<()> {
    let subscriptions = Subscriptions::new(Arc::clone(session));
    subscriptions.load().await?;

    if let Some(id) = cancel {
        subscriptions.cancel(&parse_id(&id)).await?;
        println!("Subscription {} cancelled", id);
    }
    if let Some(id) = reactivate {
        subscriptions.reactivate(&parse_id(&id)).await?;
        println!("Subscription {} reactivated", id);
    }

    let state = subscriptions.state();
    if state.subscriptions.is_empty() {
        println!("You don't have any subscriptions yet.");
        return Ok(());
    }
    for sub in &state.subscriptions {
        println!(
            "{:<6} {:<20} {:<20} {:>12} {:<10} next: {}",
            sub.id,
            sub.service_name.as_deref().unwrap_or("-"),
            sub.package_name.as_deref().unwrap_or("-"),
            sub.amount.map(|a| format!("₦{:.2}", a)).unwrap_or_default(),
            format!("{:?}", sub.status).to_lowercase(),
            sub.next_payment_date.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn parse_id(raw: &str) -> Id {
    match raw.parse::<i64>() {
        Ok(n) => Id::Num(n),
        Err(_) => Id::Text(raw.to_string()),
    }
}

fn cmd_config(config: &Config, save: bool) -> Result<()> {
    if save {
        let path = config.save()?;
        println!("Saved {}", path.display());
        return Ok(());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
