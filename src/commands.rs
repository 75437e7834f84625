//! Command definitions and their execution against the backend.
//!
//! The same `Command` tree is parsed from the process arguments and from
//! each interactive shell line.

use crate::api::admin::RewardDraft;
use crate::api::rewards::Redemption;
use crate::api::Api;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{ApiError, SessionError};
use crate::journal::Journal;
use crate::pending::{PendingItem, PendingStore};
use crate::session::SessionManager;
use crate::stats;
use crate::validation::{self, ValidationError};
use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

pub const PASSWORD_ENV: &str = "RECYCLO_PASSWORD";

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in and store the session
    Login {
        email: String,
        #[arg(long, help = "Password (else RECYCLO_PASSWORD, else prompt)")]
        password: Option<String>,
    },
    /// Create a member account
    Register {
        name: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show points and recycling history
    Profile,
    /// Show the points ranking
    Ranking,
    /// Classify a photo of a recyclable item
    Classify {
        image: PathBuf,
        #[arg(long, help = "Keep the result as a pending item")]
        keep: bool,
    },
    /// Manage items waiting to be submitted
    #[command(subcommand)]
    Pending(PendingCommand),
    /// Browse and redeem rewards
    #[command(subcommand)]
    Rewards(RewardsCommand),
    /// Show recycling statistics
    Stats,
    /// Administrator tools
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Start the interactive shell
    Shell,
}

#[derive(Debug, Clone, Subcommand)]
pub enum PendingCommand {
    List,
    /// Remove an item by id or id prefix
    Remove { id: String },
    Clear,
    Summary,
    /// Register all pending items as one recycling drop-off
    Submit,
}

#[derive(Debug, Clone, Subcommand)]
pub enum RewardsCommand {
    List,
    Redeem { id_premio: i64 },
}

#[derive(Debug, Clone, ClapArgs)]
pub struct RewardFields {
    #[arg(long)]
    pub nombre: String,
    #[arg(long)]
    pub puntos: i64,
    #[arg(long, default_value_t = 0)]
    pub stock: i64,
}

impl From<&RewardFields> for RewardDraft {
    fn from(fields: &RewardFields) -> Self {
        RewardDraft {
            nombre: fields.nombre.trim().to_string(),
            puntos_requeridos: fields.puntos,
            stock: fields.stock,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum AdminCommand {
    /// Create an administrator account
    Create {
        name: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// List every reward, including disabled ones
    Rewards,
    Reward { id_premio: i64 },
    AddReward(RewardFields),
    UpdateReward {
        id_premio: i64,
        #[command(flatten)]
        fields: RewardFields,
    },
    /// Enable a disabled reward or disable an enabled one
    ToggleReward { id_premio: i64 },
    /// Redemption history
    History,
    /// Look up a scanned redemption code
    Scan { id_canje: String },
    /// Confirm a scanned redemption
    Validate { id_canje: String },
}

impl Command {
    /// Journal name, e.g. `pending submit`
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Register { .. } => "register",
            Command::Logout => "logout",
            Command::Whoami => "whoami",
            Command::Profile => "profile",
            Command::Ranking => "ranking",
            Command::Classify { .. } => "classify",
            Command::Pending(sub) => match sub {
                PendingCommand::List => "pending list",
                PendingCommand::Remove { .. } => "pending remove",
                PendingCommand::Clear => "pending clear",
                PendingCommand::Summary => "pending summary",
                PendingCommand::Submit => "pending submit",
            },
            Command::Rewards(RewardsCommand::List) => "rewards list",
            Command::Rewards(RewardsCommand::Redeem { .. }) => "rewards redeem",
            Command::Stats => "stats",
            Command::Admin(sub) => match sub {
                AdminCommand::Create { .. } => "admin create",
                AdminCommand::Rewards => "admin rewards",
                AdminCommand::Reward { .. } => "admin reward",
                AdminCommand::AddReward(_) => "admin add-reward",
                AdminCommand::UpdateReward { .. } => "admin update-reward",
                AdminCommand::ToggleReward { .. } => "admin toggle-reward",
                AdminCommand::History => "admin history",
                AdminCommand::Scan { .. } => "admin scan",
                AdminCommand::Validate { .. } => "admin validate",
            },
            Command::Shell => "shell",
        }
    }
}

/// Everything a command needs, built once per process
pub struct App {
    config: Config,
    session: Arc<SessionManager>,
    api: Api,
    classifier: Classifier,
    pending: PendingStore,
    journal: Option<Journal>,
}

impl App {
    pub fn new(
        config: Config,
        session: Arc<SessionManager>,
        classifier: Classifier,
        journal: Option<Journal>,
    ) -> Self {
        let pending = PendingStore::open(&config.pending_file);
        Self {
            api: Api::new(session.clone()),
            config,
            session,
            classifier,
            pending,
            journal,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Re-establish the stored session; failures only sign the user out
    pub fn restore(&mut self) {
        match self.session.restore_on_load() {
            Ok(Some(user)) => tracing::info!(%user, "session restored"),
            Ok(None) => {}
            Err(e) => eprintln!("{}", describe_session_error(&e)),
        }
        let state = self.session.state();
        self.journal_event(|j| j.session_state(state.as_str()));
    }

    /// Run one command and journal it
    pub fn run(&mut self, command: &Command) -> Result<()> {
        let name = command.name();
        self.journal_event(|j| j.command(name));
        let result = self.dispatch(command);
        let error = result.as_ref().err().map(describe);
        self.journal_event(|j| j.outcome(name, error.is_none(), error.as_deref()));
        result
    }

    fn journal_event(&mut self, f: impl FnOnce(&mut Journal) -> Result<()>) {
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = f(journal) {
                warn!(error = %e, "cannot write journal");
            }
        }
    }

    fn dispatch(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Login { email, password } => self.login(email, password.as_deref()),
            Command::Register {
                name,
                email,
                password,
            } => self.register(name, email, password.as_deref(), false),
            Command::Logout => {
                self.session.logout();
                println!("Signed out");
                Ok(())
            }
            Command::Whoami => self.whoami(),
            Command::Profile => self.profile(),
            Command::Ranking => self.ranking(),
            Command::Classify { image, keep } => self.classify(image, *keep),
            Command::Pending(sub) => self.pending(sub),
            Command::Rewards(sub) => self.rewards(sub),
            Command::Stats => self.stats(),
            Command::Admin(sub) => self.admin(sub),
            // Handled by the caller; nested shells are not started
            Command::Shell => Ok(()),
        }
    }

    fn require_login(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            bail!("not signed in; run `login <email>` first");
        }
        Ok(())
    }

    fn require_admin(&self) -> Result<()> {
        self.require_login()?;
        if !self.session.is_admin() {
            bail!("this command requires an administrator account");
        }
        Ok(())
    }

    fn login(&mut self, email: &str, password: Option<&str>) -> Result<()> {
        let password = resolve_password(password)?;
        validation::validate_login(email, &password).map_err(invalid)?;
        let user = self.session.login(email.trim(), &password)?;
        println!("Signed in as {}", user);
        Ok(())
    }

    fn register(
        &mut self,
        name: &str,
        email: &str,
        password: Option<&str>,
        admin: bool,
    ) -> Result<()> {
        let password = resolve_password(password)?;
        validation::validate_registration(name, email, &password).map_err(invalid)?;
        if admin {
            self.session
                .register_admin(name.trim(), email.trim(), &password)?;
            println!("Administrator {} created", email.trim());
        } else {
            self.session.register(name.trim(), email.trim(), &password)?;
            println!("Account created; sign in with `login {}`", email.trim());
        }
        Ok(())
    }

    fn whoami(&self) -> Result<()> {
        let Some(user) = self.session.user() else {
            println!("Not signed in ({})", self.session.state().as_str());
            return Ok(());
        };
        println!("User:   {}", user);
        if let Some(email) = &user.email {
            println!("Email:  {}", email);
        }
        if let Some(id) = &user.id {
            println!("Id:     {}", id);
        }
        if let Some(expiry) = self.session.access_token_expiry() {
            println!("Token:  expires {}", expiry.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        Ok(())
    }

    fn profile(&self) -> Result<()> {
        self.require_login()?;
        let profile = self.api.profile()?;
        let info = &profile.perfil;
        println!("{}", info.nombre.as_deref().unwrap_or("-"));
        if let Some(email) = &info.email {
            println!("{}", email);
        }
        println!("Points: {}", info.puntos);
        if profile.reciclajes.is_empty() {
            println!("No recycling history yet");
            return Ok(());
        }
        println!("\nHistory:");
        for record in &profile.reciclajes {
            let details: Vec<String> = record
                .details
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => format!("{}={}", k, s),
                    other => format!("{}={}", k, other),
                })
                .collect();
            println!("  #{:<6} {}", record.id_reciclaje, details.join("  "));
        }
        Ok(())
    }

    fn ranking(&self) -> Result<()> {
        self.require_login()?;
        let ranking = self.api.ranking()?;
        if ranking.is_empty() {
            println!("Ranking is empty");
        }
        for (i, entry) in ranking.iter().enumerate() {
            println!("{:>3}. {:<30} {:>8}", i + 1, entry.nombre, entry.puntos);
        }
        Ok(())
    }

    fn classify(&mut self, image: &Path, keep: bool) -> Result<()> {
        let verdict = self
            .classifier
            .classify_file(image)
            .with_context(|| format!("classifying {}", image.display()))?;
        let material = verdict
            .top_class
            .as_deref()
            .unwrap_or(crate::pending::UNKNOWN_MATERIAL);
        println!("Material:   {}", material);
        println!("Confidence: {}", verdict.confidence_display());
        if let Some(score) = verdict.score {
            println!("Score:      {}", score);
        }
        if keep {
            let item = PendingItem::from_classification(&verdict, Some(image));
            let id = item.id;
            self.pending.add(item)?;
            println!("Saved as pending item {}", id);
        }
        Ok(())
    }

    fn pending(&mut self, command: &PendingCommand) -> Result<()> {
        match command {
            PendingCommand::List => {
                if self.pending.is_empty() {
                    println!("No pending items");
                }
                for item in self.pending.items() {
                    println!(
                        "{}  {:<14} {:>6.1}  {}",
                        item.id,
                        item.material_label(),
                        item.score,
                        item.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            PendingCommand::Remove { id } => match self.pending.remove(id)? {
                Some(item) => println!("Removed {} ({})", item.id, item.material_label()),
                None => bail!("no single pending item matches '{}'", id),
            },
            PendingCommand::Clear => {
                self.pending.clear()?;
                println!("Pending items cleared");
            }
            PendingCommand::Summary => {
                let summary = self.pending.summary();
                for (material, count) in &summary.by_material {
                    println!("{:<14} {}", material, count);
                }
                println!("Total score: {:.1}", summary.total_score);
            }
            PendingCommand::Submit => {
                self.require_login()?;
                if self.pending.is_empty() {
                    bail!("no pending items to submit");
                }
                let site_id = self.config.site_id;
                let submission = self.api.submit_pending(&mut self.pending, site_id)?;
                let count: u32 = submission.materiales.iter().map(|m| m.cantidad).sum();
                println!("Submitted {} item(s) at site {}", count, submission.id_sede);
            }
        }
        Ok(())
    }

    fn rewards(&self, command: &RewardsCommand) -> Result<()> {
        self.require_login()?;
        match command {
            RewardsCommand::List => {
                for reward in self.api.reward_catalogue()? {
                    println!(
                        "{:>4}  {:<30} {:>6} pts  stock {}",
                        reward.id_premio, reward.nombre, reward.puntos_requeridos, reward.stock
                    );
                }
            }
            RewardsCommand::Redeem { id_premio } => match self.api.redeem(*id_premio)? {
                Redemption::Existing(id) => {
                    println!("You already have a pending redemption for this reward");
                    println!("Code: {}", id);
                }
                Redemption::Created(id) => println!("Redeemed. Code: {}", id),
            },
        }
        Ok(())
    }

    fn stats(&self) -> Result<()> {
        self.require_login()?;
        let records = self.api.stat_records()?;
        let stats = stats::aggregate(&records);

        println!("By material:");
        for b in &stats.by_material {
            println!("  {:<20} {}", b.name, b.cantidad);
        }
        println!("Activity:");
        for d in &stats.activity {
            println!("  {}  {}", d.date, d.cantidad);
        }
        println!("By site:");
        for b in &stats.by_site {
            println!("  {:<20} {}", b.name, b.cantidad);
        }
        println!("Top users:");
        for b in &stats.top_users {
            println!("  {:<20} {}", b.name, b.cantidad);
        }
        let summary = &stats.summary;
        println!("Total: {}", summary.total);
        println!("Average per user: {:.1}", summary.average);
        match &summary.busiest_day {
            Some(day) => println!("Busiest day: {} ({})", day.date, day.cantidad),
            None => println!("Busiest day: -"),
        }
        Ok(())
    }

    fn admin(&mut self, command: &AdminCommand) -> Result<()> {
        self.require_admin()?;
        match command {
            AdminCommand::Create {
                name,
                email,
                password,
            } => return self.register(name, email, password.as_deref(), true),
            AdminCommand::Rewards => {
                for reward in self.api.admin_rewards()? {
                    println!(
                        "{:>4}  {:<30} {:>6} pts  stock {:<5} {}",
                        reward.id_premio,
                        reward.nombre,
                        reward.puntos_requeridos,
                        reward.stock,
                        if reward.is_available() { "enabled" } else { "disabled" }
                    );
                }
            }
            AdminCommand::Reward { id_premio } => {
                let reward = self.api.admin_reward(*id_premio)?;
                println!("{}", serde_json::to_string_pretty(&reward)?);
            }
            AdminCommand::AddReward(fields) => {
                let draft = RewardDraft::from(fields);
                validation::validate_reward(&draft).map_err(invalid)?;
                self.api.add_reward(&draft)?;
                println!("Reward '{}' added", draft.nombre);
            }
            AdminCommand::UpdateReward { id_premio, fields } => {
                let draft = RewardDraft::from(fields);
                validation::validate_reward(&draft).map_err(invalid)?;
                self.api.update_reward(*id_premio, &draft)?;
                println!("Reward {} updated", id_premio);
            }
            AdminCommand::ToggleReward { id_premio } => {
                let reward = self.api.admin_reward(*id_premio)?;
                let enable = !reward.is_available();
                self.api.set_reward_available(*id_premio, enable)?;
                println!(
                    "Reward {} {}",
                    id_premio,
                    if enable { "enabled" } else { "disabled" }
                );
            }
            AdminCommand::History => {
                for entry in self.api.redemption_history()? {
                    println!(
                        "{:<38} {:<25} {:<20} {}",
                        entry.id_canje.as_deref().unwrap_or("-"),
                        entry.premio.as_deref().unwrap_or("-"),
                        entry.nombre.as_deref().unwrap_or("-"),
                        entry.fecha.as_deref().unwrap_or("-")
                    );
                }
            }
            AdminCommand::Scan { id_canje } => {
                let summary = self.api.redemption_summary(id_canje)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                if summary.is_confirmable() {
                    println!("Ready to validate: `admin validate {}`", id_canje);
                }
            }
            AdminCommand::Validate { id_canje } => {
                let summary = self.api.redemption_summary(id_canje)?;
                if !summary.is_confirmable() {
                    bail!(
                        "redemption {} cannot be validated (state: {})",
                        id_canje,
                        summary.estado.as_deref().unwrap_or("unknown")
                    );
                }
                println!("{}", self.api.validate_redemption(id_canje)?);
            }
        }
        Ok(())
    }
}

/// `--password`, then `RECYCLO_PASSWORD`, then an interactive prompt
fn resolve_password(flag: Option<&str>) -> Result<String> {
    if let Some(p) = flag {
        return Ok(p.to_string());
    }
    if let Ok(p) = std::env::var(PASSWORD_ENV) {
        return Ok(p);
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    Ok(rl.readline("Password: ")?)
}

fn invalid(errors: Vec<ValidationError>) -> anyhow::Error {
    let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
    anyhow::anyhow!("invalid input:\n  {}", lines.join("\n  "))
}

fn describe_session_error(err: &SessionError) -> String {
    match err {
        SessionError::InvalidCredentials => "Invalid email or password".to_string(),
        SessionError::DuplicateAccount => "An account with that email already exists".to_string(),
        SessionError::RefreshFailure(_) => {
            "Your session expired and you were signed out. Please sign in again".to_string()
        }
        SessionError::TransientFailure(_) => {
            "Could not reach the server. Please try again later".to_string()
        }
    }
}

/// User-facing text for a failed command
pub fn describe(err: &anyhow::Error) -> String {
    let session = err.downcast_ref::<SessionError>().or_else(|| {
        match err.downcast_ref::<ApiError>() {
            Some(ApiError::Session(e)) => Some(e),
            _ => None,
        }
    });
    match session {
        Some(e) => describe_session_error(e),
        None => format!("{:#}", err),
    }
}
